//! Command-line surface of the `dgov` binary.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use dgov_types::{Address, ProposalId};
use dgov_utils::LogFormat;

use crate::config::DaemonConfig;

#[derive(Parser, Debug)]
#[command(name = "dgov", version, about = "Delegated token-weighted governance ledger")]
pub struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// flags and env vars override them.
    #[arg(long, env = "DGOV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the ledger database.
    #[arg(long, env = "DGOV_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "DGOV_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "DGOV_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Layer flag and env overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut DaemonConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProposalFilter {
    Active,
    Finalized,
    All,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database and mint the configured genesis balances.
    Init,

    /// Show an address's spendable balance and allowance to custody.
    Balance { address: Address },

    /// Allow the ledger to escrow up to `amount` from `owner`.
    Approve { owner: Address, amount: u128 },

    /// Move tokens between two holders.
    Transfer {
        from: Address,
        to: Address,
        amount: u128,
    },

    /// Delegate the caller's whole balance.
    Delegate { caller: Address, delegatee: Address },

    /// Withdraw the caller's delegation.
    Undelegate { caller: Address },

    /// Open a treasury proposal.
    Propose {
        caller: Address,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        amount: u128,
        #[arg(long)]
        recipient: Address,
    },

    /// Vote for a proposal with the caller's full weight.
    UpVote { caller: Address, id: ProposalId },

    /// Vote against a proposal with the caller's full weight.
    DownVote { caller: Address, id: ProposalId },

    /// Close a proposal once it has quorum or its deadline has passed.
    Finalize { caller: Address, id: ProposalId },

    /// Show one proposal.
    Proposal { id: ProposalId },

    /// List proposals.
    Proposals {
        #[arg(long, value_enum, default_value_t = ProposalFilter::Active)]
        status: ProposalFilter,
    },

    /// List current delegatees by votes received.
    Delegatees,

    /// Show an address's delegation and received weight.
    Delegation { address: Address },

    /// Print the event log.
    Events {
        #[arg(long, default_value_t = 1)]
        from: u64,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0x0101010101010101010101010101010101010101";
    const BOB: &str = "0x0202020202020202020202020202020202020202";

    #[test]
    fn parses_delegate() {
        let cli = Cli::try_parse_from(["dgov", "delegate", ALICE, BOB]).unwrap();
        match cli.command {
            Command::Delegate { caller, delegatee } => {
                assert_eq!(caller, Address::new([1; 20]));
                assert_eq!(delegatee, Address::new([2; 20]));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_propose_with_flags() {
        let cli = Cli::try_parse_from([
            "dgov", "propose", ALICE, "--title", "Docs", "--amount", "500", "--recipient", BOB,
        ])
        .unwrap();
        match cli.command {
            Command::Propose {
                title,
                description,
                amount,
                ..
            } => {
                assert_eq!(title, "Docs");
                assert_eq!(description, "");
                assert_eq!(amount, 500);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_address() {
        assert!(Cli::try_parse_from(["dgov", "undelegate", "0x12"]).is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let cli = Cli::try_parse_from([
            "dgov",
            "--data-dir",
            "/tmp/elsewhere",
            "--log-format",
            "json",
            "delegatees",
        ])
        .unwrap();
        let mut config = DaemonConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn proposals_default_to_active() {
        let cli = Cli::try_parse_from(["dgov", "proposals"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Proposals {
                status: ProposalFilter::Active
            }
        ));
    }
}
