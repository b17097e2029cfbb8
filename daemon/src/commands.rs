//! Execution of one CLI command against an opened ledger.
//!
//! Every command returns a JSON value; the binary prints it on stdout.
//! Amounts and addresses are rendered as strings so u128 values survive
//! JSON consumers.

use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Value};

use dgov_governance::{
    DelegateeStanding, GovernanceEvent, GovernanceLedger, NewProposal, Proposal, RecordedEvent,
};
use dgov_store::MetaStore;
use dgov_store_lmdb::{LmdbBalanceBook, LmdbGovernanceStore};
use dgov_token::BalanceOracle;
use dgov_types::{Address, Clock, TokenAmount};
use dgov_utils::format_remaining;

use crate::cli::{Command, ProposalFilter};
use crate::config::DaemonConfig;

/// Meta key set once the genesis allocations have been minted.
pub const GENESIS_KEY: &str = "genesis_minted";

pub type Ledger<C> = GovernanceLedger<LmdbGovernanceStore, LmdbBalanceBook, C>;

#[derive(Serialize)]
struct ProposalView {
    id: u64,
    title: String,
    description: String,
    amount: String,
    recipient: String,
    proposer: String,
    votes: String,
    status: String,
    created_at: u64,
    deadline: u64,
    time_left: String,
    finalized_at: Option<u64>,
}

impl ProposalView {
    fn new(proposal: &Proposal, voting_period_secs: u64, now: u64) -> Self {
        let deadline = proposal.deadline(voting_period_secs).as_secs();
        Self {
            id: proposal.id.raw(),
            title: proposal.title.clone(),
            description: proposal.description.clone(),
            amount: proposal.amount.to_string(),
            recipient: proposal.recipient.to_string(),
            proposer: proposal.proposer.to_string(),
            votes: proposal.votes.to_string(),
            status: proposal.status.to_string(),
            created_at: proposal.created_at.as_secs(),
            deadline,
            time_left: if proposal.is_active() {
                format_remaining(deadline, now)
            } else {
                "closed".to_string()
            },
            finalized_at: proposal.finalized_at.map(|t| t.as_secs()),
        }
    }
}

#[derive(Serialize)]
struct StandingView {
    delegatee: String,
    votes_received: String,
    delegators: usize,
}

impl From<&DelegateeStanding> for StandingView {
    fn from(s: &DelegateeStanding) -> Self {
        Self {
            delegatee: s.delegatee.to_string(),
            votes_received: s.votes_received.to_string(),
            delegators: s.delegator_count,
        }
    }
}

fn event_json(recorded: &RecordedEvent) -> Value {
    let detail = match &recorded.event {
        GovernanceEvent::Delegate {
            delegator,
            delegatee,
            amount,
            timestamp,
        }
        | GovernanceEvent::Undelegate {
            delegator,
            delegatee,
            amount,
            timestamp,
        } => json!({
            "delegator": delegator.to_string(),
            "delegatee": delegatee.to_string(),
            "amount": amount.to_string(),
            "timestamp": timestamp.as_secs(),
        }),
        GovernanceEvent::Propose {
            id,
            proposer,
            amount,
            recipient,
        } => json!({
            "id": id.raw(),
            "proposer": proposer.to_string(),
            "amount": amount.to_string(),
            "recipient": recipient.to_string(),
        }),
        GovernanceEvent::UpVote { id, voter } | GovernanceEvent::DownVote { id, voter } => json!({
            "id": id.raw(),
            "voter": voter.to_string(),
        }),
        GovernanceEvent::Finalize {
            id,
            recipient,
            status,
        } => json!({
            "id": id.raw(),
            "recipient": recipient.to_string(),
            "status": status.to_string(),
        }),
    };
    json!({ "seq": recorded.seq, "event": recorded.event.name(), "detail": detail })
}

fn balance_json<C: Clock>(ledger: &Ledger<C>, address: &Address) -> anyhow::Result<Value> {
    let book = ledger.oracle();
    Ok(json!({
        "address": address.to_string(),
        "balance": book.balance_of(address)?.to_string(),
        "allowance": book.allowance(address)?.to_string(),
        "voting_weight": ledger.voting_weight(address)?.to_string(),
    }))
}

/// Mint the genesis allocations unless that already happened.
fn init<C: Clock>(ledger: &Ledger<C>, config: &DaemonConfig) -> anyhow::Result<Value> {
    let store = ledger.store();
    if store.get_meta(GENESIS_KEY)?.is_some() {
        tracing::info!("genesis already minted");
        return Ok(json!({ "minted": 0, "already_initialised": true }));
    }

    let allocations = config.genesis_allocations()?;
    for (address, amount) in &allocations {
        ledger
            .oracle()
            .mint(address, *amount)
            .with_context(|| format!("mint genesis allocation for {address}"))?;
    }
    store.put_meta(GENESIS_KEY, &[1])?;
    tracing::info!(allocations = allocations.len(), "genesis minted");

    Ok(json!({
        "minted": allocations.len(),
        "custody": ledger.oracle().custody().to_string(),
        "quorum": ledger.quorum().to_string(),
        "voting_period_secs": ledger.voting_period(),
    }))
}

pub fn run<C: Clock>(
    command: Command,
    ledger: &mut Ledger<C>,
    config: &DaemonConfig,
    now: u64,
) -> anyhow::Result<Value> {
    let period = ledger.voting_period();
    let value = match command {
        Command::Init => init(ledger, config)?,
        Command::Balance { address } => balance_json(ledger, &address)?,
        Command::Approve { owner, amount } => {
            ledger.oracle().approve(&owner, TokenAmount::new(amount))?;
            balance_json(ledger, &owner)?
        }
        Command::Transfer { from, to, amount } => {
            let amount = TokenAmount::new(amount);
            if from == ledger.oracle().custody() {
                let surplus = ledger.treasury_balance()?;
                if amount > surplus {
                    anyhow::bail!(
                        "custody can only transfer its treasury surplus: requested {amount}, available {surplus}"
                    );
                }
            }
            ledger.oracle().transfer(&from, &to, amount)?;
            json!({
                "from": balance_json(ledger, &from)?,
                "to": balance_json(ledger, &to)?,
            })
        }
        Command::Delegate { caller, delegatee } => {
            let amount = ledger.delegate(&caller, &delegatee)?;
            json!({
                "delegator": caller.to_string(),
                "delegatee": delegatee.to_string(),
                "amount": amount.to_string(),
            })
        }
        Command::Undelegate { caller } => {
            let delegatee = ledger.delegator_delegatee(&caller);
            let amount = ledger.undelegate(&caller)?;
            json!({
                "delegator": caller.to_string(),
                "delegatee": delegatee.to_string(),
                "amount": amount.to_string(),
            })
        }
        Command::Propose {
            caller,
            title,
            description,
            amount,
            recipient,
        } => {
            let id = ledger.create_proposal(
                &caller,
                NewProposal {
                    title,
                    description,
                    amount: TokenAmount::new(amount),
                    recipient,
                },
            )?;
            json!({ "id": id.raw() })
        }
        Command::UpVote { caller, id } => {
            let cast = ledger.up_vote(&caller, id)?;
            json!({ "id": id.raw(), "cast": cast.to_string() })
        }
        Command::DownVote { caller, id } => {
            let cast = ledger.down_vote(&caller, id)?;
            json!({ "id": id.raw(), "cast": cast.to_string() })
        }
        Command::Finalize { caller, id } => {
            let status = ledger.finalize_proposal(&caller, id)?;
            json!({ "id": id.raw(), "status": status.to_string() })
        }
        Command::Proposal { id } => {
            let proposal = ledger
                .proposal(id)
                .with_context(|| format!("no proposal {id}"))?;
            serde_json::to_value(ProposalView::new(proposal, period, now))?
        }
        Command::Proposals { status } => {
            let proposals = match status {
                ProposalFilter::Active => ledger.active_proposals(),
                ProposalFilter::Finalized => ledger.finalized_proposals(),
                ProposalFilter::All => {
                    let mut all = ledger.active_proposals();
                    all.extend(ledger.finalized_proposals());
                    all.sort_by_key(|p| p.id);
                    all
                }
            };
            let views: Vec<ProposalView> = proposals
                .into_iter()
                .map(|p| ProposalView::new(p, period, now))
                .collect();
            serde_json::to_value(views)?
        }
        Command::Delegatees => {
            let views: Vec<StandingView> = ledger
                .delegatees_by_votes()
                .iter()
                .map(StandingView::from)
                .collect();
            json!({
                "total_delegated": ledger.total_tokens_delegated().to_string(),
                "delegatees": views,
            })
        }
        Command::Delegation { address } => {
            let delegators: Vec<String> = ledger
                .delegatee_delegators(&address)
                .iter()
                .map(Address::to_string)
                .collect();
            json!({
                "address": address.to_string(),
                "delegatee": ledger.delegator_delegatee(&address).to_string(),
                "delegated_balance": ledger.delegator_balance(&address).to_string(),
                "delegated_at": ledger.delegation(&address).map(|d| d.delegated_at.as_secs()),
                "votes_received": ledger.delegatee_votes_received(&address).to_string(),
                "delegators": delegators,
            })
        }
        Command::Events { from, limit } => {
            let events: Vec<Value> = ledger
                .events_since(from, limit)?
                .iter()
                .map(event_json)
                .collect();
            Value::Array(events)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenesisAllocation;
    use dgov_store_lmdb::{LmdbEnvironment, Migrator};
    use dgov_types::{ProposalId, Timestamp};

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0)
        }
    }

    fn addr(seed: u8) -> Address {
        Address::new([seed; 20])
    }

    fn config() -> DaemonConfig {
        DaemonConfig {
            quorum: 150,
            genesis: [(1u8, 100u64), (2, 100), (3, 100)]
                .into_iter()
                .map(|(seed, amount)| GenesisAllocation {
                    address: addr(seed).to_string(),
                    amount,
                })
                .chain([GenesisAllocation {
                    address: DaemonConfig::default().custody,
                    amount: 10_000,
                }])
                .collect(),
            ..DaemonConfig::default()
        }
    }

    fn open(dir: &tempfile::TempDir, config: &DaemonConfig) -> (LmdbEnvironment, Ledger<FixedClock>) {
        let env = LmdbEnvironment::open(dir.path(), 16, 16 * 1024 * 1024).unwrap();
        let custody = config.custody_address().unwrap();
        let store = env.custody_store(custody);
        Migrator::run(&store).unwrap();
        let book = env.balance_book(custody);
        let ledger = GovernanceLedger::open(store, book, FixedClock(1_000), config.params()).unwrap();
        (env, ledger)
    }

    #[test]
    fn init_mints_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let (_env, mut ledger) = open(&dir, &config);

        let first = run(Command::Init, &mut ledger, &config, 1_000).unwrap();
        assert_eq!(first["minted"], 4);
        let second = run(Command::Init, &mut ledger, &config, 1_000).unwrap();
        assert_eq!(second["minted"], 0);

        let balance = run(Command::Balance { address: addr(1) }, &mut ledger, &config, 1_000).unwrap();
        assert_eq!(balance["balance"], "100");
        assert_eq!(ledger.treasury_balance().unwrap(), TokenAmount::new(10_000));
    }

    #[test]
    fn governance_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let (_env, mut ledger) = open(&dir, &config);
        run(Command::Init, &mut ledger, &config, 1_000).unwrap();

        run(Command::Approve { owner: addr(1), amount: 100 }, &mut ledger, &config, 1_000).unwrap();
        let delegated = run(
            Command::Delegate { caller: addr(1), delegatee: addr(2) },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap();
        assert_eq!(delegated["amount"], "100");

        let proposed = run(
            Command::Propose {
                caller: addr(3),
                title: "Docs".into(),
                description: String::new(),
                amount: 500,
                recipient: addr(9),
            },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap();
        assert_eq!(proposed["id"], 1);

        let cast = run(
            Command::UpVote { caller: addr(2), id: ProposalId::FIRST },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap();
        assert_eq!(cast["cast"], "200");

        let finalized = run(
            Command::Finalize { caller: addr(3), id: ProposalId::FIRST },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap();
        assert_eq!(finalized["status"], "passed");

        let listed = run(
            Command::Proposals { status: ProposalFilter::Finalized },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap();
        assert_eq!(listed[0]["time_left"], "closed");

        let delegatees = run(Command::Delegatees, &mut ledger, &config, 1_000).unwrap();
        assert_eq!(delegatees["delegatees"][0]["votes_received"], "100");

        let events = run(Command::Events { from: 1, limit: 10 }, &mut ledger, &config, 1_000).unwrap();
        let names: Vec<&str> = events
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Delegate", "Propose", "UpVote", "Finalize"]);
    }

    #[test]
    fn rejected_operation_surfaces_governance_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let (_env, mut ledger) = open(&dir, &config);
        let err = run(Command::Undelegate { caller: addr(1) }, &mut ledger, &config, 1_000)
            .unwrap_err();
        assert!(err.to_string().contains("has no active delegation"));
    }

    #[test]
    fn custody_transfers_are_capped_at_treasury_surplus() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let custody = config.custody_address().unwrap();
        let (_env, mut ledger) = open(&dir, &config);
        run(Command::Init, &mut ledger, &config, 1_000).unwrap();
        run(Command::Approve { owner: addr(1), amount: 100 }, &mut ledger, &config, 1_000).unwrap();
        run(
            Command::Delegate { caller: addr(1), delegatee: addr(2) },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap();

        let err = run(
            Command::Transfer { from: custody, to: addr(9), amount: 10_001 },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap_err();
        assert!(err.to_string().contains("treasury surplus"));
        assert_eq!(ledger.oracle().custody_balance().unwrap(), TokenAmount::new(10_100));

        run(
            Command::Transfer { from: custody, to: addr(9), amount: 10_000 },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap();
        assert_eq!(ledger.treasury_balance().unwrap(), TokenAmount::ZERO);
        assert_eq!(ledger.oracle().custody_balance().unwrap(), TokenAmount::new(100));
        ledger.audit().unwrap();
    }

    #[test]
    fn custody_cannot_vote() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let custody = config.custody_address().unwrap();
        let (_env, mut ledger) = open(&dir, &config);
        run(Command::Init, &mut ledger, &config, 1_000).unwrap();
        run(
            Command::Propose {
                caller: addr(3),
                title: "Docs".into(),
                description: String::new(),
                amount: 500,
                recipient: addr(9),
            },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap();

        let err = run(
            Command::UpVote { caller: custody, id: ProposalId::FIRST },
            &mut ledger,
            &config,
            1_000,
        )
        .unwrap_err();
        assert!(err.to_string().contains("has no voting power"));
        let balance = run(Command::Balance { address: custody }, &mut ledger, &config, 1_000).unwrap();
        assert_eq!(balance["voting_weight"], "0");
    }
}
