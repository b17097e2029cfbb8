//! Schema versioning for the governance environment.
//!
//! The meta table carries a schema version. Opening a database written by a
//! newer build is refused; older versions are stepped forward one at a time.

use dgov_store::MetaStore;

use crate::LmdbError;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub struct Migrator;

impl Migrator {
    /// Bring the store at `meta` up to [`CURRENT_SCHEMA_VERSION`].
    pub fn run(meta: &impl MetaStore) -> Result<u32, LmdbError> {
        let stored = meta
            .get_schema_version()
            .map_err(|e| LmdbError::Heed(e.to_string()))?;

        if stored == CURRENT_SCHEMA_VERSION {
            tracing::debug!(version = stored, "governance schema is current");
            return Ok(stored);
        }

        if stored > CURRENT_SCHEMA_VERSION {
            return Err(LmdbError::Heed(format!(
                "schema version {stored} is newer than supported version {CURRENT_SCHEMA_VERSION}"
            )));
        }

        for version in stored..CURRENT_SCHEMA_VERSION {
            tracing::info!(from = version, to = version + 1, "migrating governance schema");
            step(version)?;
        }

        meta.set_schema_version(CURRENT_SCHEMA_VERSION)
            .map_err(|e| LmdbError::Heed(e.to_string()))?;
        Ok(CURRENT_SCHEMA_VERSION)
    }
}

fn step(from: u32) -> Result<(), LmdbError> {
    match from {
        // Fresh environment: tables are created by `LmdbEnvironment::open`.
        0 => Ok(()),
        other => Err(LmdbError::Heed(format!("no migration from schema {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;

    #[test]
    fn fresh_store_is_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 16, 1 << 20).unwrap();
        let store = env.governance_store();

        assert_eq!(Migrator::run(&store).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(store.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        // Second run is a no-op.
        assert_eq!(Migrator::run(&store).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 16, 1 << 20).unwrap();
        let store = env.governance_store();
        store.set_schema_version(CURRENT_SCHEMA_VERSION + 1).unwrap();

        assert!(Migrator::run(&store).is_err());
    }

    #[test]
    fn unknown_step_is_error() {
        assert!(step(99).is_err());
    }
}
