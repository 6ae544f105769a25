//! Node-local tuning knobs.
//!
//! These never affect protocol semantics as seen by other oracles; they only
//! bound how long this node waits on its own collaborators and how eagerly
//! it polls the contract for configuration changes.

use std::time::Duration;

/// Permitted range for [`LocalConfig::blockchain_timeout`].
pub const BLOCKCHAIN_TIMEOUT_RANGE: (Duration, Duration) =
    (Duration::from_secs(1), Duration::from_secs(20));
/// Permitted range for [`LocalConfig::contract_config_tracker_poll_interval`].
pub const TRACKER_POLL_INTERVAL_RANGE: (Duration, Duration) =
    (Duration::from_secs(15), Duration::from_secs(120));
/// Permitted range for [`LocalConfig::contract_config_confirmations`].
pub const CONFIG_CONFIRMATIONS_RANGE: (u16, u16) = (1, 100);
/// Permitted range for [`LocalConfig::database_timeout`].
pub const DATABASE_TIMEOUT_RANGE: (Duration, Duration) =
    (Duration::from_millis(100), Duration::from_secs(10));
/// Permitted range for [`LocalConfig::data_source_timeout`].
pub const DATA_SOURCE_TIMEOUT_RANGE: (Duration, Duration) =
    (Duration::from_secs(1), Duration::from_secs(20));

/// A local configuration value fell outside its permitted range.
#[derive(Debug, thiserror::Error)]
#[error("{name} must be between {min:?} and {max:?}, got {got:?}")]
pub struct LocalConfigError {
    /// Name of the offending option
    pub name: &'static str,
    /// Lower bound (inclusive)
    pub min: String,
    /// Upper bound (inclusive)
    pub max: String,
    /// The rejected value
    pub got: String,
}

/// Configuration local to one oracle node.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Maximum wait on any `ContractTransmitter` call
    pub blockchain_timeout: Duration,
    /// Block confirmations required before a config change is acted upon
    pub contract_config_confirmations: u16,
    /// How often the tracker polls the contract for configuration changes
    pub contract_config_tracker_poll_interval: Duration,
    /// Maximum wait on any `Database` call
    pub database_timeout: Duration,
    /// Maximum wait on `DataSource::observe`
    pub data_source_timeout: Duration,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            blockchain_timeout: Duration::from_secs(10),
            contract_config_confirmations: 3,
            contract_config_tracker_poll_interval: Duration::from_secs(15),
            database_timeout: Duration::from_secs(2),
            data_source_timeout: Duration::from_secs(5),
        }
    }
}

impl LocalConfig {
    /// Reject out-of-range values.
    ///
    /// Called once at oracle construction; the core assumes a validated
    /// config thereafter.
    pub fn validate(&self) -> Result<(), LocalConfigError> {
        check_duration(
            "blockchain_timeout",
            self.blockchain_timeout,
            BLOCKCHAIN_TIMEOUT_RANGE,
        )?;
        check_duration(
            "contract_config_tracker_poll_interval",
            self.contract_config_tracker_poll_interval,
            TRACKER_POLL_INTERVAL_RANGE,
        )?;
        let (min, max) = CONFIG_CONFIRMATIONS_RANGE;
        if self.contract_config_confirmations < min || self.contract_config_confirmations > max {
            return Err(LocalConfigError {
                name: "contract_config_confirmations",
                min: min.to_string(),
                max: max.to_string(),
                got: self.contract_config_confirmations.to_string(),
            });
        }
        check_duration("database_timeout", self.database_timeout, DATABASE_TIMEOUT_RANGE)?;
        check_duration(
            "data_source_timeout",
            self.data_source_timeout,
            DATA_SOURCE_TIMEOUT_RANGE,
        )?;
        Ok(())
    }
}

fn check_duration(
    name: &'static str,
    got: Duration,
    (min, max): (Duration, Duration),
) -> Result<(), LocalConfigError> {
    if got < min || got > max {
        return Err(LocalConfigError {
            name,
            min: format!("{min:?}"),
            max: format!("{max:?}"),
            got: format!("{got:?}"),
        });
    }
    Ok(())
}
