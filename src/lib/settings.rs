//! Runtime settings. Built-in defaults are overridden by an optional
//! `splitledger.toml` in the working directory, then by `SPLITLEDGER_*`
//! environment variables (e.g. `SPLITLEDGER_ORDERING=member_id`).
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::settlement::{MemberOrdering, SettlementCalculator};
use crate::types::MonetaryAmount;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// `tracing` filter directive, e.g. `info` or `splitledger_lib=debug`.
    pub log_level: String,
    /// Balances closer to zero than this are treated as settled. Never below 0.01.
    pub tolerance: Decimal,
    pub ordering: MemberOrdering,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("splitledger")
    }

    pub fn from_file(name: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("log_level", "info")?
            .set_default("tolerance", "0.01")?
            .set_default("ordering", "roster")?
            .add_source(File::with_name(name).required(false))
            .add_source(Environment::with_prefix("SPLITLEDGER"))
            .build()?
            .try_deserialize()
    }

    pub fn calculator(&self) -> SettlementCalculator {
        SettlementCalculator::new(MonetaryAmount::new(self.tolerance), self.ordering)
    }
}
