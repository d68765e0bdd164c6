use std::fmt;

use crate::registry::RowBinding;
use crate::scenario::Scenario;
use crate::sheet::SheetId;

#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// Dataset TOML parse / validation error.
    Config(String),
    /// A row key was bound twice.
    DuplicateKey { key: String, existing: RowBinding },
    /// A formula referenced a key that is not bound (or not yet filled).
    UnresolvedReference { key: String, reason: String },
    /// A row was appended to a sheet after the next sheet began.
    FrozenSheet { sheet: SheetId, label: String },
    /// A driver has no value for the active scenario and period.
    MissingAssumption { driver: String, scenario: Scenario, period: String },
    /// WACC <= terminal growth.
    InvalidTerminalAssumption { wacc: f64, growth: f64, context: String },
    /// Historical balance sheet does not balance.
    BalanceIdentity { period: String, assets: f64, liabilities_and_equity: f64, difference: f64 },
    /// Historical cross-validation link is nonzero.
    CrossCheckMismatch { check: String, period: String, left: f64, right: f64, difference: f64 },
    /// IO error (dataset read).
    Io(String),
}

impl BuildError {
    /// Stable machine-readable name, used in JSON error output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::DuplicateKey { .. } => "duplicate_key",
            Self::UnresolvedReference { .. } => "unresolved_reference",
            Self::FrozenSheet { .. } => "frozen_sheet",
            Self::MissingAssumption { .. } => "missing_assumption",
            Self::InvalidTerminalAssumption { .. } => "invalid_terminal_assumption",
            Self::BalanceIdentity { .. } => "balance_identity",
            Self::CrossCheckMismatch { .. } => "cross_check_mismatch",
            Self::Io(_) => "io",
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "dataset error: {msg}"),
            Self::DuplicateKey { key, existing } => {
                write!(f, "row key '{key}' already bound to {existing}")
            }
            Self::UnresolvedReference { key, reason } => {
                write!(f, "unresolved reference '{key}': {reason}")
            }
            Self::FrozenSheet { sheet, label } => {
                write!(f, "sheet {} is frozen; cannot append row '{label}'", sheet.tab_name())
            }
            Self::MissingAssumption { driver, scenario, period } => {
                write!(f, "driver '{driver}' has no {scenario} value for {period}")
            }
            Self::InvalidTerminalAssumption { wacc, growth, context } => {
                write!(
                    f,
                    "{context}: WACC {:.2}% must exceed terminal growth {:.2}%",
                    wacc * 100.0,
                    growth * 100.0
                )
            }
            Self::BalanceIdentity { period, assets, liabilities_and_equity, difference } => {
                write!(
                    f,
                    "balance sheet does not balance in {period}: assets {assets} vs liabilities+equity {liabilities_and_equity} (difference {difference})"
                )
            }
            Self::CrossCheckMismatch { check, period, left, right, difference } => {
                write!(f, "cross-check '{check}' failed in {period}: {left} vs {right} (difference {difference})")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for BuildError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_assumption_names_driver_and_period() {
        let err = BuildError::MissingAssumption {
            driver: "capex".into(),
            scenario: Scenario::Bear,
            period: "2028E".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("capex"));
        assert!(msg.contains("bear"));
        assert!(msg.contains("2028E"));
        assert_eq!(err.kind(), "missing_assumption");
    }

    #[test]
    fn test_terminal_message_shows_percentages() {
        let err = BuildError::InvalidTerminalAssumption {
            wacc: 0.03,
            growth: 0.03,
            context: "terminal value".into(),
        };
        assert_eq!(err.to_string(), "terminal value: WACC 3.00% must exceed terminal growth 3.00%");
    }
}
