//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, bad -o path)  |
//! | 3-9     | input            | Reading and validating the dataset       |
//! | 10-19   | build            | Model build failures                     |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `build_exit_code` or the relevant command

use dcfgrid_engine::BuildError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, conflicting options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Input (3-9)
// =============================================================================

/// Dataset could not be read, or an output file could not be written.
pub const EXIT_IO: u8 = 3;

/// Dataset failed to parse or validate (history lengths, unknown keys, ...).
pub const EXIT_DATASET: u8 = 4;

// =============================================================================
// Build (10-19)
// =============================================================================

/// A required driver has no value for the active scenario and period.
pub const EXIT_MISSING_ASSUMPTION: u8 = 10;

/// WACC at or below terminal growth (DCF or sensitivity grid).
pub const EXIT_INVALID_TERMINAL: u8 = 11;

/// A filed historical figure fails the balance identity or a cross-check.
pub const EXIT_INVARIANT: u8 = 12;

/// Row registry misuse: duplicate key, unresolved reference, frozen sheet.
/// Always a builder bug, never a data problem.
pub const EXIT_REGISTRY: u8 = 13;

/// Map a build error to its exit code.
pub fn build_exit_code(err: &BuildError) -> u8 {
    match err {
        BuildError::Io(_) => EXIT_IO,
        BuildError::Config(_) => EXIT_DATASET,
        BuildError::MissingAssumption { .. } => EXIT_MISSING_ASSUMPTION,
        BuildError::InvalidTerminalAssumption { .. } => EXIT_INVALID_TERMINAL,
        BuildError::BalanceIdentity { .. } | BuildError::CrossCheckMismatch { .. } => EXIT_INVARIANT,
        BuildError::DuplicateKey { .. } | BuildError::UnresolvedReference { .. } | BuildError::FrozenSheet { .. } => {
            EXIT_REGISTRY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcfgrid_engine::Scenario;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_IO,
            EXIT_DATASET,
            EXIT_MISSING_ASSUMPTION,
            EXIT_INVALID_TERMINAL,
            EXIT_INVARIANT,
            EXIT_REGISTRY,
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_build_error_mapping() {
        let missing = BuildError::MissingAssumption {
            driver: "capex".into(),
            scenario: Scenario::Bear,
            period: "2027E".into(),
        };
        assert_eq!(build_exit_code(&missing), EXIT_MISSING_ASSUMPTION);
        assert_eq!(build_exit_code(&BuildError::Config("bad".into())), EXIT_DATASET);
        let unresolved = BuildError::UnresolvedReference { key: "pl.ebit".into(), reason: "unbound".into() };
        assert_eq!(build_exit_code(&unresolved), EXIT_REGISTRY);
    }
}
