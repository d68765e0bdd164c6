//! DCF model engine: builds a multi-sheet valuation model from filed
//! financials and a scenario driver table.
//!
//! Sheets are built once each, in dependency order, into a `Workbook`
//! whose `RowRegistry` maps semantic row keys to positions. Later sheets
//! reference earlier ones through the registry; cross-validation rows that
//! need later sheets are reserved and filled in a second pass.

pub mod cell_id;
pub mod crosscheck;
pub mod dataset;
pub mod error;
pub mod expr;
pub mod model;
pub mod period;
pub mod registry;
pub mod scenario;
pub mod sheet;
pub mod sheets;
pub mod workbook;

pub use crosscheck::{CheckReport, CheckResult, CheckStatus};
pub use dataset::Dataset;
pub use error::BuildError;
pub use model::Model;
pub use scenario::Scenario;
pub use sheet::{Cell, Row, Sheet, SheetId};
