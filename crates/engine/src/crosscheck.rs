//! Cross-validation: rows asserting that two independently derived figures
//! agree.
//!
//! Builders register links as they go. Links whose rows depend on a later
//! sheet reserve them up front; the injector fills those once every sheet
//! they reference exists, then evaluates every link period by period.

use std::fmt;

use serde::Serialize;

use crate::dataset::{Dataset, ProvenanceStatus, Statement};
use crate::error::BuildError;
use crate::expr::Expr;
use crate::period::{Period, PeriodKind};
use crate::registry::RowHandle;
use crate::sheet::{Cell, SheetId};
use crate::workbook::Workbook;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Total assets against total liabilities and equity.
    BalanceIdentity,
    /// Any other pair of figures that must agree.
    CrossCheck,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    /// Nonzero in a period whose figures are marked estimated.
    Estimated,
    /// Nonzero in a forecast period on a link where one side is derived
    /// from the other.
    ForecastDrift,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => write!(f, "pass"),
            CheckStatus::Estimated => write!(f, "estimated"),
            CheckStatus::ForecastDrift => write!(f, "forecast drift"),
        }
    }
}

/// Rows a builder reserved for the injector to fill. `mirror` receives a
/// reference to the right-hand side; `difference` receives `left - right`.
#[derive(Debug, Default)]
pub struct CheckRows {
    pub mirror: Option<RowHandle>,
    pub difference: Option<RowHandle>,
}

#[derive(Debug)]
pub struct CrossCheckLink {
    pub name: String,
    pub kind: CheckKind,
    /// Statement whose provenance decides whether a historical mismatch
    /// is fatal.
    pub statement: Statement,
    pub left: String,
    pub right: String,
    pub rows: CheckRows,
}

impl CrossCheckLink {
    pub fn new(name: impl Into<String>, kind: CheckKind, statement: Statement, left: &str, right: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            statement,
            left: left.to_string(),
            right: right.to_string(),
            rows: CheckRows::default(),
        }
    }

    pub fn with_rows(mut self, rows: CheckRows) -> Self {
        self.rows = rows;
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckResult {
    pub check: String,
    pub kind: CheckKind,
    pub period: String,
    pub forecast: bool,
    pub left: f64,
    pub right: f64,
    pub difference: f64,
    pub status: CheckStatus,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CheckReport {
    pub tolerance: f64,
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    pub fn count(&self, status: CheckStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Every historical result passed outright.
    pub fn historical_clean(&self) -> bool {
        self.results.iter().filter(|r| !r.forecast).all(|r| r.status == CheckStatus::Pass)
    }
}

#[derive(Debug)]
pub struct CrossValidationInjector {
    tolerance: f64,
    links: Vec<CrossCheckLink>,
}

impl CrossValidationInjector {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance, links: Vec::new() }
    }

    pub fn register(&mut self, link: CrossCheckLink) {
        log::debug!("registered cross-check '{}' ({} vs {})", link.name, link.left, link.right);
        self.links.push(link);
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Fill every reserved row, then evaluate each link. The first hard
    /// failure aborts.
    pub fn run(self, wb: &mut Workbook, dataset: &Dataset) -> Result<CheckReport, BuildError> {
        let mut report = CheckReport { tolerance: self.tolerance, results: Vec::new() };
        for mut link in self.links {
            let rows = std::mem::take(&mut link.rows);
            let right = inject(wb, &link, rows)?;
            evaluate(wb, dataset, &link, &right, self.tolerance, &mut report)?;
        }
        log::debug!("cross-checks: {} results", report.results.len());
        Ok(report)
    }
}

/// Fill the link's reserved rows. Returns the key to read the right-hand
/// side from: the mirror row when there is one.
fn inject(wb: &mut Workbook, link: &CrossCheckLink, rows: CheckRows) -> Result<String, BuildError> {
    let mut right = link.right.clone();
    if let Some(handle) = rows.mirror {
        let cells = period_cells(wb, link, &link.right, handle.binding().sheet, |p| wb.at_period(&link.right, p))?;
        right = handle.key().to_string();
        wb.fill(handle, cells)?;
    }
    if let Some(handle) = rows.difference {
        let cells = period_cells(wb, link, &right, handle.binding().sheet, |p| {
            Ok(wb.at_period(&link.left, p)? - wb.at_period(&right, p)?)
        })?;
        wb.fill(handle, cells)?;
    }
    Ok(right)
}

/// One cell per period; skipped periods stay blank.
fn period_cells<F>(wb: &Workbook, link: &CrossCheckLink, right: &str, on: SheetId, f: F) -> Result<Vec<Cell>, BuildError>
where
    F: Fn(Period) -> Result<Expr, BuildError>,
{
    wb.timeline()
        .periods()
        .map(|p| if skipped(wb, link, right, p)? { Ok(Cell::Empty) } else { Ok(Cell::computed(f(p)?, on)) })
        .collect()
}

/// A forecast period is skipped only when a side's cell exists and is
/// blank, as on filed-only memo rows. Balance identities are never skipped;
/// unresolvable sides are errors.
fn skipped(wb: &Workbook, link: &CrossCheckLink, right: &str, p: Period) -> Result<bool, BuildError> {
    if link.kind == CheckKind::BalanceIdentity || !wb.timeline().is_forecast(p) {
        return Ok(false);
    }
    let blank = |key: &str| -> Result<bool, BuildError> { Ok(matches!(wb.cell_at(key, p)?, Cell::Empty)) };
    Ok(blank(&link.left)? || blank(right)?)
}

fn evaluate(
    wb: &Workbook,
    dataset: &Dataset,
    link: &CrossCheckLink,
    right_key: &str,
    tolerance: f64,
    report: &mut CheckReport,
) -> Result<(), BuildError> {
    let t = wb.timeline();
    for p in t.periods() {
        let forecast = t.kind(p) == PeriodKind::Forecast;
        if skipped(wb, link, right_key, p)? {
            continue;
        }
        let (left, right) = (wb.value_at(&link.left, p)?, wb.value_at(right_key, p)?);
        let difference = left - right;
        let label = t.label(p).to_string();
        let within = difference.abs() <= tolerance * right.abs().max(1.0);

        let status = match (within, forecast) {
            (true, _) => CheckStatus::Pass,
            (false, true) if link.kind == CheckKind::BalanceIdentity => {
                return Err(mismatch(link, label, left, right, difference));
            }
            (false, true) => CheckStatus::ForecastDrift,
            (false, false) => match dataset.provenance(link.statement, &label) {
                ProvenanceStatus::Estimated => {
                    log::warn!(
                        "{} does not tie in {} ({} vs {}); {} figures are estimated",
                        link.name,
                        label,
                        left,
                        right,
                        link.statement.label()
                    );
                    CheckStatus::Estimated
                }
                ProvenanceStatus::Filed => return Err(mismatch(link, label, left, right, difference)),
            },
        };
        report.results.push(CheckResult {
            check: link.name.clone(),
            kind: link.kind,
            period: label,
            forecast,
            left,
            right,
            difference,
            status,
        });
    }
    Ok(())
}

fn mismatch(link: &CrossCheckLink, period: String, left: f64, right: f64, difference: f64) -> BuildError {
    match link.kind {
        CheckKind::BalanceIdentity => BuildError::BalanceIdentity {
            period,
            assets: left,
            liabilities_and_equity: right,
            difference,
        },
        CheckKind::CrossCheck => BuildError::CrossCheckMismatch { check: link.name.clone(), period, left, right, difference },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Timeline;
    use crate::sheet::{ColumnLayout, Row, SheetId};

    const DATASET: &str = r#"
        [company]
        name = "Example Co"
        ticker = "EXM"
        valuation_date = "2025-12-31"

        [periods]
        historical = ["2024A", "2025A"]
        forecast = ["2026E"]

        [[segments]]
        key = "core"
        label = "Core"
        division = "core"
        revenue = [100.0, 110.0]

        [[divisions]]
        key = "core"
        label = "Core"
        cost_model = "blended_margin"
        operating_income = [10.0, 11.0]

        [[provenance]]
        statement = "consolidated"
        period = "2024A"
        status = "estimated"
    "#;

    fn dataset() -> Dataset {
        toml::from_str(DATASET).unwrap()
    }

    /// Segment sheet with reserved rows, then a later sheet holding the
    /// figure they compare against.
    fn workbook(later: [f64; 3]) -> (Workbook, CheckRows) {
        let t = Timeline::new(vec!["2024A".into(), "2025A".into()], vec!["2026E".into()]).unwrap();
        let mut wb = Workbook::new(t);
        wb.begin_sheet(SheetId::SegmentPl, ColumnLayout::Timeline).unwrap();
        wb.push(Row::keyed("spl.oi_total", "OI").cells(vec![Cell::Input(10.0), Cell::Input(11.0), Cell::Input(12.0)]))
            .unwrap();
        let mirror = wb.reserve(Row::keyed("spl.ebit_link", "EBIT")).unwrap();
        let difference = wb.reserve(Row::keyed("spl.ebit_diff", "Diff")).unwrap();
        wb.begin_sheet(SheetId::ConsolidatedPl, ColumnLayout::Timeline).unwrap();
        wb.push(Row::keyed("pl.ebit", "EBIT").cells(later.iter().map(|v| Cell::Input(*v)).collect())).unwrap();
        (wb, CheckRows { mirror: Some(mirror), difference: Some(difference) })
    }

    fn injector(rows: CheckRows) -> CrossValidationInjector {
        let mut injector = CrossValidationInjector::new(1e-6);
        injector.register(
            CrossCheckLink::new("segment OI vs EBIT", CheckKind::CrossCheck, Statement::Consolidated, "spl.oi_total", "pl.ebit")
                .with_rows(rows),
        );
        injector
    }

    #[test]
    fn test_injector_fills_reserved_rows() {
        let (mut wb, rows) = workbook([10.0, 11.0, 12.0]);
        let report = injector(rows).run(&mut wb, &dataset()).unwrap();

        assert!(matches!(wb.cell("spl.ebit_link", 1).unwrap(), Cell::Link(_)));
        let diff = wb.cell("spl.ebit_diff", 1).unwrap().expr().unwrap().formula(SheetId::SegmentPl);
        assert_eq!(diff, "=C1-C2");
        assert_eq!(wb.value("spl.ebit_diff", 2).unwrap(), 0.0);
        assert!(!wb.registry().is_pending("spl.ebit_diff"));

        assert_eq!(report.results.len(), 3);
        assert!(report.historical_clean());
        assert_eq!(report.count(CheckStatus::Pass), 3);
    }

    #[test]
    fn test_filed_historical_mismatch_is_fatal() {
        let (mut wb, rows) = workbook([10.0, 12.5, 12.0]);
        let err = injector(rows).run(&mut wb, &dataset()).unwrap_err();
        match err {
            BuildError::CrossCheckMismatch { period, difference, .. } => {
                assert_eq!(period, "2025A");
                assert!((difference + 1.5).abs() < 1e-12);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_estimated_period_is_informational() {
        let (mut wb, rows) = workbook([9.0, 11.0, 15.0]);
        let report = injector(rows).run(&mut wb, &dataset()).unwrap();
        let status: Vec<CheckStatus> = report.results.iter().map(|r| r.status).collect();
        assert_eq!(status, vec![CheckStatus::Estimated, CheckStatus::Pass, CheckStatus::ForecastDrift]);
        assert!(!report.historical_clean());
    }

    #[test]
    fn test_forecast_balance_break_is_fatal() {
        let t = Timeline::new(vec!["2025A".into()], vec!["2026E".into()]).unwrap();
        let mut wb = Workbook::new(t);
        wb.begin_sheet(SheetId::BalanceSheet, ColumnLayout::Timeline).unwrap();
        wb.push(Row::keyed("bs.total_assets", "TA").cells(vec![Cell::Input(100.0), Cell::Input(120.0)])).unwrap();
        wb.push(Row::keyed("bs.total_le", "TLE").cells(vec![Cell::Input(100.0), Cell::Input(119.0)])).unwrap();
        let mut injector = CrossValidationInjector::new(1e-6);
        injector.register(CrossCheckLink::new(
            "balance identity",
            CheckKind::BalanceIdentity,
            Statement::BalanceSheet,
            "bs.total_assets",
            "bs.total_le",
        ));
        let err = injector.run(&mut wb, &dataset()).unwrap_err();
        assert_eq!(err.kind(), "balance_identity");
    }

    #[test]
    fn test_blank_forecast_balance_side_is_fatal() {
        let t = Timeline::new(vec!["2025A".into()], vec!["2026E".into()]).unwrap();
        let mut wb = Workbook::new(t);
        wb.begin_sheet(SheetId::BalanceSheet, ColumnLayout::Timeline).unwrap();
        wb.push(Row::keyed("bs.total_assets", "TA").cells(vec![Cell::Input(100.0), Cell::Empty])).unwrap();
        wb.push(Row::keyed("bs.total_le", "TLE").cells(vec![Cell::Input(100.0), Cell::Input(119.0)])).unwrap();
        let difference = wb.reserve(Row::keyed("bs.balance_check", "Check")).unwrap();
        let mut injector = CrossValidationInjector::new(1e-6);
        injector.register(
            CrossCheckLink::new(
                "balance identity",
                CheckKind::BalanceIdentity,
                Statement::BalanceSheet,
                "bs.total_assets",
                "bs.total_le",
            )
            .with_rows(CheckRows { mirror: None, difference: Some(difference) }),
        );
        let err = injector.run(&mut wb, &dataset()).unwrap_err();
        assert_eq!(err.kind(), "unresolved_reference");
    }

    #[test]
    fn test_filed_only_memo_skips_forecast() {
        let t = Timeline::new(vec!["2025A".into()], vec!["2026E".into()]).unwrap();
        let mut wb = Workbook::new(t);
        wb.begin_sheet(SheetId::ConsolidatedPl, ColumnLayout::Timeline).unwrap();
        wb.push(Row::keyed("pl.ebit", "EBIT").cells(vec![Cell::Input(11.0), Cell::Input(12.0)])).unwrap();
        wb.push(Row::keyed("pl.ebit_reported", "Filed").cells(vec![Cell::Input(11.0)])).unwrap();
        let difference = wb.reserve(Row::keyed("pl.ebit_check", "Check")).unwrap();
        let mut injector = CrossValidationInjector::new(1e-6);
        injector.register(
            CrossCheckLink::new("EBIT vs filed", CheckKind::CrossCheck, Statement::Consolidated, "pl.ebit", "pl.ebit_reported")
                .with_rows(CheckRows { mirror: None, difference: Some(difference) }),
        );
        let report = injector.run(&mut wb, &dataset()).unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].period, "2025A");
        assert_eq!(wb.value("pl.ebit_check", 0).unwrap(), 0.0);
        assert_eq!(wb.cell("pl.ebit_check", 1).unwrap(), &Cell::Empty);
    }

    #[test]
    fn test_unbound_forecast_side_is_an_error() {
        let (mut wb, rows) = workbook([10.0, 11.0, 12.0]);
        let mut injector = CrossValidationInjector::new(1e-6);
        injector.register(
            CrossCheckLink::new("dangling", CheckKind::CrossCheck, Statement::Consolidated, "spl.oi_total", "pl.nowhere")
                .with_rows(rows),
        );
        let err = injector.run(&mut wb, &dataset()).unwrap_err();
        assert_eq!(err.kind(), "unresolved_reference");
    }
}
