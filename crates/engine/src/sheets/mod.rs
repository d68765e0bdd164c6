//! Sheet builders, one module per tab.
//!
//! Each builder appends its rows to the workbook, referencing only rows
//! bound by sheets built before it.

pub mod assumptions;
pub mod balance_sheet;
pub mod cash_flow;
pub mod consolidated_pl;
pub mod dcf;
pub mod ratios;
pub mod segment_pl;
pub mod segment_revenue;
pub mod sensitivity;
pub mod summary;

use crate::cell_id::CellId;
use crate::dataset::Dataset;
use crate::error::BuildError;
use crate::expr::Expr;
use crate::period::{Period, Timeline};
use crate::scenario::ScenarioResolver;
use crate::sheet::{Cell, NumFormat, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

/// Inputs shared by every builder.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub dataset: &'a Dataset,
    pub timeline: &'a Timeline,
    pub resolver: ScenarioResolver<'a>,
}

/// Registry key of a driver's selected-scenario row.
pub fn drv(key: &str) -> String {
    format!("drv.{key}")
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Title, subtitle and column header rows.
pub(crate) fn push_heading(wb: &mut Workbook, title: &str, subtitle: &str) -> Result<(), BuildError> {
    let sheet = wb.current()?;
    let columns = wb.sheet(sheet).map(|s| s.columns.clone()).unwrap_or_default();
    wb.push(Row::new(title).style(RowStyle::Title))?;
    wb.push(Row::new(subtitle).style(RowStyle::Subtitle))?;
    wb.push(
        Row::new(header_label(sheet))
            .style(RowStyle::Header)
            .cells(columns.into_iter().map(Cell::Text).collect()),
    )?;
    Ok(())
}

fn header_label(sheet: SheetId) -> &'static str {
    match sheet {
        SheetId::Ratios => "% or multiple",
        SheetId::Assumptions => "Driver",
        _ => "",
    }
}

pub(crate) fn push_section(wb: &mut Workbook, label: &str) -> Result<(), BuildError> {
    wb.push(Row::new(label).style(RowStyle::Section))?;
    Ok(())
}

/// Filed figures for historical periods, `forecast` for the rest.
pub(crate) fn history_then<F>(t: &Timeline, on: SheetId, series: &[f64], mut forecast: F) -> Result<Vec<Cell>, BuildError>
where
    F: FnMut(Period) -> Result<Expr, BuildError>,
{
    t.periods()
        .map(|p| {
            if t.is_forecast(p) {
                Ok(Cell::computed(forecast(p)?, on))
            } else {
                Ok(Cell::Input(Dataset::hist(series, p)))
            }
        })
        .collect()
}

/// Filed figures, then forecasts built from this row's own prior column.
/// `step` receives a reference to the prior period's cell. Only for
/// timeline-aligned sheets.
pub(crate) fn roll_forward<F>(wb: &Workbook, t: &Timeline, series: &[f64], mut step: F) -> Result<Vec<Cell>, BuildError>
where
    F: FnMut(Expr, Period) -> Result<Expr, BuildError>,
{
    let on = wb.current()?;
    let row = wb.next_row()?;
    let mut cells: Vec<Cell> = Vec::with_capacity(t.len());
    for p in t.periods() {
        let cell = match t.prior(p) {
            Some(prev) if t.is_forecast(p) => {
                let value = cells.get(prev.index()).and_then(Cell::value).unwrap_or(f64::NAN);
                let prior = Expr::cell(CellId::new(on, row, prev.index()), value);
                Cell::Formula(step(prior, p)?)
            }
            _ => Cell::Input(Dataset::hist(series, p)),
        };
        cells.push(cell);
    }
    Ok(cells)
}

/// The same expression shape in every period.
pub(crate) fn every_period<F>(t: &Timeline, on: SheetId, mut f: F) -> Result<Vec<Cell>, BuildError>
where
    F: FnMut(Period) -> Result<Expr, BuildError>,
{
    t.periods().map(|p| Ok(Cell::computed(f(p)?, on))).collect()
}

/// Historical periods only; forecast cells stay empty.
pub(crate) fn historical_only<F>(t: &Timeline, on: SheetId, mut f: F) -> Result<Vec<Cell>, BuildError>
where
    F: FnMut(Period) -> Result<Expr, BuildError>,
{
    t.periods()
        .map(|p| if t.is_forecast(p) { Ok(Cell::Empty) } else { Ok(Cell::computed(f(p)?, on)) })
        .collect()
}

/// Filed figures as a memo row with no forecast.
pub(crate) fn filed_cells(t: &Timeline, series: &[f64]) -> Vec<Cell> {
    t.periods()
        .map(|p| if t.is_forecast(p) { Cell::Empty } else { Cell::Input(Dataset::hist(series, p)) })
        .collect()
}

/// `num / den` per period.
pub(crate) fn ratio_cells(wb: &Workbook, t: &Timeline, num: &str, den: &str) -> Result<Vec<Cell>, BuildError> {
    let on = wb.current()?;
    every_period(t, on, |p| Ok(wb.at_period(num, p)? / wb.at_period(den, p)?))
}

/// Year-over-year growth; the first period has no prior and stays empty.
pub(crate) fn growth_cells(wb: &Workbook, t: &Timeline, key: &str) -> Result<Vec<Cell>, BuildError> {
    let on = wb.current()?;
    t.periods()
        .map(|p| match t.prior(p) {
            None => Ok(Cell::Empty),
            Some(prev) => Ok(Cell::Formula(wb.at_period(key, p)? / wb.at_period(key, prev)? - Expr::num(1.0))),
        })
        .collect()
}

/// Append a rate row (`num / den`).
pub(crate) fn push_ratio(
    wb: &mut Workbook,
    t: &Timeline,
    key: &str,
    label: &str,
    num: &str,
    den: &str,
) -> Result<(), BuildError> {
    let cells = ratio_cells(wb, t, num, den)?;
    wb.push(Row::keyed(key, label).style(RowStyle::Rate).format(NumFormat::Percent).cells(cells))?;
    Ok(())
}

/// Append a YoY row for `of`.
pub(crate) fn push_growth(wb: &mut Workbook, t: &Timeline, key: &str, label: &str, of: &str) -> Result<(), BuildError> {
    let cells = growth_cells(wb, t, of)?;
    wb.push(Row::keyed(key, label).style(RowStyle::Rate).format(NumFormat::Percent).cells(cells))?;
    Ok(())
}

/// Append a historical-only difference row between two keyed rows.
pub(crate) fn push_check(
    wb: &mut Workbook,
    t: &Timeline,
    key: &str,
    label: &str,
    left: &str,
    right: &str,
) -> Result<(), BuildError> {
    let on = wb.current()?;
    let cells = historical_only(t, on, |p| Ok(wb.at_period(left, p)? - wb.at_period(right, p)?))?;
    wb.push(Row::keyed(key, label).style(RowStyle::Check).cells(cells).note("should be 0"))?;
    Ok(())
}
