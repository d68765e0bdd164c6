//! Model under construction: sheets plus the row registry.
//!
//! Sheets are appended one at a time. Beginning a sheet freezes the one
//! before it; only reserved rows may change after that.

use crate::cell_id::CellId;
use crate::error::BuildError;
use crate::expr::Expr;
use crate::period::{Period, Timeline};
use crate::registry::{RowBinding, RowHandle, RowRegistry};
use crate::sheet::{Cell, ColumnLayout, Row, Sheet, SheetId};

#[derive(Debug)]
pub struct Workbook {
    timeline: Timeline,
    registry: RowRegistry,
    /// Sheets in build order.
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(timeline: Timeline) -> Self {
        Self { timeline, registry: RowRegistry::new(), sheets: Vec::new() }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn registry(&self) -> &RowRegistry {
        &self.registry
    }

    pub fn sheet(&self, id: SheetId) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.id == id)
    }

    /// Start a timeline- or forecast-aligned sheet.
    pub fn begin_sheet(&mut self, id: SheetId, layout: ColumnLayout) -> Result<(), BuildError> {
        let columns = match layout {
            ColumnLayout::Timeline => self.timeline.labels().to_vec(),
            ColumnLayout::Forecast => self.timeline.forecast().map(|p| self.timeline.label(p).to_string()).collect(),
            ColumnLayout::Free => Vec::new(),
        };
        self.begin_sheet_with_columns(id, layout, columns)
    }

    pub fn begin_sheet_with_columns(
        &mut self,
        id: SheetId,
        layout: ColumnLayout,
        columns: Vec<String>,
    ) -> Result<(), BuildError> {
        if self.sheet(id).is_some() {
            return Err(BuildError::Config(format!("sheet {} built twice", id.tab_name())));
        }
        if let Some(prev) = self.sheets.last_mut() {
            prev.freeze();
            log::debug!("froze {} ({} rows)", prev.name(), prev.rows().len());
        }
        self.sheets.push(Sheet::new(id, layout, columns));
        Ok(())
    }

    pub fn current(&self) -> Result<SheetId, BuildError> {
        self.sheets
            .last()
            .map(|s| s.id)
            .ok_or_else(|| BuildError::Config("no sheet has been started".into()))
    }

    /// Index the next pushed row will take on the current sheet.
    pub fn next_row(&self) -> Result<usize, BuildError> {
        self.sheets
            .last()
            .map(|s| s.rows().len())
            .ok_or_else(|| BuildError::Config("no sheet has been started".into()))
    }

    /// Append a row to the current sheet, binding its key if it has one.
    pub fn push(&mut self, row: Row) -> Result<RowBinding, BuildError> {
        let key = row.key.clone();
        let sheet = self
            .sheets
            .last_mut()
            .ok_or_else(|| BuildError::Config("no sheet has been started".into()))?;
        if let Some(existing) = key.as_deref().and_then(|k| self.registry.get(k)) {
            return Err(BuildError::DuplicateKey { key: key.unwrap_or_default(), existing });
        }
        let id = sheet.id;
        let index = sheet.push(row)?;
        if let Some(key) = key {
            self.registry.bind(&key, id, index)?;
        }
        Ok(RowBinding { sheet: id, row: index })
    }

    /// Append a placeholder row whose cells are written later via `fill`.
    pub fn reserve(&mut self, row: Row) -> Result<RowHandle, BuildError> {
        let key = row
            .key
            .clone()
            .ok_or_else(|| BuildError::Config(format!("reserved row '{}' needs a key", row.label)))?;
        let width = self.sheets.last().map(|s| s.columns.len()).unwrap_or(0);
        let placeholder = Row { key: None, cells: vec![Cell::Pending; width.max(1)], ..row };
        let binding = self.push(placeholder)?;
        let handle = self.registry.reserve(&key, binding.sheet, binding.row)?;
        if let Some(sheet) = self.sheets.iter_mut().find(|s| s.id == binding.sheet) {
            sheet.set_key(binding.row, key);
        }
        Ok(handle)
    }

    /// Write the cells of a reserved row. Permitted on frozen sheets.
    pub fn fill(&mut self, handle: RowHandle, cells: Vec<Cell>) -> Result<RowBinding, BuildError> {
        let binding = handle.binding();
        let sheet = self
            .sheets
            .iter_mut()
            .find(|s| s.id == binding.sheet)
            .ok_or_else(|| BuildError::UnresolvedReference {
                key: handle.key().to_string(),
                reason: "reserved on a sheet that does not exist".into(),
            })?;
        if sheet.fill(binding.row, cells).is_none() {
            return Err(BuildError::UnresolvedReference {
                key: handle.key().to_string(),
                reason: format!("reserved row {} is out of range", binding.excel_row()),
            });
        }
        Ok(self.registry.complete(handle))
    }

    pub fn cell(&self, key: &str, col: usize) -> Result<&Cell, BuildError> {
        let binding = self.registry.resolve(key)?;
        let row = self
            .sheet(binding.sheet)
            .and_then(|s| s.row(binding.row))
            .ok_or_else(|| BuildError::UnresolvedReference {
                key: key.to_string(),
                reason: format!("{binding} does not exist"),
            })?;
        Ok(row.cell(col))
    }

    pub fn value(&self, key: &str, col: usize) -> Result<f64, BuildError> {
        self.cell(key, col)?.value().ok_or_else(|| BuildError::UnresolvedReference {
            key: key.to_string(),
            reason: format!("column {col} holds no value"),
        })
    }

    /// Reference to column `col` of the row bound to `key`.
    pub fn at(&self, key: &str, col: usize) -> Result<Expr, BuildError> {
        let binding = self.registry.resolve(key)?;
        let value = self.value(key, col)?;
        Ok(Expr::cell(CellId::new(binding.sheet, binding.row, col), value))
    }

    /// Data column of the row bound to `key` that holds `period`.
    fn column(&self, key: &str, period: Period) -> Result<usize, BuildError> {
        let binding = self.registry.resolve(key)?;
        let layout = self.sheet(binding.sheet).map(|s| s.layout).unwrap_or(ColumnLayout::Free);
        match layout {
            ColumnLayout::Timeline => Ok(period.index()),
            ColumnLayout::Forecast => self.timeline.forecast_index(period).ok_or_else(|| {
                BuildError::UnresolvedReference {
                    key: key.to_string(),
                    reason: format!("{} is not a forecast period", self.timeline.label(period)),
                }
            }),
            ColumnLayout::Free => Err(BuildError::UnresolvedReference {
                key: key.to_string(),
                reason: "row is not period-aligned".into(),
            }),
        }
    }

    /// Cell of the row bound to `key` for `period`, blank or not.
    pub fn cell_at(&self, key: &str, period: Period) -> Result<&Cell, BuildError> {
        let col = self.column(key, period)?;
        self.cell(key, col)
    }

    /// Reference to `period` of the row bound to `key`, mapping the period
    /// onto that sheet's columns.
    pub fn at_period(&self, key: &str, period: Period) -> Result<Expr, BuildError> {
        let col = self.column(key, period)?;
        self.at(key, col)
    }

    pub fn value_at(&self, key: &str, period: Period) -> Result<f64, BuildError> {
        Ok(self.at_period(key, period)?.eval())
    }

    pub fn into_parts(mut self) -> (Timeline, RowRegistry, Vec<Sheet>) {
        if let Some(last) = self.sheets.last_mut() {
            last.freeze();
        }
        (self.timeline, self.registry, self.sheets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workbook() -> Workbook {
        let t = Timeline::new(vec!["2025A".into()], vec!["2026E".into(), "2027E".into()]).unwrap();
        Workbook::new(t)
    }

    #[test]
    fn test_push_binds_and_references() {
        let mut wb = workbook();
        wb.begin_sheet(SheetId::ConsolidatedPl, ColumnLayout::Timeline).unwrap();
        wb.push(Row::new("title")).unwrap();
        wb.push(Row::keyed("pl.revenue", "Revenue").cells(vec![Cell::Input(10.0), Cell::Input(11.0), Cell::Input(12.0)]))
            .unwrap();

        wb.begin_sheet(SheetId::Dcf, ColumnLayout::Forecast).unwrap();
        let e = wb.at_period("pl.revenue", Period::at(2)).unwrap();
        assert_eq!(e.eval(), 12.0);
        assert_eq!(e.render(SheetId::Dcf), "Consolidated_PL!D2");
    }

    #[test]
    fn test_previous_sheet_frozen_on_begin() {
        let mut wb = workbook();
        wb.begin_sheet(SheetId::SegmentRevenue, ColumnLayout::Timeline).unwrap();
        wb.begin_sheet(SheetId::SegmentPl, ColumnLayout::Timeline).unwrap();
        assert!(wb.sheet(SheetId::SegmentRevenue).unwrap().is_frozen());
        assert!(wb.begin_sheet(SheetId::SegmentRevenue, ColumnLayout::Timeline).is_err());
    }

    #[test]
    fn test_reserved_row_unresolvable_until_filled() {
        let mut wb = workbook();
        wb.begin_sheet(SheetId::BalanceSheet, ColumnLayout::Timeline).unwrap();
        let handle = wb.reserve(Row::keyed("bs.balance_check", "Balance check")).unwrap();
        assert!(matches!(
            wb.at("bs.balance_check", 0),
            Err(BuildError::UnresolvedReference { .. })
        ));

        wb.begin_sheet(SheetId::CashFlow, ColumnLayout::Timeline).unwrap();
        let binding = wb.fill(handle, vec![Cell::Input(0.0); 3]).unwrap();
        assert_eq!(binding.sheet, SheetId::BalanceSheet);
        assert_eq!(wb.value("bs.balance_check", 1).unwrap(), 0.0);
        assert_eq!(
            wb.sheet(SheetId::BalanceSheet).unwrap().find("bs.balance_check").map(|r| r.label.as_str()),
            Some("Balance check")
        );
    }

    #[test]
    fn test_duplicate_key_across_sheets() {
        let mut wb = workbook();
        wb.begin_sheet(SheetId::ConsolidatedPl, ColumnLayout::Timeline).unwrap();
        wb.push(Row::keyed("pl.ebit", "EBIT")).unwrap();
        wb.begin_sheet(SheetId::Dcf, ColumnLayout::Forecast).unwrap();
        assert!(matches!(wb.push(Row::keyed("pl.ebit", "EBIT")), Err(BuildError::DuplicateKey { .. })));
    }

    #[test]
    fn test_next_row_tracks_pushes() {
        let mut wb = workbook();
        assert!(wb.next_row().is_err());
        wb.begin_sheet(SheetId::Sensitivity, ColumnLayout::Free).unwrap();
        assert_eq!(wb.next_row().unwrap(), 0);
        let binding = wb.push(Row::new("title")).unwrap();
        assert_eq!(binding.row, 0);
        assert_eq!(wb.next_row().unwrap(), 1);
    }

    #[test]
    fn test_forecast_sheet_rejects_historical_period() {
        let mut wb = workbook();
        wb.begin_sheet(SheetId::Dcf, ColumnLayout::Forecast).unwrap();
        wb.push(Row::keyed("dcf.ufcf", "UFCF").cells(vec![Cell::Input(1.0), Cell::Input(2.0)])).unwrap();
        assert_eq!(wb.value_at("dcf.ufcf", Period::at(2)).unwrap(), 2.0);
        assert!(wb.at_period("dcf.ufcf", Period::at(0)).is_err());
    }
}
