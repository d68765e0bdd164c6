//! Sheets, rows and cells of a built model.

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::expr::Expr;

/// The fixed set of tabs. Variant order is display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetId {
    Cover,
    KeySummary,
    Assumptions,
    SegmentRevenue,
    SegmentPl,
    ConsolidatedPl,
    BalanceSheet,
    CashFlow,
    Dcf,
    Sensitivity,
    Ratios,
}

impl SheetId {
    pub const DISPLAY_ORDER: [SheetId; 11] = [
        SheetId::Cover,
        SheetId::KeySummary,
        SheetId::Assumptions,
        SheetId::SegmentRevenue,
        SheetId::SegmentPl,
        SheetId::ConsolidatedPl,
        SheetId::BalanceSheet,
        SheetId::CashFlow,
        SheetId::Dcf,
        SheetId::Sensitivity,
        SheetId::Ratios,
    ];

    /// Dependency order: every sheet references only sheets before it.
    pub const BUILD_ORDER: [SheetId; 11] = [
        SheetId::Assumptions,
        SheetId::SegmentRevenue,
        SheetId::SegmentPl,
        SheetId::ConsolidatedPl,
        SheetId::BalanceSheet,
        SheetId::CashFlow,
        SheetId::Dcf,
        SheetId::Sensitivity,
        SheetId::Ratios,
        SheetId::KeySummary,
        SheetId::Cover,
    ];

    pub fn tab_name(self) -> &'static str {
        match self {
            SheetId::Cover => "Cover",
            SheetId::KeySummary => "Key_Summary",
            SheetId::Assumptions => "Assumptions",
            SheetId::SegmentRevenue => "Segment_Revenue",
            SheetId::SegmentPl => "Segment_PL",
            SheetId::ConsolidatedPl => "Consolidated_PL",
            SheetId::BalanceSheet => "BS",
            SheetId::CashFlow => "Cash_Flow",
            SheetId::Dcf => "DCF",
            SheetId::Sensitivity => "Sensitivity",
            SheetId::Ratios => "Ratio_Analysis",
        }
    }
}

/// What the data columns of a sheet represent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnLayout {
    /// One column per timeline period, historical first.
    Timeline,
    /// One column per forecast period.
    Forecast,
    /// Free-form columns (grids, cover text).
    Free,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumFormat {
    #[default]
    Amount,
    Percent,
    Percent2,
    PerShare,
    Multiple,
    Ratio,
    Days,
    Factor,
    Decimal,
}

impl NumFormat {
    /// Spreadsheet number-format code.
    pub fn code(self) -> &'static str {
        match self {
            NumFormat::Amount => "#,##0",
            NumFormat::Percent => "0.0%",
            NumFormat::Percent2 => "0.00%",
            NumFormat::PerShare => "$#,##0.00",
            NumFormat::Multiple => "0.0x",
            NumFormat::Ratio => "0.00x",
            NumFormat::Days => "0.0",
            NumFormat::Factor => "0.0000",
            NumFormat::Decimal => "0.00",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStyle {
    Title,
    Subtitle,
    Header,
    Section,
    #[default]
    Data,
    Subtotal,
    Key,
    Rate,
    Check,
    Memo,
    Text,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    /// Hardcoded value: a filed historical figure or an assumption input.
    Input(f64),
    /// Computed on this sheet.
    Formula(Expr),
    /// Reference to another sheet.
    Link(Expr),
    Text(String),
    /// Reserved for second-pass fill.
    Pending,
}

impl Cell {
    pub fn value(&self) -> Option<f64> {
        match self {
            Cell::Input(v) => Some(*v),
            Cell::Formula(e) | Cell::Link(e) => Some(e.eval()),
            Cell::Empty | Cell::Text(_) | Cell::Pending => None,
        }
    }

    pub fn expr(&self) -> Option<&Expr> {
        match self {
            Cell::Formula(e) | Cell::Link(e) => Some(e),
            _ => None,
        }
    }

    /// A formula cell whose tree is a single cross-sheet reference is a link.
    pub fn computed(expr: Expr, on: SheetId) -> Cell {
        match &expr {
            Expr::Ref { cell, .. } if cell.sheet != on => Cell::Link(expr),
            _ => Cell::Formula(expr),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub key: Option<String>,
    pub label: String,
    pub style: RowStyle,
    pub format: NumFormat,
    pub cells: Vec<Cell>,
    pub note: Option<String>,
}

impl Row {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            key: None,
            label: label.into(),
            style: RowStyle::Data,
            format: NumFormat::Amount,
            cells: Vec::new(),
            note: None,
        }
    }

    pub fn keyed(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self { key: Some(key.into()), ..Self::new(label) }
    }

    pub fn blank() -> Self {
        Self { style: RowStyle::Text, ..Self::new("") }
    }

    pub fn style(mut self, style: RowStyle) -> Self {
        self.style = style;
        self
    }

    pub fn format(mut self, format: NumFormat) -> Self {
        self.format = format;
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        self.note = if note.is_empty() { None } else { Some(note) };
        self
    }

    pub fn cells(mut self, cells: Vec<Cell>) -> Self {
        self.cells = cells;
        self
    }

    pub fn cell(&self, col: usize) -> &Cell {
        self.cells.get(col).unwrap_or(&Cell::Empty)
    }

    pub fn is_pending(&self) -> bool {
        self.cells.iter().any(|c| matches!(c, Cell::Pending))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sheet {
    pub id: SheetId,
    pub layout: ColumnLayout,
    /// Header text per data column.
    pub columns: Vec<String>,
    rows: Vec<Row>,
    frozen: bool,
}

impl Sheet {
    pub fn new(id: SheetId, layout: ColumnLayout, columns: Vec<String>) -> Self {
        Self { id, layout, columns, rows: Vec::new(), frozen: false }
    }

    pub fn name(&self) -> &'static str {
        self.id.tab_name()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn find(&self, key: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.key.as_deref() == Some(key))
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Append a row, returning its 0-based index.
    pub(crate) fn push(&mut self, row: Row) -> Result<usize, BuildError> {
        if self.frozen {
            return Err(BuildError::FrozenSheet { sheet: self.id, label: row.label });
        }
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }

    /// Replace the cells of a reserved row. Allowed on frozen sheets.
    pub(crate) fn fill(&mut self, index: usize, cells: Vec<Cell>) -> Option<&Row> {
        let row = self.rows.get_mut(index)?;
        row.cells = cells;
        Some(row)
    }

    pub(crate) fn set_key(&mut self, index: usize, key: String) {
        if let Some(row) = self.rows.get_mut(index) {
            row.key = Some(key);
        }
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }
}
