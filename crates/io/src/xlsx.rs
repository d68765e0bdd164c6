// Excel export of a built model
//
// One worksheet per sheet, in display order. Column A holds row labels,
// data columns start at B, and the note sits one column past the data.
// Every computed cell is written as a formula with its build-time result
// cached, so the file opens with correct numbers before any recalculation.

use std::path::Path;
use std::time::Instant;

use dcfgrid_engine::cell_id::col_to_letters;
use dcfgrid_engine::sheet::{Cell, ColumnLayout, NumFormat, Row, RowStyle, Sheet, SheetId};
use dcfgrid_engine::Model;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Formula, Workbook as XlsxWorkbook, Worksheet};

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

const HEADER_FILL: u32 = 0x1F4E78;
const SECTION_FILL: u32 = 0xD9E1F2;
const INPUT_FILL: u32 = 0xDDEBF7;
const KEY_FILL: u32 = 0xFFF2CC;
const CHECK_FILL: u32 = 0xFFC7CE;
const INPUT_TEXT: u32 = 0x1F4E78;
const HISTORICAL_TEXT: u32 = 0x305496;
const LINK_TEXT: u32 = 0x548235;
const NOTE_TEXT: u32 = 0x808080;
const RULE: u32 = 0xD9D9D9;

const LABEL_WIDTH: f64 = 46.0;
const DATA_WIDTH: f64 = 13.0;
const FREE_WIDTH: f64 = 16.0;
const NOTE_WIDTH: f64 = 52.0;

/// Statistics from an export
#[derive(Debug, Clone, Default)]
pub struct ExportResult {
    pub sheets_exported: usize,
    pub cells_exported: usize,
    pub formulas_exported: usize,
    pub links_exported: usize,
    /// Formulas written without a cached result (division by zero and the like)
    pub uncached_formulas: usize,
    pub export_duration_ms: u128,
}

impl ExportResult {
    /// Returns a summary message suitable for display
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} sheet{}", self.sheets_exported, if self.sheets_exported == 1 { "" } else { "s" }),
            format!("{} cells", self.cells_exported),
            format!("{} formulas", self.formulas_exported),
            format!("{} links", self.links_exported),
        ];
        if self.uncached_formulas > 0 {
            parts.push(format!("{} without cached result", self.uncached_formulas));
        }
        parts.join(", ")
    }
}

/// How a cell was produced, which decides its font colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    /// Filed figure or other hardcoded value.
    Historical,
    /// Assumption the user is expected to edit.
    Input,
    Formula,
    Link,
    Text,
}

/// Export a built model to XLSX format
///
/// The workbook is assembled in memory and written in one step; if the write
/// fails, whatever reached `path` is removed.
pub fn export(model: &Model, path: &Path) -> Result<ExportResult, String> {
    let (buffer, result) = render(model)?;
    crate::write_file(path, &buffer)?;
    log::info!("wrote {} ({})", path.display(), result.summary());
    Ok(result)
}

/// Assemble the workbook without touching the filesystem.
pub fn render(model: &Model) -> Result<(Vec<u8>, ExportResult), String> {
    let start_time = Instant::now();
    let mut result = ExportResult::default();
    let mut xlsx_workbook = XlsxWorkbook::new();

    for sheet in model.sheets() {
        let worksheet = xlsx_workbook
            .add_worksheet()
            .set_name(sheet.name())
            .map_err(|e| format!("Failed to create sheet '{}': {}", sheet.name(), e))?;
        export_sheet(sheet, worksheet, &mut result)?;
        result.sheets_exported += 1;
    }

    let buffer = xlsx_workbook
        .save_to_buffer()
        .map_err(|e| format!("Failed to assemble XLSX file: {}", e))?;
    result.export_duration_ms = start_time.elapsed().as_millis();
    Ok((buffer, result))
}

fn export_sheet(sheet: &Sheet, worksheet: &mut Worksheet, result: &mut ExportResult) -> Result<(), String> {
    let data_cols = data_columns(sheet);
    let note_col = data_cols + 2;
    let blank = Cell::Empty;

    for (r, row) in sheet.rows().iter().enumerate() {
        let row32 = r as u32;
        let label_format = label_format(sheet, row);
        worksheet
            .write_string_with_format(row32, 0, &row.label, &label_format)
            .map_err(|e| format!("Failed to write label ({}, A): {}", r + 1, e))?;

        // Banded rows carry their fill across every data column.
        let span = if banded(row.style) { data_cols } else { row.cells.len() };
        for col in 0..span {
            let col16 = (col + 1) as u16;
            let cell = row.cells.get(col).unwrap_or(&blank);
            let kind = cell_kind(sheet, row, cell);
            let format = cell_format(row, kind);
            write_cell(worksheet, sheet.id, cell, row32, col16, &format, result)
                .map_err(|e| format!("Failed to write {}!{}{}: {}", sheet.name(), col_to_letters(col16 as usize), r + 1, e))?;
        }

        if let Some(note) = &row.note {
            let format = Format::new().set_font_size(9).set_font_color(Color::RGB(NOTE_TEXT));
            worksheet
                .write_string_with_format(row32, note_col as u16, note, &format)
                .map_err(|e| format!("Failed to write note on row {}: {}", r + 1, e))?;
        }
    }

    apply_layout(sheet, worksheet, data_cols, note_col)
}

fn write_cell(
    worksheet: &mut Worksheet,
    on: SheetId,
    cell: &Cell,
    row: u32,
    col: u16,
    format: &Format,
    result: &mut ExportResult,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    match cell {
        Cell::Empty | Cell::Pending => {
            worksheet.write_blank(row, col, format)?;
        }
        Cell::Text(s) => {
            worksheet.write_string_with_format(row, col, s, format)?;
            result.cells_exported += 1;
        }
        Cell::Input(v) => {
            worksheet.write_number_with_format(row, col, *v, format)?;
            result.cells_exported += 1;
        }
        Cell::Formula(expr) | Cell::Link(expr) => {
            let text = expr.formula(on);
            let mut formula = Formula::new(text.strip_prefix('=').unwrap_or(&text));
            let value = expr.eval();
            if value.is_finite() {
                formula = formula.set_result(value.to_string());
            } else {
                result.uncached_formulas += 1;
            }
            worksheet.write_formula_with_format(row, col, formula, format)?;
            if matches!(cell, Cell::Link(_)) {
                result.links_exported += 1;
            } else {
                result.formulas_exported += 1;
            }
            result.cells_exported += 1;
        }
    }
    Ok(())
}

/// Data column count: the header width for period-aligned sheets, the
/// widest row for free-form ones.
fn data_columns(sheet: &Sheet) -> usize {
    match sheet.layout {
        ColumnLayout::Timeline | ColumnLayout::Forecast => sheet.columns.len(),
        ColumnLayout::Free => sheet.rows().iter().map(|r| r.cells.len()).max().unwrap_or(0),
    }
}

fn banded(style: RowStyle) -> bool {
    matches!(style, RowStyle::Header | RowStyle::Section | RowStyle::Key | RowStyle::Check)
}

fn cell_kind(sheet: &Sheet, row: &Row, cell: &Cell) -> CellKind {
    match cell {
        Cell::Input(_) if is_assumption_input(sheet.id, row) => CellKind::Input,
        Cell::Input(_) => CellKind::Historical,
        Cell::Formula(_) => CellKind::Formula,
        Cell::Link(_) => CellKind::Link,
        Cell::Text(_) | Cell::Empty | Cell::Pending => CellKind::Text,
    }
}

/// Scenario tracks on Assumptions and the WACC axis of the sensitivity grid.
fn is_assumption_input(sheet: SheetId, row: &Row) -> bool {
    match sheet {
        SheetId::Assumptions => row.style != RowStyle::Key,
        SheetId::Sensitivity => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

fn row_format(style: RowStyle) -> Format {
    let format = Format::new().set_font_size(10);
    match style {
        RowStyle::Title => Format::new().set_bold().set_font_size(14),
        RowStyle::Subtitle => Format::new().set_bold().set_font_size(11).set_font_color(Color::RGB(INPUT_TEXT)),
        RowStyle::Header => format
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(HEADER_FILL))
            .set_align(FormatAlign::Center),
        RowStyle::Section => format.set_bold().set_background_color(Color::RGB(SECTION_FILL)),
        RowStyle::Subtotal => format.set_bold().set_border_top(FormatBorder::Thin).set_border_top_color(Color::RGB(RULE)),
        RowStyle::Key => format.set_bold().set_background_color(Color::RGB(KEY_FILL)),
        RowStyle::Check => format.set_bold().set_background_color(Color::RGB(CHECK_FILL)),
        RowStyle::Rate | RowStyle::Memo => format.set_italic().set_font_color(Color::RGB(NOTE_TEXT)),
        RowStyle::Data | RowStyle::Text => format,
    }
}

fn label_format(sheet: &Sheet, row: &Row) -> Format {
    if sheet.id == SheetId::Cover {
        if let Some(format) = legend_format(&row.label) {
            return format;
        }
    }
    row_format(row.style)
}

/// The Cover legend shows each convention in its own colours.
fn legend_format(label: &str) -> Option<Format> {
    let format = Format::new().set_font_size(10);
    let format = match label {
        "Blue text" => format.set_font_color(Color::RGB(HISTORICAL_TEXT)),
        "Blue fill" => format.set_bold().set_font_color(Color::RGB(INPUT_TEXT)).set_background_color(Color::RGB(INPUT_FILL)),
        "Black text" => format,
        "Green text" => format.set_font_color(Color::RGB(LINK_TEXT)),
        "Yellow fill" => format.set_bold().set_background_color(Color::RGB(KEY_FILL)),
        "Red fill" => format.set_bold().set_background_color(Color::RGB(CHECK_FILL)),
        _ => return None,
    };
    Some(format)
}

fn cell_format(row: &Row, kind: CellKind) -> Format {
    let mut format = row_format(row.style);
    if !matches!(row.style, RowStyle::Title | RowStyle::Subtitle | RowStyle::Header | RowStyle::Text) {
        format = format.set_num_format(number_code(row.format));
    }
    match kind {
        CellKind::Input => format
            .set_bold()
            .set_font_color(Color::RGB(INPUT_TEXT))
            .set_background_color(Color::RGB(INPUT_FILL)),
        CellKind::Historical => format.set_font_color(Color::RGB(HISTORICAL_TEXT)),
        CellKind::Link => format.set_font_color(Color::RGB(LINK_TEXT)),
        CellKind::Formula | CellKind::Text => format,
    }
}

/// Excel code for a row format. Negative amounts show in parentheses.
fn number_code(format: NumFormat) -> String {
    let code = format.code();
    match format {
        NumFormat::Amount | NumFormat::PerShare => format!("{code};({code});\"-\""),
        _ => code.to_string(),
    }
}

fn apply_layout(sheet: &Sheet, worksheet: &mut Worksheet, data_cols: usize, note_col: usize) -> Result<(), String> {
    worksheet
        .set_column_width(0, LABEL_WIDTH)
        .map_err(|e| format!("Failed to set label column width: {}", e))?;
    let width = match sheet.layout {
        ColumnLayout::Free => FREE_WIDTH,
        _ => DATA_WIDTH,
    };
    for col in 1..=data_cols {
        worksheet
            .set_column_width(col as u16, width)
            .map_err(|e| format!("Failed to set column {} width: {}", col, e))?;
    }
    worksheet
        .set_column_width(note_col as u16, NOTE_WIDTH)
        .map_err(|e| format!("Failed to set note column width: {}", e))?;

    // Title, subtitle and header stay visible on period-aligned sheets.
    if sheet.layout != ColumnLayout::Free {
        worksheet
            .set_freeze_panes(3, 1)
            .map_err(|e| format!("Failed to set freeze panes: {}", e))?;
    }

    match sheet.id {
        SheetId::Cover | SheetId::KeySummary => {
            worksheet.set_tab_color(Color::RGB(HEADER_FILL));
        }
        SheetId::Assumptions => {
            worksheet.set_tab_color(Color::RGB(INPUT_FILL));
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_code_brackets_negative_amounts() {
        assert_eq!(number_code(NumFormat::Amount), "#,##0;(#,##0);\"-\"");
        assert_eq!(number_code(NumFormat::Percent), "0.0%");
    }

    #[test]
    fn test_cell_kind_classification() {
        let assumptions = Sheet::new(SheetId::Assumptions, ColumnLayout::Timeline, vec![]);
        let bs = Sheet::new(SheetId::BalanceSheet, ColumnLayout::Timeline, vec![]);
        let track = Row::keyed("drv.capex.base", "Base");
        let selected = Row::keyed("drv.capex", "CapEx").style(RowStyle::Key);

        assert_eq!(cell_kind(&assumptions, &track, &Cell::Input(1.0)), CellKind::Input);
        assert_eq!(cell_kind(&assumptions, &selected, &Cell::Input(1.0)), CellKind::Historical);
        assert_eq!(cell_kind(&bs, &track, &Cell::Input(1.0)), CellKind::Historical);
        assert_eq!(cell_kind(&bs, &track, &Cell::Text("x".into())), CellKind::Text);
    }

    #[test]
    fn test_legend_only_matches_known_labels() {
        assert!(legend_format("Green text").is_some());
        assert!(legend_format("Valuation date").is_none());
    }

    #[test]
    fn test_summary_mentions_uncached() {
        let result = ExportResult { sheets_exported: 1, uncached_formulas: 2, ..Default::default() };
        let summary = result.summary();
        assert!(summary.starts_with("1 sheet,"), "{summary}");
        assert!(summary.contains("2 without cached result"), "{summary}");
    }
}
