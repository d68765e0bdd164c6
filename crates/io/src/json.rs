// JSON export
//
// The same content as the workbook: every row with its formula text and
// build-time value, plus the cross-check report.

use std::path::Path;

use dcfgrid_engine::sheet::{Cell, Row, Sheet};
use dcfgrid_engine::Model;
use serde_json::{json, Value};

/// Structured view of a built model
pub fn to_value(model: &Model) -> Result<Value, String> {
    let checks = serde_json::to_value(&model.checks).map_err(|e| e.to_string())?;
    Ok(json!({
        "company": model.company,
        "scenario": model.scenario,
        "fingerprint": model.fingerprint(),
        "periods": model.timeline().labels(),
        "sheets": model.sheets().iter().map(sheet_value).collect::<Vec<_>>(),
        "checks": checks,
    }))
}

/// Pretty-printed JSON bytes, without touching the filesystem
pub fn render(model: &Model) -> Result<Vec<u8>, String> {
    let value = to_value(model)?;
    serde_json::to_vec_pretty(&value).map_err(|e| format!("Failed to serialize model: {}", e))
}

/// Write the model as pretty-printed JSON; a failed write leaves no file.
pub fn export(model: &Model, path: &Path) -> Result<(), String> {
    let bytes = render(model)?;
    crate::write_file(path, &bytes)?;
    log::info!("wrote {}", path.display());
    Ok(())
}

fn sheet_value(sheet: &Sheet) -> Value {
    json!({
        "name": sheet.name(),
        "layout": sheet.layout,
        "columns": sheet.columns,
        "rows": sheet.rows().iter().map(|row| row_value(sheet, row)).collect::<Vec<_>>(),
    })
}

fn row_value(sheet: &Sheet, row: &Row) -> Value {
    json!({
        "key": row.key,
        "label": row.label,
        "style": row.style,
        "format": row.format,
        "cells": row.cells.iter().map(|c| cell_value(sheet, c)).collect::<Vec<_>>(),
        "note": row.note,
    })
}

/// Non-finite results serialize as null.
fn cell_value(sheet: &Sheet, cell: &Cell) -> Value {
    match cell {
        Cell::Empty | Cell::Pending => Value::Null,
        Cell::Text(s) => json!({ "text": s }),
        Cell::Input(v) => json!({ "value": v }),
        Cell::Formula(expr) | Cell::Link(expr) => json!({
            "formula": expr.formula(sheet.id),
            "value": expr.eval(),
            "link": matches!(cell, Cell::Link(_)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcfgrid_engine::cell_id::CellId;
    use dcfgrid_engine::expr::Expr;
    use dcfgrid_engine::sheet::{ColumnLayout, SheetId};

    #[test]
    fn test_cell_values() {
        let sheet = Sheet::new(SheetId::Dcf, ColumnLayout::Forecast, vec!["2026E".into()]);
        assert_eq!(cell_value(&sheet, &Cell::Empty), Value::Null);
        assert_eq!(cell_value(&sheet, &Cell::Input(2.5)), json!({ "value": 2.5 }));

        let link = Cell::Link(Expr::cell(CellId::new(SheetId::ConsolidatedPl, 4, 3), 100.0));
        let value = cell_value(&sheet, &link);
        assert_eq!(value["formula"], "=Consolidated_PL!E5");
        assert_eq!(value["value"], 100.0);
        assert_eq!(value["link"], true);
    }

    #[test]
    fn test_nan_serializes_as_null() {
        let sheet = Sheet::new(SheetId::Dcf, ColumnLayout::Forecast, vec![]);
        let div = Cell::Formula(Expr::num(1.0) / Expr::num(0.0));
        assert_eq!(cell_value(&sheet, &div)["value"], Value::Null);
    }
}
