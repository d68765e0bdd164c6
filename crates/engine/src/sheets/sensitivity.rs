//! Implied share price over a WACC x terminal growth grid. Each grid cell
//! re-discounts the DCF's cash flows at its own rates; nothing else moves.

use crate::cell_id::CellId;
use crate::error::BuildError;
use crate::expr::Expr;
use crate::sheet::{Cell, ColumnLayout, NumFormat, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::dcf::{discount_factor, ensure_spread};
use super::{push_section, BuildContext};

const ID: SheetId = SheetId::Sensitivity;

pub fn build(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let axes = &ctx.dataset.valuation.sensitivity;
    wb.begin_sheet(ID, ColumnLayout::Free)?;
    wb.push(Row::new("Sensitivity Analysis").style(RowStyle::Title))?;
    wb.push(Row::new("Implied share price; WACC down the rows, terminal growth across").style(RowStyle::Subtitle))?;

    push_section(wb, "Implied share price")?;
    let mut header = vec![Cell::Empty];
    header.extend(axes.terminal_growth.iter().map(|g| Cell::Input(*g)));
    wb.push(
        Row::keyed("sens.terminal_growth", "WACC \\ terminal growth")
            .style(RowStyle::Header)
            .format(NumFormat::Percent)
            .cells(header),
    )?;

    let last = t.last();
    for (i, wacc) in axes.wacc.iter().copied().enumerate() {
        let w = Expr::cell(CellId::new(ID, wb.next_row()?, 0), wacc);
        let mut cells = vec![Cell::Input(wacc)];
        for (j, growth) in axes.terminal_growth.iter().copied().enumerate() {
            ensure_spread(wacc, growth, "sensitivity grid")?;
            let g = wb.at("sens.terminal_growth", j + 1)?;
            let explicit = t
                .forecast()
                .map(|p| Ok(wb.at_period("dcf.ufcf", p)? * discount_factor(w.clone(), wb.at_period("dcf.period", p)?)))
                .collect::<Result<Vec<_>, BuildError>>()?;
            let terminal = wb.at_period("dcf.ufcf", last)? * (Expr::num(1.0) + g.clone()) / (w.clone() - g)
                * discount_factor(w.clone(), wb.at_period("dcf.period", last)?);
            let price = (Expr::sum(explicit) + terminal + wb.at("dcf.cash", 0)? - wb.at("dcf.debt", 0)?)
                / wb.at("dcf.shares", 0)?;
            cells.push(Cell::Formula(price));
        }
        wb.push(
            Row::keyed(format!("sens.wacc.{i}"), "")
                .format(NumFormat::PerShare)
                .cells(cells),
        )?;
    }

    push_section(wb, "Reference")?;
    let price = wb.at("dcf.price", 0)?;
    wb.push(
        Row::keyed("sens.base_price", "DCF implied price (per-period WACC)")
            .style(RowStyle::Key)
            .format(NumFormat::PerShare)
            .cells(vec![Cell::computed(price, ID)]),
    )?;

    log::debug!("sensitivity: {}x{} grid", axes.wacc.len(), axes.terminal_growth.len());
    Ok(())
}
