//! Consolidated income statement.
//!
//! EBIT links to the segment total; the consolidated cost lines are
//! forecast independently for disclosure and reconciled through implied
//! OpEx rather than summed into EBIT.

use crate::error::BuildError;
use crate::expr::Expr;
use crate::sheet::{ColumnLayout, NumFormat, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::{
    drv, every_period, filed_cells, history_then, push_check, push_growth, push_heading, push_ratio, push_section,
    roll_forward, BuildContext,
};

const ID: SheetId = SheetId::ConsolidatedPl;

pub fn build(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let ds = ctx.dataset;
    let c = &ds.consolidated;
    wb.begin_sheet(ID, ColumnLayout::Timeline)?;
    push_heading(wb, "Consolidated Income Statement", &ds.company.units)?;

    let cells = every_period(t, ID, |p| wb.at_period("rev.total", p))?;
    wb.push(Row::keyed("pl.revenue", "Total revenue").style(RowStyle::Key).cells(cells).note("Linked from Segment_Revenue"))?;
    push_growth(wb, t, "pl.revenue.yoy", "    YoY growth", "pl.revenue")?;
    wb.push(Row::keyed("pl.revenue_reported", "Reported revenue (filed)").style(RowStyle::Memo).cells(filed_cells(t, &c.revenue)))?;
    push_check(wb, t, "pl.revenue_check", "    Segment build vs filed", "pl.revenue", "pl.revenue_reported")?;

    let cells = every_period(t, ID, |p| wb.at_period("rev.advertising", p))?;
    wb.push(Row::keyed("pl.ad_revenue", "Advertising revenue (memo)").style(RowStyle::Memo).cells(cells).note("TAC base"))?;

    // Cost of revenues
    push_section(wb, "Cost of revenues")?;
    let cells = history_then(t, ID, &c.tac, |p| Ok(wb.at_period("pl.ad_revenue", p)? * wb.at_period(&drv("tac_rate"), p)?))?;
    wb.push(Row::keyed("pl.tac", "Traffic acquisition costs").cells(cells).note("Ad revenue x TAC rate"))?;
    push_ratio(wb, t, "pl.tac.pct", "    % of ad revenue", "pl.tac", "pl.ad_revenue")?;

    push_driven(wb, ctx, "pl.other_cogs", "Other cost of revenues", &c.other_cogs, "other_cogs_rate")?;
    push_ratio(wb, t, "pl.other_cogs.pct", "    % of revenue", "pl.other_cogs", "pl.revenue")?;

    let cells = every_period(t, ID, |p| Ok(wb.at_period("pl.tac", p)? + wb.at_period("pl.other_cogs", p)?))?;
    wb.push(Row::keyed("pl.cogs", "Total cost of revenues").style(RowStyle::Subtotal).cells(cells))?;

    let cells = every_period(t, ID, |p| Ok(wb.at_period("pl.revenue", p)? - wb.at_period("pl.cogs", p)?))?;
    wb.push(Row::keyed("pl.gross_profit", "Gross profit").style(RowStyle::Subtotal).cells(cells).note("Revenue - COGS"))?;
    push_ratio(wb, t, "pl.gross_margin", "    Gross margin", "pl.gross_profit", "pl.revenue")?;

    // Operating expenses
    push_section(wb, "Operating expenses")?;
    for (key, label, series, rate) in [
        ("pl.rnd", "Research & development", &c.rnd, "rnd_rate"),
        ("pl.snm", "Sales & marketing", &c.snm, "snm_rate"),
        ("pl.gna", "General & administrative", &c.gna, "gna_rate"),
    ] {
        push_driven(wb, ctx, key, label, series, rate)?;
        push_ratio(wb, t, &format!("{key}.pct"), "    % of revenue", key, "pl.revenue")?;
    }
    let cells = every_period(t, ID, |p| {
        Ok(Expr::sum([wb.at_period("pl.rnd", p)?, wb.at_period("pl.snm", p)?, wb.at_period("pl.gna", p)?]))
    })?;
    wb.push(
        Row::keyed("pl.opex_est", "Estimated total OpEx")
            .style(RowStyle::Subtotal)
            .cells(cells)
            .note("Disclosure only; EBIT comes from segments"),
    )?;

    let cells = every_period(t, ID, |p| wb.at_period("spl.oi_total", p))?;
    wb.push(
        Row::keyed("pl.ebit", "EBIT (sum of segment OI)")
            .style(RowStyle::Key)
            .cells(cells)
            .note("Linked from Segment_PL"),
    )?;
    push_ratio(wb, t, "pl.ebit_margin", "    EBIT margin", "pl.ebit", "pl.revenue")?;
    let cells = every_period(t, ID, |p| Ok(wb.at_period("pl.gross_profit", p)? - wb.at_period("pl.ebit", p)?))?;
    wb.push(Row::keyed("pl.implied_opex", "    Implied OpEx (gross profit - EBIT)").style(RowStyle::Rate).cells(cells))?;
    wb.push(Row::keyed("pl.ebit_reported", "Reported operating income (filed)").style(RowStyle::Memo).cells(filed_cells(t, &c.ebit)))?;
    push_check(wb, t, "pl.ebit_check", "    Segment OI vs filed", "pl.ebit", "pl.ebit_reported")?;

    // Below the line
    push_section(wb, "Net income")?;
    let cells = history_then(t, ID, &c.other_income, |p| wb.at_period(&drv("other_income"), p))?;
    wb.push(Row::keyed("pl.other_income", "Other income (expense), net").cells(cells))?;

    let cells = every_period(t, ID, |p| Ok(wb.at_period("pl.ebit", p)? + wb.at_period("pl.other_income", p)?))?;
    wb.push(Row::keyed("pl.pretax", "Pre-tax income").style(RowStyle::Subtotal).cells(cells))?;

    let cells = history_then(t, ID, &c.tax, |p| Ok(wb.at_period("pl.pretax", p)? * wb.at_period(&drv("tax_rate"), p)?))?;
    wb.push(Row::keyed("pl.tax", "Income tax").cells(cells).note("Pre-tax income x effective tax rate"))?;

    let cells = every_period(t, ID, |p| Ok(wb.at_period("pl.pretax", p)? - wb.at_period("pl.tax", p)?))?;
    wb.push(Row::keyed("pl.net_income", "Net income").style(RowStyle::Key).cells(cells))?;
    push_ratio(wb, t, "pl.net_margin", "    Net margin", "pl.net_income", "pl.revenue")?;
    push_growth(wb, t, "pl.net_income.yoy", "    YoY growth", "pl.net_income")?;
    wb.push(
        Row::keyed("pl.net_income_reported", "Reported net income (filed)")
            .style(RowStyle::Memo)
            .cells(filed_cells(t, &c.net_income)),
    )?;
    push_check(wb, t, "pl.net_income_check", "    Built vs filed", "pl.net_income", "pl.net_income_reported")?;

    // Memo lines and per-share
    push_section(wb, "Memo")?;
    push_driven(wb, ctx, "pl.dna", "Depreciation & amortization", &c.dna, "dna_rate")?;
    push_driven(wb, ctx, "pl.sbc", "Stock-based compensation", &c.sbc, "sbc_rate")?;

    let change = drv("share_change");
    let cells = roll_forward(wb, t, &c.diluted_shares, |prior, p| {
        Ok(prior * (Expr::num(1.0) + wb.at_period(&change, p)?))
    })?;
    wb.push(Row::keyed("pl.shares", "Diluted shares").cells(cells).note("Prior x (1 + share change)"))?;

    let cells = every_period(t, ID, |p| Ok(wb.at_period("pl.net_income", p)? / wb.at_period("pl.shares", p)?))?;
    wb.push(
        Row::keyed("pl.eps", "Diluted EPS")
            .style(RowStyle::Key)
            .format(NumFormat::PerShare)
            .cells(cells)
            .note("Net income / diluted shares"),
    )?;

    log::debug!("consolidated P&L built");
    Ok(())
}

/// Filed history, forecast as `revenue x rate`.
fn push_driven(
    wb: &mut Workbook,
    ctx: &BuildContext,
    key: &str,
    label: &str,
    series: &[f64],
    rate: &str,
) -> Result<(), BuildError> {
    let rate = drv(rate);
    let cells = history_then(ctx.timeline, ID, series, |p| {
        Ok(wb.at_period("pl.revenue", p)? * wb.at_period(&rate, p)?)
    })?;
    wb.push(Row::keyed(key, label).cells(cells).note("Revenue x rate"))?;
    Ok(())
}
