//! Discounted cash flow valuation.
//!
//! Forecast-aligned: one column per forecast year for the UFCF build, then a
//! single-column bridge from enterprise value to implied share price.

use crate::error::BuildError;
use crate::expr::Expr;
use crate::period::Period;
use crate::sheet::{Cell, ColumnLayout, NumFormat, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::{drv, push_heading, push_section, BuildContext};

const ID: SheetId = SheetId::Dcf;

/// Gordon growth terminal value, `UFCF x (1 + g) / (WACC - g)`.
pub fn gordon_terminal_value(ufcf: f64, wacc: f64, growth: f64) -> Result<f64, BuildError> {
    ensure_spread(wacc, growth, "terminal value")?;
    Ok(ufcf * (1.0 + growth) / (wacc - growth))
}

/// WACC must exceed terminal growth for the perpetuity to converge.
pub(crate) fn ensure_spread(wacc: f64, growth: f64, context: &str) -> Result<(), BuildError> {
    if wacc <= growth {
        return Err(BuildError::InvalidTerminalAssumption { wacc, growth, context: context.to_string() });
    }
    Ok(())
}

/// `1 / (1 + wacc)^n`.
pub fn discount_factor(wacc: Expr, periods: Expr) -> Expr {
    Expr::num(1.0) / (Expr::num(1.0) + wacc).pow(periods)
}

pub fn build(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let ds = ctx.dataset;
    wb.begin_sheet(ID, ColumnLayout::Forecast)?;
    push_heading(
        wb,
        "Discounted Cash Flow Valuation",
        &format!("{} | unlevered free cash flow, discounted at WACC", ds.company.units),
    )?;

    push_section(wb, "Unlevered free cash flow")?;
    forecast_row(wb, ctx, Row::keyed("dcf.ebit", "EBIT").note("Linked from Consolidated_PL"), |wb, p| {
        wb.at_period("pl.ebit", p)
    })?;
    forecast_row(wb, ctx, Row::keyed("dcf.tax", "(-) Taxes on EBIT").note("EBIT x tax rate"), |wb, p| {
        Ok(wb.at_period("dcf.ebit", p)? * wb.at_period(&drv("tax_rate"), p)?)
    })?;
    forecast_row(wb, ctx, Row::keyed("dcf.nopat", "NOPAT").style(RowStyle::Subtotal), |wb, p| {
        Ok(wb.at_period("dcf.ebit", p)? - wb.at_period("dcf.tax", p)?)
    })?;
    forecast_row(wb, ctx, Row::keyed("dcf.dna", "(+) Depreciation & amortization"), |wb, p| {
        wb.at_period("pl.dna", p)
    })?;
    forecast_row(wb, ctx, Row::keyed("dcf.capex", "(-) Capital expenditures").note("CapEx guidance"), |wb, p| {
        wb.at_period(&drv("capex"), p)
    })?;
    forecast_row(wb, ctx, Row::keyed("dcf.nwc", "(-) Change in net working capital").note("Revenue change x NWC rate"), |wb, p| {
        let prev = t.prior(p).unwrap_or(p);
        Ok((wb.at_period("pl.revenue", p)? - wb.at_period("pl.revenue", prev)?) * wb.at_period(&drv("nwc_rate"), p)?)
    })?;
    forecast_row(
        wb,
        ctx,
        Row::keyed("dcf.ufcf", "Unlevered free cash flow").style(RowStyle::Key).note("NOPAT + D&A - CapEx - change in NWC"),
        |wb, p| {
            Ok(wb.at_period("dcf.nopat", p)? + wb.at_period("dcf.dna", p)?
                - wb.at_period("dcf.capex", p)?
                - wb.at_period("dcf.nwc", p)?)
        },
    )?;

    push_section(wb, "Discounting")?;
    forecast_row(wb, ctx, Row::keyed("dcf.wacc", "WACC").format(NumFormat::Percent2), |wb, p| {
        wb.at_period("wacc.rate", p)
    })?;
    let periods: Vec<Cell> = t
        .forecast()
        .enumerate()
        .map(|(i, _)| Cell::Input((i + 1) as f64))
        .collect();
    wb.push(
        Row::keyed("dcf.period", "Discount period (years from valuation date)")
            .format(NumFormat::Decimal)
            .cells(periods)
            .note(format!("Valuation date {}", ds.company.valuation_date)),
    )?;
    forecast_row(wb, ctx, Row::keyed("dcf.discount_factor", "Discount factor").format(NumFormat::Factor), |wb, p| {
        Ok(discount_factor(wb.at_period("dcf.wacc", p)?, wb.at_period("dcf.period", p)?))
    })?;
    forecast_row(wb, ctx, Row::keyed("dcf.pv_ufcf", "PV of UFCF").style(RowStyle::Subtotal), |wb, p| {
        Ok(wb.at_period("dcf.ufcf", p)? * wb.at_period("dcf.discount_factor", p)?)
    })?;

    // Bridge: single-column scalars.
    let last = t.last();
    push_section(wb, "Terminal value")?;
    let growth = wb.at_period(&drv("terminal_growth"), last)?;
    push_scalar(wb, "dcf.terminal_growth", "Terminal growth rate", NumFormat::Percent2, growth)?;

    let ufcf = wb.at_period("dcf.ufcf", last)?;
    let wacc = wb.at_period("dcf.wacc", last)?;
    let g = wb.at("dcf.terminal_growth", 0)?;
    ensure_spread(wacc.eval(), g.eval(), "terminal value")?;
    let tv = ufcf * (Expr::num(1.0) + g.clone()) / (wacc - g);
    push_scalar(wb, "dcf.tv", "Terminal value (Gordon growth)", NumFormat::Amount, tv)?;
    let pv_tv = wb.at("dcf.tv", 0)? * wb.at_period("dcf.discount_factor", last)?;
    push_scalar(wb, "dcf.pv_tv", "PV of terminal value", NumFormat::Amount, pv_tv)?;

    push_section(wb, "Enterprise to equity value")?;
    let pv_row: Vec<Expr> = t.forecast().map(|p| wb.at_period("dcf.pv_ufcf", p)).collect::<Result<_, _>>()?;
    push_scalar(wb, "dcf.sum_pv", "Sum of PV of UFCF", NumFormat::Amount, Expr::sum(pv_row))?;
    let ev = wb.at("dcf.sum_pv", 0)? + wb.at("dcf.pv_tv", 0)?;
    push_scalar(wb, "dcf.ev", "Enterprise value", NumFormat::Amount, ev)?;
    let share = wb.at("dcf.pv_tv", 0)? / wb.at("dcf.ev", 0)?;
    push_scalar(wb, "dcf.tv_share", "    Terminal value % of EV", NumFormat::Percent, share)?;

    let anchor = t.last_historical();
    let cash = wb.at_period("bs.cash_total", anchor)?;
    push_scalar(wb, "dcf.cash", "(+) Cash & marketable securities", NumFormat::Amount, cash)?;
    let debt = wb.at_period("bs.lt_debt", anchor)?;
    push_scalar(wb, "dcf.debt", "(-) Long-term debt", NumFormat::Amount, debt)?;
    let equity = wb.at("dcf.ev", 0)? + wb.at("dcf.cash", 0)? - wb.at("dcf.debt", 0)?;
    push_scalar(wb, "dcf.equity_value", "Equity value", NumFormat::Amount, equity)?;
    let shares = wb.at_period("pl.shares", anchor)?;
    push_scalar(wb, "dcf.shares", "Diluted shares", NumFormat::Amount, shares)?;
    let price = wb.at("dcf.equity_value", 0)? / wb.at("dcf.shares", 0)?;
    wb.push(
        Row::keyed("dcf.price", "Implied share price")
            .style(RowStyle::Key)
            .format(NumFormat::PerShare)
            .cells(vec![Cell::computed(price, ID)]),
    )?;

    log::debug!(
        "dcf: EV {:.0}, implied price {:.2}",
        wb.value("dcf.ev", 0)?,
        wb.value("dcf.price", 0)?
    );
    Ok(())
}

/// Append a forecast-aligned row computed per forecast period.
fn forecast_row<F>(wb: &mut Workbook, ctx: &BuildContext, row: Row, f: F) -> Result<(), BuildError>
where
    F: Fn(&Workbook, Period) -> Result<Expr, BuildError>,
{
    let cells = ctx
        .timeline
        .forecast()
        .map(|p| Ok(Cell::computed(f(wb, p)?, ID)))
        .collect::<Result<Vec<_>, BuildError>>()?;
    wb.push(row.cells(cells))?;
    Ok(())
}

fn push_scalar(wb: &mut Workbook, key: &str, label: &str, format: NumFormat, expr: Expr) -> Result<(), BuildError> {
    wb.push(Row::keyed(key, label).format(format).cells(vec![Cell::computed(expr, ID)]))?;
    Ok(())
}
