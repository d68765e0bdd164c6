//! Cash flow statement. Working-capital lines are period-over-period
//! movements of balance sheet rows, never separate assumptions.

use crate::dataset::Dataset;
use crate::error::BuildError;
use crate::expr::Expr;
use crate::period::Period;
use crate::sheet::{Cell, ColumnLayout, NumFormat, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::{drv, every_period, filed_cells, history_then, push_check, push_heading, push_ratio, push_section, BuildContext};

const ID: SheetId = SheetId::CashFlow;

/// Which side of the balance sheet a working-capital line sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalanceSide {
    Asset,
    Liability,
}

/// Cash effect of a balance moving from `prior` to `current`: a growing
/// asset consumes cash, a growing liability provides it.
pub fn working_capital_delta(current: Expr, prior: Expr, side: BalanceSide) -> Expr {
    match side {
        BalanceSide::Asset => prior - current,
        BalanceSide::Liability => current - prior,
    }
}

struct WorkingCapitalLine<'a> {
    key: &'static str,
    label: &'static str,
    filed: &'a [f64],
    balances: &'static [&'static str],
    side: BalanceSide,
}

pub fn build(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let ds = ctx.dataset;
    let cf = &ds.cash_flow;
    wb.begin_sheet(ID, ColumnLayout::Timeline)?;
    push_heading(wb, "Cash Flow Statement", &ds.company.units)?;

    push_section(wb, "Operating activities")?;
    let mut operating = Vec::new();
    for (key, label, source) in [
        ("cf.net_income", "Net income", "pl.net_income"),
        ("cf.dna", "(+) Depreciation & amortization", "pl.dna"),
        ("cf.sbc", "(+) Stock-based compensation", "pl.sbc"),
    ] {
        let cells = every_period(t, ID, |p| wb.at_period(source, p))?;
        wb.push(Row::keyed(key, label).cells(cells).note("Linked from Consolidated_PL"))?;
        operating.push(key);
    }
    for (key, label, series) in [
        ("cf.deferred_taxes", "Deferred income taxes", &cf.deferred_taxes),
        ("cf.securities_gains", "(Gain) loss on securities", &cf.securities_gains),
        ("cf.other_adjustments", "Other adjustments", &cf.other_adjustments),
    ] {
        let cells = t
            .periods()
            .map(|p| Cell::Input(if t.is_forecast(p) { 0.0 } else { Dataset::hist(series, p) }))
            .collect();
        wb.push(Row::keyed(key, label).cells(cells).note("Not forecast"))?;
        operating.push(key);
    }

    push_section(wb, "Working capital changes")?;
    let lines = [
        WorkingCapitalLine {
            key: "cf.chg_receivables",
            label: "Change in receivables",
            filed: &cf.change_receivables,
            balances: &["bs.ar"],
            side: BalanceSide::Asset,
        },
        WorkingCapitalLine {
            key: "cf.chg_income_taxes",
            label: "Change in income taxes, net",
            filed: &cf.change_income_taxes,
            balances: &["bs.tax_nc"],
            side: BalanceSide::Liability,
        },
        WorkingCapitalLine {
            key: "cf.chg_other_assets",
            label: "Change in other assets",
            filed: &cf.change_other_assets,
            balances: &["bs.other_ca"],
            side: BalanceSide::Asset,
        },
        WorkingCapitalLine {
            key: "cf.chg_payables",
            label: "Change in accounts payable",
            filed: &cf.change_payables,
            balances: &["bs.ap"],
            side: BalanceSide::Liability,
        },
        WorkingCapitalLine {
            key: "cf.chg_accrued",
            label: "Change in accrued expenses & other",
            filed: &cf.change_accrued_expenses,
            balances: &["bs.accrued_comp", "bs.accrued_exp"],
            side: BalanceSide::Liability,
        },
        WorkingCapitalLine {
            key: "cf.chg_rev_share",
            label: "Change in accrued revenue share",
            filed: &cf.change_revenue_share,
            balances: &["bs.rev_share"],
            side: BalanceSide::Liability,
        },
        WorkingCapitalLine {
            key: "cf.chg_deferred_rev",
            label: "Change in deferred revenue",
            filed: &cf.change_deferred_revenue,
            balances: &["bs.deferred_rev"],
            side: BalanceSide::Liability,
        },
    ];
    for line in &lines {
        let cells = history_then(t, ID, line.filed, |p| {
            let prev = t.prior(p).unwrap_or(p);
            Ok(working_capital_delta(
                sum_at(wb, line.balances, p)?,
                sum_at(wb, line.balances, prev)?,
                line.side,
            ))
        })?;
        let note = match line.side {
            BalanceSide::Asset => "Increase in the asset uses cash",
            BalanceSide::Liability => "Increase in the liability provides cash",
        };
        wb.push(Row::keyed(line.key, line.label).cells(cells).note(note))?;
        operating.push(line.key);
    }

    let cells = every_period(t, ID, |p| {
        Ok(Expr::sum(operating.iter().map(|k| wb.at_period(k, p)).collect::<Result<Vec<_>, _>>()?))
    })?;
    wb.push(
        Row::keyed("cf.cfo", "Cash from operations")
            .style(RowStyle::Subtotal)
            .cells(cells)
            .note("NI + non-cash items + working capital"),
    )?;
    wb.push(
        Row::keyed("cf.cfo_reported", "Reported cash from operations (filed)")
            .style(RowStyle::Memo)
            .cells(filed_cells(t, &cf.operating_cash_flow)),
    )?;
    push_check(wb, t, "cf.cfo_check", "    Components vs filed", "cf.cfo", "cf.cfo_reported")?;

    push_section(wb, "Investing activities")?;
    let cells = history_then(t, ID, &cf.capex, |p| Ok(-wb.at_period(&drv("capex"), p)?))?;
    wb.push(Row::keyed("cf.capex", "Capital expenditures").cells(cells).note("Forecast from CapEx guidance"))?;
    let cells = every_period(t, ID, |p| Ok(-wb.at_period("cf.capex", p)? / wb.at_period("pl.revenue", p)?))?;
    wb.push(
        Row::keyed("cf.capex_intensity", "    CapEx / revenue")
            .style(RowStyle::Rate)
            .format(NumFormat::Percent)
            .cells(cells),
    )?;

    let cells = every_period(t, ID, |p| Ok(wb.at_period("cf.cfo", p)? + wb.at_period("cf.capex", p)?))?;
    wb.push(Row::keyed("cf.fcf", "Free cash flow").style(RowStyle::Key).cells(cells).note("CFO + CapEx"))?;
    push_ratio(wb, t, "cf.fcf_margin", "    FCF margin", "cf.fcf", "pl.revenue")?;

    push_section(wb, "Financing activities")?;
    let cells = history_then(t, ID, &cf.buybacks, |p| Ok(-wb.at_period(&drv("buyback"), p)?))?;
    wb.push(Row::keyed("cf.buybacks", "Share repurchases").cells(cells))?;
    let cells = history_then(t, ID, &cf.dividends, |p| {
        Ok(-(wb.at_period(&drv("dividend_per_share"), p)? * wb.at_period("pl.shares", p)?))
    })?;
    wb.push(Row::keyed("cf.dividends", "Dividends paid").cells(cells).note("DPS x diluted shares"))?;

    log::debug!("cash flow: {} operating components", operating.len());
    Ok(())
}

/// Balance of one or more rows; a compound balance is treated as a unit.
fn sum_at(wb: &Workbook, keys: &[&str], p: Period) -> Result<Expr, BuildError> {
    let mut terms = keys.iter().map(|k| wb.at_period(k, p));
    let first = terms.next().unwrap_or_else(|| Ok(Expr::num(0.0)))?;
    terms.try_fold(first, |acc, term| Ok(acc + term?))
}
