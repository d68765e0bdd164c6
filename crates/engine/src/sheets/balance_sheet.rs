//! Balance sheet. Every line except cash is forecast on its own; cash is
//! the residual that makes assets equal liabilities plus equity.
//!
//! Cash sits at the top of the statement but depends on rows below it, so
//! cash and the asset subtotals that include it are reserved and filled
//! once equity is known.

use crate::crosscheck::CheckRows;
use crate::error::BuildError;
use crate::expr::Expr;
use crate::period::Period;
use crate::sheet::{Cell, ColumnLayout, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::{drv, every_period, history_then, push_heading, push_section, roll_forward, BuildContext};

const ID: SheetId = SheetId::BalanceSheet;

const DAYS_PER_YEAR: f64 = 365.0;

/// Cash that balances the sheet: liabilities plus equity less every other asset.
pub fn cash_plug(liabilities: Expr, equity: Expr, other_assets: Vec<Expr>) -> Expr {
    other_assets.into_iter().fold(liabilities + equity, |acc, asset| acc - asset)
}

pub fn build(wb: &mut Workbook, ctx: &BuildContext) -> Result<CheckRows, BuildError> {
    let t = ctx.timeline;
    let ds = ctx.dataset;
    let b = &ds.balance_sheet;
    wb.begin_sheet(ID, ColumnLayout::Timeline)?;
    push_heading(wb, "Consolidated Balance Sheet", &format!("{} | cash is the balancing item", ds.company.units))?;

    // Current assets
    push_section(wb, "Current assets")?;
    let cash = wb.reserve(Row::keyed("bs.cash", "Cash & equivalents").note("Plug: total L&E - all other assets"))?;
    push_growth_line(wb, ctx, "bs.marketable", "Marketable securities", &b.marketable_securities, "marketable_growth")?;
    let cash_total = wb.reserve(Row::keyed("bs.cash_total", "Total cash & securities").style(RowStyle::Subtotal))?;

    let cells = history_then(t, ID, &b.accounts_receivable, |p| {
        Ok(wb.at_period("pl.revenue", p)? * wb.at_period(&drv("ar_days"), p)? / Expr::num(DAYS_PER_YEAR))
    })?;
    wb.push(Row::keyed("bs.ar", "Accounts receivable, net").cells(cells).note("Revenue x AR days / 365"))?;
    push_rate_line(wb, ctx, "bs.other_ca", "Other current assets", &b.other_current_assets, "pl.revenue", "other_current_rate")?;
    let total_ca = wb.reserve(Row::keyed("bs.total_ca", "Total current assets").style(RowStyle::Subtotal))?;

    // Non-current assets
    push_section(wb, "Non-current assets")?;
    push_growth_line(
        wb,
        ctx,
        "bs.non_marketable",
        "Non-marketable securities",
        &b.non_marketable_securities,
        "non_marketable_growth",
    )?;
    let cells = history_then(t, ID, &b.deferred_tax_assets, |p| wb.at_period(&drv("deferred_tax_assets"), p))?;
    wb.push(Row::keyed("bs.deferred_tax", "Deferred income taxes").cells(cells))?;

    let capex = drv("capex");
    let cells = roll_forward(wb, t, &b.ppe, |prior, p| {
        Ok(prior + wb.at_period(&capex, p)? - wb.at_period("pl.dna", p)?)
    })?;
    wb.push(Row::keyed("bs.ppe", "Property & equipment, net").cells(cells).note("Prior + CapEx - D&A"))?;
    push_growth_line(wb, ctx, "bs.op_lease_assets", "Operating lease assets", &b.operating_lease_assets, "op_lease_growth")?;
    push_growth_line(wb, ctx, "bs.goodwill", "Goodwill", &b.goodwill, "goodwill_growth")?;
    push_growth_line(wb, ctx, "bs.other_nca", "Other non-current assets", &b.other_noncurrent_assets, "other_noncurrent_growth")?;
    push_total(
        wb,
        "bs.total_nca",
        "Total non-current assets",
        &["bs.non_marketable", "bs.deferred_tax", "bs.ppe", "bs.op_lease_assets", "bs.goodwill", "bs.other_nca"],
    )?;
    let total_assets = wb.reserve(Row::keyed("bs.total_assets", "Total assets").style(RowStyle::Key))?;

    // Current liabilities
    push_section(wb, "Current liabilities")?;
    let cells = history_then(t, ID, &b.accounts_payable, |p| {
        Ok(wb.at_period("pl.cogs", p)? * wb.at_period(&drv("ap_days"), p)? / Expr::num(DAYS_PER_YEAR))
    })?;
    wb.push(Row::keyed("bs.ap", "Accounts payable").cells(cells).note("COGS x AP days / 365"))?;
    push_rate_line(wb, ctx, "bs.accrued_comp", "Accrued compensation", &b.accrued_compensation, "pl.revenue", "accrued_comp_rate")?;
    push_rate_line(wb, ctx, "bs.accrued_exp", "Accrued expenses & other", &b.accrued_expenses, "pl.revenue", "accrued_exp_rate")?;
    push_rate_line(wb, ctx, "bs.rev_share", "Accrued revenue share", &b.accrued_revenue_share, "pl.ad_revenue", "rev_share_rate")?;
    push_growth_line(wb, ctx, "bs.deferred_rev", "Deferred revenue", &b.deferred_revenue, "deferred_rev_growth")?;
    push_total(
        wb,
        "bs.total_cl",
        "Total current liabilities",
        &["bs.ap", "bs.accrued_comp", "bs.accrued_exp", "bs.rev_share", "bs.deferred_rev"],
    )?;

    // Non-current liabilities
    push_section(wb, "Non-current liabilities")?;
    let cells = history_then(t, ID, &b.long_term_debt, |p| wb.at_period(&drv("long_term_debt"), p))?;
    wb.push(Row::keyed("bs.lt_debt", "Long-term debt").cells(cells).note("Absolute assumption"))?;
    push_growth_line(wb, ctx, "bs.tax_nc", "Income taxes payable, non-current", &b.noncurrent_income_taxes, "noncurrent_tax_growth")?;
    push_rate_line(
        wb,
        ctx,
        "bs.op_lease_liab",
        "Operating lease liabilities",
        &b.operating_lease_liabilities,
        "bs.op_lease_assets",
        "lease_liability_ratio",
    )?;
    push_growth_line(wb, ctx, "bs.other_ltl", "Other long-term liabilities", &b.other_long_term_liabilities, "other_lt_growth")?;
    push_total(wb, "bs.total_ncl", "Total non-current liabilities", &["bs.lt_debt", "bs.tax_nc", "bs.op_lease_liab", "bs.other_ltl"])?;
    let cells = every_period(t, ID, |p| Ok(wb.at_period("bs.total_cl", p)? + wb.at_period("bs.total_ncl", p)?))?;
    wb.push(Row::keyed("bs.total_liabilities", "Total liabilities").style(RowStyle::Subtotal).cells(cells))?;

    // Equity
    push_section(wb, "Stockholders' equity")?;
    let cells = roll_forward(wb, t, &b.equity, |prior, p| {
        Ok(prior + wb.at_period("pl.net_income", p)?
            - wb.at_period(&drv("buyback"), p)?
            - wb.at_period(&drv("dividend_per_share"), p)? * wb.at_period("pl.shares", p)?
            + wb.at_period("pl.sbc", p)? * wb.at_period(&drv("sbc_equity_retention"), p)?)
    })?;
    wb.push(
        Row::keyed("bs.equity", "Total equity")
            .style(RowStyle::Key)
            .cells(cells)
            .note("Prior + NI - buybacks - DPS x shares + retained SBC"),
    )?;
    let cells = every_period(t, ID, |p| Ok(wb.at_period("bs.total_liabilities", p)? + wb.at_period("bs.equity", p)?))?;
    wb.push(Row::keyed("bs.total_le", "Total liabilities & equity").style(RowStyle::Key).cells(cells))?;
    let balance_check = wb.reserve(
        Row::keyed("bs.balance_check", "Balance check (assets - L&E)")
            .style(RowStyle::Check)
            .note("Should be 0; cash is the plug"),
    )?;

    // Second pass over the reserved asset rows, top-down.
    let cells = history_then(t, ID, &b.cash, |p| {
        Ok(cash_plug(
            wb.at_period("bs.total_liabilities", p)?,
            wb.at_period("bs.equity", p)?,
            vec![
                wb.at_period("bs.total_nca", p)?,
                wb.at_period("bs.marketable", p)?,
                wb.at_period("bs.ar", p)?,
                wb.at_period("bs.other_ca", p)?,
            ],
        ))
    })?;
    wb.fill(cash, cells)?;
    let cells = sum_cells(wb, &["bs.cash", "bs.marketable"])?;
    wb.fill(cash_total, cells)?;
    let cells = sum_cells(wb, &["bs.cash_total", "bs.ar", "bs.other_ca"])?;
    wb.fill(total_ca, cells)?;
    let cells = sum_cells(wb, &["bs.total_ca", "bs.total_nca"])?;
    wb.fill(total_assets, cells)?;

    log::debug!("balance sheet built, cash plugged for {} forecast periods", t.forecast_count());
    Ok(CheckRows { mirror: None, difference: Some(balance_check) })
}

/// Filed history, forecast as `prior x (1 + growth)`.
fn push_growth_line(
    wb: &mut Workbook,
    ctx: &BuildContext,
    key: &str,
    label: &str,
    series: &[f64],
    growth: &str,
) -> Result<(), BuildError> {
    let growth = drv(growth);
    let cells = roll_forward(wb, ctx.timeline, series, |prior, p| {
        Ok(prior * (Expr::num(1.0) + wb.at_period(&growth, p)?))
    })?;
    wb.push(Row::keyed(key, label).cells(cells).note("Prior x (1 + growth)"))?;
    Ok(())
}

/// Filed history, forecast as `base x rate`.
fn push_rate_line(
    wb: &mut Workbook,
    ctx: &BuildContext,
    key: &str,
    label: &str,
    series: &[f64],
    base: &str,
    rate: &str,
) -> Result<(), BuildError> {
    let rate = drv(rate);
    let cells = history_then(ctx.timeline, ID, series, |p| Ok(wb.at_period(base, p)? * wb.at_period(&rate, p)?))?;
    wb.push(Row::keyed(key, label).cells(cells))?;
    Ok(())
}

fn push_total(wb: &mut Workbook, key: &str, label: &str, parts: &[&str]) -> Result<(), BuildError> {
    let cells = sum_cells(wb, parts)?;
    wb.push(Row::keyed(key, label).style(RowStyle::Subtotal).cells(cells))?;
    Ok(())
}

fn sum_cells(wb: &Workbook, parts: &[&str]) -> Result<Vec<Cell>, BuildError> {
    let t = wb.timeline();
    let cells = t
        .periods()
        .map(|p| sum_at(wb, parts, p).map(Cell::Formula))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cells)
}

fn sum_at(wb: &Workbook, parts: &[&str], p: Period) -> Result<Expr, BuildError> {
    let mut terms = parts.iter().map(|k| wb.at_period(k, p));
    let first = terms.next().unwrap_or_else(|| Ok(Expr::num(0.0)))?;
    terms.try_fold(first, |acc, term| Ok(acc + term?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::period::Timeline;
    use crate::scenario::{Scenario, ScenarioResolver};
    use crate::sheets::test_support::{timeline, with_drivers};

    // Filed 2025A: assets 200 = liabilities 70 + equity 130.
    const DATASET: &str = r#"
        [company]
        name = "Example Co"
        ticker = "EXM"
        valuation_date = "2025-12-31"

        [periods]
        historical = ["2025A"]
        forecast = ["2026E"]

        [[segments]]
        key = "core"
        label = "Core"
        division = "core"
        revenue = [400.0]

        [[divisions]]
        key = "core"
        label = "Core"
        cost_model = "blended_margin"
        operating_income = [60.0]

        [balance_sheet]
        cash = [10.0]
        marketable_securities = [20.0]
        accounts_receivable = [30.0]
        other_current_assets = [5.0]
        non_marketable_securities = [15.0]
        deferred_tax_assets = [2.0]
        ppe = [100.0]
        operating_lease_assets = [8.0]
        goodwill = [10.0]
        other_noncurrent_assets = [0.0]
        accounts_payable = [10.0]
        accrued_compensation = [5.0]
        accrued_expenses = [5.0]
        accrued_revenue_share = [4.0]
        deferred_revenue = [6.0]
        long_term_debt = [20.0]
        noncurrent_income_taxes = [5.0]
        operating_lease_liabilities = [10.0]
        other_long_term_liabilities = [5.0]
        equity = [130.0]
    "#;

    fn close(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-9
    }

    /// Flat drivers that keep every non-rollforward line at its 2025A level,
    /// plus a stand-in income statement.
    fn prepared(t: &Timeline) -> Workbook {
        let mut wb = with_drivers(
            t,
            &[
                ("marketable_growth", 0.0),
                ("ar_days", 36.5),
                ("other_current_rate", 0.0125),
                ("non_marketable_growth", 0.0),
                ("deferred_tax_assets", 2.0),
                ("capex", 30.0),
                ("op_lease_growth", 0.0),
                ("goodwill_growth", 0.0),
                ("other_noncurrent_growth", 0.0),
                ("ap_days", 20.0),
                ("accrued_comp_rate", 0.0125),
                ("accrued_exp_rate", 0.0125),
                ("rev_share_rate", 0.02),
                ("deferred_rev_growth", 0.0),
                ("long_term_debt", 20.0),
                ("noncurrent_tax_growth", 0.0),
                ("lease_liability_ratio", 1.25),
                ("other_lt_growth", 0.0),
                ("buyback", 20.0),
                ("dividend_per_share", 1.0),
                ("sbc_equity_retention", 0.6),
            ],
        );
        wb.begin_sheet(SheetId::ConsolidatedPl, ColumnLayout::Timeline).unwrap();
        for (key, values) in [
            ("pl.revenue", [400.0, 400.0]),
            ("pl.ad_revenue", [200.0, 200.0]),
            ("pl.cogs", [182.5, 182.5]),
            ("pl.net_income", [45.0, 50.0]),
            ("pl.dna", [9.0, 10.0]),
            ("pl.sbc", [4.0, 5.0]),
            ("pl.shares", [10.0, 10.0]),
        ] {
            wb.push(Row::keyed(key, key).cells(values.iter().map(|v| Cell::Input(*v)).collect())).unwrap();
        }
        wb
    }

    fn built() -> (Workbook, CheckRows) {
        let ds: Dataset = toml::from_str(DATASET).unwrap();
        let t = timeline(&["2025A"], &["2026E"]);
        let mut wb = prepared(&t);
        let ctx = BuildContext { dataset: &ds, timeline: &t, resolver: ScenarioResolver::new(&ds.drivers, &t, Scenario::Base) };
        let rows = build(&mut wb, &ctx).unwrap();
        (wb, rows)
    }

    #[test]
    fn test_rollforwards() {
        let (wb, _) = built();
        let forecast = Period::at(1);

        // 100 + 30 capex - 10 D&A
        assert!(matches!(wb.cell_at("bs.ppe", forecast).unwrap(), Cell::Formula(_)));
        assert!(close(wb.value_at("bs.ppe", forecast).unwrap(), 120.0));

        // 130 + 50 NI - 20 buyback - 1 x 10 dividends + 5 x 0.6 retained SBC
        assert!(close(wb.value_at("bs.equity", forecast).unwrap(), 153.0));
        let formula = wb.cell_at("bs.equity", forecast).unwrap().expr().unwrap().formula(ID);
        assert!(formula.contains("Consolidated_PL!"), "{formula}");
    }

    #[test]
    fn test_cash_is_filed_then_plugged() {
        let (wb, rows) = built();
        assert_eq!(wb.cell_at("bs.cash", Period::at(0)).unwrap(), &Cell::Input(10.0));

        let plug = wb.cell_at("bs.cash", Period::at(1)).unwrap();
        assert!(matches!(plug, Cell::Formula(_)));
        // 70 liabilities + 153 equity - 155 non-current - 20 securities - 40 AR - 5 other
        assert!(close(plug.value().unwrap(), 3.0));

        for p in [Period::at(0), Period::at(1)] {
            let assets = wb.value_at("bs.total_assets", p).unwrap();
            let le = wb.value_at("bs.total_le", p).unwrap();
            assert!(close(assets, le), "{assets} vs {le}");
        }
        assert!(close(wb.value_at("bs.total_assets", Period::at(1)).unwrap(), 223.0));

        assert!(wb.registry().is_pending("bs.balance_check"));
        assert_eq!(rows.difference.as_ref().map(|h| h.key()), Some("bs.balance_check"));
        assert!(rows.mirror.is_none());
    }

    #[test]
    fn test_cash_plug_balances() {
        let cash = cash_plug(Expr::num(100.0), Expr::num(250.0), vec![Expr::num(300.0)]);
        assert_eq!(cash.eval(), 50.0);
    }

    #[test]
    fn test_cash_plug_renders_as_subtractions() {
        use crate::cell_id::CellId;
        let at = |row| Expr::cell(CellId::new(ID, row, 2), 1.0);
        let cash = cash_plug(at(40), at(43), vec![at(20), at(6)]);
        assert_eq!(cash.formula(ID), "=D41+D44-D21-D7");
    }
}
