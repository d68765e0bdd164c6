//! Ratio analysis. Every row is arithmetic over rows already published on
//! the statements; no new assumptions enter here.

use crate::error::BuildError;
use crate::expr::Expr;
use crate::period::Period;
use crate::sheet::{ColumnLayout, NumFormat, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::{every_period, push_growth, push_heading, push_ratio, push_section, BuildContext};

const ID: SheetId = SheetId::Ratios;

const DAYS_PER_YEAR: f64 = 365.0;

pub fn build(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let t = ctx.timeline;
    wb.begin_sheet(ID, ColumnLayout::Timeline)?;
    push_heading(wb, "Ratio Analysis", "Derived from Consolidated_PL, BS and Cash_Flow")?;

    push_section(wb, "Profitability")?;
    push_ratio(wb, t, "ratio.gross_margin", "Gross margin", "pl.gross_profit", "pl.revenue")?;
    push_ratio(wb, t, "ratio.ebit_margin", "EBIT margin", "pl.ebit", "pl.revenue")?;
    push_ratio(wb, t, "ratio.net_margin", "Net margin", "pl.net_income", "pl.revenue")?;
    push_ratio(wb, t, "ratio.roe", "Return on equity", "pl.net_income", "bs.equity")?;
    push_ratio(wb, t, "ratio.roa", "Return on assets", "pl.net_income", "bs.total_assets")?;

    push_section(wb, "Efficiency")?;
    push_metric(wb, ctx, "ratio.ar_days", "Receivable days", NumFormat::Days, |wb, p| {
        Ok(wb.at_period("bs.ar", p)? / wb.at_period("pl.revenue", p)? * Expr::num(DAYS_PER_YEAR))
    })?;
    push_metric(wb, ctx, "ratio.ap_days", "Payable days", NumFormat::Days, |wb, p| {
        Ok(wb.at_period("bs.ap", p)? / wb.at_period("pl.cogs", p)? * Expr::num(DAYS_PER_YEAR))
    })?;
    push_metric(wb, ctx, "ratio.capex_intensity", "CapEx / revenue", NumFormat::Percent, |wb, p| {
        Ok(-wb.at_period("cf.capex", p)? / wb.at_period("pl.revenue", p)?)
    })?;
    push_metric(wb, ctx, "ratio.capex_to_dna", "CapEx / D&A", NumFormat::Multiple, |wb, p| {
        Ok(-wb.at_period("cf.capex", p)? / wb.at_period("pl.dna", p)?)
    })?;

    push_section(wb, "Leverage & liquidity")?;
    push_ratio(wb, t, "ratio.liabilities_to_assets", "Liabilities / assets", "bs.total_liabilities", "bs.total_assets")?;
    push_metric(wb, ctx, "ratio.current_ratio", "Current ratio", NumFormat::Ratio, |wb, p| {
        Ok(wb.at_period("bs.total_ca", p)? / wb.at_period("bs.total_cl", p)?)
    })?;
    push_metric(wb, ctx, "ratio.net_cash", "Net cash (cash & securities - debt)", NumFormat::Amount, |wb, p| {
        Ok(wb.at_period("bs.cash_total", p)? - wb.at_period("bs.lt_debt", p)?)
    })?;

    push_section(wb, "Cash flow quality")?;
    push_metric(wb, ctx, "ratio.ocf_to_ni", "Operating cash flow / net income", NumFormat::Ratio, |wb, p| {
        Ok(wb.at_period("cf.cfo", p)? / wb.at_period("pl.net_income", p)?)
    })?;
    push_ratio(wb, t, "ratio.fcf_margin", "FCF / revenue", "cf.fcf", "pl.revenue")?;

    push_section(wb, "Growth")?;
    push_growth(wb, t, "ratio.revenue_growth", "Revenue growth", "pl.revenue")?;
    push_growth(wb, t, "ratio.net_income_growth", "Net income growth", "pl.net_income")?;
    push_growth(wb, t, "ratio.eps_growth", "EPS growth", "pl.eps")?;

    log::debug!("ratio analysis built");
    Ok(())
}

fn push_metric<F>(
    wb: &mut Workbook,
    ctx: &BuildContext,
    key: &str,
    label: &str,
    format: NumFormat,
    f: F,
) -> Result<(), BuildError>
where
    F: Fn(&Workbook, Period) -> Result<Expr, BuildError>,
{
    let cells = every_period(ctx.timeline, ID, |p| f(wb, p))?;
    wb.push(Row::keyed(key, label).style(RowStyle::Rate).format(format).cells(cells))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::scenario::{Scenario, ScenarioResolver};
    use crate::sheet::Cell;
    use crate::sheets::test_support::timeline;

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
        revenue = [1000.0]

        [[divisions]]
        key = "core"
        label = "Core"
        cost_model = "blended_margin"
        operating_income = [200.0]
    "#;

    /// Minimal stand-in statements holding every row the ratios read.
    fn statements(t: &crate::period::Timeline) -> Workbook {
        let mut wb = Workbook::new(t.clone());
        let flat = |a: f64, b: f64| vec![Cell::Input(a), Cell::Input(b)];
        wb.begin_sheet(SheetId::ConsolidatedPl, ColumnLayout::Timeline).unwrap();
        for (key, a, b) in [
            ("pl.revenue", 1000.0, 1100.0),
            ("pl.gross_profit", 600.0, 660.0),
            ("pl.ebit", 200.0, 220.0),
            ("pl.net_income", 150.0, 180.0),
            ("pl.cogs", 400.0, 440.0),
            ("pl.dna", 50.0, 60.0),
            ("pl.eps", 1.5, 1.8),
        ] {
            wb.push(Row::keyed(key, key).cells(flat(a, b))).unwrap();
        }
        wb.begin_sheet(SheetId::BalanceSheet, ColumnLayout::Timeline).unwrap();
        for (key, a, b) in [
            ("bs.ar", 100.0, 110.0),
            ("bs.ap", 40.0, 44.0),
            ("bs.equity", 750.0, 900.0),
            ("bs.total_assets", 1500.0, 1600.0),
            ("bs.total_liabilities", 750.0, 700.0),
            ("bs.total_ca", 600.0, 650.0),
            ("bs.total_cl", 300.0, 325.0),
            ("bs.cash_total", 400.0, 420.0),
            ("bs.lt_debt", 100.0, 100.0),
        ] {
            wb.push(Row::keyed(key, key).cells(flat(a, b))).unwrap();
        }
        wb.begin_sheet(SheetId::CashFlow, ColumnLayout::Timeline).unwrap();
        for (key, a, b) in [("cf.capex", -80.0, -90.0), ("cf.cfo", 210.0, 240.0), ("cf.fcf", 130.0, 150.0)] {
            wb.push(Row::keyed(key, key).cells(flat(a, b))).unwrap();
        }
        wb
    }

    #[test]
    fn test_ratios_from_statement_rows() {
        let ds: Dataset = toml::from_str(DATASET).unwrap();
        let t = timeline(&["2025A"], &["2026E"]);
        let mut wb = statements(&t);
        let ctx = BuildContext { dataset: &ds, timeline: &t, resolver: ScenarioResolver::new(&ds.drivers, &t, Scenario::Base) };
        build(&mut wb, &ctx).unwrap();

        let at = |key: &str, i: usize| wb.value_at(key, Period::at(i)).unwrap();
        assert!((at("ratio.gross_margin", 0) - 0.6).abs() < 1e-12);
        assert!((at("ratio.roe", 0) - 0.2).abs() < 1e-12);
        assert!((at("ratio.ar_days", 0) - 36.5).abs() < 1e-9);
        assert!((at("ratio.capex_intensity", 0) - 0.08).abs() < 1e-12);
        assert!((at("ratio.current_ratio", 1) - 2.0).abs() < 1e-12);
        assert_eq!(at("ratio.net_cash", 1), 320.0);
        assert!((at("ratio.revenue_growth", 1) - 0.1).abs() < 1e-12);
        assert!(matches!(wb.cell("ratio.revenue_growth", 0).unwrap(), Cell::Empty));
    }

    #[test]
    fn test_ratio_formulas_cross_sheets() {
        let ds: Dataset = toml::from_str(DATASET).unwrap();
        let t = timeline(&["2025A"], &["2026E"]);
        let mut wb = statements(&t);
        let ctx = BuildContext { dataset: &ds, timeline: &t, resolver: ScenarioResolver::new(&ds.drivers, &t, Scenario::Base) };
        build(&mut wb, &ctx).unwrap();
        let formula = wb.cell("ratio.roa", 0).unwrap().expr().unwrap().formula(ID);
        assert_eq!(formula, "=Consolidated_PL!B4/BS!B4");
    }
}
