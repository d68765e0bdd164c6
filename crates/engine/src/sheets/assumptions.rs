//! Assumptions: one block per driver plus the derived discount rate.
//!
//! Each driver gets three track rows (one per scenario) holding the forecast
//! inputs, and a selected row. The selected row carries the historical
//! actuals and, for forecast periods, a reference to the active scenario's
//! track. Every other sheet reads drivers through the selected row only.

use crate::dataset::{CostModel, Dataset};
use crate::error::BuildError;
use crate::expr::Expr;
use crate::period::Period;
use crate::scenario::Scenario;
use crate::sheet::{Cell, ColumnLayout, NumFormat, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::{drv, push_heading, push_section, BuildContext};

const ID: SheetId = SheetId::Assumptions;

/// Driver keys consumed by the sheet builders, grouped for display.
pub fn catalog(dataset: &Dataset) -> Vec<(&'static str, Vec<String>)> {
    let owned = |keys: &[&str]| keys.iter().map(|k| k.to_string()).collect::<Vec<_>>();

    let growth = dataset.segments.iter().map(|s| format!("growth.{}", s.key)).collect();

    let mut costs = Vec::new();
    for d in &dataset.divisions {
        match d.cost_model {
            CostModel::Decomposed => {
                costs.push(format!("employee_comp_rate.{}", d.key));
                costs.push(format!("other_cost_rate.{}", d.key));
            }
            CostModel::BlendedMargin => costs.push(format!("oi_margin.{}", d.key)),
        }
    }
    costs.push("unallocated_costs".to_string());

    vec![
        (
            "Discount rate inputs",
            owned(&[
                "risk_free_rate",
                "beta",
                "equity_risk_premium",
                "cost_of_debt",
                "tax_rate",
                "debt_to_capital",
                "terminal_growth",
            ]),
        ),
        ("Segment revenue growth", growth),
        ("Segment cost structure", costs),
        (
            "Income statement",
            owned(&[
                "tac_rate",
                "other_cogs_rate",
                "rnd_rate",
                "snm_rate",
                "gna_rate",
                "dna_rate",
                "sbc_rate",
                "other_income",
                "share_change",
            ]),
        ),
        ("Capital allocation", owned(&["capex", "buyback", "dividend_per_share", "nwc_rate"])),
        (
            "Balance sheet",
            owned(&[
                "ar_days",
                "ap_days",
                "accrued_comp_rate",
                "accrued_exp_rate",
                "rev_share_rate",
                "deferred_rev_growth",
                "op_lease_growth",
                "non_marketable_growth",
                "marketable_growth",
                "other_current_rate",
                "deferred_tax_assets",
                "goodwill_growth",
                "other_noncurrent_growth",
                "long_term_debt",
                "noncurrent_tax_growth",
                "lease_liability_ratio",
                "other_lt_growth",
                "sbc_equity_retention",
            ]),
        ),
    ]
}

pub fn build(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let groups = catalog(ctx.dataset);
    for (_, keys) in &groups {
        for key in keys {
            ctx.resolver.require(key)?;
        }
    }

    wb.begin_sheet(ID, ColumnLayout::Timeline)?;
    push_heading(
        wb,
        "Key Assumptions & Drivers",
        &format!("Historical actuals, three scenario tracks, selected = {}", ctx.resolver.active().title()),
    )?;
    wb.push(
        Row::keyed("scenario.active", "Active scenario")
            .style(RowStyle::Key)
            .cells(vec![Cell::Text(ctx.resolver.active().title().to_string())])
            .note("Forecast cells of each selected row point at this scenario's track"),
    )?;

    let mut written = std::collections::BTreeSet::new();
    for (heading, keys) in &groups {
        push_section(wb, heading)?;
        for key in keys {
            push_driver(wb, ctx, key)?;
            written.insert(key.clone());
        }
    }

    let extra: Vec<String> = ctx
        .dataset
        .drivers
        .iter()
        .map(|(k, _)| k.to_string())
        .filter(|k| !written.contains(k))
        .collect();
    if !extra.is_empty() {
        push_section(wb, "Other drivers")?;
        for key in &extra {
            push_driver(wb, ctx, key)?;
        }
    }

    push_wacc(wb, ctx)?;
    log::debug!("assumptions: {} drivers", written.len() + extra.len());
    Ok(())
}

fn push_driver(wb: &mut Workbook, ctx: &BuildContext, key: &str) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let driver = ctx.dataset.drivers.get(key).ok_or_else(|| BuildError::MissingAssumption {
        driver: key.to_string(),
        scenario: ctx.resolver.active(),
        period: t.label(t.last_historical()).to_string(),
    })?;

    for scenario in Scenario::ALL {
        let cells = t
            .periods()
            .map(|p| match t.forecast_index(p) {
                Some(i) => driver.forecast_value(scenario, i).map(Cell::Input).unwrap_or(Cell::Empty),
                None => Cell::Empty,
            })
            .collect();
        wb.push(
            Row::keyed(track_key(key, scenario), format!("    {}", scenario.title()))
                .format(driver.format)
                .cells(cells),
        )?;
    }

    let active = track_key(key, ctx.resolver.active());
    let cells = t
        .periods()
        .map(|p| {
            if t.is_forecast(p) {
                ctx.resolver.select(key, p)?;
                Ok(Cell::Formula(wb.at_period(&active, p)?))
            } else {
                Ok(ctx.resolver.actual(key, p).map(Cell::Input).unwrap_or(Cell::Empty))
            }
        })
        .collect::<Result<Vec<_>, BuildError>>()?;
    let mut row = Row::keyed(drv(key), driver.label.clone()).style(RowStyle::Key).format(driver.format).cells(cells);
    if let Some(note) = &driver.note {
        row = row.note(note.clone());
    }
    wb.push(row)?;
    Ok(())
}

pub fn track_key(driver: &str, scenario: Scenario) -> String {
    format!("drv.{driver}.{scenario}")
}

/// Ke = Rf + beta * ERP; Kd(after tax) = Kd * (1 - t);
/// WACC = (1 - D/C) * Ke + D/C * Kd(after tax).
fn push_wacc(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let t = ctx.timeline;
    push_section(wb, "Derived discount rate")?;

    let cells = forecast_cells(wb, t, &|wb, p| {
        Ok(wb.at_period(&drv("risk_free_rate"), p)?
            + wb.at_period(&drv("beta"), p)? * wb.at_period(&drv("equity_risk_premium"), p)?)
    })?;
    wb.push(
        Row::keyed("wacc.cost_of_equity", "Cost of equity (CAPM)")
            .format(NumFormat::Percent2)
            .cells(cells)
            .note("Rf + Beta x ERP"),
    )?;

    let cells = forecast_cells(wb, t, &|wb, p| {
        Ok(wb.at_period(&drv("cost_of_debt"), p)? * (Expr::num(1.0) - wb.at_period(&drv("tax_rate"), p)?))
    })?;
    wb.push(
        Row::keyed("wacc.after_tax_cost_of_debt", "After-tax cost of debt")
            .format(NumFormat::Percent2)
            .cells(cells)
            .note("Kd x (1 - tax rate)"),
    )?;

    let cells = forecast_cells(wb, t, &|wb, p| Ok(Expr::num(1.0) - wb.at_period(&drv("debt_to_capital"), p)?))?;
    wb.push(Row::keyed("wacc.equity_weight", "Equity weight (E/C)").format(NumFormat::Percent).cells(cells))?;

    let cells = forecast_cells(wb, t, &|wb, p| {
        Ok(wb.at_period("wacc.equity_weight", p)? * wb.at_period("wacc.cost_of_equity", p)?
            + wb.at_period(&drv("debt_to_capital"), p)? * wb.at_period("wacc.after_tax_cost_of_debt", p)?)
    })?;
    wb.push(
        Row::keyed("wacc.rate", "WACC")
            .style(RowStyle::Key)
            .format(NumFormat::Percent2)
            .cells(cells)
            .note("E/C x Ke + D/C x Kd(after tax)"),
    )?;
    Ok(())
}

fn forecast_cells(
    wb: &Workbook,
    t: &crate::period::Timeline,
    f: &dyn Fn(&Workbook, Period) -> Result<Expr, BuildError>,
) -> Result<Vec<Cell>, BuildError> {
    t.periods()
        .map(|p| if t.is_forecast(p) { Ok(Cell::Formula(f(wb, p)?)) } else { Ok(Cell::Empty) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioResolver;
    use crate::sheets::test_support::timeline;

    const DATASET: &str = r#"
        [company]
        name = "Example Co"
        ticker = "EXM"
        valuation_date = "2025-12-31"

        [periods]
        historical = ["2025A"]
        forecast = ["2026E", "2027E"]

        [[segments]]
        key = "core"
        label = "Core"
        division = "main"
        revenue = [100.0]

        [[divisions]]
        key = "main"
        label = "Main"
        cost_model = "blended_margin"
        operating_income = [20.0]

        [drivers.tax_rate]
        label = "Tax rate"
        historical = [0.168]
        base = 0.17
        bull = 0.165
        bear = [0.18, 0.19]
    "#;

    #[test]
    fn test_selected_row_points_at_active_track() {
        let ds: Dataset = toml::from_str(DATASET).unwrap();
        let t = timeline(&["2025A"], &["2026E", "2027E"]);
        for scenario in [Scenario::Base, Scenario::Bear] {
            let ctx = BuildContext {
                dataset: &ds,
                timeline: &t,
                resolver: ScenarioResolver::new(&ds.drivers, &t, scenario),
            };
            let mut wb = Workbook::new(t.clone());
            wb.begin_sheet(ID, ColumnLayout::Timeline).unwrap();
            push_driver(&mut wb, &ctx, "tax_rate").unwrap();

            assert_eq!(wb.value_at(&drv("tax_rate"), Period::at(0)).unwrap(), 0.168);
            let expected = if scenario == Scenario::Base { 0.17 } else { 0.19 };
            assert_eq!(wb.value_at(&drv("tax_rate"), Period::at(2)).unwrap(), expected);

            let selected = wb.cell(&drv("tax_rate"), 2).unwrap().expr().unwrap().render(ID);
            let track_row = wb.registry().resolve(&track_key("tax_rate", scenario)).unwrap().excel_row();
            assert_eq!(selected, format!("D{track_row}"));
        }
    }

    #[test]
    fn test_catalog_follows_cost_model() {
        let ds: Dataset = toml::from_str(DATASET).unwrap();
        let keys: Vec<String> = catalog(&ds).into_iter().flat_map(|(_, k)| k).collect();
        assert!(keys.contains(&"growth.core".to_string()));
        assert!(keys.contains(&"oi_margin.main".to_string()));
        assert!(!keys.contains(&"employee_comp_rate.main".to_string()));
    }

    #[test]
    fn test_missing_required_driver_fails_before_any_row() {
        let ds: Dataset = toml::from_str(DATASET).unwrap();
        let t = timeline(&["2025A"], &["2026E", "2027E"]);
        let ctx = BuildContext { dataset: &ds, timeline: &t, resolver: ScenarioResolver::new(&ds.drivers, &t, Scenario::Base) };
        let mut wb = Workbook::new(t.clone());
        let err = build(&mut wb, &ctx).unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingAssumption { driver: "risk_free_rate".into(), scenario: Scenario::Base, period: "2026E".into() }
        );
        assert!(wb.sheet(ID).is_none());
    }
}
