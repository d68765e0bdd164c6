//! Segment P&L: operating income per division, the unallocated corporate
//! line, and the segment total that consolidated EBIT links to.

use crate::crosscheck::CheckRows;
use crate::dataset::{CostModel, Division};
use crate::error::BuildError;
use crate::expr::Expr;
use crate::sheet::{ColumnLayout, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::{drv, every_period, history_then, push_heading, push_ratio, push_section, BuildContext};

const ID: SheetId = SheetId::SegmentPl;

pub fn build(wb: &mut Workbook, ctx: &BuildContext) -> Result<CheckRows, BuildError> {
    let t = ctx.timeline;
    let ds = ctx.dataset;
    wb.begin_sheet(ID, ColumnLayout::Timeline)?;
    push_heading(
        wb,
        "Segment P&L",
        &format!("{} | revenue, costs and operating income by division", ds.company.units),
    )?;

    for division in &ds.divisions {
        push_section(wb, &division.label)?;
        let revenue = format!("spl.{}.revenue", division.key);
        let source = format!("rev.division.{}", division.key);
        let cells = every_period(t, ID, |p| wb.at_period(&source, p))?;
        wb.push(Row::keyed(&revenue, "Revenue").cells(cells).note("Linked from Segment_Revenue"))?;

        match division.cost_model {
            CostModel::Decomposed => push_decomposed(wb, ctx, division, &revenue)?,
            CostModel::BlendedMargin => push_blended(wb, ctx, division, &revenue)?,
        }
    }

    push_section(wb, &ds.unallocated.label)?;
    let cells = history_then(t, ID, &ds.unallocated.costs, |p| Ok(-wb.at_period(&drv("unallocated_costs"), p)?))?;
    wb.push(
        Row::keyed("spl.unallocated", "Unallocated costs")
            .cells(cells)
            .note("Corporate costs not allocated to divisions; forecast = -driver"),
    )?;
    push_ratio(wb, t, "spl.unallocated.pct", "    % of total revenue", "spl.unallocated", "rev.total")?;

    push_section(wb, "Cross-check: sum of segment OI vs consolidated EBIT")?;
    let parts: Vec<String> = ds
        .divisions
        .iter()
        .map(|d| format!("spl.{}.oi", d.key))
        .chain(std::iter::once("spl.unallocated".to_string()))
        .collect();
    let cells = every_period(t, ID, |p| {
        Ok(Expr::sum(parts.iter().map(|k| wb.at_period(k, p)).collect::<Result<Vec<_>, _>>()?))
    })?;
    wb.push(
        Row::keyed("spl.oi_total", "Sum of segment operating income")
            .style(RowStyle::Key)
            .cells(cells)
            .note("Divisions + unallocated"),
    )?;

    let mirror = wb.reserve(
        Row::keyed("spl.ebit_link", "Consolidated EBIT (from Consolidated_PL)").note("Filled once Consolidated_PL exists"),
    )?;
    let difference = wb.reserve(
        Row::keyed("spl.ebit_diff", "Difference (should be 0)")
            .style(RowStyle::Check)
            .note("Nonzero means segment and consolidated views disagree"),
    )?;

    log::debug!("segment P&L: {} divisions", ds.divisions.len());
    Ok(CheckRows { mirror: Some(mirror), difference: Some(difference) })
}

fn push_decomposed(wb: &mut Workbook, ctx: &BuildContext, division: &Division, revenue: &str) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let key = &division.key;
    let emp = format!("spl.{key}.employee_comp");
    let other = format!("spl.{key}.other_costs");
    let total = format!("spl.{key}.total_costs");
    let oi = format!("spl.{key}.oi");

    let rate = drv(&format!("employee_comp_rate.{key}"));
    let cells = history_then(t, ID, &division.employee_comp, |p| Ok(wb.at_period(revenue, p)? * wb.at_period(&rate, p)?))?;
    wb.push(Row::keyed(&emp, "(-) Employee compensation").cells(cells).note("Revenue x employee comp rate"))?;

    let rate = drv(&format!("other_cost_rate.{key}"));
    let cells = history_then(t, ID, &division.other_costs, |p| Ok(wb.at_period(revenue, p)? * wb.at_period(&rate, p)?))?;
    wb.push(Row::keyed(&other, "(-) Other costs").cells(cells).note("Revenue x other cost rate"))?;

    let cells = every_period(t, ID, |p| Ok(wb.at_period(&emp, p)? + wb.at_period(&other, p)?))?;
    wb.push(Row::keyed(&total, "Total costs").style(RowStyle::Subtotal).cells(cells))?;

    let cells = every_period(t, ID, |p| Ok(wb.at_period(revenue, p)? - wb.at_period(&total, p)?))?;
    wb.push(Row::keyed(&oi, "Operating income").style(RowStyle::Key).cells(cells).note("Revenue - total costs"))?;
    push_ratio(wb, t, &format!("spl.{key}.margin"), "    Operating margin", &oi, revenue)?;
    Ok(())
}

/// Cost lines are not disclosed: operating income comes from a single
/// margin and costs are implied.
fn push_blended(wb: &mut Workbook, ctx: &BuildContext, division: &Division, revenue: &str) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let key = &division.key;
    let oi = format!("spl.{key}.oi");
    let margin = drv(&format!("oi_margin.{key}"));

    let cells = history_then(t, ID, &division.operating_income, |p| {
        Ok(wb.at_period(revenue, p)? * wb.at_period(&margin, p)?)
    })?;
    wb.push(
        Row::keyed(&oi, "Operating income (loss)")
            .style(RowStyle::Key)
            .cells(cells)
            .note("Revenue x blended operating margin"),
    )?;
    let cells = every_period(t, ID, |p| Ok(wb.at_period(revenue, p)? - wb.at_period(&oi, p)?))?;
    wb.push(Row::keyed(format!("spl.{key}.implied_costs"), "Implied costs (revenue - OI)").cells(cells))?;
    push_ratio(wb, t, &format!("spl.{key}.margin"), "    Operating margin", &oi, revenue)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::sheet::Cell;
    use crate::period::Period;
    use crate::scenario::{Scenario, ScenarioResolver};
    use crate::sheets::test_support::{timeline, with_drivers};

    const DATASET: &str = r#"
        [company]
        name = "Example Co"
        ticker = "EXM"
        valuation_date = "2025-12-31"

        [periods]
        historical = ["2025A"]
        forecast = ["2026E"]

        [[segments]]
        key = "ads"
        label = "Ads"
        division = "services"
        revenue = [1000.0]

        [[segments]]
        key = "labs"
        label = "Labs"
        division = "labs"
        revenue = [10.0]

        [[divisions]]
        key = "services"
        label = "Services"
        cost_model = "decomposed"
        employee_comp = [150.0]
        other_costs = [450.0]

        [[divisions]]
        key = "labs"
        label = "Labs"
        cost_model = "blended_margin"
        operating_income = [-30.0]

        [unallocated]
        costs = [-20.0]
    "#;

    /// Assumptions plus a stand-in revenue sheet.
    fn prepared(ds: &Dataset, t: &crate::period::Timeline) -> Workbook {
        let mut wb = with_drivers(
            t,
            &[
                ("employee_comp_rate.services", 0.10),
                ("other_cost_rate.services", 0.40),
                ("oi_margin.labs", -2.0),
                ("unallocated_costs", 25.0),
            ],
        );
        wb.begin_sheet(SheetId::SegmentRevenue, ColumnLayout::Timeline).unwrap();
        let total: f64 = ds.segments.iter().map(|s| s.revenue[0]).sum();
        for d in &ds.divisions {
            let v: f64 = ds.segments_of(&d.key).map(|s| s.revenue[0]).sum();
            wb.push(Row::keyed(format!("rev.division.{}", d.key), &d.label).cells(vec![Cell::Input(v), Cell::Input(v * 2.0)]))
                .unwrap();
        }
        wb.push(Row::keyed("rev.total", "Total").cells(vec![Cell::Input(total), Cell::Input(total * 2.0)])).unwrap();
        wb
    }

    #[test]
    fn test_segment_oi_and_reserved_rows() {
        let ds: Dataset = toml::from_str(DATASET).unwrap();
        let t = timeline(&["2025A"], &["2026E"]);
        let mut wb = prepared(&ds, &t);
        let ctx = BuildContext { dataset: &ds, timeline: &t, resolver: ScenarioResolver::new(&ds.drivers, &t, Scenario::Base) };
        let rows = build(&mut wb, &ctx).unwrap();

        // 1000 - (150 + 450) = 400; 400 - 30 - 20 = 350.
        assert_eq!(wb.value_at("spl.services.oi", Period::at(0)).unwrap(), 400.0);
        assert_eq!(wb.value_at("spl.oi_total", Period::at(0)).unwrap(), 350.0);

        // Forecast: revenue 2000 -> OI 1000; labs 20 x -2 = -40; unallocated -25.
        assert!((wb.value_at("spl.services.oi", Period::at(1)).unwrap() - 1000.0).abs() < 1e-9);
        assert!((wb.value_at("spl.labs.oi", Period::at(1)).unwrap() + 40.0).abs() < 1e-9);
        assert_eq!(wb.value_at("spl.unallocated", Period::at(1)).unwrap(), -25.0);
        assert_eq!(wb.value_at("spl.labs.implied_costs", Period::at(0)).unwrap(), 40.0);

        assert!(wb.registry().is_pending("spl.ebit_link"));
        assert!(wb.registry().is_pending("spl.ebit_diff"));
        assert_eq!(rows.mirror.as_ref().map(|h| h.key()), Some("spl.ebit_link"));
    }

    #[test]
    fn test_revenue_is_a_link() {
        let ds: Dataset = toml::from_str(DATASET).unwrap();
        let t = timeline(&["2025A"], &["2026E"]);
        let mut wb = prepared(&ds, &t);
        let ctx = BuildContext { dataset: &ds, timeline: &t, resolver: ScenarioResolver::new(&ds.drivers, &t, Scenario::Base) };
        build(&mut wb, &ctx).unwrap();
        assert!(matches!(wb.cell("spl.services.revenue", 0).unwrap(), Cell::Link(_)));
    }
}
