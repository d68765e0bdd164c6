//! Segment revenue build: each segment grows off its prior year, divisions
//! and the total are sums of segment rows.

use crate::error::BuildError;
use crate::expr::Expr;
use crate::sheet::{Cell, ColumnLayout, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::{drv, every_period, push_growth, push_heading, push_ratio, push_section, roll_forward, BuildContext};

const ID: SheetId = SheetId::SegmentRevenue;

pub fn build(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let ds = ctx.dataset;
    wb.begin_sheet(ID, ColumnLayout::Timeline)?;
    push_heading(
        wb,
        "Segment Revenue Build",
        &format!("{} | revenue by segment, forecast = prior x (1 + growth)", ds.company.units),
    )?;

    for division in &ds.divisions {
        push_section(wb, &division.label)?;
        for seg in ds.segments_of(&division.key) {
            let key = format!("rev.{}", seg.key);
            let growth = drv(&format!("growth.{}", seg.key));
            let cells = roll_forward(wb, t, &seg.revenue, |prior, p| {
                Ok(prior * (Expr::num(1.0) + wb.at_period(&growth, p)?))
            })?;
            let mut row = Row::keyed(&key, &seg.label).cells(cells);
            if let Some(note) = &seg.note {
                row = row.note(note.clone());
            }
            wb.push(row)?;
            push_growth(wb, t, &format!("{key}.yoy"), "    YoY growth", &key)?;
        }
        let members: Vec<String> = ds.segments_of(&division.key).map(|s| format!("rev.{}", s.key)).collect();
        let cells = every_period(t, ID, |p| {
            Ok(Expr::sum(members.iter().map(|k| wb.at_period(k, p)).collect::<Result<Vec<_>, _>>()?))
        })?;
        wb.push(
            Row::keyed(format!("rev.division.{}", division.key), format!("{} revenue", division.label))
                .style(RowStyle::Subtotal)
                .cells(cells),
        )?;
    }

    push_section(wb, "Consolidated")?;
    let advertising: Vec<String> =
        ds.segments.iter().filter(|s| s.advertising).map(|s| format!("rev.{}", s.key)).collect();
    let cells = if advertising.is_empty() {
        vec![Cell::Input(0.0); t.len()]
    } else {
        every_period(t, ID, |p| {
            Ok(Expr::sum(advertising.iter().map(|k| wb.at_period(k, p)).collect::<Result<Vec<_>, _>>()?))
        })?
    };
    wb.push(Row::keyed("rev.advertising", "Advertising revenue").style(RowStyle::Subtotal).cells(cells))?;

    let hedging = t
        .periods()
        .map(|p| match t.is_forecast(p) {
            true => Cell::Input(0.0),
            false => Cell::Input(ds.revenue.hedging.get(p.index()).copied().unwrap_or(0.0)),
        })
        .collect();
    wb.push(
        Row::keyed("rev.hedging", &ds.revenue.hedging_label)
            .cells(hedging)
            .note("Not forecast"),
    )?;

    let parts: Vec<String> = ds
        .divisions
        .iter()
        .map(|d| format!("rev.division.{}", d.key))
        .chain(std::iter::once("rev.hedging".to_string()))
        .collect();
    let cells = every_period(t, ID, |p| {
        Ok(Expr::sum(parts.iter().map(|k| wb.at_period(k, p)).collect::<Result<Vec<_>, _>>()?))
    })?;
    wb.push(Row::keyed("rev.total", "Total revenue").style(RowStyle::Key).cells(cells))?;
    push_growth(wb, t, "rev.total.yoy", "    YoY growth", "rev.total")?;

    push_section(wb, "Revenue mix")?;
    for seg in &ds.segments {
        push_ratio(wb, t, &format!("rev.{}.mix", seg.key), &seg.label, &format!("rev.{}", seg.key), "rev.total")?;
    }

    log::debug!("segment revenue: {} segments across {} divisions", ds.segments.len(), ds.divisions.len());
    Ok(())
}
