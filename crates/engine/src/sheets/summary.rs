//! Presentation tabs: Key Summary (linked KPIs) and Cover.

use crate::dataset::ProvenanceStatus;
use crate::error::BuildError;
use crate::period::{Period, Timeline};
use crate::sheet::{Cell, ColumnLayout, NumFormat, Row, RowStyle, SheetId};
use crate::workbook::Workbook;

use super::{push_heading, push_section, BuildContext};

// ---------------------------------------------------------------------------
// Key Summary
// ---------------------------------------------------------------------------

pub fn build_key_summary(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let ds = ctx.dataset;
    wb.begin_sheet(SheetId::KeySummary, ColumnLayout::Timeline)?;
    push_heading(
        wb,
        &format!("{} Key Summary", ds.company.name),
        &format!("{} | {} case", ds.company.units, ctx.resolver.active().title()),
    )?;

    push_section(wb, "Income statement")?;
    for (key, label, source, format) in [
        ("sum.revenue", "Total revenue", "pl.revenue", NumFormat::Amount),
        ("sum.revenue_growth", "    YoY growth", "pl.revenue.yoy", NumFormat::Percent),
        ("sum.gross_profit", "Gross profit", "pl.gross_profit", NumFormat::Amount),
        ("sum.gross_margin", "    Gross margin", "pl.gross_margin", NumFormat::Percent),
        ("sum.ebit", "EBIT", "pl.ebit", NumFormat::Amount),
        ("sum.ebit_margin", "    EBIT margin", "pl.ebit_margin", NumFormat::Percent),
        ("sum.net_income", "Net income", "pl.net_income", NumFormat::Amount),
        ("sum.net_margin", "    Net margin", "pl.net_margin", NumFormat::Percent),
        ("sum.eps", "Diluted EPS", "pl.eps", NumFormat::PerShare),
    ] {
        push_link(wb, t, key, label, source, format)?;
    }

    push_section(wb, "Revenue by division")?;
    for division in &ds.divisions {
        let key = format!("sum.division.{}", division.key);
        push_link(wb, t, &key, &division.label, &format!("rev.division.{}", division.key), NumFormat::Amount)?;
        let cells = t
            .periods()
            .map(|p| Ok(Cell::Formula(wb.at_period(&key, p)? / wb.at_period("sum.revenue", p)?)))
            .collect::<Result<Vec<_>, BuildError>>()?;
        wb.push(
            Row::keyed(format!("{key}.share"), "    % of revenue")
                .style(RowStyle::Rate)
                .format(NumFormat::Percent)
                .cells(cells),
        )?;
    }

    push_section(wb, "Balance sheet and returns")?;
    for (key, label, source, format) in [
        ("sum.total_assets", "Total assets", "bs.total_assets", NumFormat::Amount),
        ("sum.equity", "Total equity", "bs.equity", NumFormat::Amount),
        ("sum.cash", "Cash & marketable securities", "bs.cash_total", NumFormat::Amount),
        ("sum.roe", "Return on equity", "ratio.roe", NumFormat::Percent),
        ("sum.roa", "Return on assets", "ratio.roa", NumFormat::Percent),
    ] {
        push_link(wb, t, key, label, source, format)?;
    }

    // Scenario-dependent: first forecast column, never an actuals column.
    push_section(wb, "Valuation")?;
    let anchor = t.historical_count();
    for (key, label, source, format) in [
        ("sum.ev", "Enterprise value", "dcf.ev", NumFormat::Amount),
        ("sum.equity_value", "Equity value", "dcf.equity_value", NumFormat::Amount),
        ("sum.price", "DCF implied share price", "dcf.price", NumFormat::PerShare),
    ] {
        let mut cells = vec![Cell::Empty; t.len()];
        cells[anchor] = Cell::computed(wb.at(source, 0)?, SheetId::KeySummary);
        wb.push(
            Row::keyed(key, label)
                .style(RowStyle::Key)
                .format(format)
                .cells(cells)
                .note(format!("As of {}", ds.company.valuation_date)),
        )?;
    }

    log::debug!("key summary built");
    Ok(())
}

/// Link every period of `source`; periods where it is blank stay blank.
fn push_link(
    wb: &mut Workbook,
    t: &Timeline,
    key: &str,
    label: &str,
    source: &str,
    format: NumFormat,
) -> Result<(), BuildError> {
    let cells = t
        .periods()
        .map(|p| match wb.cell(source, p.index())?.value() {
            None => Ok(Cell::Empty),
            Some(_) => Ok(Cell::computed(wb.at_period(source, p)?, SheetId::KeySummary)),
        })
        .collect::<Result<Vec<_>, BuildError>>()?;
    let style = match format {
        NumFormat::Percent => RowStyle::Rate,
        _ => RowStyle::Data,
    };
    wb.push(Row::keyed(key, label).style(style).format(format).cells(cells))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Cover
// ---------------------------------------------------------------------------

pub fn build_cover(wb: &mut Workbook, ctx: &BuildContext) -> Result<(), BuildError> {
    let t = ctx.timeline;
    let ds = ctx.dataset;
    let company = &ds.company;
    wb.begin_sheet(SheetId::Cover, ColumnLayout::Free)?;
    wb.push(Row::new(&company.title).style(RowStyle::Title))?;
    wb.push(Row::new(format!("{} ({})", company.name, company.ticker)).style(RowStyle::Subtitle))?;

    push_section(wb, "Model")?;
    let facts = [
        ("Valuation date", company.valuation_date.to_string()),
        ("Active scenario", ctx.resolver.active().title().to_string()),
        ("Units", company.units.clone()),
        ("Historical periods", span(t, t.historical())),
        ("Forecast periods", span(t, t.forecast())),
    ];
    for (label, text) in facts {
        wb.push(Row::new(label).style(RowStyle::Text).cells(vec![Cell::Text(text)]))?;
    }
    let price = wb.at("dcf.price", 0)?;
    wb.push(
        Row::keyed("cover.price", "DCF implied share price")
            .style(RowStyle::Key)
            .format(NumFormat::PerShare)
            .cells(vec![Cell::computed(price, SheetId::Cover)]),
    )?;

    if !company.sources.is_empty() {
        push_section(wb, "Data sources")?;
        for source in &company.sources {
            wb.push(Row::new("").style(RowStyle::Text).cells(vec![Cell::Text(source.clone())]))?;
        }
    }

    push_section(wb, "Data provenance")?;
    if ds.provenance.is_empty() {
        wb.push(Row::new("All historical figures are filed").style(RowStyle::Text))?;
    }
    for entry in &ds.provenance {
        let status = match entry.status {
            ProvenanceStatus::Filed => "Filed",
            ProvenanceStatus::Estimated => "Estimated; cross-checks informational",
        };
        wb.push(
            Row::new(format!("{} {}", entry.statement.label(), entry.period))
                .style(RowStyle::Text)
                .cells(vec![Cell::Text(status.to_string()), Cell::Text(entry.source.clone())]),
        )?;
    }

    if !company.notes.is_empty() {
        push_section(wb, "Notes")?;
        for note in &company.notes {
            wb.push(Row::new("").style(RowStyle::Text).cells(vec![Cell::Text(note.clone())]))?;
        }
    }

    push_section(wb, "Legend")?;
    for (label, meaning) in [
        ("Blue text", "Historical figure from filings"),
        ("Blue fill", "Assumption input"),
        ("Black text", "Formula on this sheet"),
        ("Green text", "Link to another sheet"),
        ("Yellow fill", "Key output"),
        ("Red fill", "Check row; should be 0"),
    ] {
        wb.push(Row::new(label).style(RowStyle::Text).cells(vec![Cell::Text(meaning.to_string())]))?;
    }

    log::debug!("cover built");
    Ok(())
}

/// `first to last` label range.
fn span(t: &Timeline, periods: impl Iterator<Item = Period>) -> String {
    let labels: Vec<&str> = periods.map(|p| t.label(p)).collect();
    match (labels.first(), labels.last()) {
        (Some(first), Some(last)) if first != last => format!("{first} to {last}"),
        (Some(only), _) => only.to_string(),
        _ => String::new(),
    }
}
