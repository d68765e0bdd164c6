//! The build: every sheet in dependency order, then cross-validation.

use crate::crosscheck::{CheckKind, CheckReport, CrossCheckLink, CrossValidationInjector};
use crate::dataset::{Dataset, Statement};
use crate::error::BuildError;
use crate::period::Timeline;
use crate::registry::RowRegistry;
use crate::scenario::{Scenario, ScenarioResolver};
use crate::sheet::{Cell, Sheet, SheetId};
use crate::sheets::{
    assumptions, balance_sheet, cash_flow, consolidated_pl, dcf, ratios, segment_pl, segment_revenue, sensitivity,
    summary, BuildContext,
};
use crate::workbook::Workbook;

/// A fully built model. Sheets are held in display order.
#[derive(Debug)]
pub struct Model {
    pub company: String,
    pub scenario: Scenario,
    pub checks: CheckReport,
    timeline: Timeline,
    registry: RowRegistry,
    sheets: Vec<Sheet>,
}

impl Model {
    /// Build every sheet for `scenario`. Either the whole model is built
    /// with every historical invariant holding, or nothing is returned.
    pub fn build(dataset: &Dataset, scenario: Scenario) -> Result<Model, BuildError> {
        dataset.validate()?;
        let timeline = dataset.timeline()?;
        dataset.drivers.validate(&timeline)?;

        let ctx = BuildContext {
            dataset,
            timeline: &timeline,
            resolver: ScenarioResolver::new(&dataset.drivers, &timeline, scenario),
        };
        let mut wb = Workbook::new(timeline.clone());
        let mut injector = CrossValidationInjector::new(dataset.valuation.tolerance);

        assumptions::build(&mut wb, &ctx)?;
        segment_revenue::build(&mut wb, &ctx)?;
        let rows = segment_pl::build(&mut wb, &ctx)?;
        injector.register(
            CrossCheckLink::new(
                "Segment OI vs consolidated EBIT",
                CheckKind::CrossCheck,
                Statement::Segments,
                "spl.oi_total",
                "pl.ebit",
            )
            .with_rows(rows),
        );

        consolidated_pl::build(&mut wb, &ctx)?;
        for (name, left, right) in [
            ("Segment revenue vs filed revenue", "pl.revenue", "pl.revenue_reported"),
            ("Segment OI vs filed EBIT", "pl.ebit", "pl.ebit_reported"),
            ("Net income vs filed", "pl.net_income", "pl.net_income_reported"),
        ] {
            injector.register(CrossCheckLink::new(name, CheckKind::CrossCheck, Statement::Consolidated, left, right));
        }

        let rows = balance_sheet::build(&mut wb, &ctx)?;
        injector.register(
            CrossCheckLink::new(
                "Balance identity",
                CheckKind::BalanceIdentity,
                Statement::BalanceSheet,
                "bs.total_assets",
                "bs.total_le",
            )
            .with_rows(rows),
        );

        cash_flow::build(&mut wb, &ctx)?;
        injector.register(CrossCheckLink::new(
            "CFO components vs filed",
            CheckKind::CrossCheck,
            Statement::CashFlow,
            "cf.cfo",
            "cf.cfo_reported",
        ));

        dcf::build(&mut wb, &ctx)?;
        sensitivity::build(&mut wb, &ctx)?;
        ratios::build(&mut wb, &ctx)?;

        let checks = injector.run(&mut wb, dataset)?;

        summary::build_key_summary(&mut wb, &ctx)?;
        summary::build_cover(&mut wb, &ctx)?;

        let (timeline, registry, mut sheets) = wb.into_parts();
        if let Some(key) = registry.pending_keys().next() {
            return Err(BuildError::UnresolvedReference {
                key: key.to_string(),
                reason: "reserved row was never filled".into(),
            });
        }
        sheets.sort_by_key(|s| s.id);

        let model = Model { company: dataset.company.name.clone(), scenario, checks, timeline, registry, sheets };
        log::info!(
            "built {} ({} case): {} sheets, {} keyed rows, {}",
            model.company,
            scenario,
            model.sheets.len(),
            model.registry.len(),
            model.fingerprint()
        );
        Ok(model)
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn registry(&self) -> &RowRegistry {
        &self.registry
    }

    /// Sheets in display order.
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, id: SheetId) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.id == id)
    }

    /// Value of data column `col` of the row bound to `key`.
    pub fn value(&self, key: &str, col: usize) -> Option<f64> {
        let binding = self.registry.get(key)?;
        self.sheet(binding.sheet)?.row(binding.row)?.cell(col).value()
    }

    /// Content hash over registry bindings and every cell's formula text or
    /// input value. Equal inputs give equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.scenario.as_str().as_bytes());
        for (key, binding) in self.registry.iter() {
            hasher.update(format!("\n{key}={}:{}", binding.sheet.tab_name(), binding.row).as_bytes());
        }
        for sheet in &self.sheets {
            hasher.update(format!("\n[{}]", sheet.name()).as_bytes());
            for row in sheet.rows() {
                hasher.update(format!("\n{}|{}", row.key.as_deref().unwrap_or(""), row.label).as_bytes());
                for cell in &row.cells {
                    let text = match cell {
                        Cell::Empty | Cell::Pending => String::new(),
                        Cell::Input(v) => format!("{v:?}"),
                        Cell::Formula(e) | Cell::Link(e) => e.formula(sheet.id),
                        Cell::Text(s) => s.clone(),
                    };
                    hasher.update(b"\t");
                    hasher.update(text.as_bytes());
                }
            }
        }
        format!("blake3:{}", hasher.finalize().to_hex())
    }
}
