//! Build input: filed historical financials plus the driver table.
//!
//! Loaded from TOML, then validated before any sheet is built.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::period::{Period, Timeline};
use crate::scenario::DriverTable;

// ---------------------------------------------------------------------------
// Top-level dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    pub company: Company,
    pub periods: PeriodsConfig,
    pub segments: Vec<Segment>,
    pub divisions: Vec<Division>,
    #[serde(default)]
    pub revenue: RevenueAdjustments,
    #[serde(default)]
    pub unallocated: Unallocated,
    #[serde(default)]
    pub consolidated: ConsolidatedHistory,
    #[serde(default)]
    pub balance_sheet: BalanceSheetHistory,
    #[serde(default)]
    pub cash_flow: CashFlowHistory,
    #[serde(default)]
    pub drivers: DriverTable,
    #[serde(default)]
    pub valuation: ValuationConfig,
    #[serde(default)]
    pub provenance: Vec<Provenance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Company {
    pub name: String,
    pub ticker: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_units")]
    pub units: String,
    pub valuation_date: NaiveDate,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

fn default_title() -> String {
    "DCF Valuation Model".into()
}

fn default_units() -> String {
    "USD mm".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodsConfig {
    pub historical: Vec<String>,
    pub forecast: Vec<String>,
}

// ---------------------------------------------------------------------------
// Segments and divisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Segment {
    pub key: String,
    pub label: String,
    pub division: String,
    #[serde(default)]
    pub advertising: bool,
    pub revenue: Vec<f64>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostModel {
    /// Employee compensation and other costs, each a rate on revenue.
    Decomposed,
    /// A single operating margin on revenue.
    BlendedMargin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Division {
    pub key: String,
    pub label: String,
    pub cost_model: CostModel,
    #[serde(default)]
    pub employee_comp: Vec<f64>,
    #[serde(default)]
    pub other_costs: Vec<f64>,
    #[serde(default)]
    pub operating_income: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevenueAdjustments {
    #[serde(default = "default_hedging_label")]
    pub hedging_label: String,
    /// Hedging gains (losses) per historical period; zero in forecasts.
    #[serde(default)]
    pub hedging: Vec<f64>,
}

impl Default for RevenueAdjustments {
    fn default() -> Self {
        Self { hedging_label: default_hedging_label(), hedging: Vec::new() }
    }
}

fn default_hedging_label() -> String {
    "Hedging gains (losses)".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Unallocated {
    #[serde(default = "default_unallocated_label")]
    pub label: String,
    /// Reported as negative amounts, as in segment notes.
    #[serde(default)]
    pub costs: Vec<f64>,
}

impl Default for Unallocated {
    fn default() -> Self {
        Self { label: default_unallocated_label(), costs: Vec::new() }
    }
}

fn default_unallocated_label() -> String {
    "Unallocated corporate costs".into()
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConsolidatedHistory {
    pub revenue: Vec<f64>,
    pub tac: Vec<f64>,
    pub other_cogs: Vec<f64>,
    pub rnd: Vec<f64>,
    pub snm: Vec<f64>,
    pub gna: Vec<f64>,
    pub ebit: Vec<f64>,
    pub other_income: Vec<f64>,
    pub tax: Vec<f64>,
    pub net_income: Vec<f64>,
    pub dna: Vec<f64>,
    pub sbc: Vec<f64>,
    pub diluted_shares: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BalanceSheetHistory {
    pub cash: Vec<f64>,
    pub marketable_securities: Vec<f64>,
    pub accounts_receivable: Vec<f64>,
    pub other_current_assets: Vec<f64>,
    pub non_marketable_securities: Vec<f64>,
    pub deferred_tax_assets: Vec<f64>,
    pub ppe: Vec<f64>,
    pub operating_lease_assets: Vec<f64>,
    pub goodwill: Vec<f64>,
    pub other_noncurrent_assets: Vec<f64>,
    pub accounts_payable: Vec<f64>,
    pub accrued_compensation: Vec<f64>,
    pub accrued_expenses: Vec<f64>,
    pub accrued_revenue_share: Vec<f64>,
    pub deferred_revenue: Vec<f64>,
    pub long_term_debt: Vec<f64>,
    pub noncurrent_income_taxes: Vec<f64>,
    pub operating_lease_liabilities: Vec<f64>,
    pub other_long_term_liabilities: Vec<f64>,
    pub equity: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CashFlowHistory {
    pub deferred_taxes: Vec<f64>,
    pub securities_gains: Vec<f64>,
    pub other_adjustments: Vec<f64>,
    pub change_receivables: Vec<f64>,
    pub change_income_taxes: Vec<f64>,
    pub change_other_assets: Vec<f64>,
    pub change_payables: Vec<f64>,
    pub change_accrued_expenses: Vec<f64>,
    pub change_revenue_share: Vec<f64>,
    pub change_deferred_revenue: Vec<f64>,
    pub operating_cash_flow: Vec<f64>,
    pub capex: Vec<f64>,
    pub buybacks: Vec<f64>,
    pub dividends: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Valuation and provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    /// Relative tolerance for invariant checks.
    pub tolerance: f64,
    pub sensitivity: SensitivityConfig,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self { tolerance: 1e-6, sensitivity: SensitivityConfig::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    pub wacc: Vec<f64>,
    pub terminal_growth: Vec<f64>,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            wacc: vec![0.075, 0.080, 0.085, 0.090, 0.095, 0.100, 0.105],
            terminal_growth: vec![0.020, 0.025, 0.030, 0.035, 0.040],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    Segments,
    Consolidated,
    BalanceSheet,
    CashFlow,
}

impl Statement {
    pub fn label(self) -> &'static str {
        match self {
            Statement::Segments => "Segment data",
            Statement::Consolidated => "Income statement",
            Statement::BalanceSheet => "Balance sheet",
            Statement::CashFlow => "Cash flow statement",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceStatus {
    #[default]
    Filed,
    Estimated,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Provenance {
    pub statement: Statement,
    pub period: String,
    pub status: ProvenanceStatus,
    #[serde(default)]
    pub source: String,
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl Dataset {
    /// Parse and validate a TOML dataset.
    pub fn from_toml(input: &str) -> Result<Self, BuildError> {
        let dataset: Dataset =
            toml::from_str(input).map_err(|e| BuildError::Config(format!("parse error: {e}")))?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BuildError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn timeline(&self) -> Result<Timeline, BuildError> {
        Timeline::new(self.periods.historical.clone(), self.periods.forecast.clone())
    }

    /// Whether `statement` figures for `period` come from a filing.
    pub fn provenance(&self, statement: Statement, period: &str) -> ProvenanceStatus {
        self.provenance
            .iter()
            .find(|p| p.statement == statement && p.period == period)
            .map(|p| p.status)
            .unwrap_or_default()
    }

    pub fn segments_of<'a>(&'a self, division: &'a str) -> impl Iterator<Item = &'a Segment> + 'a {
        self.segments.iter().filter(move |s| s.division == division)
    }

    /// Historical value of a series at `period`, for series validated to
    /// cover every historical period.
    pub fn hist(series: &[f64], period: Period) -> f64 {
        series.get(period.index()).copied().unwrap_or(0.0)
    }

    /// A decomposed division may also carry its filed operating income; when
    /// it does, it must equal revenue less both cost lines in every filed
    /// period.
    fn validate_decomposed_income(&self, timeline: &Timeline) -> Result<(), BuildError> {
        let h = timeline.historical_count();
        let tolerance = self.valuation.tolerance;
        for d in self.divisions.iter().filter(|d| d.cost_model == CostModel::Decomposed) {
            if d.operating_income.is_empty() {
                continue;
            }
            check_len(&format!("divisions.{}.operating_income", d.key), &d.operating_income, h)?;
            for p in timeline.historical() {
                let label = timeline.label(p);
                if self.provenance(Statement::Segments, label) == ProvenanceStatus::Estimated {
                    continue;
                }
                let revenue: f64 = self.segments_of(&d.key).map(|s| Self::hist(&s.revenue, p)).sum();
                let derived = revenue - Self::hist(&d.employee_comp, p) - Self::hist(&d.other_costs, p);
                let filed = Self::hist(&d.operating_income, p);
                if (derived - filed).abs() > tolerance * filed.abs().max(1.0) {
                    return Err(BuildError::Config(format!(
                        "divisions.{}.operating_income {label}: filed {filed} but revenue less costs is {derived}",
                        d.key
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        let timeline = self.timeline()?;
        let h = timeline.historical_count();

        if self.segments.is_empty() {
            return Err(BuildError::Config("at least one segment is required".into()));
        }
        if self.divisions.is_empty() {
            return Err(BuildError::Config("at least one division is required".into()));
        }

        let mut division_keys = HashSet::new();
        for d in &self.divisions {
            if !division_keys.insert(d.key.as_str()) {
                return Err(BuildError::Config(format!("duplicate division key '{}'", d.key)));
            }
            match d.cost_model {
                CostModel::Decomposed => {
                    check_len(&format!("divisions.{}.employee_comp", d.key), &d.employee_comp, h)?;
                    check_len(&format!("divisions.{}.other_costs", d.key), &d.other_costs, h)?;
                }
                CostModel::BlendedMargin => {
                    check_len(&format!("divisions.{}.operating_income", d.key), &d.operating_income, h)?;
                }
            }
        }

        let mut segment_keys = HashSet::new();
        for s in &self.segments {
            if !segment_keys.insert(s.key.as_str()) {
                return Err(BuildError::Config(format!("duplicate segment key '{}'", s.key)));
            }
            if !division_keys.contains(s.division.as_str()) {
                return Err(BuildError::Config(format!(
                    "segment '{}' names unknown division '{}'",
                    s.key, s.division
                )));
            }
            check_len(&format!("segments.{}.revenue", s.key), &s.revenue, h)?;
        }
        for d in &self.divisions {
            if self.segments_of(&d.key).next().is_none() {
                return Err(BuildError::Config(format!("division '{}' has no segments", d.key)));
            }
        }

        if !self.revenue.hedging.is_empty() {
            check_len("revenue.hedging", &self.revenue.hedging, h)?;
        }
        check_len("unallocated.costs", &self.unallocated.costs, h)?;

        let c = &self.consolidated;
        for (name, series) in [
            ("revenue", &c.revenue),
            ("tac", &c.tac),
            ("other_cogs", &c.other_cogs),
            ("rnd", &c.rnd),
            ("snm", &c.snm),
            ("gna", &c.gna),
            ("ebit", &c.ebit),
            ("other_income", &c.other_income),
            ("tax", &c.tax),
            ("net_income", &c.net_income),
            ("dna", &c.dna),
            ("sbc", &c.sbc),
            ("diluted_shares", &c.diluted_shares),
        ] {
            check_len(&format!("consolidated.{name}"), series, h)?;
        }

        let b = &self.balance_sheet;
        for (name, series) in [
            ("cash", &b.cash),
            ("marketable_securities", &b.marketable_securities),
            ("accounts_receivable", &b.accounts_receivable),
            ("other_current_assets", &b.other_current_assets),
            ("non_marketable_securities", &b.non_marketable_securities),
            ("deferred_tax_assets", &b.deferred_tax_assets),
            ("ppe", &b.ppe),
            ("operating_lease_assets", &b.operating_lease_assets),
            ("goodwill", &b.goodwill),
            ("other_noncurrent_assets", &b.other_noncurrent_assets),
            ("accounts_payable", &b.accounts_payable),
            ("accrued_compensation", &b.accrued_compensation),
            ("accrued_expenses", &b.accrued_expenses),
            ("accrued_revenue_share", &b.accrued_revenue_share),
            ("deferred_revenue", &b.deferred_revenue),
            ("long_term_debt", &b.long_term_debt),
            ("noncurrent_income_taxes", &b.noncurrent_income_taxes),
            ("operating_lease_liabilities", &b.operating_lease_liabilities),
            ("other_long_term_liabilities", &b.other_long_term_liabilities),
            ("equity", &b.equity),
        ] {
            check_len(&format!("balance_sheet.{name}"), series, h)?;
        }

        let cf = &self.cash_flow;
        for (name, series) in [
            ("deferred_taxes", &cf.deferred_taxes),
            ("securities_gains", &cf.securities_gains),
            ("other_adjustments", &cf.other_adjustments),
            ("change_receivables", &cf.change_receivables),
            ("change_income_taxes", &cf.change_income_taxes),
            ("change_other_assets", &cf.change_other_assets),
            ("change_payables", &cf.change_payables),
            ("change_accrued_expenses", &cf.change_accrued_expenses),
            ("change_revenue_share", &cf.change_revenue_share),
            ("change_deferred_revenue", &cf.change_deferred_revenue),
            ("operating_cash_flow", &cf.operating_cash_flow),
            ("capex", &cf.capex),
            ("buybacks", &cf.buybacks),
            ("dividends", &cf.dividends),
        ] {
            check_len(&format!("cash_flow.{name}"), series, h)?;
        }

        self.drivers.validate(&timeline)?;

        if !(self.valuation.tolerance > 0.0) {
            return Err(BuildError::Config("valuation.tolerance must be positive".into()));
        }
        if self.valuation.sensitivity.wacc.is_empty() || self.valuation.sensitivity.terminal_growth.is_empty() {
            return Err(BuildError::Config("sensitivity axes must not be empty".into()));
        }
        self.validate_decomposed_income(&timeline)?;

        for p in &self.provenance {
            if timeline.find(&p.period).is_none() {
                return Err(BuildError::Config(format!(
                    "provenance entry names unknown period '{}'",
                    p.period
                )));
            }
        }

        Ok(())
    }
}

fn check_len(name: &str, series: &[f64], expected: usize) -> Result<(), BuildError> {
    if series.len() != expected {
        return Err(BuildError::Config(format!(
            "{name}: expected {expected} historical values, found {}",
            series.len()
        )));
    }
    Ok(())
}
