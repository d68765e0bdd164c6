//! Scenarios and the driver table.
//!
//! A driver is a named assumption with one actual per historical period and
//! one track of forecast values per scenario. `ScenarioResolver` picks the
//! value for a (driver, period) pair under the active scenario.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::period::{Period, PeriodKind, Timeline};
use crate::sheet::NumFormat;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    #[default]
    Base,
    Bull,
    Bear,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Base, Scenario::Bull, Scenario::Bear];

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Base => "base",
            Scenario::Bull => "bull",
            Scenario::Bear => "bear",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Scenario::Base => "Base Case",
            Scenario::Bull => "Bull Case",
            Scenario::Bear => "Bear Case",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(Scenario::Base),
            "bull" => Ok(Scenario::Bull),
            "bear" => Ok(Scenario::Bear),
            other => Err(format!("unknown scenario '{other}' (expected base, bull or bear)")),
        }
    }
}

/// Forecast values for one scenario: a flat value for every forecast
/// period, or one value per period.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Track {
    Flat(f64),
    PerPeriod(Vec<f64>),
}

impl Track {
    pub fn value(&self, forecast_index: usize) -> Option<f64> {
        match self {
            Track::Flat(v) => Some(*v),
            Track::PerPeriod(values) => values.get(forecast_index).copied(),
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Track::Flat(_) => None,
            Track::PerPeriod(values) => Some(values.len()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Driver {
    pub label: String,
    #[serde(default = "default_driver_format")]
    pub format: NumFormat,
    /// Actuals, one per historical period. Shorter means no actual.
    #[serde(default)]
    pub historical: Vec<f64>,
    #[serde(default)]
    pub base: Option<Track>,
    #[serde(default)]
    pub bull: Option<Track>,
    #[serde(default)]
    pub bear: Option<Track>,
    #[serde(default)]
    pub note: Option<String>,
}

fn default_driver_format() -> NumFormat {
    NumFormat::Percent
}

impl Driver {
    pub fn track(&self, scenario: Scenario) -> Option<&Track> {
        match scenario {
            Scenario::Base => self.base.as_ref(),
            Scenario::Bull => self.bull.as_ref(),
            Scenario::Bear => self.bear.as_ref(),
        }
    }

    pub fn forecast_value(&self, scenario: Scenario, forecast_index: usize) -> Option<f64> {
        self.track(scenario).and_then(|t| t.value(forecast_index))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct DriverTable {
    drivers: BTreeMap<String, Driver>,
}

impl DriverTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, driver: Driver) {
        self.drivers.insert(key.into(), driver);
    }

    pub fn get(&self, key: &str) -> Option<&Driver> {
        self.drivers.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.drivers.contains_key(key)
    }

    /// Drivers in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Driver)> {
        self.drivers.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Shape checks independent of the active scenario.
    pub fn validate(&self, timeline: &Timeline) -> Result<(), BuildError> {
        for (key, driver) in &self.drivers {
            if driver.historical.len() > timeline.historical_count() {
                return Err(BuildError::Config(format!(
                    "driver '{key}': {} historical values for {} historical periods",
                    driver.historical.len(),
                    timeline.historical_count()
                )));
            }
            for scenario in Scenario::ALL {
                if let Some(n) = driver.track(scenario).and_then(Track::len) {
                    if n > timeline.forecast_count() {
                        return Err(BuildError::Config(format!(
                            "driver '{key}': {scenario} track has {n} values for {} forecast periods",
                            timeline.forecast_count()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Pure lookup of driver values under one scenario.
#[derive(Clone, Copy, Debug)]
pub struct ScenarioResolver<'a> {
    table: &'a DriverTable,
    timeline: &'a Timeline,
    active: Scenario,
}

impl<'a> ScenarioResolver<'a> {
    pub fn new(table: &'a DriverTable, timeline: &'a Timeline, active: Scenario) -> Self {
        Self { table, timeline, active }
    }

    pub fn active(&self) -> Scenario {
        self.active
    }

    pub fn table(&self) -> &'a DriverTable {
        self.table
    }

    /// Same table, different scenario.
    pub fn with_scenario(&self, scenario: Scenario) -> ScenarioResolver<'a> {
        ScenarioResolver { active: scenario, ..*self }
    }

    /// Historical periods return the actual regardless of scenario;
    /// forecast periods return the active scenario's value.
    pub fn select(&self, driver: &str, period: Period) -> Result<f64, BuildError> {
        self.select_for(driver, self.active, period)
    }

    pub fn select_for(&self, driver: &str, scenario: Scenario, period: Period) -> Result<f64, BuildError> {
        let missing = || BuildError::MissingAssumption {
            driver: driver.to_string(),
            scenario,
            period: self.timeline.label(period).to_string(),
        };
        let d = self.table.get(driver).ok_or_else(missing)?;
        match self.timeline.kind(period) {
            PeriodKind::Historical => d.historical.get(period.index()).copied().ok_or_else(missing),
            PeriodKind::Forecast => {
                let idx = self.timeline.forecast_index(period).ok_or_else(missing)?;
                d.forecast_value(scenario, idx).ok_or_else(missing)
            }
        }
    }

    /// Historical actual, if the driver has one for `period`.
    pub fn actual(&self, driver: &str, period: Period) -> Option<f64> {
        if self.timeline.is_forecast(period) {
            return None;
        }
        self.table.get(driver)?.historical.get(period.index()).copied()
    }

    /// Fail unless `driver` resolves for the active scenario in every
    /// forecast period.
    pub fn require(&self, driver: &str) -> Result<(), BuildError> {
        for period in self.timeline.forecast() {
            self.select(driver, period)?;
        }
        Ok(())
    }
}
