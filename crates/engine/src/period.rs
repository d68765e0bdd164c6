//! Reporting periods.
//!
//! A `Timeline` is the ordered set of historical periods (closed, from
//! filings) followed by forecast periods (open, computed). Periods are
//! totally ordered by their index; column `i` of every timeline-aligned
//! sheet holds period `i`.

use serde::Serialize;

use crate::error::BuildError;

/// Index of a period within a timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    #[inline]
    pub fn at(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Historical,
    Forecast,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timeline {
    labels: Vec<String>,
    historical: usize,
}

impl Timeline {
    pub fn new(historical: Vec<String>, forecast: Vec<String>) -> Result<Self, BuildError> {
        if historical.is_empty() {
            return Err(BuildError::Config("at least one historical period is required".into()));
        }
        if forecast.is_empty() {
            return Err(BuildError::Config("at least one forecast period is required".into()));
        }
        let n_hist = historical.len();
        let mut labels = historical;
        labels.extend(forecast);

        let mut seen = std::collections::HashSet::new();
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(BuildError::Config(format!("duplicate period label '{label}'")));
            }
        }
        Ok(Self { labels, historical: n_hist })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn historical_count(&self) -> usize {
        self.historical
    }

    pub fn forecast_count(&self) -> usize {
        self.labels.len() - self.historical
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn periods(&self) -> impl Iterator<Item = Period> {
        (0..self.labels.len()).map(Period)
    }

    pub fn historical(&self) -> impl Iterator<Item = Period> {
        (0..self.historical).map(Period)
    }

    pub fn forecast(&self) -> impl Iterator<Item = Period> {
        (self.historical..self.labels.len()).map(Period)
    }

    pub fn kind(&self, period: Period) -> PeriodKind {
        if period.0 < self.historical {
            PeriodKind::Historical
        } else {
            PeriodKind::Forecast
        }
    }

    pub fn is_forecast(&self, period: Period) -> bool {
        self.kind(period) == PeriodKind::Forecast
    }

    pub fn label(&self, period: Period) -> &str {
        self.labels.get(period.0).map(String::as_str).unwrap_or("?")
    }

    /// The period immediately before `period`, if any.
    pub fn prior(&self, period: Period) -> Option<Period> {
        period.0.checked_sub(1).map(Period)
    }

    /// 0-based position among forecast periods (`None` for historical).
    pub fn forecast_index(&self, period: Period) -> Option<usize> {
        period.0.checked_sub(self.historical)
    }

    pub fn last_historical(&self) -> Period {
        Period(self.historical - 1)
    }

    pub fn last(&self) -> Period {
        Period(self.labels.len() - 1)
    }

    pub fn find(&self, label: &str) -> Option<Period> {
        self.labels.iter().position(|l| l == label).map(Period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline() -> Timeline {
        Timeline::new(
            vec!["2024A".into(), "2025A".into()],
            vec!["2026E".into(), "2027E".into(), "2028E".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_kinds_and_indices() {
        let t = timeline();
        assert_eq!(t.len(), 5);
        assert_eq!(t.kind(Period::at(1)), PeriodKind::Historical);
        assert_eq!(t.kind(Period::at(2)), PeriodKind::Forecast);
        assert_eq!(t.forecast_index(Period::at(4)), Some(2));
        assert_eq!(t.forecast_index(Period::at(0)), None);
        assert_eq!(t.last_historical(), Period::at(1));
        assert_eq!(t.prior(Period::at(0)), None);
        assert_eq!(t.find("2027E"), Some(Period::at(3)));
    }

    #[test]
    fn test_rejects_duplicate_labels() {
        let err = Timeline::new(vec!["2025A".into()], vec!["2025A".into()]).unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn test_requires_both_phases() {
        assert!(Timeline::new(vec![], vec!["2026E".into()]).is_err());
        assert!(Timeline::new(vec!["2025A".into()], vec![]).is_err());
    }
}
