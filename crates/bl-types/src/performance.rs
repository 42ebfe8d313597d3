use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation of portfolio value over time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformancePoint {
    pub date: DateTime<Utc>,
    pub value: f64,
    /// Simple return since the previous point (0 for the first).
    pub periodic_return: f64,
}

/// Append-only time series of portfolio values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSeries {
    pub points: Vec<PerformancePoint>,
}

impl PerformanceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new portfolio value, deriving the periodic return from the
    /// previous observation.
    pub fn record(&mut self, date: DateTime<Utc>, value: f64) {
        let periodic_return = match self.points.last() {
            Some(prev) if prev.value > 0.0 => value / prev.value - 1.0,
            _ => 0.0,
        };
        self.points.push(PerformancePoint {
            date,
            value,
            periodic_return,
        });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.points.iter().skip(1).map(|p| p.periodic_return).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn first_value(&self) -> Option<f64> {
        self.points.first().map(|p| p.value)
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    /// Cumulative return over the whole series.
    pub fn total_return(&self) -> f64 {
        match (self.first_value(), self.last_value()) {
            (Some(first), Some(last)) if first > 0.0 => last / first - 1.0,
            _ => 0.0,
        }
    }

    /// Points within `[start, end]`, inclusive.
    pub fn slice(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> PerformanceSeries {
        PerformanceSeries {
            points: self
                .points
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn record_derives_periodic_returns() {
        let mut series = PerformanceSeries::new();
        let start = Utc::now();
        series.record(start, 100.0);
        series.record(start + Duration::days(1), 110.0);
        series.record(start + Duration::days(2), 99.0);

        let returns = series.returns();
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.10).abs() < 1e-12);
        assert!((returns[1] + 0.10).abs() < 1e-12);
        assert!((series.total_return() + 0.01).abs() < 1e-12);
    }

    #[test]
    fn slice_is_inclusive() {
        let mut series = PerformanceSeries::new();
        let start = Utc::now();
        for i in 0..5 {
            series.record(start + Duration::days(i), 100.0 + i as f64);
        }
        let window = series.slice(start + Duration::days(1), start + Duration::days(3));
        assert_eq!(window.len(), 3);
    }
}
