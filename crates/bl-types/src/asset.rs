use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies one asset in a portfolio (ticker, fund code, or "cash").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The conventional identifier for the cash sleeve.
    pub fn cash() -> Self {
        Self("cash".to_string())
    }

    pub fn is_cash(&self) -> bool {
        self.0 == "cash"
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Symmetric covariance matrix over an ordered list of assets.
///
/// Stored dense; portfolios here are small (tens of assets at most).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    pub assets: Vec<AssetId>,
    /// Row-major `assets.len() × assets.len()` entries.
    pub values: Vec<f64>,
}

impl CovarianceMatrix {
    pub fn new(assets: Vec<AssetId>, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), assets.len() * assets.len());
        Self { assets, values }
    }

    /// Identity-free construction from per-asset volatilities and pairwise
    /// correlations (missing pairs default to zero correlation).
    pub fn from_vols_and_correlations(
        assets: Vec<AssetId>,
        vols: &[f64],
        correlations: &HashMap<(AssetId, AssetId), f64>,
    ) -> Self {
        let n = assets.len();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let rho = if i == j {
                    1.0
                } else {
                    correlations
                        .get(&(assets[i].clone(), assets[j].clone()))
                        .or_else(|| correlations.get(&(assets[j].clone(), assets[i].clone())))
                        .copied()
                        .unwrap_or(0.0)
                };
                values[i * n + j] = rho * vols[i] * vols[j];
            }
        }
        Self { assets, values }
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.assets.len() + j]
    }

    /// `Σw` — matrix-vector product against a weight vector.
    pub fn mul_vec(&self, w: &[f64]) -> Vec<f64> {
        let n = self.len();
        let mut out = vec![0.0; n];
        for i in 0..n {
            let mut acc = 0.0;
            for j in 0..n {
                acc += self.get(i, j) * w[j];
            }
            out[i] = acc;
        }
        out
    }

    /// `wᵀΣw` — portfolio variance for a weight vector.
    pub fn quadratic_form(&self, w: &[f64]) -> f64 {
        self.mul_vec(w)
            .iter()
            .zip(w.iter())
            .map(|(sw, wi)| sw * wi)
            .sum()
    }
}

/// Date-aligned historical prices for a set of assets.
///
/// Invariant: every asset's price vector has the same length as `dates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub dates: Vec<DateTime<Utc>>,
    pub prices: HashMap<AssetId, Vec<f64>>,
}

impl PriceSeries {
    pub fn new(dates: Vec<DateTime<Utc>>, prices: HashMap<AssetId, Vec<f64>>) -> Self {
        debug_assert!(prices.values().all(|p| p.len() == dates.len()));
        Self { dates, prices }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn price_at(&self, asset: &AssetId, index: usize) -> Option<f64> {
        self.prices.get(asset).and_then(|p| p.get(index)).copied()
    }

    /// Index of the first date >= `date`, if any.
    pub fn index_at_or_after(&self, date: DateTime<Utc>) -> Option<usize> {
        self.dates.iter().position(|d| *d >= date)
    }

    /// Simple returns for one asset over `[from, to]` bar indices.
    pub fn window_return(&self, asset: &AssetId, from: usize, to: usize) -> Option<f64> {
        let series = self.prices.get(asset)?;
        let start = *series.get(from)?;
        let end = *series.get(to)?;
        if start > 0.0 {
            Some(end / start - 1.0)
        } else {
            None
        }
    }
}
