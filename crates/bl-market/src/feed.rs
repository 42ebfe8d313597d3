use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use bl_types::{AssetId, BallastError, BallastResult, CovarianceMatrix, PriceSeries};

/// One price observation for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub asset_id: AssetId,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Market state consumed by triggers and execution gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub prices: HashMap<AssetId, Decimal>,
    /// Market-wide realized volatility estimate (annualized fraction).
    pub realized_volatility: f64,
    /// Aggregate liquidity score, 0 (dry) to 1 (deep).
    pub liquidity_score: f64,
}

impl MarketSnapshot {
    pub fn price(&self, asset: &AssetId) -> Option<Decimal> {
        self.prices.get(asset).copied()
    }
}

/// Read-only market data source.
pub trait MarketDataFeed: Send + Sync {
    fn quote(&self, asset: &AssetId) -> BallastResult<Quote>;

    fn covariance(&self, assets: &[AssetId]) -> BallastResult<CovarianceMatrix>;

    /// Assemble a snapshot for the given universe at `now`.
    fn snapshot(&self, assets: &[AssetId], now: DateTime<Utc>) -> BallastResult<MarketSnapshot>;
}

/// Fixed in-memory feed for tests and demos.
#[derive(Debug, Clone)]
pub struct StaticFeed {
    pub prices: HashMap<AssetId, Decimal>,
    pub covariance: CovarianceMatrix,
    pub realized_volatility: f64,
    pub liquidity_score: f64,
}

impl StaticFeed {
    pub fn new(prices: HashMap<AssetId, Decimal>, covariance: CovarianceMatrix) -> Self {
        Self {
            prices,
            covariance,
            realized_volatility: 0.10,
            liquidity_score: 1.0,
        }
    }

    pub fn with_market_state(mut self, realized_volatility: f64, liquidity_score: f64) -> Self {
        self.realized_volatility = realized_volatility;
        self.liquidity_score = liquidity_score;
        self
    }
}

impl MarketDataFeed for StaticFeed {
    fn quote(&self, asset: &AssetId) -> BallastResult<Quote> {
        let price = self
            .prices
            .get(asset)
            .copied()
            .ok_or_else(|| BallastError::MarketData(format!("no quote for {asset}")))?;
        Ok(Quote {
            asset_id: asset.clone(),
            price,
            timestamp: Utc::now(),
        })
    }

    fn covariance(&self, assets: &[AssetId]) -> BallastResult<CovarianceMatrix> {
        if assets.iter().all(|a| self.covariance.assets.contains(a)) {
            Ok(self.covariance.clone())
        } else {
            Err(BallastError::MarketData(
                "covariance requested for unknown asset".to_string(),
            ))
        }
    }

    fn snapshot(&self, assets: &[AssetId], now: DateTime<Utc>) -> BallastResult<MarketSnapshot> {
        let mut prices = HashMap::new();
        for asset in assets {
            prices.insert(asset.clone(), self.quote(asset)?.price);
        }
        Ok(MarketSnapshot {
            timestamp: now,
            prices,
            realized_volatility: self.realized_volatility,
            liquidity_score: self.liquidity_score,
        })
    }
}

/// Replays a [`PriceSeries`] bar-by-bar as a feed for the backtester.
///
/// The cursor is advanced by the backtest loop; quotes and covariance are
/// computed from data at or before the cursor only, so replays are
/// deterministic and free of lookahead.
#[derive(Debug, Clone)]
pub struct HistoricalFeed {
    series: PriceSeries,
    cursor: usize,
    /// Trailing window (bars) for covariance estimation.
    pub covariance_window: usize,
}

impl HistoricalFeed {
    pub fn new(series: PriceSeries) -> Self {
        Self {
            series,
            cursor: 0,
            covariance_window: 60,
        }
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, index: usize) {
        self.cursor = index.min(self.series.len().saturating_sub(1));
    }

    pub fn current_date(&self) -> Option<DateTime<Utc>> {
        self.series.dates.get(self.cursor).copied()
    }

    /// Trailing per-asset simple returns up to the cursor.
    fn trailing_returns(&self, asset: &AssetId) -> Vec<f64> {
        let window_start = self.cursor.saturating_sub(self.covariance_window);
        let prices = match self.series.prices.get(asset) {
            Some(p) => p,
            None => return Vec::new(),
        };
        (window_start..self.cursor)
            .filter_map(|i| {
                let prev = prices.get(i)?;
                let next = prices.get(i + 1)?;
                if *prev > 0.0 { Some(next / prev - 1.0) } else { None }
            })
            .collect()
    }

    fn mean(xs: &[f64]) -> f64 {
        if xs.is_empty() {
            0.0
        } else {
            xs.iter().sum::<f64>() / xs.len() as f64
        }
    }
}

impl MarketDataFeed for HistoricalFeed {
    fn quote(&self, asset: &AssetId) -> BallastResult<Quote> {
        let price = self
            .series
            .price_at(asset, self.cursor)
            .ok_or_else(|| BallastError::MarketData(format!("no bar for {asset}")))?;
        Ok(Quote {
            asset_id: asset.clone(),
            price: Decimal::from_f64_retain(price)
                .ok_or_else(|| BallastError::MarketData(format!("bad price for {asset}")))?,
            timestamp: self.current_date().unwrap_or_else(Utc::now),
        })
    }

    fn covariance(&self, assets: &[AssetId]) -> BallastResult<CovarianceMatrix> {
        let n = assets.len();
        let returns: Vec<Vec<f64>> = assets.iter().map(|a| self.trailing_returns(a)).collect();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let (ri, rj) = (&returns[i], &returns[j]);
                let len = ri.len().min(rj.len());
                let cov = if len < 2 {
                    0.0
                } else {
                    let mi = Self::mean(&ri[..len]);
                    let mj = Self::mean(&rj[..len]);
                    let sum: f64 = (0..len).map(|k| (ri[k] - mi) * (rj[k] - mj)).sum();
                    // Annualize daily covariance.
                    sum / (len - 1) as f64 * 252.0
                };
                values[i * n + j] = cov;
                values[j * n + i] = cov;
            }
        }
        Ok(CovarianceMatrix::new(assets.to_vec(), values))
    }

    fn snapshot(&self, assets: &[AssetId], now: DateTime<Utc>) -> BallastResult<MarketSnapshot> {
        let mut prices = HashMap::new();
        for asset in assets {
            prices.insert(asset.clone(), self.quote(asset)?.price);
        }
        // Market-wide vol proxy: average of per-asset trailing vols.
        let vols: Vec<f64> = assets
            .iter()
            .map(|a| {
                let rs = self.trailing_returns(a);
                if rs.len() < 2 {
                    return 0.0;
                }
                let m = Self::mean(&rs);
                let var = rs.iter().map(|r| (r - m) * (r - m)).sum::<f64>() / (rs.len() - 1) as f64;
                (var * 252.0).sqrt()
            })
            .collect();
        Ok(MarketSnapshot {
            timestamp: now,
            prices,
            realized_volatility: Self::mean(&vols),
            liquidity_score: 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn series(prices_a: &[f64]) -> PriceSeries {
        let start = Utc::now();
        let dates = (0..prices_a.len())
            .map(|i| start + Duration::days(i as i64))
            .collect();
        let mut prices = HashMap::new();
        prices.insert(AssetId::new("A"), prices_a.to_vec());
        PriceSeries::new(dates, prices)
    }

    #[test]
    fn static_feed_quotes_and_errors() {
        let mut prices = HashMap::new();
        prices.insert(AssetId::new("A"), dec!(100));
        let feed = StaticFeed::new(
            prices,
            CovarianceMatrix::new(vec![AssetId::new("A")], vec![0.04]),
        );
        assert_eq!(feed.quote(&AssetId::new("A")).unwrap().price, dec!(100));
        assert!(feed.quote(&AssetId::new("B")).is_err());
    }

    #[test]
    fn historical_feed_tracks_cursor() {
        let mut feed = HistoricalFeed::new(series(&[100.0, 110.0, 121.0]));
        assert_eq!(feed.quote(&AssetId::new("A")).unwrap().price, dec!(100));
        feed.set_cursor(2);
        assert_eq!(feed.quote(&AssetId::new("A")).unwrap().price, dec!(121));
    }

    #[test]
    fn historical_covariance_uses_trailing_window_only() {
        let mut feed = HistoricalFeed::new(series(&[100.0, 101.0, 99.0, 102.0, 100.0, 103.0]));
        feed.set_cursor(5);
        let cov = feed.covariance(&[AssetId::new("A")]).unwrap();
        assert!(cov.get(0, 0) > 0.0);
    }

    #[test]
    fn cursor_clamps_to_series_end() {
        let mut feed = HistoricalFeed::new(series(&[100.0, 110.0]));
        feed.set_cursor(10);
        assert_eq!(feed.cursor(), 1);
    }
}
