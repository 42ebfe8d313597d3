//! Return and risk-adjusted metrics over a portfolio value series.

use serde::{Deserialize, Serialize};

use bl_risk::RiskCalculator;
use bl_types::PerformanceSeries;

const TRADING_DAYS: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    /// Annualized return over the risk-free rate.
    pub excess_return: f64,
    /// Annualized standard deviation of periodic returns.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    /// Only populated when a benchmark series was supplied.
    pub tracking_error: Option<f64>,
    pub information_ratio: Option<f64>,
    pub observations: usize,
}

impl PerformanceMetrics {
    pub fn empty() -> Self {
        Self {
            total_return: 0.0,
            annualized_return: 0.0,
            excess_return: 0.0,
            volatility: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            calmar_ratio: 0.0,
            max_drawdown: 0.0,
            tracking_error: None,
            information_ratio: None,
            observations: 0,
        }
    }
}

/// Stateless metric calculator; series assumed daily.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    pub risk_free_rate: f64,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.02,
        }
    }
}

impl PerformanceTracker {
    pub fn new(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }

    pub fn metrics(&self, series: &PerformanceSeries) -> PerformanceMetrics {
        self.metrics_against(series, None)
    }

    pub fn metrics_against(
        &self,
        series: &PerformanceSeries,
        benchmark: Option<&PerformanceSeries>,
    ) -> PerformanceMetrics {
        let returns = series.returns();
        if returns.is_empty() {
            return PerformanceMetrics::empty();
        }

        let total_return = series.total_return();
        let annualized_return = annualize(total_return, returns.len());
        let volatility = stdev(&returns) * TRADING_DAYS.sqrt();
        let excess = annualized_return - self.risk_free_rate;

        let downside = downside_deviation(&returns) * TRADING_DAYS.sqrt();
        let (_, max_drawdown) = RiskCalculator::drawdowns(&series.values());

        let (tracking_error, information_ratio) = match benchmark {
            Some(bench) => {
                let bench_returns = bench.returns();
                let n = returns.len().min(bench_returns.len());
                if n < 2 {
                    (None, None)
                } else {
                    let active: Vec<f64> = (0..n)
                        .map(|i| returns[i] - bench_returns[i])
                        .collect();
                    let te = stdev(&active) * TRADING_DAYS.sqrt();
                    let active_annual =
                        annualized_return - annualize(bench.total_return(), bench_returns.len());
                    let ir = if te > 1e-12 {
                        Some(active_annual / te)
                    } else {
                        None
                    };
                    (Some(te), ir)
                }
            }
            None => (None, None),
        };

        PerformanceMetrics {
            total_return,
            annualized_return,
            excess_return: excess,
            volatility,
            sharpe_ratio: ratio(excess, volatility),
            sortino_ratio: ratio(excess, downside),
            calmar_ratio: ratio(annualized_return, max_drawdown),
            max_drawdown,
            tracking_error,
            information_ratio,
            observations: series.len(),
        }
    }
}

fn annualize(total_return: f64, periods: usize) -> f64 {
    if periods == 0 || total_return <= -1.0 {
        return 0.0;
    }
    (1.0 + total_return).powf(TRADING_DAYS / periods as f64) - 1.0
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn stdev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

/// Root mean square of negative returns only.
fn downside_deviation(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let sum: f64 = xs.iter().map(|x| x.min(0.0).powi(2)).sum();
    (sum / xs.len() as f64).sqrt()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() > 1e-12 {
        numerator / denominator.abs()
    } else {
        0.0
    }
}
