//! Execution gates. Any violation suspends the rebalance; gating is a
//! deferral, never a failure.

use std::fmt;

use chrono::{DateTime, Utc};

use bl_market::MarketSnapshot;
use bl_types::{
    BallastError, RebalancingProfile, RebalancingRules, RebalancingTrade, TradeSide,
};

#[derive(Debug, Clone, PartialEq)]
pub enum GateViolation {
    Volatility { observed: f64, threshold: f64 },
    Liquidity { observed: f64, threshold: f64 },
    Blackout,
    CashReserve { projected_pct: f64, reserve_pct: f64 },
}

impl fmt::Display for GateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volatility { observed, threshold } => {
                write!(f, "volatility {observed:.4} above threshold {threshold:.4}")
            }
            Self::Liquidity { observed, threshold } => {
                write!(f, "liquidity {observed:.4} below threshold {threshold:.4}")
            }
            Self::Blackout => write!(f, "inside a blackout window"),
            Self::CashReserve {
                projected_pct,
                reserve_pct,
            } => write!(
                f,
                "projected cash {projected_pct:.2}% below reserve {reserve_pct:.2}%"
            ),
        }
    }
}

/// Cash weight after the planned trades settle: buys draw the sleeve down,
/// sells replenish it. `None` when the profile carries no cash sleeve.
pub fn projected_cash_pct(
    profile: &RebalancingProfile,
    trades: &[RebalancingTrade],
) -> Option<f64> {
    let cash = profile
        .allocations
        .iter()
        .find(|a| a.asset_id.is_cash())?
        .current_pct;
    let net_buys: f64 = trades
        .iter()
        .map(|t| match t.side {
            TradeSide::Buy => t.weight_delta_pct,
            TradeSide::Sell => -t.weight_delta_pct,
        })
        .sum();
    Some(cash - net_buys)
}

pub fn check_gates(
    rules: &RebalancingRules,
    snapshot: &MarketSnapshot,
    projected_cash: Option<f64>,
    now: DateTime<Utc>,
) -> Vec<GateViolation> {
    let mut violations = Vec::new();
    if snapshot.realized_volatility > rules.volatility_threshold {
        violations.push(GateViolation::Volatility {
            observed: snapshot.realized_volatility,
            threshold: rules.volatility_threshold,
        });
    }
    if snapshot.liquidity_score < rules.liquidity_threshold {
        violations.push(GateViolation::Liquidity {
            observed: snapshot.liquidity_score,
            threshold: rules.liquidity_threshold,
        });
    }
    if rules.blackout_windows.iter().any(|w| w.contains(now)) {
        violations.push(GateViolation::Blackout);
    }
    if let Some(projected_pct) = projected_cash {
        if projected_pct < rules.cash_reserve_pct {
            violations.push(GateViolation::CashReserve {
                projected_pct,
                reserve_pct: rules.cash_reserve_pct,
            });
        }
    }
    violations
}

pub fn gate_error(violations: &[GateViolation]) -> BallastError {
    let reasons: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
    BallastError::ExecutionGated {
        reason: reasons.join("; "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_types::{AssetAllocation, AssetId, BlackoutWindow, RebalancingStrategy};
    use chrono::{NaiveTime, TimeZone};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn snapshot(vol: f64, liquidity: f64) -> MarketSnapshot {
        MarketSnapshot {
            timestamp: Utc::now(),
            prices: HashMap::new(),
            realized_volatility: vol,
            liquidity_score: liquidity,
        }
    }

    fn cash_profile(cash_pct: f64) -> RebalancingProfile {
        RebalancingProfile::new(
            "test",
            RebalancingStrategy::Threshold { threshold_pct: 5.0 },
            vec![
                AssetAllocation::new("A", 90.0),
                AssetAllocation::new("cash", 10.0).with_current(cash_pct),
            ],
            Utc::now(),
        )
    }

    fn buy(asset: &str, delta: f64) -> RebalancingTrade {
        RebalancingTrade {
            asset_id: AssetId::new(asset),
            side: TradeSide::Buy,
            weight_delta_pct: delta,
            notional: dec!(1_000),
            target_price: dec!(100),
            executed_price: None,
            transaction_cost: dec!(1),
            slippage_bps: dec!(5),
            priority: 5,
        }
    }

    #[test]
    fn calm_markets_pass_all_gates() {
        let rules = RebalancingRules::default();
        assert!(check_gates(&rules, &snapshot(0.10, 0.9), None, Utc::now()).is_empty());
    }

    #[test]
    fn high_volatility_gates() {
        let rules = RebalancingRules::default();
        let violations = check_gates(&rules, &snapshot(0.55, 0.9), None, Utc::now());
        assert!(matches!(violations[0], GateViolation::Volatility { .. }));
        let err = gate_error(&violations);
        assert!(err.is_recoverable());
    }

    #[test]
    fn thin_liquidity_gates() {
        let rules = RebalancingRules::default();
        let violations = check_gates(&rules, &snapshot(0.10, 0.05), None, Utc::now());
        assert!(matches!(violations[0], GateViolation::Liquidity { .. }));
    }

    #[test]
    fn blackout_window_gates() {
        let mut rules = RebalancingRules::default();
        rules.blackout_windows.push(BlackoutWindow {
            start: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        });
        let inside = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        let violations = check_gates(&rules, &snapshot(0.10, 0.9), None, inside);
        assert_eq!(violations, vec![GateViolation::Blackout]);
    }

    #[test]
    fn cash_reserve_breach_gates() {
        let mut rules = RebalancingRules::default();
        rules.cash_reserve_pct = 5.0;
        let profile = cash_profile(8.0);
        let trades = vec![buy("A", 4.0)];
        let projected = projected_cash_pct(&profile, &trades);
        assert_eq!(projected, Some(4.0));
        let violations = check_gates(&rules, &snapshot(0.10, 0.9), projected, Utc::now());
        assert!(matches!(violations[0], GateViolation::CashReserve { .. }));
    }

    #[test]
    fn sells_replenish_projected_cash() {
        let profile = cash_profile(2.0);
        let mut sell = buy("A", 6.0);
        sell.side = TradeSide::Sell;
        assert_eq!(projected_cash_pct(&profile, &[sell]), Some(8.0));
    }
}
