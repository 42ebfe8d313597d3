use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bl_types::{BallastError, BallastResult, RebalancingTrade, TradeSide};

use crate::cost::CostModel;
use crate::feed::MarketSnapshot;

/// What the venue reports back for one submitted trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueFill {
    pub executed_price: Decimal,
    pub slippage_bps: Decimal,
    pub transaction_cost: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Execution venue abstraction: real brokerage adapters and the simulator
/// both implement this.
pub trait ExecutionVenue: Send {
    fn submit(
        &mut self,
        trade: &RebalancingTrade,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> BallastResult<VenueFill>;
}

/// Simulated venue: fills at the snapshot quote plus seeded random slippage
/// around the cost model's expectation. Identical seed ⇒ identical fills.
pub struct SimulatedVenue<C: CostModel> {
    cost_model: C,
    rng: StdRng,
}

impl<C: CostModel> SimulatedVenue<C> {
    pub fn new(cost_model: C, seed: u64) -> Self {
        Self {
            cost_model,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<C: CostModel> ExecutionVenue for SimulatedVenue<C> {
    fn submit(
        &mut self,
        trade: &RebalancingTrade,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> BallastResult<VenueFill> {
        let quote = snapshot
            .price(&trade.asset_id)
            .ok_or_else(|| BallastError::MarketData(format!("no quote for {}", trade.asset_id)))?;

        // Slippage jitters uniformly around the model expectation; buys slip
        // up, sells slip down.
        let expected_bps = self.cost_model.expected_slippage_bps(trade.notional);
        let jitter: f64 = self.rng.random_range(0.5..1.5);
        let slippage_bps = expected_bps
            * Decimal::from_f64_retain(jitter).unwrap_or(Decimal::ONE);
        let slip = quote * slippage_bps / Decimal::from(10_000);
        let executed_price = match trade.side {
            TradeSide::Buy => quote + slip,
            TradeSide::Sell => quote - slip,
        };

        let transaction_cost = self.cost_model.cost(trade.notional);
        debug!(
            asset = %trade.asset_id,
            %executed_price,
            %slippage_bps,
            "simulated fill"
        );

        Ok(VenueFill {
            executed_price,
            slippage_bps,
            transaction_cost,
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::FlatBpsCost;
    use bl_types::AssetId;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn snapshot() -> MarketSnapshot {
        let mut prices = HashMap::new();
        prices.insert(AssetId::new("A"), dec!(100));
        MarketSnapshot {
            timestamp: Utc::now(),
            prices,
            realized_volatility: 0.10,
            liquidity_score: 1.0,
        }
    }

    fn buy(notional: Decimal) -> RebalancingTrade {
        RebalancingTrade {
            asset_id: AssetId::new("A"),
            side: TradeSide::Buy,
            weight_delta_pct: 5.0,
            notional,
            target_price: dec!(100),
            executed_price: None,
            transaction_cost: Decimal::ZERO,
            slippage_bps: Decimal::ZERO,
            priority: 1,
        }
    }

    #[test]
    fn buys_fill_above_quote_sells_below() {
        let mut venue = SimulatedVenue::new(FlatBpsCost::default(), 7);
        let fill = venue.submit(&buy(dec!(10_000)), &snapshot(), Utc::now()).unwrap();
        assert!(fill.executed_price > dec!(100));

        let mut sell = buy(dec!(10_000));
        sell.side = TradeSide::Sell;
        let fill = venue.submit(&sell, &snapshot(), Utc::now()).unwrap();
        assert!(fill.executed_price < dec!(100));
    }

    #[test]
    fn same_seed_same_fills() {
        let run = |seed: u64| {
            let mut venue = SimulatedVenue::new(FlatBpsCost::default(), seed);
            let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 1, 1, 0, 0, 0).unwrap();
            (0..5)
                .map(|_| venue.submit(&buy(dec!(10_000)), &snapshot(), now).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn missing_quote_is_market_data_error() {
        let mut venue = SimulatedVenue::new(FlatBpsCost::default(), 1);
        let mut trade = buy(dec!(10_000));
        trade.asset_id = AssetId::new("unknown");
        assert!(matches!(
            venue.submit(&trade, &snapshot(), Utc::now()),
            Err(BallastError::MarketData(_))
        ));
    }
}
