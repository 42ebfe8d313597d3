use rust_decimal::Decimal;

/// Pluggable transaction-cost model.
///
/// Cost figures are deliberately not hard-coded in the executor: profiles can
/// be calibrated against whatever venue they actually trade on.
pub trait CostModel: Send + Sync {
    /// Transaction cost for a trade of the given notional.
    fn cost(&self, notional: Decimal) -> Decimal;

    /// Expected slippage in basis points for a trade of the given notional.
    fn expected_slippage_bps(&self, notional: Decimal) -> Decimal;
}

/// Flat basis-point cost with a fixed slippage expectation.
#[derive(Debug, Clone)]
pub struct FlatBpsCost {
    pub cost_bps: Decimal,
    pub slippage_bps: Decimal,
}

impl FlatBpsCost {
    pub fn new(cost_bps: Decimal, slippage_bps: Decimal) -> Self {
        Self { cost_bps, slippage_bps }
    }
}

impl Default for FlatBpsCost {
    fn default() -> Self {
        // 10 bps cost, 5 bps slippage.
        Self {
            cost_bps: Decimal::from(10),
            slippage_bps: Decimal::from(5),
        }
    }
}

impl CostModel for FlatBpsCost {
    fn cost(&self, notional: Decimal) -> Decimal {
        notional.abs() * self.cost_bps / Decimal::from(10_000)
    }

    fn expected_slippage_bps(&self, _notional: Decimal) -> Decimal {
        self.slippage_bps
    }
}

/// Size-tiered cost: larger trades pay progressively more impact.
#[derive(Debug, Clone)]
pub struct TieredCost {
    /// (notional ceiling, bps) tiers, ascending by ceiling. Trades above the
    /// last ceiling pay `overflow_bps`.
    pub tiers: Vec<(Decimal, Decimal)>,
    pub overflow_bps: Decimal,
}

impl TieredCost {
    fn bps_for(&self, notional: Decimal) -> Decimal {
        let abs = notional.abs();
        for (ceiling, bps) in &self.tiers {
            if abs <= *ceiling {
                return *bps;
            }
        }
        self.overflow_bps
    }
}

impl CostModel for TieredCost {
    fn cost(&self, notional: Decimal) -> Decimal {
        notional.abs() * self.bps_for(notional) / Decimal::from(10_000)
    }

    fn expected_slippage_bps(&self, notional: Decimal) -> Decimal {
        self.bps_for(notional) / Decimal::from(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn flat_cost_is_linear() {
        let model = FlatBpsCost::default();
        assert_eq!(model.cost(dec!(10_000)), dec!(10));
        assert_eq!(model.cost(dec!(-10_000)), dec!(10));
    }

    #[test]
    fn tiered_cost_steps_up() {
        let model = TieredCost {
            tiers: vec![(dec!(10_000), dec!(5)), (dec!(100_000), dec!(10))],
            overflow_bps: dec!(25),
        };
        assert_eq!(model.cost(dec!(5_000)), dec!(2.5000));
        assert_eq!(model.cost(dec!(50_000)), dec!(50));
        assert_eq!(model.cost(dec!(200_000)), dec!(500));
    }
}
