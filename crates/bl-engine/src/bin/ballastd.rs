//! Ballast daemon: drives the scheduler against a demo market on a fixed
//! interval and logs what each tick did. `BALLAST_TICK_SECS` controls the
//! cadence, `RUST_LOG` the verbosity.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bl_engine::{InMemoryProfileRepository, PerformanceStore, ProfileRepository, Scheduler};
use bl_execution::TradeExecutor;
use bl_market::{FlatBpsCost, SimulatedVenue, StaticFeed};
use bl_risk::RiskMonitor;
use bl_types::{AssetAllocation, AssetId, CovarianceMatrix, RebalancingProfile, RebalancingStrategy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let tick_secs: u64 = std::env::var("BALLAST_TICK_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    let repo = Arc::new(InMemoryProfileRepository::new());
    seed_demo_profiles(&repo)?;

    let (alert_tx, alert_rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for alert in alert_rx {
            warn!(?alert, "risk alert");
        }
    });

    let mut scheduler = Scheduler::new(
        repo.clone(),
        Arc::new(demo_feed()),
        Arc::new(PerformanceStore::new()),
        Arc::new(Mutex::new(RiskMonitor::new(alert_tx))),
        TradeExecutor::new(
            SimulatedVenue::new(FlatBpsCost::default(), 42),
            FlatBpsCost::default(),
        ),
    );

    info!(profiles = repo.len(), tick_secs, "ballastd started");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs));
    loop {
        interval.tick().await;
        let report = scheduler.tick(Utc::now());
        info!(
            events = report.events.len(),
            deferred = report.deferred.len(),
            errors = report.errors.len(),
            alerts = report.alerts_raised,
            "tick complete"
        );
        for (profile_id, reason) in &report.deferred {
            info!(%profile_id, reason, "rebalance deferred");
        }
        for (profile_id, error) in &report.errors {
            warn!(%profile_id, error, "profile error");
        }
    }
}

fn demo_feed() -> StaticFeed {
    let mut prices = HashMap::new();
    prices.insert(AssetId::new("equities"), Decimal::from(412));
    prices.insert(AssetId::new("bonds"), Decimal::from(97));
    prices.insert(AssetId::new("real_estate"), Decimal::from(88));

    let assets = vec![
        AssetId::new("equities"),
        AssetId::new("bonds"),
        AssetId::new("real_estate"),
        AssetId::cash(),
    ];
    let mut correlations = HashMap::new();
    correlations.insert((AssetId::new("equities"), AssetId::new("bonds")), -0.2);
    correlations.insert((AssetId::new("equities"), AssetId::new("real_estate")), 0.6);
    correlations.insert((AssetId::new("bonds"), AssetId::new("real_estate")), 0.1);
    let covariance =
        CovarianceMatrix::from_vols_and_correlations(assets, &[0.18, 0.06, 0.15, 0.0], &correlations);

    StaticFeed::new(prices, covariance).with_market_state(0.14, 0.9)
}

fn seed_demo_profiles(repo: &InMemoryProfileRepository) -> anyhow::Result<()> {
    let now = Utc::now();
    let threshold = RebalancingProfile::new(
        "demo-threshold",
        RebalancingStrategy::Threshold { threshold_pct: 5.0 },
        vec![
            AssetAllocation::new("equities", 55.0).with_current(61.0),
            AssetAllocation::new("bonds", 30.0).with_current(26.0),
            AssetAllocation::new("real_estate", 10.0).with_current(8.5),
            AssetAllocation::new("cash", 5.0).with_current(4.5),
        ],
        now,
    );
    threshold.validate()?;

    let parity = RebalancingProfile::new(
        "demo-risk-parity",
        RebalancingStrategy::RiskParity {
            tolerance: 0.05,
            target_contributions: HashMap::new(),
        },
        vec![
            AssetAllocation::new("equities", 35.0)
                .with_current(35.0)
                .with_return_profile(0.07, 0.18),
            AssetAllocation::new("bonds", 45.0)
                .with_current(45.0)
                .with_return_profile(0.03, 0.06),
            AssetAllocation::new("real_estate", 15.0)
                .with_current(15.0)
                .with_return_profile(0.05, 0.15),
            AssetAllocation::new("cash", 5.0).with_current(5.0),
        ],
        now,
    );
    parity.validate()?;

    repo.put(threshold)?;
    repo.put(parity)?;
    Ok(())
}
