//! Profile storage behind a trait so tests and embedders can inject their
//! own; the in-memory implementation backs the daemon and all tests.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use bl_types::{BallastError, BallastResult, PerformanceSeries, ProfileId, RebalancingProfile};

pub trait ProfileRepository: Send + Sync {
    fn get(&self, id: ProfileId) -> BallastResult<RebalancingProfile>;

    fn put(&self, profile: RebalancingProfile) -> BallastResult<()>;

    fn remove(&self, id: ProfileId) -> BallastResult<RebalancingProfile>;

    fn list(&self) -> Vec<RebalancingProfile>;

    fn contains(&self, id: ProfileId) -> bool;
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: DashMap<ProfileId, RebalancingProfile>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl ProfileRepository for InMemoryProfileRepository {
    fn get(&self, id: ProfileId) -> BallastResult<RebalancingProfile> {
        self.profiles
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(BallastError::ProfileNotFound { profile_id: id })
    }

    fn put(&self, profile: RebalancingProfile) -> BallastResult<()> {
        self.profiles.insert(profile.id, profile);
        Ok(())
    }

    fn remove(&self, id: ProfileId) -> BallastResult<RebalancingProfile> {
        self.profiles
            .remove(&id)
            .map(|(_, profile)| profile)
            .ok_or(BallastError::ProfileNotFound { profile_id: id })
    }

    fn list(&self) -> Vec<RebalancingProfile> {
        self.profiles.iter().map(|entry| entry.clone()).collect()
    }

    fn contains(&self, id: ProfileId) -> bool {
        self.profiles.contains_key(&id)
    }
}

/// Per-profile portfolio-value history, written by the scheduler each tick
/// and read by analytics and triggers.
#[derive(Default)]
pub struct PerformanceStore {
    series: DashMap<ProfileId, PerformanceSeries>,
}

impl PerformanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: ProfileId, date: DateTime<Utc>, value: f64) {
        self.series.entry(id).or_default().record(date, value);
    }

    /// Snapshot of the series; empty when nothing was recorded yet.
    pub fn series(&self, id: ProfileId) -> PerformanceSeries {
        self.series
            .get(&id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn remove(&self, id: ProfileId) {
        self.series.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_types::{AssetAllocation, RebalancingStrategy};
    use uuid::Uuid;

    fn profile() -> RebalancingProfile {
        RebalancingProfile::new(
            "repo-test",
            RebalancingStrategy::Threshold { threshold_pct: 5.0 },
            vec![
                AssetAllocation::new("A", 60.0),
                AssetAllocation::new("B", 40.0),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn put_get_roundtrip() {
        let repo = InMemoryProfileRepository::new();
        let p = profile();
        let id = p.id;
        repo.put(p.clone()).unwrap();
        assert_eq!(repo.get(id).unwrap(), p);
        assert_eq!(repo.list().len(), 1);
    }

    #[test]
    fn missing_profile_is_not_found() {
        let repo = InMemoryProfileRepository::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            repo.get(id),
            Err(BallastError::ProfileNotFound { profile_id }) if profile_id == id
        ));
    }

    #[test]
    fn remove_returns_the_profile() {
        let repo = InMemoryProfileRepository::new();
        let p = profile();
        let id = p.id;
        repo.put(p).unwrap();
        assert!(repo.remove(id).is_ok());
        assert!(!repo.contains(id));
    }

    #[test]
    fn performance_store_accumulates() {
        let store = PerformanceStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store.record(id, now, 100.0);
        store.record(id, now + chrono::Duration::days(1), 101.0);
        let series = store.series(id);
        assert_eq!(series.len(), 2);
        assert!((series.total_return() - 0.01).abs() < 1e-12);
        assert!(store.series(Uuid::new_v4()).is_empty());
    }
}
