//! The license service: request handling, startup phases, and the janitor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::clock::{Clock, IdSource, SystemClock, UuidIds};
use crate::config::Config;
use crate::error::ServiceError;
use crate::invocation::{Invocation, Position};
use crate::pool::{LicensePool, LicenseStats};

/// Server lifecycle phase.
///
/// The server spends a short grace period in `Starting` after boot, during
/// which it "adopts" invocation ids it does not recognize instead of
/// rejecting them. This lets invocations that were queued or allocated
/// before a restart carry on without losing their seat or their place in
/// line. The transition to `Running` is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Starting,
    Running,
}

/// A single license type, addressed as `vendor::feature`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseSpec {
    pub vendor: String,
    pub feature: String,
}

impl LicenseSpec {
    pub fn type_name(&self) -> String {
        format!("{}::{}", self.vendor, self.feature)
    }
}

/// Client-supplied description of an invocation, carried on allocate and
/// refresh requests. `id` is empty on an invocation's first contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationSpec {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub build_tag: String,
    #[serde(default)]
    pub licenses: Vec<LicenseSpec>,
}

/// Successful allocate result: either a held seat or a spot in line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AllocateOutcome {
    Allocated {
        invocation_id: String,
        refresh_deadline: DateTime<Utc>,
    },
    Queued {
        invocation_id: String,
        next_poll: DateTime<Utc>,
        queue_position: Position,
    },
}

/// Successful refresh result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub invocation_id: String,
    pub refresh_deadline: DateTime<Utc>,
}

struct EngineState {
    phase: Phase,
    licenses: HashMap<String, LicensePool>,
}

/// Arbitrates license seats across all configured pools.
///
/// All request handling is synchronous under one mutex; nothing awaits or
/// does IO while holding it. Async enters the picture only for the two
/// background tasks (janitor ticker, startup grace timer).
pub struct LicenseService {
    state: Mutex<EngineState>,
    queue_refresh: Duration,
    allocation_refresh: Duration,
    janitor_interval: StdDuration,
    adoption_grace: StdDuration,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    shutdown: watch::Sender<bool>,
}

impl LicenseService {
    pub fn new(config: &Config) -> Self {
        Self::with_sources(config, Arc::new(SystemClock), Arc::new(UuidIds))
    }

    /// Like [`new`](Self::new), with the time and id sources supplied by the
    /// caller. Used by tests to drive expiry deterministically.
    pub fn with_sources(
        config: &Config,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        let licenses = config
            .licenses
            .iter()
            .map(|lc| {
                let name = lc.type_name();
                tracing::info!(
                    license = %name,
                    quantity = lc.quantity,
                    policy = ?lc.policy,
                    "registering license pool"
                );
                (
                    name.clone(),
                    LicensePool::new(name, lc.quantity, lc.policy.prioritizer()),
                )
            })
            .collect();
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Mutex::new(EngineState {
                phase: Phase::Starting,
                licenses,
            }),
            queue_refresh: Duration::seconds(config.queue_refresh_secs as i64),
            allocation_refresh: Duration::seconds(config.allocation_refresh_secs as i64),
            janitor_interval: StdDuration::from_secs(config.janitor_interval_secs),
            adoption_grace: StdDuration::from_secs(config.adoption_grace_secs),
            clock,
            ids,
            shutdown,
        }
    }

    /// Starts the janitor ticker and the startup grace timer. Both stop when
    /// [`trigger_shutdown`](Self::trigger_shutdown) fires.
    pub fn spawn_background(service: &Arc<Self>) {
        let svc = Arc::clone(service);
        let mut shutdown = service.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(svc.janitor_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => svc.sweep(),
                    _ = shutdown.changed() => break,
                }
            }
        });

        let svc = Arc::clone(service);
        let mut shutdown = service.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(svc.adoption_grace) => svc.set_running(),
                _ = shutdown.changed() => {}
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Ends the startup grace period. Idempotent.
    pub fn set_running(&self) {
        let mut state = self.lock();
        if state.phase != Phase::Running {
            state.phase = Phase::Running;
            tracing::info!("startup grace period over, rejecting unknown invocations from now on");
        }
    }

    fn single_license(spec: &InvocationSpec) -> Result<String, ServiceError> {
        if spec.licenses.len() != 1 {
            return Err(ServiceError::InvalidArgument(
                "licenses must have exactly one license spec".into(),
            ));
        }
        Ok(spec.licenses[0].type_name())
    }

    /// Allocates a seat to the invocation, or queues it if none are free.
    ///
    /// First contact (empty id) mints an id and enqueues; repeat calls act as
    /// queue-spot keepalives and report the current state. Unknown non-empty
    /// ids are re-queued during `Starting` and rejected during `Running`.
    pub fn allocate(&self, spec: &InvocationSpec) -> Result<AllocateOutcome, ServiceError> {
        let license_type = Self::single_license(spec)?;
        let mut state = self.lock();
        let phase = state.phase;
        let pool = state
            .licenses
            .get_mut(&license_type)
            .ok_or_else(|| ServiceError::UnknownLicense(license_type.clone()))?;
        let now = self.clock.now();

        let mut invocation_id = spec.id.clone();
        if invocation_id.is_empty() {
            invocation_id = self.ids.generate().map_err(ServiceError::IdGeneration)?;
            pool.enqueue(Invocation::new(
                invocation_id.clone(),
                &spec.owner,
                &spec.build_tag,
                now,
            ));
            if phase == Phase::Running {
                pool.promote();
            }
        }

        // The id is now either allocated (promoted above, or earlier by the
        // janitor) or queued, unless the server has never seen it.
        if let Some(inv) = pool.get_allocated_mut(&invocation_id) {
            inv.last_checkin = now;
            return Ok(AllocateOutcome::Allocated {
                invocation_id,
                refresh_deadline: now + self.allocation_refresh,
            });
        }
        if let Some((inv, queue_position)) = pool.get_queued_mut(&invocation_id) {
            inv.last_checkin = now;
            return Ok(AllocateOutcome::Queued {
                invocation_id,
                next_poll: now + self.queue_refresh,
                queue_position,
            });
        }
        if phase == Phase::Running {
            return Err(ServiceError::InvocationNotFound(invocation_id));
        }

        // The id predates a restart; put it back in line rather than failing
        // the invocation.
        tracing::info!(license = %license_type, invocation = %invocation_id, "adopting unknown invocation into queue");
        let queue_position = pool.enqueue(Invocation::new(
            invocation_id.clone(),
            &spec.owner,
            &spec.build_tag,
            now,
        ));
        Ok(AllocateOutcome::Queued {
            invocation_id,
            next_poll: now + self.queue_refresh,
            queue_position,
        })
    }

    /// Keepalive for a held seat. Unknown ids are adopted straight into an
    /// allocation during `Starting` if a seat is free.
    pub fn refresh(&self, spec: &InvocationSpec) -> Result<RefreshOutcome, ServiceError> {
        let license_type = Self::single_license(spec)?;
        let mut state = self.lock();
        let phase = state.phase;
        let pool = state
            .licenses
            .get_mut(&license_type)
            .ok_or_else(|| ServiceError::UnknownLicense(license_type.clone()))?;
        if spec.id.is_empty() {
            return Err(ServiceError::InvalidArgument("invocation_id must be set".into()));
        }
        let now = self.clock.now();

        if let Some(inv) = pool.get_allocated_mut(&spec.id) {
            inv.last_checkin = now;
            return Ok(RefreshOutcome {
                invocation_id: spec.id.clone(),
                refresh_deadline: now + self.allocation_refresh,
            });
        }
        if phase == Phase::Running {
            return Err(ServiceError::NotAllocated(spec.id.clone()));
        }

        // The seat was held before a restart; hand it straight back if the
        // pool still has room.
        let adopted = pool.adopt(Invocation::new(
            spec.id.clone(),
            &spec.owner,
            &spec.build_tag,
            now,
        ));
        if !adopted {
            return Err(ServiceError::Exhausted(license_type));
        }
        tracing::info!(license = %license_type, invocation = %spec.id, "adopting unknown invocation into allocation");
        Ok(RefreshOutcome {
            invocation_id: spec.id.clone(),
            refresh_deadline: now + self.allocation_refresh,
        })
    }

    /// Returns the invocation's seat and/or queue spot across every pool.
    pub fn release(&self, invocation_id: &str) -> Result<(), ServiceError> {
        if invocation_id.is_empty() {
            return Err(ServiceError::InvalidArgument("invocation_id must be set".into()));
        }
        let mut state = self.lock();
        let mut count = 0;
        for pool in state.licenses.values_mut() {
            count += pool.forget(invocation_id);
        }
        if count == 0 {
            return Err(ServiceError::InvocationNotFound(invocation_id.to_string()));
        }
        tracing::debug!(invocation = %invocation_id, entries = count, "released");
        Ok(())
    }

    /// Snapshot of every pool, sorted by vendor then feature.
    pub fn licenses_status(&self) -> (Phase, Vec<LicenseStats>) {
        let state = self.lock();
        let now = self.clock.now();
        let mut stats: Vec<LicenseStats> =
            state.licenses.values().map(|pool| pool.stats(now)).collect();
        stats.sort_by(|a, b| {
            (a.vendor.as_str(), a.feature.as_str()).cmp(&(b.vendor.as_str(), b.feature.as_str()))
        });
        (state.phase, stats)
    }

    /// One janitor pass: expire stale allocations and queue spots, then fill
    /// free seats from the queues. A no-op during `Starting` so adoption has
    /// a chance to run before anything is reclaimed.
    pub fn sweep(&self) {
        let mut state = self.lock();
        if state.phase == Phase::Starting {
            return;
        }
        let now = self.clock.now();
        let allocation_cutoff = now - self.allocation_refresh;
        let queue_cutoff = now - self.queue_refresh;
        for pool in state.licenses.values_mut() {
            pool.expire_allocations(allocation_cutoff);
            pool.expire_queued(queue_cutoff);
            pool.promote();
        }
    }

    /// Tells the background tasks (and anyone holding a
    /// [`shutdown_rx`](Self::shutdown_rx)) to stop.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SequentialIds};
    use chrono::TimeZone;

    const LICENSE: &str = "xilinx::feature_foo";

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 14, 12, 0, 0).unwrap()
    }

    fn test_config() -> Config {
        serde_json::from_str(
            r#"{
                "licenses": [
                    {"vendor": "xilinx", "feature": "feature_foo", "quantity": 2}
                ],
                "queue_refresh_secs": 5,
                "allocation_refresh_secs": 7
            }"#,
        )
        .unwrap()
    }

    fn service() -> (LicenseService, Arc<ManualClock>) {
        service_with(test_config())
    }

    fn service_with(config: Config) -> (LicenseService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_time()));
        let svc = LicenseService::with_sources(
            &config,
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::new(SequentialIds::new()),
        );
        (svc, clock)
    }

    fn spec(id: &str) -> InvocationSpec {
        InvocationSpec {
            id: id.into(),
            owner: "owner".into(),
            build_tag: "tag".into(),
            licenses: vec![LicenseSpec {
                vendor: "xilinx".into(),
                feature: "feature_foo".into(),
            }],
        }
    }

    fn with_allocation(svc: &LicenseService, id: &str, at: DateTime<Utc>) {
        let mut state = svc.lock();
        let pool = state.licenses.get_mut(LICENSE).unwrap();
        assert!(pool.allocate(Invocation::new(id, "owner", "tag", at)));
    }

    fn with_queued(svc: &LicenseService, id: &str, at: DateTime<Utc>) {
        let mut state = svc.lock();
        let pool = state.licenses.get_mut(LICENSE).unwrap();
        pool.enqueue(Invocation::new(id, "owner", "tag", at));
    }

    fn allocated_ids(svc: &LicenseService) -> Vec<String> {
        let (_, stats) = svc.licenses_status();
        stats[0].allocated.iter().map(|i| i.id.clone()).collect()
    }

    fn queued_ids(svc: &LicenseService) -> Vec<String> {
        let (_, stats) = svc.licenses_status();
        stats[0].queued.iter().map(|i| i.id.clone()).collect()
    }

    #[test]
    fn allocate_requires_exactly_one_license_spec() {
        let (svc, _) = service();
        svc.set_running();

        let mut none = spec("");
        none.licenses.clear();
        let err = svc.allocate(&none).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert_eq!(err.to_string(), "licenses must have exactly one license spec");

        let mut two = spec("");
        two.licenses.push(two.licenses[0].clone());
        let err = svc.allocate(&two).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn allocate_rejects_unknown_license_type() {
        let (svc, _) = service();
        svc.set_running();

        let mut req = spec("");
        req.licenses[0].feature = "feature_bar".into();
        let err = svc.allocate(&req).unwrap_err();
        assert!(matches!(err, ServiceError::UnknownLicense(_)));
        assert_eq!(err.to_string(), "unknown license type: \"xilinx::feature_bar\"");
    }

    #[test]
    fn allocate_new_invocation_gets_seat_when_running() {
        let (svc, _) = service();
        svc.set_running();

        let outcome = svc.allocate(&spec("")).unwrap();
        assert_eq!(
            outcome,
            AllocateOutcome::Allocated {
                invocation_id: "1".into(),
                refresh_deadline: start_time() + Duration::seconds(7),
            }
        );
        assert_eq!(allocated_ids(&svc), ["1"]);
    }

    #[test]
    fn allocate_new_invocation_queues_when_pool_full() {
        let (svc, _) = service();
        svc.set_running();
        with_allocation(&svc, "a", start_time());
        with_allocation(&svc, "b", start_time());

        let outcome = svc.allocate(&spec("")).unwrap();
        assert_eq!(
            outcome,
            AllocateOutcome::Queued {
                invocation_id: "1".into(),
                next_poll: start_time() + Duration::seconds(5),
                queue_position: 1,
            }
        );
    }

    #[test]
    fn allocate_new_invocation_only_queues_during_startup() {
        // Seats are free, but promotion is deferred until Running so older
        // invocations being adopted can reclaim them first.
        let (svc, _) = service();

        let outcome = svc.allocate(&spec("")).unwrap();
        assert!(matches!(outcome, AllocateOutcome::Queued { .. }));
        assert!(allocated_ids(&svc).is_empty());
        assert_eq!(queued_ids(&svc), ["1"]);
    }

    #[test]
    fn allocate_poll_refreshes_queue_spot() {
        let (svc, clock) = service();
        svc.set_running();
        with_allocation(&svc, "a", start_time());
        with_allocation(&svc, "b", start_time());
        with_queued(&svc, "q", start_time());

        clock.advance(Duration::seconds(3));
        let outcome = svc.allocate(&spec("q")).unwrap();
        assert_eq!(
            outcome,
            AllocateOutcome::Queued {
                invocation_id: "q".into(),
                next_poll: start_time() + Duration::seconds(8),
                queue_position: 1,
            }
        );

        let state = svc.lock();
        let (inv, _) = state.licenses[LICENSE].get_queued("q").unwrap();
        assert_eq!(inv.last_checkin, start_time() + Duration::seconds(3));
    }

    #[test]
    fn allocate_poll_reports_promotion() {
        let (svc, clock) = service();
        svc.set_running();
        with_allocation(&svc, "a", start_time());
        with_allocation(&svc, "b", start_time());
        with_queued(&svc, "q", start_time());

        // The seat frees up and the janitor promotes between polls.
        svc.release("a").unwrap();
        clock.advance(Duration::seconds(1));
        svc.sweep();

        let outcome = svc.allocate(&spec("q")).unwrap();
        assert_eq!(
            outcome,
            AllocateOutcome::Allocated {
                invocation_id: "q".into(),
                refresh_deadline: start_time() + Duration::seconds(8),
            }
        );
    }

    #[test]
    fn allocate_unknown_id_fails_when_running() {
        let (svc, _) = service();
        svc.set_running();

        let err = svc.allocate(&spec("ghost")).unwrap_err();
        assert!(matches!(err, ServiceError::InvocationNotFound(_)));
        assert_eq!(err.to_string(), "invocation_id not found: \"ghost\"");
    }

    #[test]
    fn allocate_unknown_id_requeues_during_startup() {
        let (svc, _) = service();

        let outcome = svc.allocate(&spec("survivor")).unwrap();
        assert_eq!(
            outcome,
            AllocateOutcome::Queued {
                invocation_id: "survivor".into(),
                next_poll: start_time() + Duration::seconds(5),
                queue_position: 1,
            }
        );

        // A second poll finds the queued entry instead of enqueueing twice.
        let outcome = svc.allocate(&spec("survivor")).unwrap();
        assert!(matches!(outcome, AllocateOutcome::Queued { queue_position: 1, .. }));
        assert_eq!(queued_ids(&svc), ["survivor"]);
    }

    #[test]
    fn refresh_requires_invocation_id() {
        let (svc, _) = service();
        svc.set_running();

        let err = svc.refresh(&spec("")).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert_eq!(err.to_string(), "invocation_id must be set");
    }

    #[test]
    fn refresh_validates_license_spec_before_id() {
        let (svc, _) = service();
        svc.set_running();

        let mut req = spec("");
        req.licenses.clear();
        let err = svc.refresh(&req).unwrap_err();
        assert_eq!(err.to_string(), "licenses must have exactly one license spec");

        let mut req = spec("");
        req.licenses[0].vendor = "acme".into();
        let err = svc.refresh(&req).unwrap_err();
        assert!(matches!(err, ServiceError::UnknownLicense(_)));
    }

    #[test]
    fn refresh_extends_allocation_deadline() {
        let (svc, clock) = service();
        svc.set_running();
        with_allocation(&svc, "a", start_time());

        clock.advance(Duration::seconds(4));
        let outcome = svc.refresh(&spec("a")).unwrap();
        assert_eq!(
            outcome,
            RefreshOutcome {
                invocation_id: "a".into(),
                refresh_deadline: start_time() + Duration::seconds(11),
            }
        );

        let state = svc.lock();
        let inv = state.licenses[LICENSE].get_allocated("a").unwrap();
        assert_eq!(inv.last_checkin, start_time() + Duration::seconds(4));
    }

    #[test]
    fn refresh_unknown_id_fails_when_running() {
        let (svc, _) = service();
        svc.set_running();

        let err = svc.refresh(&spec("ghost")).unwrap_err();
        assert!(matches!(err, ServiceError::NotAllocated(_)));
        assert_eq!(err.to_string(), "invocation_id not allocated: \"ghost\"");
    }

    #[test]
    fn refresh_adopts_unknown_id_during_startup() {
        let (svc, _) = service();

        let outcome = svc.refresh(&spec("survivor")).unwrap();
        assert_eq!(outcome.invocation_id, "survivor");
        assert_eq!(allocated_ids(&svc), ["survivor"]);
    }

    #[test]
    fn refresh_adoption_surrenders_existing_queue_spot() {
        // An id can get queued by allocate-adoption and then show up on
        // refresh; it must end up allocated only, never in both places.
        let (svc, _) = service();

        svc.allocate(&spec("survivor")).unwrap();
        assert_eq!(queued_ids(&svc), ["survivor"]);

        svc.refresh(&spec("survivor")).unwrap();
        assert_eq!(allocated_ids(&svc), ["survivor"]);
        assert!(queued_ids(&svc).is_empty());
    }

    #[test]
    fn refresh_adoption_fails_when_pool_exhausted() {
        let (svc, _) = service();
        with_allocation(&svc, "a", start_time());
        with_allocation(&svc, "b", start_time());

        let err = svc.refresh(&spec("survivor")).unwrap_err();
        assert!(matches!(err, ServiceError::Exhausted(_)));
        assert_eq!(err.to_string(), "\"xilinx::feature_foo\" has no available licenses");
    }

    #[test]
    fn release_requires_invocation_id() {
        let (svc, _) = service();
        let err = svc.release("").unwrap_err();
        assert_eq!(err.to_string(), "invocation_id must be set");
    }

    #[test]
    fn release_unknown_id_fails() {
        let (svc, _) = service();
        let err = svc.release("ghost").unwrap_err();
        assert!(matches!(err, ServiceError::InvocationNotFound(_)));
    }

    #[test]
    fn release_forgets_across_all_pools() {
        let mut config = test_config();
        config.licenses.push(
            serde_json::from_str(r#"{"vendor": "acme", "feature": "synth", "quantity": 1}"#)
                .unwrap(),
        );
        let (svc, _) = service_with(config);

        with_allocation(&svc, "x", start_time());
        {
            let mut state = svc.lock();
            let pool = state.licenses.get_mut("acme::synth").unwrap();
            pool.enqueue(Invocation::new("x", "owner", "tag", start_time()));
        }

        svc.release("x").unwrap();
        let (_, stats) = svc.licenses_status();
        for s in &stats {
            assert!(s.allocated.is_empty());
            assert!(s.queued.is_empty());
        }
    }

    #[test]
    fn sweep_is_a_noop_during_startup() {
        let (svc, clock) = service();
        with_allocation(&svc, "stale", start_time());
        with_queued(&svc, "waiting", start_time());

        clock.advance(Duration::seconds(60));
        svc.sweep();
        assert_eq!(allocated_ids(&svc), ["stale"]);
        assert_eq!(queued_ids(&svc), ["waiting"]);
    }

    #[test]
    fn sweep_expires_and_promotes() {
        let (svc, clock) = service();
        svc.set_running();
        with_allocation(&svc, "a", start_time());
        with_allocation(&svc, "b", start_time());
        with_queued(&svc, "q", start_time() + Duration::seconds(5));

        // At +8s: allocation cutoff is +1s (both seats stale), queue cutoff
        // is +3s (the queued entry survives and takes a freed seat).
        clock.set(start_time() + Duration::seconds(8));
        svc.sweep();

        assert_eq!(allocated_ids(&svc), ["q"]);
        assert!(queued_ids(&svc).is_empty());
    }

    #[test]
    fn sweep_expires_stale_queue_spots() {
        let (svc, clock) = service();
        svc.set_running();
        with_queued(&svc, "gone", start_time());
        with_queued(&svc, "fresh", start_time() + Duration::seconds(4));

        // Zero out capacity effects by filling the pool first.
        with_allocation(&svc, "a", start_time() + Duration::seconds(5));
        with_allocation(&svc, "b", start_time() + Duration::seconds(5));

        clock.set(start_time() + Duration::seconds(6));
        svc.sweep();
        assert_eq!(queued_ids(&svc), ["fresh"]);
    }

    #[test]
    fn licenses_status_reports_sorted_pools() {
        let mut config = test_config();
        config.licenses.push(
            serde_json::from_str(r#"{"vendor": "acme", "feature": "synth", "quantity": 1}"#)
                .unwrap(),
        );
        let (svc, _) = service_with(config);
        with_allocation(&svc, "a", start_time());

        let (phase, stats) = svc.licenses_status();
        assert_eq!(phase, Phase::Starting);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].vendor, "acme");
        assert_eq!(stats[1].vendor, "xilinx");
        assert_eq!(stats[1].allocated_count, 1);
        assert_eq!(stats[1].timestamp, start_time());
    }

    #[test]
    fn full_lifecycle_allocate_poll_release() {
        let (svc, clock) = service();
        svc.set_running();

        // Fill both seats, then queue a third invocation.
        svc.allocate(&spec("")).unwrap();
        svc.allocate(&spec("")).unwrap();
        let outcome = svc.allocate(&spec("")).unwrap();
        assert!(matches!(outcome, AllocateOutcome::Queued { queue_position: 1, .. }));

        // Seat 1 releases; the janitor promotes; the next poll sees a seat.
        svc.release("1").unwrap();
        clock.advance(Duration::seconds(1));
        svc.sweep();
        let outcome = svc.allocate(&spec("3")).unwrap();
        assert!(matches!(outcome, AllocateOutcome::Allocated { .. }));

        svc.release("2").unwrap();
        svc.release("3").unwrap();
        let (_, stats) = svc.licenses_status();
        assert_eq!(stats[0].allocated_count, 0);
    }

    #[test]
    fn outcome_json_shapes() {
        let allocated = AllocateOutcome::Allocated {
            invocation_id: "1".into(),
            refresh_deadline: start_time(),
        };
        let value = serde_json::to_value(&allocated).unwrap();
        assert_eq!(value["status"], "allocated");
        assert_eq!(value["invocation_id"], "1");

        let queued = AllocateOutcome::Queued {
            invocation_id: "2".into(),
            next_poll: start_time(),
            queue_position: 4,
        };
        let value = serde_json::to_value(&queued).unwrap();
        assert_eq!(value["status"], "queued");
        assert_eq!(value["queue_position"], 4);

        assert_eq!(serde_json::to_value(Phase::Starting).unwrap(), "STARTING");
        assert_eq!(serde_json::to_value(Phase::Running).unwrap(), "RUNNING");
    }

    #[tokio::test(start_paused = true)]
    async fn grace_timer_flips_phase_to_running() {
        let (svc, _) = service();
        let svc = Arc::new(svc);
        LicenseService::spawn_background(&svc);
        assert_eq!(svc.phase(), Phase::Starting);

        tokio::time::sleep(StdDuration::from_secs(11)).await;
        assert_eq!(svc.phase(), Phase::Running);
        svc.trigger_shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_task_sweeps_periodically() {
        let (svc, clock) = service();
        let svc = Arc::new(svc);
        svc.set_running();
        with_allocation(&svc, "stale", start_time());
        LicenseService::spawn_background(&svc);

        clock.advance(Duration::seconds(30));
        tokio::time::sleep(StdDuration::from_secs(3)).await;
        assert!(allocated_ids(&svc).is_empty());
        svc.trigger_shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_background_tasks() {
        let (svc, _) = service();
        let svc = Arc::new(svc);
        LicenseService::spawn_background(&svc);
        svc.trigger_shutdown();

        tokio::time::sleep(StdDuration::from_secs(30)).await;
        assert_eq!(svc.phase(), Phase::Starting);
    }
}
