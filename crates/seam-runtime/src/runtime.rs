//! The miner runtime: one user's mining loop.
//!
//! Owns the engine components, the task scheduler and the local cache, and
//! publishes a live display state over a watch channel. All recurring work
//! goes through the scheduler so teardown is a single call; every operation
//! is also callable directly, which is how tests drive the runtime under a
//! manual clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use seam_core::clock::Clock;
use seam_core::session::{MiningSession, UpgradeFlags};
use seam_core::types::{Amount, Timestamp, UserId};
use seam_core::{Result, SeamError};
use seam_engine::{
    accrual, ClaimGate, ClaimReceipt, ReconcileReport, Reconciler, ResumeSnapshot, SessionManager,
    StreakOutcome, StreakTracker,
};
use seam_store::{DeviceKv, RewardStore};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::CacheMirror;
use crate::config::RuntimeConfig;
use crate::limiter::SyncRateLimiter;
use crate::scheduler::TaskScheduler;

/// Snapshot of what a UI would render right now.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayState {
    pub mining: bool,
    pub session_end: Option<Timestamp>,
    pub accrued: Amount,
    pub claimable: Amount,
    pub claimed: Amount,
    pub updated_at: Timestamp,
}

pub struct MinerRuntime {
    user: UserId,
    upgrades: UpgradeFlags,
    store: Arc<dyn RewardStore>,
    clock: Arc<dyn Clock>,
    sessions: Arc<SessionManager>,
    gate: ClaimGate,
    streaks: StreakTracker,
    reconciler: Reconciler,
    cache: CacheMirror,
    limiter: SyncRateLimiter,
    scheduler: TaskScheduler,
    retry: seam_engine::RetryPolicy,
    config: RuntimeConfig,
    /// Single-flight guard for `resume`.
    resuming: AtomicBool,
    display_tx: watch::Sender<DisplayState>,
}

impl MinerRuntime {
    pub fn new(
        user: UserId,
        upgrades: UpgradeFlags,
        store: Arc<dyn RewardStore>,
        kv: Arc<dyn DeviceKv>,
        clock: Arc<dyn Clock>,
        config: RuntimeConfig,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            clock.clone(),
            config.retry.clone(),
        ));
        let gate = ClaimGate::new(
            store.clone(),
            clock.clone(),
            sessions.clone(),
            config.retry.clone(),
        );
        let streaks = StreakTracker::new(store.clone(), clock.clone(), config.retry.clone());
        let reconciler = Reconciler::new(
            store.clone(),
            clock.clone(),
            sessions.clone(),
            config.retry.clone(),
        );
        let limiter = SyncRateLimiter::new(clock.clone(), config.min_sync_interval_secs);
        let (display_tx, _) = watch::channel(DisplayState::default());

        Self {
            user,
            upgrades,
            store,
            clock,
            sessions,
            gate,
            streaks,
            reconciler,
            cache: CacheMirror::new(kv),
            limiter,
            scheduler: TaskScheduler::new(),
            retry: config.retry.clone(),
            config,
            resuming: AtomicBool::new(false),
            display_tx,
        }
    }

    /// Live display state. The channel always holds the latest value.
    pub fn display(&self) -> watch::Receiver<DisplayState> {
        self.display_tx.subscribe()
    }

    // ── UI-facing operations ─────────────────────────────────────────────────

    pub async fn start_mining(&self) -> Result<MiningSession> {
        let session = self.sessions.start(&self.user, &self.upgrades).await?;
        if let Err(e) = self.refresh().await {
            warn!(user = %self.user, error = %e, "refresh after start failed");
        }
        Ok(session)
    }

    pub async fn claim(&self, amount: Amount) -> Result<ClaimReceipt> {
        let receipt = self.gate.claim(&self.user, amount, &self.upgrades).await?;
        if let Err(e) = self.refresh().await {
            warn!(user = %self.user, error = %e, "refresh after claim failed");
        }
        Ok(receipt)
    }

    pub async fn claim_daily_streak(&self) -> Result<Option<StreakOutcome>> {
        self.streaks.claim_daily(&self.user).await
    }

    /// Resume-from-background entry point. Runs offline reconciliation once;
    /// a second overlapping call returns `Ok(None)` instead of
    /// double-processing the same interval.
    pub async fn resume(&self) -> Result<Option<ReconcileReport>> {
        if self
            .resuming
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(user = %self.user, "resume already in flight");
            return Ok(None);
        }
        let _reset = ResetOnDrop(&self.resuming);

        let now = self.clock.now();
        // A snapshot still on device means the span since its save has not
        // been settled yet (it is cleared below only after a successful
        // reconciliation), so its save time is the authoritative start of
        // the offline interval — including on a retry after a transient
        // store failure.
        let snapshot = self.cache.load_snapshot(&self.user)?;
        let last_seen = snapshot
            .as_ref()
            .map(|s| s.saved_at)
            .or(self.cache.last_seen(&self.user)?)
            .unwrap_or(now);
        // Advance the marker before any async work, so an overlapping
        // resume that slips past the flag sees an empty interval.
        self.cache.set_last_seen(&self.user, now)?;

        let report = self
            .reconciler
            .reconcile(&self.user, snapshot.as_ref(), last_seen, &self.upgrades)
            .await?;
        if snapshot.is_some() {
            self.cache.clear_snapshot(&self.user)?;
        }
        if let Err(e) = self.refresh().await {
            warn!(user = %self.user, error = %e, "refresh after resume failed");
        }
        Ok(Some(report))
    }

    // ── Scheduled operations ─────────────────────────────────────────────────

    /// Recompute and publish the display state.
    pub async fn refresh(&self) -> Result<DisplayState> {
        let session = self.sessions.get_active(&self.user, &self.upgrades).await?;
        let balance = self
            .retry
            .read("get_balance", || self.store.get_balance(&self.user))
            .await?;
        let now = self.clock.now();

        // Displayed accrued is the session's uncredited remainder; spans
        // already on the ledger (offline credits included) show under
        // `claimable` instead.
        let accrued = match session.as_ref() {
            Some(s) => {
                let credited = self
                    .retry
                    .read("session_credited", || self.store.session_credited(&s.id))
                    .await?;
                accrual::uncredited_in_session(now, s, credited, &self.upgrades)
            }
            None => 0.0,
        };
        let state = DisplayState {
            mining: session.is_some(),
            session_end: session.as_ref().map(|s| s.end_time),
            accrued,
            claimable: balance.claimable,
            claimed: balance.claimed,
            updated_at: now,
        };
        // Nobody subscribed is fine.
        let _ = self.display_tx.send(state.clone());
        Ok(state)
    }

    /// One accrual tick: refresh the display and probe the auto-claim
    /// threshold.
    pub async fn tick(&self) {
        if let Err(e) = self.refresh().await {
            warn!(user = %self.user, error = %e, "display refresh failed");
            return;
        }
        match self.gate.auto_claim(&self.user, &self.upgrades).await {
            Ok(Some(receipt)) => {
                if let Err(e) = self.refresh().await {
                    warn!(user = %self.user, error = %e, "refresh after auto-claim failed");
                }
                debug!(user = %self.user, amount = receipt.amount, "auto-claim applied");
            }
            Ok(None) => {}
            Err(e) => warn!(user = %self.user, error = %e, "auto-claim probe failed"),
        }
    }

    /// Start a session if the user shows as idle. Ineligibility is a normal
    /// answer here, not an error.
    pub async fn auto_start_check(&self) {
        match self.sessions.get_active(&self.user, &self.upgrades).await {
            Ok(Some(_)) => {}
            Ok(None) => match self.sessions.start(&self.user, &self.upgrades).await {
                Ok(session) => info!(user = %self.user, session = %session.id, "auto-started"),
                Err(SeamError::SessionConflict) => {}
                Err(SeamError::NotEligible { reason }) => {
                    debug!(user = %self.user, reason, "not eligible; will re-check")
                }
                Err(e) => warn!(user = %self.user, error = %e, "auto-start failed"),
            },
            Err(e) => warn!(user = %self.user, error = %e, "active-session check failed"),
        }
    }

    /// Full reconciliation against the authoritative store, rate-limited.
    pub async fn full_sync(&self) {
        if !self.limiter.try_acquire() {
            return;
        }
        if let Err(e) = self.refresh().await {
            warn!(user = %self.user, error = %e, "full sync failed");
            return;
        }
        if let Err(e) = self.cache.set_last_seen(&self.user, self.clock.now()) {
            warn!(user = %self.user, error = %e, "advancing last-seen failed");
        }
    }

    /// Persist the on-device snapshot of live mining state.
    pub async fn snapshot_now(&self) -> Result<()> {
        let now = self.clock.now();
        let session = match self.sessions.get_active(&self.user, &self.upgrades).await? {
            Some(s) => s,
            None => return self.cache.set_last_seen(&self.user, now),
        };
        let balance = self
            .retry
            .read("get_balance", || self.store.get_balance(&self.user))
            .await?;
        let credited = self
            .retry
            .read("session_credited", || self.store.session_credited(&session.id))
            .await?;

        let snapshot = ResumeSnapshot {
            session_id: session.id,
            start_time: session.start_time,
            end_time: session.end_time,
            basis: accrual::basis_for_session(&session, balance.last_claim_time),
            accrued: accrual::uncredited_in_session(now, &session, credited, &self.upgrades),
            saved_at: now,
        };
        self.cache.save_snapshot(&self.user, &snapshot)?;
        self.cache.set_last_seen(&self.user, now)
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Register the recurring tasks. Idempotent in effect: respawning
    /// replaces tasks of the same name.
    pub fn start_tasks(self: &Arc<Self>) {
        let rt = self.clone();
        self.scheduler
            .spawn_interval("accrual-tick", self.config.tick, move || {
                let rt = rt.clone();
                async move { rt.tick().await }
            });

        let rt = self.clone();
        self.scheduler
            .spawn_interval("auto-start", self.config.auto_start_check, move || {
                let rt = rt.clone();
                async move { rt.auto_start_check().await }
            });

        let rt = self.clone();
        self.scheduler
            .spawn_interval("full-sync", self.config.full_sync, move || {
                let rt = rt.clone();
                async move { rt.full_sync().await }
            });

        let rt = self.clone();
        self.scheduler
            .spawn_interval("snapshot", self.config.snapshot_save, move || {
                let rt = rt.clone();
                async move {
                    if let Err(e) = rt.snapshot_now().await {
                        warn!(user = %rt.user, error = %e, "snapshot save failed");
                    }
                }
            });

        info!(user = %self.user, tasks = ?self.scheduler.names(), "runtime tasks started");
    }

    /// Cancel all tasks and attempt one final snapshot flush.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        if let Err(e) = self.snapshot_now().await {
            warn!(user = %self.user, error = %e, "final snapshot failed");
        }
        if let Err(e) = self.cache.flush() {
            warn!(user = %self.user, error = %e, "final flush failed");
        }
        info!(user = %self.user, "runtime stopped");
    }

    pub fn cache(&self) -> &CacheMirror {
        &self.cache
    }

    pub fn sync_count(&self) -> u64 {
        self.limiter.syncs()
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
