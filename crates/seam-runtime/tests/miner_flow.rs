//! End-to-end miner runtime flows over the in-memory store, driven by a
//! manual clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use seam_core::clock::ManualClock;
use seam_core::ledger::{BalanceSummary, EntryKind, LedgerEntry};
use seam_core::session::{MiningSession, UpgradeFlags};
use seam_core::streak::StreakState;
use seam_core::types::{Amount, EntryId, IdempotencyKey, SessionId, Timestamp, UserId};
use seam_core::SeamError;
use seam_engine::RetryPolicy;
use seam_runtime::{MinerRuntime, RuntimeConfig};
use seam_store::{Eligibility, MemoryKv, MemoryStore, RewardStore};

fn user() -> UserId {
    UserId::new("alice")
}

fn setup(now: i64, upgrades: UpgradeFlags) -> (Arc<MemoryStore>, Arc<ManualClock>, Arc<MinerRuntime>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".parse().expect("valid filter")),
        )
        .with_test_writer()
        .try_init();
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::at(now));
    let config = RuntimeConfig {
        retry: RetryPolicy::none(),
        ..Default::default()
    };
    let runtime = Arc::new(MinerRuntime::new(
        user(),
        upgrades,
        store.clone(),
        Arc::new(MemoryKv::new()),
        clock.clone(),
        config,
    ));
    (store, clock, runtime)
}

#[tokio::test]
async fn claim_keeps_the_displayed_total_continuous() {
    let (_, clock, rt) = setup(0, UpgradeFlags::default());
    rt.start_mining().await.unwrap();

    clock.set(2 * 3_600);
    let before = rt.refresh().await.unwrap();
    let expected_accrued = 2.0 * 3_600.0 * 50.0 / 86_400.0;
    assert!((before.accrued - expected_accrued).abs() < 1e-9);
    assert_eq!(before.claimable, 0.0);

    rt.claim(2.0).await.unwrap();

    let after = rt.display().borrow().clone();
    assert_eq!(after.accrued, 0.0);
    let before_total = before.claimable + before.accrued + before.claimed;
    let after_total = after.claimable + after.accrued + after.claimed;
    assert!((after_total - before_total).abs() < 1e-9);
    assert!((after.claimed - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn resume_credits_the_offline_interval_once() {
    let (store, clock, rt) = setup(0, UpgradeFlags::default());
    let session = rt.start_mining().await.unwrap();

    clock.set(1_000);
    rt.snapshot_now().await.unwrap();

    // App is backgrounded until t=5000.
    clock.set(5_000);
    let first = rt.resume().await.unwrap().unwrap();
    let expected = 4_000.0 * 50.0 / 86_400.0;
    assert!((first.credited - expected).abs() < 1e-9);

    // A second resume sees an empty interval and no leftover snapshot.
    let second = rt.resume().await.unwrap().unwrap();
    assert_eq!(second.credited, 0.0);

    let total = store.session_credited(&session.id).await.unwrap();
    assert!((total - first.credited).abs() < 1e-9);
}

#[tokio::test]
async fn claim_after_resume_totals_the_true_earnings() {
    let (store, clock, rt) = setup(0, UpgradeFlags::default());
    let session = rt.start_mining().await.unwrap();

    clock.set(1_000);
    rt.snapshot_now().await.unwrap();

    // Resume credits the offline span [1000, 5000); the live display then
    // only carries the [0, 1000) remainder as accrued.
    clock.set(5_000);
    rt.resume().await.unwrap().unwrap();
    let earned = 5_000.0 * 50.0 / 86_400.0;
    let state = rt.refresh().await.unwrap();
    assert!((state.claimable + state.accrued - earned).abs() < 1e-9);

    // Claiming everything moves exactly the true earnings, never the
    // offline span a second time.
    rt.claim(earned).await.unwrap();
    let total = store.session_credited(&session.id).await.unwrap();
    assert!((total - earned).abs() < 1e-9);

    let state = rt.display().borrow().clone();
    assert!((state.claimed - earned).abs() < 1e-9);
    assert!(state.accrued < 1e-9);
}

/// Store wrapper that fails the next `fail_balance_reads` balance reads
/// with a network error, then recovers.
struct FlakyStore {
    inner: MemoryStore,
    fail_balance_reads: AtomicUsize,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_balance_reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RewardStore for FlakyStore {
    async fn start_session(
        &self,
        user: &UserId,
        duration_secs: i64,
        now: Timestamp,
    ) -> seam_core::Result<MiningSession> {
        self.inner.start_session(user, duration_secs, now).await
    }

    async fn get_active_session(&self, user: &UserId) -> seam_core::Result<Option<MiningSession>> {
        self.inner.get_active_session(user).await
    }

    async fn complete_session(&self, session: &SessionId) -> seam_core::Result<Amount> {
        self.inner.complete_session(session).await
    }

    async fn get_balance(&self, user: &UserId) -> seam_core::Result<BalanceSummary> {
        let should_fail = self
            .fail_balance_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(SeamError::Network("connection reset".to_string()));
        }
        self.inner.get_balance(user).await
    }

    async fn append_ledger_entry(
        &self,
        user: &UserId,
        session: Option<SessionId>,
        kind: EntryKind,
        amount: Amount,
        created_at: Timestamp,
        idempotency_key: Option<IdempotencyKey>,
    ) -> seam_core::Result<EntryId> {
        self.inner
            .append_ledger_entry(user, session, kind, amount, created_at, idempotency_key)
            .await
    }

    async fn recent_entries(
        &self,
        user: &UserId,
        kind: EntryKind,
        since: Timestamp,
    ) -> seam_core::Result<Vec<LedgerEntry>> {
        self.inner.recent_entries(user, kind, since).await
    }

    async fn session_credited(&self, session: &SessionId) -> seam_core::Result<Amount> {
        self.inner.session_credited(session).await
    }

    async fn get_streak_state(&self, user: &UserId) -> seam_core::Result<StreakState> {
        self.inner.get_streak_state(user).await
    }

    async fn set_streak_state(&self, state: &StreakState) -> seam_core::Result<()> {
        self.inner.set_streak_state(state).await
    }

    async fn get_eligibility(&self, user: &UserId) -> seam_core::Result<Eligibility> {
        self.inner.get_eligibility(user).await
    }
}

#[tokio::test]
async fn resume_survives_a_transient_store_failure() {
    let store = Arc::new(FlakyStore::new());
    let clock = Arc::new(ManualClock::at(0));
    let rt = Arc::new(MinerRuntime::new(
        user(),
        UpgradeFlags::default(),
        store.clone(),
        Arc::new(MemoryKv::new()),
        clock.clone(),
        RuntimeConfig {
            retry: RetryPolicy::none(),
            ..Default::default()
        },
    ));
    let session = rt.start_mining().await.unwrap();

    clock.set(1_000);
    rt.snapshot_now().await.unwrap();

    // The first resume hits a network error mid-reconciliation and fails.
    clock.set(5_000);
    store.fail_balance_reads.store(1, Ordering::SeqCst);
    assert!(rt.resume().await.is_err());

    // The snapshot survived the failure, so a retry still knows where the
    // offline interval started and credits it in full.
    assert!(rt.cache().load_snapshot(&user()).unwrap().is_some());
    let report = rt.resume().await.unwrap().unwrap();
    let expected = 4_000.0 * 50.0 / 86_400.0;
    assert!((report.credited - expected).abs() < 1e-9);

    let total = store.session_credited(&session.id).await.unwrap();
    assert!((total - expected).abs() < 1e-9);
    assert!(rt.cache().load_snapshot(&user()).unwrap().is_none());
}

#[tokio::test]
async fn expired_session_rolls_over_on_refresh() {
    let (_, clock, rt) = setup(0, UpgradeFlags::default());
    let first = rt.start_mining().await.unwrap();

    clock.set(first.end_time + 10);
    let state = rt.refresh().await.unwrap();
    assert!(state.mining);
    assert_eq!(state.session_end, Some(first.end_time + 10 + 86_400));
    // The old session's full reward landed in claimable.
    assert!((state.claimable - 50.0).abs() < 1e-9);
}

#[tokio::test]
async fn tick_auto_claims_past_the_threshold() {
    let (_, clock, rt) = setup(0, UpgradeFlags::default());
    rt.start_mining().await.unwrap();

    // 6 hours in: accrued 12.5 > threshold 10.
    clock.set(6 * 3_600);
    rt.tick().await;

    let state = rt.display().borrow().clone();
    assert!((state.claimed - 12.5).abs() < 1e-6);
    assert_eq!(state.accrued, 0.0);
}

#[tokio::test]
async fn auto_start_check_restarts_an_idle_user() {
    let (_, _, rt) = setup(0, UpgradeFlags::default());
    let before = rt.refresh().await.unwrap();
    assert!(!before.mining);

    rt.auto_start_check().await;
    let after = rt.refresh().await.unwrap();
    assert!(after.mining);
}

#[tokio::test]
async fn full_sync_is_rate_limited() {
    let (_, clock, rt) = setup(0, UpgradeFlags::default());
    rt.full_sync().await;
    rt.full_sync().await;
    assert_eq!(rt.sync_count(), 1);

    clock.advance(120);
    rt.full_sync().await;
    assert_eq!(rt.sync_count(), 2);
}

#[tokio::test]
async fn shutdown_persists_a_final_snapshot() {
    let (_, clock, rt) = setup(0, UpgradeFlags::default());
    let session = rt.start_mining().await.unwrap();

    clock.set(1_000);
    rt.shutdown().await;

    let snapshot = rt.cache().load_snapshot(&user()).unwrap().unwrap();
    assert_eq!(snapshot.session_id, session.id);
    assert_eq!(snapshot.saved_at, 1_000);
    assert_eq!(rt.cache().last_seen(&user()).unwrap(), Some(1_000));
}

#[tokio::test]
async fn extended_upgrade_flows_through_the_runtime() {
    let upgrades = UpgradeFlags {
        rate_multiplier: 2.0,
        extended_session: true,
    };
    let (_, clock, rt) = setup(0, upgrades);
    let session = rt.start_mining().await.unwrap();
    assert_eq!(session.duration_secs(), 2 * 86_400);

    clock.set(3_600);
    let state = rt.refresh().await.unwrap();
    assert!((state.accrued - 3_600.0 * 100.0 / 86_400.0).abs() < 1e-9);
}

#[tokio::test]
async fn streak_claims_once_per_day() {
    let (_, clock, rt) = setup(1_700_000_000, UpgradeFlags::default());
    let first = rt.claim_daily_streak().await.unwrap().unwrap();
    assert_eq!(first.streak, 1);
    assert_eq!(first.reward, 500.0);

    clock.advance(3_600);
    assert!(rt.claim_daily_streak().await.unwrap().is_none());

    clock.advance(86_400);
    let next = rt.claim_daily_streak().await.unwrap().unwrap();
    assert_eq!(next.streak, 2);
}
