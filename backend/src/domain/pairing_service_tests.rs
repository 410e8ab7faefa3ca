//! Tests for the pairing coordinator.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use super::*;
use crate::domain::ports::{MockPairingStore, PairingQuery};
use crate::domain::{
    AccountId, ConnectionDirectory, ErrorCode, PairingCode, Role, TokenStatus,
};
use crate::outbound::memory::InMemoryPairingStore;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockall::Sequence;
use rstest::{fixture, rstest};

struct FixtureClock {
    utc_now: DateTime<Utc>,
}

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc_now.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.utc_now
    }
}

/// Hands out the scripted codes in order, then repeats the last one.
struct ScriptedCodeGenerator {
    codes: Mutex<VecDeque<PairingCode>>,
    last: PairingCode,
}

impl ScriptedCodeGenerator {
    fn new(codes: &[&str]) -> Self {
        let codes: VecDeque<PairingCode> = codes
            .iter()
            .map(|raw| PairingCode::new(*raw).expect("valid scripted code"))
            .collect();
        let last = codes.back().cloned().expect("at least one scripted code");
        Self {
            codes: Mutex::new(codes),
            last,
        }
    }
}

impl CodeGenerator for ScriptedCodeGenerator {
    fn generate(&self) -> PairingCode {
        self.codes
            .lock()
            .expect("generator lock")
            .pop_front()
            .unwrap_or_else(|| self.last.clone())
    }
}

/// Store whose every call hangs, to exercise store deadlines.
struct StallingStore;

#[async_trait]
impl PairingStore for StallingStore {
    async fn create_token_if_absent(&self, _: &PairingToken) -> Result<bool, PairingStoreError> {
        std::future::pending().await
    }

    async fn find_token(&self, _: &PairingCode) -> Result<Option<PairingToken>, PairingStoreError> {
        std::future::pending().await
    }

    async fn commit_redemption(
        &self,
        _: &PairingToken,
        _: &ConnectionDraft,
    ) -> Result<Connection, PairingStoreError> {
        std::future::pending().await
    }

    async fn commit_token_update(&self, _: &PairingToken) -> Result<PairingToken, PairingStoreError> {
        std::future::pending().await
    }

    async fn list_tokens_by_issuer(
        &self,
        _: &AccountId,
    ) -> Result<Vec<PairingToken>, PairingStoreError> {
        std::future::pending().await
    }

    async fn list_connections_for_account(
        &self,
        _: &AccountId,
    ) -> Result<Vec<Connection>, PairingStoreError> {
        std::future::pending().await
    }
}

fn account(id: &str) -> AccountId {
    AccountId::new(id).expect("valid account id")
}

fn caller(id: &str, role: Role) -> CallerContext {
    CallerContext::new(account(id), role)
}

fn clock_at(utc_now: DateTime<Utc>) -> Arc<dyn Clock> {
    Arc::new(FixtureClock { utc_now })
}

#[fixture]
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0)
        .single()
        .expect("valid timestamp")
}

#[fixture]
fn store() -> Arc<InMemoryPairingStore> {
    Arc::new(InMemoryPairingStore::default())
}

fn coordinator<S>(
    store: Arc<S>,
    now: DateTime<Utc>,
    codes: &[&str],
) -> PairingCoordinator<S> {
    PairingCoordinator::new(store, clock_at(now), PairingPolicy::default())
        .with_code_generator(Arc::new(ScriptedCodeGenerator::new(codes)))
}

async fn stored_token(store: &InMemoryPairingStore, raw: &str) -> PairingToken {
    store
        .find_token(&PairingCode::new(raw).expect("valid code"))
        .await
        .expect("store read")
        .expect("token present")
}

#[rstest]
#[tokio::test]
async fn issue_invite_creates_pending_token_with_link(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let service = coordinator(store.clone(), now, &["X7K2M9QT"]);

    let issued = service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue succeeds");

    assert_eq!(issued.token.code().as_str(), "X7K2M9QT");
    assert_eq!(issued.token.status(), TokenStatus::Pending);
    assert_eq!(issued.token.redeemer_role(), Role::RoleB);
    assert_eq!(issued.token.created_at(), now);
    assert!(issued.token.expires_at().is_none());
    assert_eq!(issued.link, "pairing://invite/X7K2M9QT");
    assert_eq!(issued.qr_code_data, "X7K2M9QT");
    assert_eq!(stored_token(&store, "X7K2M9QT").await.revision(), 0);
}

#[rstest]
#[tokio::test]
async fn issue_invite_sets_expiry_when_ttl_configured(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let policy = PairingPolicy::default().with_token_ttl(Some(Duration::hours(24)));
    let service = PairingCoordinator::new(store, clock_at(now), policy)
        .with_code_generator(Arc::new(ScriptedCodeGenerator::new(&["TTL00001"])));

    let issued = service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue succeeds");

    assert_eq!(issued.token.expires_at(), Some(now + Duration::hours(24)));
}

#[rstest]
#[tokio::test]
async fn issue_invite_caps_oversized_ttl(store: Arc<InMemoryPairingStore>, now: DateTime<Utc>) {
    let policy =
        PairingPolicy::default().with_token_ttl(Some(Duration::hours(i64::from(u32::MAX))));
    let service = PairingCoordinator::new(store, clock_at(now), policy)
        .with_code_generator(Arc::new(ScriptedCodeGenerator::new(&["TTL00002"])));

    let issued = service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue succeeds");

    assert_eq!(issued.token.expires_at(), Some(now + Duration::days(365)));
}

#[rstest]
#[tokio::test]
async fn issue_invite_reports_unrepresentable_expiry(store: Arc<InMemoryPairingStore>) {
    let policy = PairingPolicy::default().with_token_ttl(Some(Duration::hours(24)));
    let service = PairingCoordinator::new(store.clone(), clock_at(DateTime::<Utc>::MAX_UTC), policy)
        .with_code_generator(Arc::new(ScriptedCodeGenerator::new(&["TTL00003"])));

    let err = service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect_err("expiry overflows");

    assert_eq!(err.code(), ErrorCode::InternalError);
    let listed = store
        .list_tokens_by_issuer(&account("p1"))
        .await
        .expect("list");
    assert!(listed.is_empty());
}

#[rstest]
#[tokio::test]
async fn issue_invite_retries_after_collision(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let first = coordinator(store.clone(), now, &["AAAA0001"]);
    first
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("first issue");
    let second = coordinator(store.clone(), now, &["AAAA0001", "AAAA0002"]);

    let issued = second
        .issue_invite(&caller("c1", Role::RoleB))
        .await
        .expect("second issue");

    assert_eq!(issued.token.code().as_str(), "AAAA0002");
    assert_eq!(
        stored_token(&store, "AAAA0001").await.issuer_id(),
        &account("p1")
    );
}

#[rstest]
#[tokio::test]
async fn issue_invite_gives_up_after_max_attempts(now: DateTime<Utc>) {
    let mut store = MockPairingStore::new();
    store
        .expect_create_token_if_absent()
        .times(3)
        .returning(|_| Ok(false));
    let policy = PairingPolicy::default().with_issue_max_attempts(3);
    let service = PairingCoordinator::new(Arc::new(store), clock_at(now), policy)
        .with_code_generator(Arc::new(ScriptedCodeGenerator::new(&["TAKEN001"])));

    let err = service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect_err("code space exhausted");

    assert_eq!(err.code(), ErrorCode::CodeSpaceExhausted);
    assert!(!err.is_retryable());
}

#[rstest]
#[tokio::test]
async fn redeem_creates_connection_with_role_slots(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let service = coordinator(store.clone(), now, &["X7K2M9QT"]);
    service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue");

    let connection = service
        .redeem("X7K2M9QT", &caller("c1", Role::RoleB))
        .await
        .expect("redeem succeeds");

    assert_eq!(connection.account_a_id, account("p1"));
    assert_eq!(connection.account_b_id, account("c1"));
    assert_eq!(connection.created_by, account("p1"));
    let token = stored_token(&store, "X7K2M9QT").await;
    assert_eq!(token.status(), TokenStatus::Used);
    assert_eq!(token.redeemed_by(), Some(&account("c1")));
    assert_eq!(token.redeemed_at(), Some(now));
}

#[rstest]
#[tokio::test]
async fn role_b_issuer_still_lands_in_b_slot(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let service = coordinator(store, now, &["BISSUER1"]);
    service
        .issue_invite(&caller("c1", Role::RoleB))
        .await
        .expect("issue");

    let connection = service
        .redeem("BISSUER1", &caller("p1", Role::RoleA))
        .await
        .expect("redeem succeeds");

    assert_eq!(connection.account_a_id, account("p1"));
    assert_eq!(connection.account_b_id, account("c1"));
    assert_eq!(connection.created_by, account("c1"));
}

#[rstest]
#[tokio::test]
async fn second_redemption_is_already_used(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let service = coordinator(store.clone(), now, &["ONCE0001"]);
    service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue");
    service
        .redeem("ONCE0001", &caller("c1", Role::RoleB))
        .await
        .expect("first redeem");

    let err = service
        .redeem("ONCE0001", &caller("c2", Role::RoleB))
        .await
        .expect_err("already used");

    assert_eq!(err.code(), ErrorCode::AlreadyUsed);
    assert_eq!(store.connection_total(), 1);
}

#[rstest]
#[tokio::test]
async fn same_role_redemption_is_refused_without_writes(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let service = coordinator(store.clone(), now, &["SAME0001"]);
    service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue");

    let err = service
        .redeem("SAME0001", &caller("p2", Role::RoleA))
        .await
        .expect_err("role conflict");

    assert_eq!(err.code(), ErrorCode::RoleConflict);
    assert_eq!(err.message(), "Cannot connect users of the same type");
    let token = stored_token(&store, "SAME0001").await;
    assert_eq!(token.status(), TokenStatus::Pending);
    assert_eq!(token.revision(), 0);
    assert_eq!(store.connection_total(), 0);
}

#[rstest]
#[case("ZZZZZZZZ")]
#[case("zzzzzzzz")]
#[case("SHORT")]
#[tokio::test]
async fn unknown_or_malformed_codes_are_invalid(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
    #[case] raw: &str,
) {
    let service = coordinator(store.clone(), now, &["UNUSED01"]);

    let err = service
        .redeem(raw, &caller("c1", Role::RoleB))
        .await
        .expect_err("invalid code");

    assert_eq!(err.code(), ErrorCode::InvalidCode);
    assert_eq!(store.connection_total(), 0);
}

#[rstest]
#[tokio::test]
async fn expired_tokens_cannot_be_redeemed(store: Arc<InMemoryPairingStore>, now: DateTime<Utc>) {
    let policy = PairingPolicy::default().with_token_ttl(Some(Duration::hours(1)));
    let issuer = PairingCoordinator::new(store.clone(), clock_at(now), policy.clone())
        .with_code_generator(Arc::new(ScriptedCodeGenerator::new(&["OLD00001"])));
    issuer
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue");
    let later = PairingCoordinator::new(store.clone(), clock_at(now + Duration::hours(2)), policy);

    let err = later
        .redeem("OLD00001", &caller("c1", Role::RoleB))
        .await
        .expect_err("expired");

    assert_eq!(err.code(), ErrorCode::Expired);
    assert_eq!(
        stored_token(&store, "OLD00001").await.status(),
        TokenStatus::Pending
    );
}

#[rstest]
#[tokio::test]
async fn redeem_surfaces_conflict_after_bounded_retries(now: DateTime<Utc>) {
    let pending = PairingToken::issue(
        PairingCode::new("BUSY0001").expect("valid code"),
        &caller("p1", Role::RoleA),
        now,
        None,
    );
    let mut store = MockPairingStore::new();
    store
        .expect_find_token()
        .times(3)
        .returning(move |_| Ok(Some(pending.clone())));
    store
        .expect_commit_redemption()
        .times(3)
        .returning(|token, _| {
            Err(PairingStoreError::revision_mismatch(
                token.code().as_str(),
                token.revision(),
            ))
        });
    let policy = PairingPolicy::default().with_redeem_conflict_retries(2);
    let service = PairingCoordinator::new(Arc::new(store), clock_at(now), policy);

    let err = service
        .redeem("BUSY0001", &caller("c1", Role::RoleB))
        .await
        .expect_err("conflict");

    assert_eq!(err.code(), ErrorCode::Conflict);
    assert!(err.is_retryable());
}

#[rstest]
#[tokio::test]
async fn losing_a_commit_race_resolves_to_already_used(now: DateTime<Utc>) {
    let pending = PairingToken::issue(
        PairingCode::new("RACE0001").expect("valid code"),
        &caller("p1", Role::RoleA),
        now,
        None,
    );
    let winner = pending
        .redeem(&caller("c9", Role::RoleB), now)
        .expect("redeemable")
        .with_revision(1);
    let mut seq = Sequence::new();
    let mut store = MockPairingStore::new();
    store
        .expect_find_token()
        .times(1)
        .in_sequence(&mut seq)
        .return_once(move |_| Ok(Some(pending)));
    store
        .expect_commit_redemption()
        .times(1)
        .in_sequence(&mut seq)
        .return_once(|_, _| Err(PairingStoreError::revision_mismatch("RACE0001", 0_u32)));
    store
        .expect_find_token()
        .times(1)
        .in_sequence(&mut seq)
        .return_once(move |_| Ok(Some(winner)));
    let service = PairingCoordinator::new(Arc::new(store), clock_at(now), PairingPolicy::default());

    let err = service
        .redeem("RACE0001", &caller("c1", Role::RoleB))
        .await
        .expect_err("race lost");

    assert_eq!(err.code(), ErrorCode::AlreadyUsed);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redeemers_yield_exactly_one_connection(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let service = Arc::new(coordinator(store.clone(), now, &["RUSH0001"]));
    service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue");

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .redeem("RUSH0001", &caller(&format!("c{n}"), Role::RoleB))
                    .await
            })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("redeemer task"));
    }

    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(winners, 1);
    for outcome in outcomes.iter().filter_map(|outcome| outcome.as_ref().err()) {
        assert_eq!(outcome.code(), ErrorCode::AlreadyUsed);
    }
    assert_eq!(store.connection_total(), 1);
}

#[rstest]
#[tokio::test]
async fn cancel_hides_invite_and_blocks_redemption(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let service = coordinator(store.clone(), now, &["KEEP0001", "DROP0001"]);
    let issuer = caller("p1", Role::RoleA);
    service.issue_invite(&issuer).await.expect("first issue");
    service.issue_invite(&issuer).await.expect("second issue");

    service
        .cancel_invite("DROP0001", &issuer)
        .await
        .expect("cancel succeeds");

    let directory = ConnectionDirectory::new(store.clone(), service.policy());
    let invites = directory
        .list_my_invites(issuer.account_id())
        .await
        .expect("listing");
    let codes: Vec<&str> = invites.iter().map(|token| token.code().as_str()).collect();
    assert_eq!(codes, ["KEEP0001"]);
    let stats = directory
        .invite_stats(issuer.account_id())
        .await
        .expect("stats");
    assert_eq!((stats.total, stats.used, stats.pending), (1, 0, 1));

    let err = service
        .redeem("DROP0001", &caller("c1", Role::RoleB))
        .await
        .expect_err("cancelled");
    assert_eq!(err.code(), ErrorCode::AlreadyUsed);
    let cancelled = stored_token(&store, "DROP0001").await;
    assert_eq!(cancelled.status(), TokenStatus::Cancelled);
    assert_eq!(cancelled.cancelled_at(), Some(now));
}

#[rstest]
#[tokio::test]
async fn cancelling_twice_is_idempotent(store: Arc<InMemoryPairingStore>, now: DateTime<Utc>) {
    let service = coordinator(store.clone(), now, &["TWICE001"]);
    let issuer = caller("p1", Role::RoleA);
    service.issue_invite(&issuer).await.expect("issue");

    service.cancel_invite("TWICE001", &issuer).await.expect("first cancel");
    service.cancel_invite("TWICE001", &issuer).await.expect("second cancel");

    assert_eq!(stored_token(&store, "TWICE001").await.revision(), 1);
}

#[rstest]
#[case("p2", false, ErrorCode::PermissionDenied)]
#[case("p1", true, ErrorCode::AlreadyUsed)]
#[tokio::test]
async fn cancel_rejections(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
    #[case] requester: &str,
    #[case] redeem_first: bool,
    #[case] expected: ErrorCode,
) {
    let service = coordinator(store.clone(), now, &["GUARD001"]);
    service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue");
    if redeem_first {
        service
            .redeem("GUARD001", &caller("c1", Role::RoleB))
            .await
            .expect("redeem");
    }

    let err = service
        .cancel_invite("GUARD001", &caller(requester, Role::RoleA))
        .await
        .expect_err("cancel refused");

    assert_eq!(err.code(), expected);
}

#[rstest]
#[tokio::test]
async fn cancel_of_unknown_code_is_invalid(store: Arc<InMemoryPairingStore>, now: DateTime<Utc>) {
    let service = coordinator(store, now, &["UNUSED01"]);

    let err = service
        .cancel_invite("NOPE0000", &caller("p1", Role::RoleA))
        .await
        .expect_err("unknown code");

    assert_eq!(err.code(), ErrorCode::InvalidCode);
}

#[rstest]
#[tokio::test]
async fn preview_reports_roles_without_writing(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
) {
    let service = coordinator(store.clone(), now, &["PEEK0001"]);
    service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect("issue");

    let preview = service
        .preview_invite("PEEK0001", &caller("c1", Role::RoleB))
        .await
        .expect("preview succeeds");
    let refused = service
        .preview_invite("PEEK0001", &caller("p2", Role::RoleA))
        .await
        .expect_err("same role");

    assert_eq!(preview.issuer_id, account("p1"));
    assert_eq!(preview.issuer_role, Role::RoleA);
    assert_eq!(preview.redeemer_role, Role::RoleB);
    assert_eq!(refused.code(), ErrorCode::RoleConflict);
    let token = stored_token(&store, "PEEK0001").await;
    assert_eq!(token.status(), TokenStatus::Pending);
    assert_eq!(token.revision(), 0);
}

#[rstest]
#[case(Role::RoleA, Role::RoleB)]
#[case(Role::RoleB, Role::RoleA)]
fn eligibility_names_the_complementary_role(
    store: Arc<InMemoryPairingStore>,
    now: DateTime<Utc>,
    #[case] role: Role,
    #[case] invited: Role,
) {
    let service = coordinator(store, now, &["UNUSED01"]);

    let eligibility = service.invite_eligibility(&caller("p1", role));

    assert!(eligibility.can_invite);
    assert_eq!(eligibility.invited_role, invited);
    assert!(eligibility.message.contains(invited.as_str()));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stalled_reads_are_service_unavailable(now: DateTime<Utc>) {
    let policy = PairingPolicy::default().with_store_timeout(StdDuration::from_millis(20));
    let service = PairingCoordinator::new(Arc::new(StallingStore), clock_at(now), policy);

    let err = service
        .redeem("SLOW0001", &caller("c1", Role::RoleB))
        .await
        .expect_err("timed out");

    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stalled_writes_are_unknown(now: DateTime<Utc>) {
    let policy = PairingPolicy::default().with_store_timeout(StdDuration::from_millis(20));
    let service = PairingCoordinator::new(Arc::new(StallingStore), clock_at(now), policy);

    let err = service
        .issue_invite(&caller("p1", Role::RoleA))
        .await
        .expect_err("timed out");

    assert_eq!(err.code(), ErrorCode::Unknown);
    assert!(err.is_retryable());
}
