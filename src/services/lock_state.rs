use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::UnlockGrant;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{LockReasons, Requisition, RequisitionRecord, RequisitionStatus, UnlockRequest};
use crate::repositories::RequisitionRepository;

/// Lock state of a requisition as last confirmed by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockState {
    Unlocked,
    Locked { reasons: LockReasons },
}

impl LockState {
    pub fn from_record(record: &RequisitionRecord) -> Self {
        match RequisitionStatus::from_backend_name(&record.status.name) {
            RequisitionStatus::Locked => LockState::Locked {
                reasons: LockReasons::parse(record.observations.as_deref()),
            },
            RequisitionStatus::Open => LockState::Unlocked,
        }
    }

    pub fn from_requisition(requisition: &Requisition) -> Self {
        if requisition.is_locked() {
            LockState::Locked {
                reasons: requisition.lock_reasons.clone(),
            }
        } else {
            LockState::Unlocked
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked { .. })
    }
}

/// Logical timestamp handed out when a fetch is issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchDisposition {
    Applied(LockState),
    Discarded,
}

/// Result of an accepted unlock attempt, decided by the re-read that follows it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnlockOutcome {
    Unlocked,
    /// The backend accepted the attempt but still reports the requisition as locked.
    StillLocked { reasons: LockReasons },
    /// The view was detached while the unlock was in flight.
    Detached,
}

impl UnlockOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            UnlockOutcome::Unlocked => "requisition unlocked",
            UnlockOutcome::StillLocked { .. } => "partially unlocked, pending fields remain",
            UnlockOutcome::Detached => "view detached before the unlock resolved",
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: LockState,
    unlock_pending: bool,
    // Highest ticket whose result was applied. Older results never overwrite it.
    applied: u64,
    detached: bool,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the pending flag however the unlock future ends, including cancellation.
struct PendingUnlock<'a> {
    inner: &'a Mutex<Inner>,
}

impl Drop for PendingUnlock<'_> {
    fn drop(&mut self) {
        lock(self.inner).unlock_pending = false;
    }
}

/// Tracks whether one requisition is locked and drives the admin unlock.
///
/// Every fetch is stamped with a [`FetchTicket`] from a monotonic counter.
/// A result is applied only if no fresher one has been applied, no unlock is
/// in flight, and the view has not been detached. The unlock's own re-read
/// is applied last, so fetches issued before it can no longer clobber it.
pub struct RequisitionLockStateMachine {
    repository: Arc<dyn RequisitionRepository>,
    requisition_id: Uuid,
    grace_period: Duration,
    event_sender: Option<EventSender>,
    tickets: AtomicU64,
    inner: Mutex<Inner>,
}

impl RequisitionLockStateMachine {
    pub fn new(
        repository: Arc<dyn RequisitionRepository>,
        requisition_id: Uuid,
        grace_period: Duration,
    ) -> Self {
        Self {
            repository,
            requisition_id,
            grace_period,
            event_sender: None,
            tickets: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                state: LockState::Unlocked,
                unlock_pending: false,
                applied: 0,
                detached: false,
            }),
        }
    }

    pub fn with_events(mut self, event_sender: EventSender) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    pub fn requisition_id(&self) -> Uuid {
        self.requisition_id
    }

    pub fn snapshot(&self) -> LockState {
        lock(&self.inner).state.clone()
    }

    pub fn is_locked(&self) -> bool {
        lock(&self.inner).state.is_locked()
    }

    pub fn is_unlock_pending(&self) -> bool {
        lock(&self.inner).unlock_pending
    }

    pub fn is_detached(&self) -> bool {
        lock(&self.inner).detached
    }

    /// Stops all further state updates. Called when the owning view goes away.
    pub fn detach(&self) {
        lock(&self.inner).detached = true;
        debug!(requisition_id = %self.requisition_id, "Lock state detached");
    }

    /// Stamps a fetch that is about to be issued.
    pub fn begin_fetch(&self) -> FetchTicket {
        FetchTicket(self.tickets.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Applies a fetch result unless it is stale or arrives during an unlock.
    pub fn apply_fetch(&self, ticket: FetchTicket, record: &RequisitionRecord) -> FetchDisposition {
        let mut inner = lock(&self.inner);

        if inner.detached {
            return FetchDisposition::Discarded;
        }
        if inner.unlock_pending {
            debug!(ticket = ticket.0, "Discarding fetch result while unlock is pending");
            return FetchDisposition::Discarded;
        }
        if ticket.0 <= inner.applied {
            debug!(
                ticket = ticket.0,
                applied = inner.applied,
                "Discarding stale fetch result"
            );
            return FetchDisposition::Discarded;
        }

        inner.state = LockState::from_record(record);
        inner.applied = ticket.0;
        FetchDisposition::Applied(inner.state.clone())
    }

    /// Re-reads the requisition and applies the result.
    #[instrument(skip(self), fields(requisition_id = %self.requisition_id))]
    pub async fn refresh(&self) -> Result<FetchDisposition, ServiceError> {
        let ticket = self.begin_fetch();
        let record = self.repository.get_requisition(self.requisition_id).await?;
        Ok(self.apply_fetch(ticket, &record))
    }

    /// Asks the backend to unlock, waits the grace period, then re-reads.
    ///
    /// A rejected attempt leaves the state untouched and returns the backend's
    /// error. An accepted attempt resolves to whatever the re-read reports.
    #[instrument(skip(self, grant), fields(requisition_id = %self.requisition_id, user = %grant.username()))]
    pub async fn unlock(&self, grant: &UnlockGrant) -> Result<UnlockOutcome, ServiceError> {
        {
            let mut inner = lock(&self.inner);
            if inner.detached {
                return Ok(UnlockOutcome::Detached);
            }
            if inner.unlock_pending {
                return Err(ServiceError::Conflict(format!(
                    "an unlock is already in progress for requisition {}",
                    self.requisition_id
                )));
            }
            inner.unlock_pending = true;
        }
        let pending = PendingUnlock { inner: &self.inner };

        self.emit(Event::UnlockRequested {
            requisition_id: self.requisition_id,
            user: grant.username().to_string(),
        })
        .await;

        let request = UnlockRequest {
            user: grant.username().to_string(),
        };
        if let Err(e) = self.repository.unlock(self.requisition_id, &request).await {
            warn!("Unlock rejected: {}", e);
            return Err(e);
        }

        if !self.grace_period.is_zero() {
            tokio::time::sleep(self.grace_period).await;
        }

        let ticket = self.begin_fetch();
        let record = self.repository.get_requisition(self.requisition_id).await?;
        let fresh = LockState::from_record(&record);

        {
            let mut inner = lock(&self.inner);
            if inner.detached {
                return Ok(UnlockOutcome::Detached);
            }
            inner.state = fresh.clone();
            inner.applied = inner.applied.max(ticket.0);
        }
        drop(pending);

        let outcome = match fresh {
            LockState::Unlocked => {
                info!("Requisition unlocked");
                self.emit(Event::RequisitionUnlocked(self.requisition_id)).await;
                UnlockOutcome::Unlocked
            }
            LockState::Locked { reasons } => {
                warn!("Unlock accepted but requisition is still locked");
                self.emit(Event::UnlockPendingFields {
                    requisition_id: self.requisition_id,
                    reasons: reasons.as_list().into_iter().map(str::to_string).collect(),
                })
                .await;
                UnlockOutcome::StillLocked { reasons }
            }
        };

        Ok(outcome)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, RbacService, ROLE_ADMIN};
    use crate::events;
    use crate::models::StatusName;
    use crate::repositories::MockRequisitionRepository;
    use assert_matches::assert_matches;

    fn record(id: Uuid, status: &str, observations: Option<&str>) -> RequisitionRecord {
        RequisitionRecord {
            id,
            project_id: Uuid::nil(),
            status: StatusName::new(status),
            observations: observations.map(str::to_string),
            lines: Vec::new(),
        }
    }

    fn admin_grant() -> UnlockGrant {
        RbacService::new()
            .authorize_unlock(&AuthUser::new("admin", &[ROLE_ADMIN]))
            .unwrap()
    }

    fn machine(repo: MockRequisitionRepository, id: Uuid) -> RequisitionLockStateMachine {
        RequisitionLockStateMachine::new(Arc::new(repo), id, Duration::ZERO)
    }

    #[test]
    fn state_derives_from_status_name() {
        let id = Uuid::new_v4();
        assert_eq!(
            LockState::from_record(&record(id, "Bloqueada", Some(r#"["Excede presupuesto"]"#))),
            LockState::Locked {
                reasons: LockReasons::Structured(vec!["Excede presupuesto".into()])
            }
        );
        assert_eq!(
            LockState::from_record(&record(id, "Pendiente", None)),
            LockState::Unlocked
        );
    }

    #[test]
    fn freshest_fetch_wins() {
        let id = Uuid::new_v4();
        let m = machine(MockRequisitionRepository::new(), id);

        let older = m.begin_fetch();
        let newer = m.begin_fetch();
        assert_matches!(
            m.apply_fetch(newer, &record(id, "Bloqueada", None)),
            FetchDisposition::Applied(LockState::Locked { .. })
        );
        assert_eq!(
            m.apply_fetch(older, &record(id, "Pendiente", None)),
            FetchDisposition::Discarded
        );
        assert!(m.is_locked());
    }

    #[tokio::test]
    async fn unlock_applies_fresh_state_and_fences_older_fetches() {
        let id = Uuid::new_v4();
        let mut repo = MockRequisitionRepository::new();
        repo.expect_unlock()
            .withf(|_, request| request.user == "admin")
            .times(1)
            .returning(|_, _| Ok(()));
        repo.expect_get_requisition()
            .times(1)
            .returning(move |_| Ok(record(id, "Aprobada", None)));

        let m = machine(repo, id);
        m.apply_fetch(m.begin_fetch(), &record(id, "Bloqueada", None));
        let stale = m.begin_fetch();

        let outcome = m.unlock(&admin_grant()).await.unwrap();
        assert_eq!(outcome, UnlockOutcome::Unlocked);

        assert_eq!(
            m.apply_fetch(stale, &record(id, "Bloqueada", None)),
            FetchDisposition::Discarded
        );
        assert_eq!(m.snapshot(), LockState::Unlocked);
        assert!(!m.is_unlock_pending());
    }

    #[tokio::test]
    async fn accepted_unlock_that_stays_locked_is_partial() {
        let id = Uuid::new_v4();
        let mut repo = MockRequisitionRepository::new();
        repo.expect_unlock().returning(|_, _| Ok(()));
        repo.expect_get_requisition()
            .returning(move |_| Ok(record(id, "Bloqueada", Some("falta firma"))));

        let (sender, mut rx) = events::channel(8);
        let m = machine(repo, id).with_events(sender);

        let outcome = m.unlock(&admin_grant()).await.unwrap();
        assert_eq!(
            outcome,
            UnlockOutcome::StillLocked {
                reasons: LockReasons::Opaque("falta firma".into())
            }
        );
        assert_eq!(outcome.message(), "partially unlocked, pending fields remain");

        assert_matches!(rx.recv().await, Some(Event::UnlockRequested { .. }));
        assert_eq!(
            rx.recv().await,
            Some(Event::UnlockPendingFields {
                requisition_id: id,
                reasons: vec!["falta firma".into()],
            })
        );
    }

    #[tokio::test]
    async fn rejected_unlock_keeps_state_and_clears_pending() {
        let id = Uuid::new_v4();
        let mut repo = MockRequisitionRepository::new();
        repo.expect_unlock().returning(|_, _| {
            Err(ServiceError::ExternalApiError {
                status: 403,
                message: "No autorizado".into(),
            })
        });
        repo.expect_get_requisition().never();

        let m = machine(repo, id);
        m.apply_fetch(m.begin_fetch(), &record(id, "Bloqueada", None));

        let err = m.unlock(&admin_grant()).await.unwrap_err();
        assert_eq!(err.to_string(), "No autorizado");
        assert!(m.is_locked());
        assert!(!m.is_unlock_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn unlock_waits_for_the_grace_period() {
        let id = Uuid::new_v4();
        let mut repo = MockRequisitionRepository::new();
        repo.expect_unlock().returning(|_, _| Ok(()));
        repo.expect_get_requisition()
            .returning(move |_| Ok(record(id, "Pendiente", None)));

        let m = RequisitionLockStateMachine::new(Arc::new(repo), id, Duration::from_millis(500));
        let started = tokio::time::Instant::now();
        m.unlock(&admin_grant()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn detached_machine_ignores_everything() {
        let id = Uuid::new_v4();
        let mut repo = MockRequisitionRepository::new();
        repo.expect_unlock().never();

        let m = machine(repo, id);
        m.detach();

        assert_eq!(
            m.apply_fetch(m.begin_fetch(), &record(id, "Bloqueada", None)),
            FetchDisposition::Discarded
        );
        assert_eq!(m.unlock(&admin_grant()).await.unwrap(), UnlockOutcome::Detached);
        assert_eq!(m.snapshot(), LockState::Unlocked);
    }
}
