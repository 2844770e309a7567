use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{AuthUser, RbacService};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::Requisition;
use crate::repositories::RequisitionRepository;
use crate::services::budget::{check_budget, DraftLine, RequisitionDraft};
use crate::services::evaluation::EvaluationSession;
use crate::services::lock_state::{RequisitionLockStateMachine, UnlockOutcome};

/// Material the requester wants to add to a draft.
#[derive(Clone, Debug)]
pub struct MaterialRequest {
    pub material_id: Uuid,
    pub description: String,
    pub unit: String,
    pub requested_qty: Decimal,
}

type MachineRegistry = Arc<Mutex<HashMap<Uuid, Weak<RequisitionLockStateMachine>>>>;

/// Entry point for the requisition workflow: drafting, evaluation and unlock.
///
/// Clones share one lock state machine per requisition, so an unlock in
/// flight is visible to every caller holding the service.
#[derive(Clone)]
pub struct RequisitionService {
    repository: Arc<dyn RequisitionRepository>,
    event_sender: EventSender,
    rbac: RbacService,
    unlock_grace_period: Duration,
    machines: MachineRegistry,
}

impl RequisitionService {
    pub fn new(
        repository: Arc<dyn RequisitionRepository>,
        event_sender: EventSender,
        unlock_grace_period: Duration,
    ) -> Self {
        Self {
            repository,
            event_sender,
            rbac: RbacService::new(),
            unlock_grace_period,
            machines: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(
        repository: Arc<dyn RequisitionRepository>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self::new(repository, event_sender, config.unlock_grace_period())
    }

    /// Reads warehouse stock, treating an unknown material as out of stock.
    async fn inventory_level(&self, material_id: Uuid) -> Result<Decimal, ServiceError> {
        match self.repository.get_inventory(material_id).await {
            Ok(inventory) => Ok(inventory.level.max(Decimal::ZERO)),
            Err(ServiceError::NotFound(_)) => {
                warn!(%material_id, "No inventory record, assuming zero stock");
                Ok(Decimal::ZERO)
            }
            Err(e) => Err(e),
        }
    }

    /// Checks one material against the project's budget and current stock.
    #[instrument(skip(self, request), fields(material_id = %request.material_id))]
    pub async fn assess_draft_line(
        &self,
        project_id: Uuid,
        request: MaterialRequest,
    ) -> Result<DraftLine, ServiceError> {
        let budget_line = self
            .repository
            .get_budget_line(project_id, request.material_id)
            .await?;
        let inventory_level = self.inventory_level(request.material_id).await?;
        let check = check_budget(request.requested_qty, budget_line.as_ref(), inventory_level);

        Ok(DraftLine {
            material_id: request.material_id,
            description: request.description,
            unit: request.unit,
            requested_qty: request.requested_qty,
            check,
        })
    }

    /// Assesses a material and appends it to the draft.
    pub async fn add_to_draft(
        &self,
        draft: &mut RequisitionDraft,
        request: MaterialRequest,
    ) -> Result<(), ServiceError> {
        let line = self.assess_draft_line(draft.project_id, request).await?;
        draft.add_line(line)
    }

    /// Creates the requisition. A draft that would lock needs `acknowledged`.
    #[instrument(skip(self, draft), fields(project_id = %draft.project_id))]
    pub async fn submit_draft(
        &self,
        draft: RequisitionDraft,
        acknowledged: bool,
    ) -> Result<Requisition, ServiceError> {
        let new_requisition = draft.into_new_requisition(acknowledged)?;
        let record = self.repository.create_requisition(&new_requisition).await?;
        let requisition = Requisition::from(record);

        info!(
            requisition_id = %requisition.id,
            locked = requisition.is_locked(),
            "Requisition created"
        );
        self.event_sender
            .send_or_log(Event::RequisitionCreated {
                requisition_id: requisition.id,
                project_id: requisition.project_id,
                locked: requisition.is_locked(),
                timestamp: Utc::now(),
            })
            .await;

        Ok(requisition)
    }

    #[instrument(skip(self))]
    pub async fn get_requisition(&self, requisition_id: Uuid) -> Result<Requisition, ServiceError> {
        let record = self.repository.get_requisition(requisition_id).await?;
        Ok(Requisition::from(record))
    }

    pub async fn open_evaluation(&self, requisition_id: Uuid) -> Result<EvaluationSession, ServiceError> {
        let requisition = self.get_requisition(requisition_id).await?;
        Ok(EvaluationSession::from_requisition(requisition))
    }

    /// Re-reads stock for every line of the session.
    #[instrument(skip(self, session), fields(requisition_id = %session.requisition_id()))]
    pub async fn refresh_inventory(&self, session: &mut EvaluationSession) -> Result<(), ServiceError> {
        let mut levels = HashMap::new();
        for view in session.lines() {
            let material_id = view.line().material_id;
            if !levels.contains_key(&material_id) {
                levels.insert(material_id, self.inventory_level(material_id).await?);
            }
        }
        session.refresh_inventory(&levels);
        Ok(())
    }

    /// Persists the evaluation and returns a session rebuilt from the backend.
    #[instrument(skip(self, session), fields(requisition_id = %session.requisition_id()))]
    pub async fn submit_evaluation(
        &self,
        session: &EvaluationSession,
        evaluator: &str,
    ) -> Result<EvaluationSession, ServiceError> {
        if session.is_locked() {
            return Err(locked_for_evaluation());
        }
        let payload = session.assemble(evaluator)?;

        // The session may predate a lock applied by the backend.
        if self.get_requisition(session.requisition_id()).await?.is_locked() {
            warn!("Requisition was locked after the session opened");
            return Err(locked_for_evaluation());
        }

        self.repository.evaluate(&payload).await?;

        let routed = payload
            .lines
            .iter()
            .filter(|line| line.send_to_procurement)
            .count();
        info!(lines = payload.lines.len(), routed, "Evaluation submitted");
        self.event_sender
            .send_or_log(Event::EvaluationSubmitted {
                requisition_id: payload.requisition_id,
                evaluator: payload.evaluator.clone(),
                lines: payload.lines.len(),
                routed_to_procurement: routed,
                timestamp: Utc::now(),
            })
            .await;

        self.open_evaluation(session.requisition_id()).await
    }

    /// Returns the live lock state machine for the requisition, creating one
    /// if nobody holds it, and refreshes it from the backend.
    ///
    /// A refresh while an unlock is pending is discarded by the machine.
    #[instrument(skip(self))]
    pub async fn lock_machine(
        &self,
        requisition_id: Uuid,
    ) -> Result<Arc<RequisitionLockStateMachine>, ServiceError> {
        let machine = self.registered_machine(requisition_id)?;
        machine.refresh().await?;
        Ok(machine)
    }

    fn registered_machine(
        &self,
        requisition_id: Uuid,
    ) -> Result<Arc<RequisitionLockStateMachine>, ServiceError> {
        let mut machines = self
            .machines
            .lock()
            .map_err(|_| ServiceError::InvalidOperation("lock machine registry poisoned".into()))?;

        if let Some(machine) = machines.get(&requisition_id).and_then(Weak::upgrade) {
            if !machine.is_detached() {
                return Ok(machine);
            }
        }

        machines.retain(|_, machine| machine.strong_count() > 0);
        let machine = Arc::new(
            RequisitionLockStateMachine::new(
                self.repository.clone(),
                requisition_id,
                self.unlock_grace_period,
            )
            .with_events(self.event_sender.clone()),
        );
        machines.insert(requisition_id, Arc::downgrade(&machine));
        debug!(%requisition_id, live = machines.len(), "Registered lock state machine");
        Ok(machine)
    }

    /// Authorizes `user` and runs the unlock on the requisition's shared
    /// state machine. A second unlock while one is in flight gets `Conflict`.
    #[instrument(skip(self, user), fields(user = %user.username))]
    pub async fn unlock(
        &self,
        requisition_id: Uuid,
        user: &AuthUser,
    ) -> Result<UnlockOutcome, ServiceError> {
        let grant = self.rbac.authorize_unlock(user)?;
        let machine = self.lock_machine(requisition_id).await?;
        machine.unlock(&grant).await
    }
}

fn locked_for_evaluation() -> ServiceError {
    ServiceError::InvalidOperation(
        "requisition is locked and cannot be evaluated until an administrator unlocks it".to_string(),
    )
}
