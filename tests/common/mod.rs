#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use requisition_core::{
    auth::{AuthUser, RbacService, UnlockGrant, ROLE_ADMIN},
    errors::ServiceError,
    events::{self, Event},
    models::{
        BudgetLine, EvaluationPayload, InventoryLevel, LockReasons, NewRequisition,
        RequisitionLineRecord, RequisitionRecord, StatusName, UnlockRequest,
    },
    repositories::RequisitionRepository,
};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

pub const LOCKED: &str = "Bloqueada";
pub const OPEN: &str = "Pendiente";
pub const APPROVED: &str = "Aprobada";

#[derive(Default)]
struct FakeState {
    requisitions: HashMap<Uuid, RequisitionRecord>,
    budget_lines: HashMap<(Uuid, Uuid), BudgetLine>,
    inventory: HashMap<Uuid, Decimal>,
    created: Vec<NewRequisition>,
    evaluations: Vec<EvaluationPayload>,
    unlock_calls: Vec<(Uuid, String)>,
    unlock_rejection: Option<(u16, String)>,
    status_after_unlock: Option<String>,
    get_calls: usize,
}

/// In-memory requisition backend.
///
/// Unlocks can be held open with [`FakeRepository::hold_unlocks`] so tests can
/// act while one is in flight.
#[derive(Default)]
pub struct FakeRepository {
    state: Mutex<FakeState>,
    unlock_gate: Mutex<Option<Arc<Notify>>>,
    unlock_entered: Notify,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_requisition(&self, record: RequisitionRecord) {
        self.state
            .lock()
            .unwrap()
            .requisitions
            .insert(record.id, record);
    }

    /// Changes the requisition's status as the backend would on its own.
    pub fn set_status(&self, id: Uuid, status: &str) {
        if let Some(record) = self.state.lock().unwrap().requisitions.get_mut(&id) {
            record.status = StatusName::new(status);
        }
    }

    pub fn set_budget_line(&self, project_id: Uuid, material_id: Uuid, line: BudgetLine) {
        self.state
            .lock()
            .unwrap()
            .budget_lines
            .insert((project_id, material_id), line);
    }

    pub fn set_inventory(&self, material_id: Uuid, level: Decimal) {
        self.state.lock().unwrap().inventory.insert(material_id, level);
    }

    pub fn reject_unlocks(&self, status: u16, message: &str) {
        self.state.lock().unwrap().unlock_rejection = Some((status, message.to_string()));
    }

    /// Status the backend reports after an accepted unlock. Defaults to approved.
    pub fn status_after_unlock(&self, status: &str) {
        self.state.lock().unwrap().status_after_unlock = Some(status.to_string());
    }

    pub fn hold_unlocks(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.unlock_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once an unlock call has reached the backend.
    pub async fn unlock_entered(&self) {
        self.unlock_entered.notified().await;
    }

    pub fn requisition(&self, id: Uuid) -> Option<RequisitionRecord> {
        self.state.lock().unwrap().requisitions.get(&id).cloned()
    }

    pub fn created(&self) -> Vec<NewRequisition> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn evaluations(&self) -> Vec<EvaluationPayload> {
        self.state.lock().unwrap().evaluations.clone()
    }

    pub fn unlock_calls(&self) -> Vec<(Uuid, String)> {
        self.state.lock().unwrap().unlock_calls.clone()
    }

    pub fn get_calls(&self) -> usize {
        self.state.lock().unwrap().get_calls
    }
}

#[async_trait]
impl RequisitionRepository for FakeRepository {
    async fn get_requisition(&self, id: Uuid) -> Result<RequisitionRecord, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.get_calls += 1;
        state
            .requisitions
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("Requisition {} not found", id)))
    }

    async fn create_requisition(
        &self,
        requisition: &NewRequisition,
    ) -> Result<RequisitionRecord, ServiceError> {
        let mut state = self.state.lock().unwrap();

        let lines = requisition
            .lines
            .iter()
            .map(|line| RequisitionLineRecord {
                id: Uuid::new_v4(),
                material_id: line.material_id,
                description: line.description.clone(),
                unit: line.unit.clone(),
                requested_qty: line.requested_qty,
                delivered_qty: Decimal::ZERO,
                inventory_level: state
                    .inventory
                    .get(&line.material_id)
                    .copied()
                    .unwrap_or_default(),
                status: StatusName::new(OPEN),
                send_to_procurement: line.send_to_procurement,
                procurement_suggested_qty: Decimal::ZERO,
                note: None,
            })
            .collect();

        for line in &requisition.lines {
            if let Some(budget) = state
                .budget_lines
                .get_mut(&(requisition.project_id, line.material_id))
            {
                budget.requisitioned_qty += line.requested_qty;
            }
        }

        let record = RequisitionRecord {
            id: Uuid::new_v4(),
            project_id: requisition.project_id,
            status: StatusName::new(if requisition.locked { LOCKED } else { OPEN }),
            observations: requisition.observations.clone(),
            lines,
        };
        state.created.push(requisition.clone());
        state.requisitions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn evaluate(&self, payload: &EvaluationPayload) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .requisitions
            .get_mut(&payload.requisition_id)
            .ok_or_else(|| ServiceError::NotFound("requisition".into()))?;

        for update in &payload.lines {
            if let Some(line) = record.lines.iter_mut().find(|l| l.id == update.id) {
                line.delivered_qty = update.delivered_qty;
                line.send_to_procurement = update.send_to_procurement;
                line.procurement_suggested_qty = update.procurement_suggested_qty;
                line.note = Some(update.note.clone());
                if update.delivered_qty >= line.requested_qty {
                    line.status = StatusName::new("Compra entregada");
                } else if update.send_to_procurement {
                    line.status = StatusName::new("Requisitado");
                }
            }
        }
        state.evaluations.push(payload.clone());
        Ok(())
    }

    async fn unlock(&self, id: Uuid, request: &UnlockRequest) -> Result<(), ServiceError> {
        self.state
            .lock()
            .unwrap()
            .unlock_calls
            .push((id, request.user.clone()));

        let gate = self.unlock_gate.lock().unwrap().clone();
        self.unlock_entered.notify_one();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some((status, message)) = state.unlock_rejection.clone() {
            return Err(ServiceError::ExternalApiError { status, message });
        }
        let next = state
            .status_after_unlock
            .clone()
            .unwrap_or_else(|| APPROVED.to_string());
        let record = state
            .requisitions
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound("requisition".into()))?;
        record.status = StatusName::new(next);
        Ok(())
    }

    async fn get_budget_line(
        &self,
        project_id: Uuid,
        material_id: Uuid,
    ) -> Result<Option<BudgetLine>, ServiceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .budget_lines
            .get(&(project_id, material_id))
            .cloned())
    }

    async fn get_inventory(&self, material_id: Uuid) -> Result<InventoryLevel, ServiceError> {
        self.state
            .lock()
            .unwrap()
            .inventory
            .get(&material_id)
            .map(|level| InventoryLevel { level: *level })
            .ok_or_else(|| ServiceError::NotFound(format!("Inventory for {} not found", material_id)))
    }
}

pub fn requisition(status: &str, reasons: &[&str], lines: Vec<RequisitionLineRecord>) -> RequisitionRecord {
    let reasons: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
    RequisitionRecord {
        id: Uuid::new_v4(),
        project_id: Uuid::new_v4(),
        status: StatusName::new(status),
        observations: (!reasons.is_empty()).then(|| LockReasons::to_observations(&reasons)),
        lines,
    }
}

pub fn line(
    status: &str,
    requested: Decimal,
    delivered: Decimal,
    inventory: Decimal,
) -> RequisitionLineRecord {
    RequisitionLineRecord {
        id: Uuid::new_v4(),
        material_id: Uuid::new_v4(),
        description: "Varilla 3/8".into(),
        unit: "pza".into(),
        requested_qty: requested,
        delivered_qty: delivered,
        inventory_level: inventory,
        status: StatusName::new(status),
        send_to_procurement: false,
        procurement_suggested_qty: Decimal::ZERO,
        note: None,
    }
}

pub fn admin() -> AuthUser {
    AuthUser::new("direccion", &[ROLE_ADMIN])
}

pub fn admin_grant() -> UnlockGrant {
    RbacService::new()
        .authorize_unlock(&admin())
        .expect("admin is allowed to unlock")
}

/// Drains every event sent so far.
pub fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    seen
}

pub fn event_channel() -> (events::EventSender, mpsc::Receiver<Event>) {
    events::channel(64)
}
