use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::lock_reasons::LockReasons;
use super::status::{LineStatus, RequisitionStatus};

/// Status object as nested by the backend (`{"name": "Pendiente"}`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusName {
    pub name: String,
}

impl StatusName {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Requisition as returned by `GET /requisitions/{id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequisitionRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status: StatusName,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub lines: Vec<RequisitionLineRecord>,
}

/// One line of a [`RequisitionRecord`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequisitionLineRecord {
    pub id: Uuid,
    pub material_id: Uuid,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    pub requested_qty: Decimal,
    #[serde(default)]
    pub delivered_qty: Decimal,
    #[serde(default)]
    pub inventory_level: Decimal,
    pub status: StatusName,
    #[serde(default)]
    pub send_to_procurement: bool,
    #[serde(default)]
    pub procurement_suggested_qty: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

/// One requested material, normalized from the backend record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequisitionLine {
    pub id: Uuid,
    pub material_id: Uuid,
    pub description: String,
    pub unit: String,
    pub requested_qty: Decimal,
    pub delivered_qty: Decimal,
    pub inventory_level: Decimal,
    pub status: LineStatus,
    pub send_to_procurement: bool,
    pub procurement_suggested_qty: Decimal,
    pub note: String,
}

impl From<RequisitionLineRecord> for RequisitionLine {
    fn from(record: RequisitionLineRecord) -> Self {
        let requested_qty = record.requested_qty.max(Decimal::ZERO);
        let delivered_qty = record.delivered_qty.max(Decimal::ZERO).min(requested_qty);
        if delivered_qty != record.delivered_qty {
            warn!(
                line_id = %record.id,
                reported = %record.delivered_qty,
                requested = %requested_qty,
                "Backend delivered quantity out of range, clamping"
            );
        }

        Self {
            id: record.id,
            material_id: record.material_id,
            description: record.description,
            unit: record.unit,
            requested_qty,
            delivered_qty,
            inventory_level: record.inventory_level.max(Decimal::ZERO),
            status: LineStatus::from_backend_name(&record.status.name),
            send_to_procurement: record.send_to_procurement,
            procurement_suggested_qty: record.procurement_suggested_qty,
            note: record.note.unwrap_or_default(),
        }
    }
}

/// Requisition aggregate with lines in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct Requisition {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status: RequisitionStatus,
    pub lock_reasons: LockReasons,
    pub lines: Vec<RequisitionLine>,
}

impl Requisition {
    pub fn is_locked(&self) -> bool {
        self.status.is_locked()
    }

    pub fn line(&self, line_id: Uuid) -> Option<&RequisitionLine> {
        self.lines.iter().find(|line| line.id == line_id)
    }
}

impl From<RequisitionRecord> for Requisition {
    fn from(record: RequisitionRecord) -> Self {
        Self {
            id: record.id,
            project_id: record.project_id,
            status: RequisitionStatus::from_backend_name(&record.status.name),
            lock_reasons: LockReasons::parse(record.observations.as_deref()),
            lines: record.lines.into_iter().map(RequisitionLine::from).collect(),
        }
    }
}

/// Body of `POST /requisitions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequisition {
    pub project_id: Uuid,
    pub requester: String,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    pub lines: Vec<NewRequisitionLine>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequisitionLine {
    pub material_id: Uuid,
    pub description: String,
    pub unit: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub requested_qty: Decimal,
    pub send_to_procurement: bool,
}

/// Body of `PATCH /requisitions/{id}/evaluate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationPayload {
    pub requisition_id: Uuid,
    pub evaluator: String,
    pub lines: Vec<EvaluationLinePayload>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationLinePayload {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub delivered_qty: Decimal,
    pub send_to_procurement: bool,
    pub note: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub procurement_suggested_qty: Decimal,
}

/// Body of `POST /requisitions/{id}/unlock`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub user: String,
}
