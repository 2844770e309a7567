use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{
    BudgetLine, EvaluationPayload, InventoryLevel, NewRequisition, RequisitionRecord,
    UnlockRequest,
};

pub mod http;

pub use http::HttpRequisitionRepository;

/// Persistence collaborator for requisitions, budgets and inventory.
///
/// Implementations own storage and authentication. A successful `unlock` only
/// means the backend accepted the attempt; callers re-read the requisition to
/// learn the resulting state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequisitionRepository: Send + Sync {
    async fn get_requisition(&self, id: Uuid) -> Result<RequisitionRecord, ServiceError>;

    async fn create_requisition(
        &self,
        requisition: &NewRequisition,
    ) -> Result<RequisitionRecord, ServiceError>;

    async fn evaluate(&self, payload: &EvaluationPayload) -> Result<(), ServiceError>;

    async fn unlock(&self, id: Uuid, request: &UnlockRequest) -> Result<(), ServiceError>;

    /// `None` when the material is not part of the project's bill-of-materials.
    async fn get_budget_line(
        &self,
        project_id: Uuid,
        material_id: Uuid,
    ) -> Result<Option<BudgetLine>, ServiceError>;

    async fn get_inventory(&self, material_id: Uuid) -> Result<InventoryLevel, ServiceError>;
}
