// Requisition domain models
pub mod budget;
pub mod lock_reasons;
pub mod requisition;
pub mod status;

pub use budget::{BudgetLine, InventoryLevel};
pub use lock_reasons::LockReasons;
pub use requisition::{
    EvaluationLinePayload, EvaluationPayload, NewRequisition, NewRequisitionLine, Requisition,
    RequisitionLine, RequisitionLineRecord, RequisitionRecord, StatusName, UnlockRequest,
};
pub use status::{LineStatus, RequisitionStatus};
