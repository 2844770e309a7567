use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One bill-of-materials entry of a project's approved quotation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLine {
    /// Total quantity approved for the material across the project's lifetime.
    pub planned_qty: Decimal,
    /// Quantity already consumed by earlier requisitions. Owned by the backend.
    #[serde(default)]
    pub requisitioned_qty: Decimal,
}

impl BudgetLine {
    pub fn new(planned_qty: Decimal, requisitioned_qty: Decimal) -> Self {
        Self {
            planned_qty,
            requisitioned_qty,
        }
    }

    /// Remaining budget, never negative.
    pub fn available_qty(&self) -> Decimal {
        (self.planned_qty - self.requisitioned_qty).max(Decimal::ZERO)
    }
}

/// Warehouse stock for one material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub level: Decimal,
}
