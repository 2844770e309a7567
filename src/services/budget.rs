//! Creation-time budget validation against a project's approved
//! bill-of-materials, and the draft requisition built from it.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{BudgetLine, LockReasons, NewRequisition, NewRequisitionLine};

/// Outcome of checking one requested quantity against the budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BudgetCheck {
    /// Material is not in the approved bill-of-materials.
    NoMatch,
    /// Request is larger than what is left of the budget.
    Exceeds { requested: Decimal, available: Decimal },
    /// Request fits. `route_to_procurement` reflects current warehouse stock.
    WithinBudget {
        available: Decimal,
        route_to_procurement: bool,
    },
}

impl BudgetCheck {
    pub fn is_blocking(&self) -> bool {
        !matches!(self, BudgetCheck::WithinBudget { .. })
    }

    pub fn route_to_procurement(&self) -> bool {
        matches!(
            self,
            BudgetCheck::WithinBudget {
                route_to_procurement: true,
                ..
            }
        )
    }

    pub fn message(&self) -> String {
        match self {
            BudgetCheck::NoMatch => "not part of the approved bill-of-materials".to_string(),
            BudgetCheck::Exceeds {
                requested,
                available,
            } => format!(
                "requested {} exceeds the available budget of {}",
                requested.normalize(),
                available.normalize()
            ),
            BudgetCheck::WithinBudget {
                available,
                route_to_procurement,
            } => {
                if *route_to_procurement {
                    format!(
                        "within budget ({} available); insufficient inventory, will be routed to procurement",
                        available.normalize()
                    )
                } else {
                    format!("within budget ({} available)", available.normalize())
                }
            }
        }
    }
}

/// Checks a requested quantity against its bill-of-materials line.
///
/// A request equal to the available quantity fits. Within budget, the line is
/// pre-flagged for procurement when warehouse stock cannot cover it; that is
/// informational and never blocking.
pub fn check_budget(
    requested_qty: Decimal,
    budget_line: Option<&BudgetLine>,
    inventory_level: Decimal,
) -> BudgetCheck {
    let Some(budget_line) = budget_line else {
        return BudgetCheck::NoMatch;
    };

    let available = budget_line.available_qty();
    if requested_qty > available {
        return BudgetCheck::Exceeds {
            requested: requested_qty,
            available,
        };
    }

    BudgetCheck::WithinBudget {
        available,
        route_to_procurement: inventory_level < requested_qty,
    }
}

/// One material added to a pending requisition, with its budget verdict.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftLine {
    pub material_id: Uuid,
    pub description: String,
    pub unit: String,
    pub requested_qty: Decimal,
    pub check: BudgetCheck,
}

impl DraftLine {
    fn lock_reason(&self) -> Option<String> {
        self.check
            .is_blocking()
            .then(|| format!("{}: {}", self.description, self.check.message()))
    }
}

/// Requisition being assembled by a requester, before it is created.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequisitionDraft {
    pub project_id: Uuid,
    pub requester: String,
    lines: Vec<DraftLine>,
}

impl RequisitionDraft {
    pub fn new(project_id: Uuid, requester: impl Into<String>) -> Self {
        Self {
            project_id,
            requester: requester.into(),
            lines: Vec::new(),
        }
    }

    pub fn add_line(&mut self, line: DraftLine) -> Result<(), ServiceError> {
        if line.requested_qty <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "{}: requested quantity must be greater than zero",
                line.description
            )));
        }
        if self.lines.iter().any(|l| l.material_id == line.material_id) {
            return Err(ServiceError::ValidationError(format!(
                "{}: material already requested in this requisition",
                line.description
            )));
        }
        self.lines.push(line);
        Ok(())
    }

    pub fn remove_line(&mut self, material_id: Uuid) -> Option<DraftLine> {
        let index = self.lines.iter().position(|l| l.material_id == material_id)?;
        Some(self.lines.remove(index))
    }

    pub fn lines(&self) -> &[DraftLine] {
        &self.lines
    }

    /// True when any line would lock the requisition on creation.
    pub fn would_lock(&self) -> bool {
        self.lines.iter().any(|line| line.check.is_blocking())
    }

    pub fn lock_reasons(&self) -> Vec<String> {
        self.lines.iter().filter_map(DraftLine::lock_reason).collect()
    }

    /// Builds the creation payload.
    ///
    /// A draft that would lock is refused unless the requester acknowledged it;
    /// when acknowledged the requisition is created locked with the blocking
    /// messages stored as its lock reasons.
    pub fn into_new_requisition(self, acknowledged: bool) -> Result<NewRequisition, ServiceError> {
        if self.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "requisition has no lines".to_string(),
            ));
        }

        let reasons = self.lock_reasons();
        let locked = !reasons.is_empty();
        if locked && !acknowledged {
            return Err(ServiceError::AcknowledgementRequired(reasons));
        }

        Ok(NewRequisition {
            project_id: self.project_id,
            requester: self.requester,
            locked,
            observations: locked.then(|| LockReasons::to_observations(&reasons)),
            lines: self
                .lines
                .into_iter()
                .map(|line| NewRequisitionLine {
                    send_to_procurement: line.check.route_to_procurement(),
                    material_id: line.material_id,
                    description: line.description,
                    unit: line.unit,
                    requested_qty: line.requested_qty,
                })
                .collect(),
        })
    }
}
