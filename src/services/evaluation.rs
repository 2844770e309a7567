//! Evaluation sessions: warehouse staff reconcile a submitted requisition
//! against current stock and decide what goes to procurement.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{EvaluationLinePayload, EvaluationPayload, Requisition, RequisitionLine};
use crate::services::editability::{line_editability, Editability};
use crate::services::reconciliation::{reconcile, LineQuantities, ReconciledLine};

/// One line as shown to the evaluator: the persisted snapshot plus the
/// evaluator's pending edits.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineView {
    line: RequisitionLine,
    reconciled: ReconciledLine,
    procurement_choice: Option<bool>,
    note: String,
    editability: Editability,
}

impl LineView {
    pub fn from_line(line: RequisitionLine) -> Self {
        // A line already flagged in an earlier session keeps its flag.
        let procurement_choice = line.send_to_procurement.then_some(true);
        let quantities = LineQuantities::from(&line);
        let reconciled = reconcile(&quantities, line.delivered_qty, procurement_choice);
        let editability = Self::editability_of(&line);

        Self {
            note: line.note.clone(),
            line,
            reconciled,
            procurement_choice,
            editability,
        }
    }

    fn editability_of(line: &RequisitionLine) -> Editability {
        line_editability(
            line.status,
            line.inventory_level,
            line.requested_qty,
            line.delivered_qty,
        )
    }

    fn recompute(&mut self, delivered: Decimal) {
        self.reconciled = reconcile(
            &LineQuantities::from(&self.line),
            delivered,
            self.procurement_choice,
        );
    }

    fn ensure_editable(&self) -> Result<(), ServiceError> {
        if self.editability.editable {
            Ok(())
        } else {
            Err(ServiceError::LineNotEditable(self.line.id))
        }
    }

    pub fn id(&self) -> Uuid {
        self.line.id
    }

    pub fn line(&self) -> &RequisitionLine {
        &self.line
    }

    pub fn reconciled(&self) -> &ReconciledLine {
        &self.reconciled
    }

    pub fn editability(&self) -> Editability {
        self.editability
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    /// Sets the delivered quantity. Stock already handed out in an earlier
    /// session cannot be taken back, so the persisted quantity is a floor.
    pub fn edit_delivered(&mut self, delivered: Decimal) -> Result<&ReconciledLine, ServiceError> {
        self.ensure_editable()?;
        if delivered < self.line.delivered_qty {
            return Err(ServiceError::ValidationError(format!(
                "delivered quantity {} is below the {} already delivered",
                delivered.normalize(),
                self.line.delivered_qty.normalize()
            )));
        }
        self.recompute(delivered);
        Ok(&self.reconciled)
    }

    pub fn set_send_to_procurement(&mut self, send: bool) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        self.procurement_choice = Some(send);
        self.recompute(self.reconciled.delivered_qty);
        Ok(())
    }

    pub fn set_note(&mut self, note: impl Into<String>) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        self.note = note.into();
        Ok(())
    }

    /// Applies a fresh inventory reading and re-derives editability.
    ///
    /// A line that becomes frozen drops its pending edits.
    pub fn refresh_inventory(&mut self, level: Decimal) {
        self.line.inventory_level = level.max(Decimal::ZERO);
        self.editability = Self::editability_of(&self.line);

        let delivered = if self.editability.editable {
            self.reconciled.delivered_qty
        } else {
            self.procurement_choice = self.line.send_to_procurement.then_some(true);
            self.note = self.line.note.clone();
            self.line.delivered_qty
        };
        self.recompute(delivered);
    }
}

/// Builds the evaluation payload from the evaluator's line views.
///
/// Editability is recomputed here from each line's persisted state, so a
/// frozen line is never sent even when the caller passes it in. Assembly is
/// refused as a whole if no line is left to evaluate or if any included line
/// is routed to procurement without a note. Delivered quantities never drop
/// below what the line already had delivered.
pub fn assemble_evaluation(
    requisition_id: Uuid,
    evaluator: &str,
    lines: &[LineView],
) -> Result<EvaluationPayload, ServiceError> {
    let evaluator = evaluator.trim();
    if evaluator.is_empty() {
        return Err(ServiceError::ValidationError(
            "evaluator is required".to_string(),
        ));
    }

    let included: Vec<&LineView> = lines
        .iter()
        .filter(|view| {
            let editable = LineView::editability_of(&view.line).editable;
            if !editable {
                debug!(line_id = %view.line.id, "Excluding frozen line from evaluation payload");
            }
            editable
        })
        .collect();
    if included.is_empty() {
        return Err(ServiceError::ValidationError(
            "no editable lines to evaluate".to_string(),
        ));
    }

    let missing: Vec<Uuid> = included
        .iter()
        .filter(|view| view.reconciled.send_to_procurement && view.note.trim().is_empty())
        .map(|view| view.line.id)
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::MissingJustification(missing));
    }

    let lines = included
        .into_iter()
        .map(|view| {
            let requested = view.line.requested_qty;
            let send_to_procurement = view.reconciled.send_to_procurement;
            EvaluationLinePayload {
                id: view.line.id,
                delivered_qty: view
                    .reconciled
                    .delivered_qty
                    .max(view.line.delivered_qty)
                    .max(Decimal::ZERO)
                    .min(requested),
                send_to_procurement,
                note: view.note.trim().to_string(),
                procurement_suggested_qty: if send_to_procurement {
                    view.reconciled.procurement_suggested_qty
                } else {
                    Decimal::ZERO
                },
            }
        })
        .collect();

    Ok(EvaluationPayload {
        requisition_id,
        evaluator: evaluator.to_string(),
        lines,
    })
}

/// Editable view of a whole requisition during evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSession {
    requisition_id: Uuid,
    locked: bool,
    lines: Vec<LineView>,
}

impl EvaluationSession {
    pub fn from_requisition(requisition: Requisition) -> Self {
        Self {
            requisition_id: requisition.id,
            locked: requisition.is_locked(),
            lines: requisition.lines.into_iter().map(LineView::from_line).collect(),
        }
    }

    pub fn requisition_id(&self) -> Uuid {
        self.requisition_id
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lines(&self) -> &[LineView] {
        &self.lines
    }

    pub fn line(&self, line_id: Uuid) -> Option<&LineView> {
        self.lines.iter().find(|view| view.id() == line_id)
    }

    fn line_mut(&mut self, line_id: Uuid) -> Result<&mut LineView, ServiceError> {
        self.lines
            .iter_mut()
            .find(|view| view.id() == line_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Line {} not found", line_id)))
    }

    pub fn edit_delivered(
        &mut self,
        line_id: Uuid,
        delivered: Decimal,
    ) -> Result<&ReconciledLine, ServiceError> {
        self.line_mut(line_id)?.edit_delivered(delivered)
    }

    pub fn set_send_to_procurement(&mut self, line_id: Uuid, send: bool) -> Result<(), ServiceError> {
        self.line_mut(line_id)?.set_send_to_procurement(send)
    }

    pub fn set_note(&mut self, line_id: Uuid, note: impl Into<String>) -> Result<(), ServiceError> {
        self.line_mut(line_id)?.set_note(note)
    }

    /// Applies fresh stock readings keyed by material id. Materials missing
    /// from `levels` keep their previous reading.
    pub fn refresh_inventory(&mut self, levels: &HashMap<Uuid, Decimal>) {
        for view in &mut self.lines {
            if let Some(level) = levels.get(&view.line.material_id) {
                view.refresh_inventory(*level);
            }
        }
    }

    pub fn assemble(&self, evaluator: &str) -> Result<EvaluationPayload, ServiceError> {
        assemble_evaluation(self.requisition_id, evaluator, &self.lines)
    }
}
