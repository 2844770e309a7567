//! Per-line fulfillment arithmetic: how much can be delivered from the
//! warehouse now and how much has to go to procurement.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::RequisitionLine;

/// Quantities the reconciliation works from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineQuantities {
    pub requested_qty: Decimal,
    pub delivered_qty_initial: Decimal,
    pub inventory_level: Decimal,
}

impl From<&RequisitionLine> for LineQuantities {
    fn from(line: &RequisitionLine) -> Self {
        Self {
            requested_qty: line.requested_qty,
            delivered_qty_initial: line.delivered_qty,
            inventory_level: line.inventory_level,
        }
    }
}

/// Deliverable-now view of one line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledLine {
    pub delivered_qty: Decimal,
    pub shortfall: Decimal,
    pub inventory_after_delivery: Decimal,
    pub procurement_suggested_qty: Decimal,
    pub sufficient: bool,
    pub send_to_procurement: bool,
    pub message: String,
}

/// Recomputes the line after the evaluator edits the delivered quantity.
///
/// `procurement_choice` is the evaluator's explicit decision, if any. An
/// explicit choice is always honored; without one the line is routed to
/// procurement exactly when stock does not cover the shortfall.
pub fn reconcile(
    quantities: &LineQuantities,
    edited_delivered: Decimal,
    procurement_choice: Option<bool>,
) -> ReconciledLine {
    let requested = quantities.requested_qty.max(Decimal::ZERO);
    let inventory = quantities.inventory_level;

    let delivered_qty = edited_delivered.max(Decimal::ZERO).min(requested);
    let shortfall = requested - delivered_qty;
    let inventory_after_delivery = (inventory - delivered_qty).max(Decimal::ZERO);
    let procurement_suggested_qty = (shortfall - inventory).max(Decimal::ZERO);
    let sufficient = inventory >= shortfall;
    let send_to_procurement = procurement_choice.unwrap_or(!sufficient);

    ReconciledLine {
        delivered_qty,
        shortfall,
        inventory_after_delivery,
        procurement_suggested_qty,
        sufficient,
        send_to_procurement,
        message: sufficiency_message(sufficient, inventory, procurement_suggested_qty),
    }
}

/// View of the line as loaded, before any edit.
pub fn reconcile_initial(quantities: &LineQuantities) -> ReconciledLine {
    reconcile(quantities, quantities.delivered_qty_initial, None)
}

pub fn sufficiency_message(sufficient: bool, inventory: Decimal, suggested: Decimal) -> String {
    if sufficient {
        format!("Inventory sufficient: {} available", inventory.normalize())
    } else {
        format!(
            "Short {} units — can be sent to procurement",
            suggested.normalize()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quantities(requested: Decimal, delivered: Decimal, inventory: Decimal) -> LineQuantities {
        LineQuantities {
            requested_qty: requested,
            delivered_qty_initial: delivered,
            inventory_level: inventory,
        }
    }

    #[test]
    fn short_inventory_suggests_procurement() {
        let line = reconcile_initial(&quantities(dec!(10), dec!(0), dec!(4)));

        assert_eq!(line.shortfall, dec!(10));
        assert_eq!(line.procurement_suggested_qty, dec!(6));
        assert!(!line.sufficient);
        assert!(line.send_to_procurement);
        assert!(line.message.contains('6'));
        assert_eq!(line.message, "Short 6 units — can be sent to procurement");
    }

    #[test]
    fn sufficient_inventory_does_not_route() {
        let line = reconcile_initial(&quantities(dec!(10), dec!(2), dec!(8)));

        assert_eq!(line.shortfall, dec!(8));
        assert_eq!(line.inventory_after_delivery, dec!(6));
        assert_eq!(line.procurement_suggested_qty, dec!(0));
        assert!(line.sufficient);
        assert!(!line.send_to_procurement);
        assert_eq!(line.message, "Inventory sufficient: 8 available");
    }

    #[test]
    fn edits_are_clamped_to_requested_range() {
        let q = quantities(dec!(10), dec!(0), dec!(4));
        assert_eq!(reconcile(&q, dec!(-3), None).delivered_qty, dec!(0));
        assert_eq!(reconcile(&q, dec!(25), None).delivered_qty, dec!(10));
        assert_eq!(reconcile(&q, dec!(25), None).shortfall, dec!(0));
    }

    #[test]
    fn delivering_from_stock_reduces_inventory_after_delivery() {
        let line = reconcile(&quantities(dec!(10), dec!(0), dec!(4)), dec!(4), None);

        assert_eq!(line.shortfall, dec!(6));
        assert_eq!(line.inventory_after_delivery, dec!(0));
        assert_eq!(line.procurement_suggested_qty, dec!(2));
    }

    #[test]
    fn explicit_send_survives_recomputation() {
        let q = quantities(dec!(10), dec!(0), dec!(4));
        let line = reconcile(&q, dec!(10), Some(true));

        assert!(line.sufficient);
        assert!(line.send_to_procurement);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let q = quantities(dec!(7.5), dec!(1.25), dec!(3));
        let first = reconcile(&q, dec!(2.5), None);
        let second = reconcile(&q, first.delivered_qty, None);
        assert_eq!(first, second);
    }

    #[test]
    fn message_drops_trailing_zeros() {
        let line = reconcile_initial(&quantities(dec!(10.00), dec!(0), dec!(4.00)));
        assert_eq!(line.message, "Short 6 units — can be sent to procurement");
    }
}
