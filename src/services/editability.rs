use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::LineStatus;

/// Legend shown next to a line that has already been handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum EditabilityLegend {
    #[strum(serialize = "inventory now sufficient to update")]
    InventoryNowSufficient,
    #[strum(serialize = "already delivered, cannot be modified")]
    AlreadyDelivered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Editability {
    pub editable: bool,
    pub legend: Option<EditabilityLegend>,
}

/// Decides whether a line may still be edited in an evaluation session.
///
/// Delivered lines are frozen unless something is still missing and current
/// stock covers it. A fully delivered line has nothing to top up and stays
/// frozen. Inventory is owned elsewhere, so call this on every refresh.
pub fn line_editability(
    status: LineStatus,
    inventory_level: Decimal,
    requested_qty: Decimal,
    delivered_qty: Decimal,
) -> Editability {
    if !status.is_delivered() {
        return Editability {
            editable: true,
            legend: None,
        };
    }

    let remaining = requested_qty - delivered_qty;
    if remaining > Decimal::ZERO && inventory_level >= remaining {
        Editability {
            editable: true,
            legend: Some(EditabilityLegend::InventoryNowSufficient),
        }
    } else {
        Editability {
            editable: false,
            legend: Some(EditabilityLegend::AlreadyDelivered),
        }
    }
}
