//! Translation boundary between the backend's free-text status names and the
//! closed enumerations used everywhere else in the crate.
//!
//! The backend reports statuses as display strings ("Pendiente",
//! "Compra entregada", "Bloqueada", ...). All lexical matching happens here.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fulfillment status of a single requisition line.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LineStatus {
    Pending,
    Requisitioned,
    PurchaseOrdered,
    Delivered,
}

/// Backend name → status. Entries are compared after lowercasing and trimming.
const LINE_STATUS_TABLE: &[(&str, LineStatus)] = &[
    ("pendiente", LineStatus::Pending),
    ("pending", LineStatus::Pending),
    ("requisitado", LineStatus::Requisitioned),
    ("requisitada", LineStatus::Requisitioned),
    ("en requisición", LineStatus::Requisitioned),
    ("requisitioned", LineStatus::Requisitioned),
    ("orden de compra", LineStatus::PurchaseOrdered),
    ("compra ordenada", LineStatus::PurchaseOrdered),
    ("compra solicitada", LineStatus::PurchaseOrdered),
    ("purchase-ordered", LineStatus::PurchaseOrdered),
    ("purchase ordered", LineStatus::PurchaseOrdered),
    ("compra entregada", LineStatus::Delivered),
    ("entregado", LineStatus::Delivered),
    ("entregada", LineStatus::Delivered),
    ("delivered", LineStatus::Delivered),
];

impl LineStatus {
    /// Maps a backend status name onto the enum.
    ///
    /// Unknown names fall back to `Pending`: only `Delivered` restricts editing,
    /// so an unrecognised name never makes a line immutable by accident.
    pub fn from_backend_name(name: &str) -> Self {
        let normalized = name.trim().to_lowercase();
        LINE_STATUS_TABLE
            .iter()
            .find(|(label, _)| *label == normalized)
            .map(|(_, status)| *status)
            .unwrap_or_else(|| {
                warn!(status = %name, "Unrecognised line status, treating as pending");
                LineStatus::Pending
            })
    }

    /// Name sent back to the backend.
    pub fn backend_name(&self) -> &'static str {
        match self {
            LineStatus::Pending => "Pendiente",
            LineStatus::Requisitioned => "Requisitado",
            LineStatus::PurchaseOrdered => "Orden de compra",
            LineStatus::Delivered => "Compra entregada",
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, LineStatus::Delivered)
    }
}

/// Requisition-level state markers that mean "locked pending administrator".
const LOCK_MARKERS: &[&str] = &["bloquead", "bloqueo", "locked", "blocked"];

/// Requisition-level state as reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RequisitionStatus {
    Open,
    Locked,
}

impl RequisitionStatus {
    pub fn from_backend_name(name: &str) -> Self {
        let normalized = name.trim().to_lowercase();
        if LOCK_MARKERS.iter().any(|marker| normalized.contains(marker)) {
            RequisitionStatus::Locked
        } else {
            RequisitionStatus::Open
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, RequisitionStatus::Locked)
    }
}
