//! Requisition Core Library
//!
//! Materials-requisition reconciliation for construction projects: per-line
//! delivery arithmetic, budget validation at creation time, evaluation
//! sessions and the admin-gated lock state machine.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod repositories;
pub mod services;

pub use errors::ServiceError;
pub use services::lock_state::{LockState, RequisitionLockStateMachine, UnlockOutcome};
pub use services::requisitions::RequisitionService;
