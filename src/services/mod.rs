// Pure line and requisition policies
pub mod budget;
pub mod editability;
pub mod reconciliation;

// Stateful workflow
pub mod evaluation;
pub mod lock_state;

// Service facade over the repository
pub mod requisitions;
