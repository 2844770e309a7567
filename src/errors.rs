use serde::Serialize;
use uuid::Uuid;

/// Error type shared by every service, repository and policy in the crate.
///
/// Validation variants are local and recoverable: they block only the action
/// in progress and never touch persisted state. Backend variants carry the
/// remote message verbatim so it can be surfaced to the user unchanged.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Lines flagged for procurement without a justification note.
    #[error("Lines sent to procurement require a justification note: {}", format_ids(.0))]
    MissingJustification(Vec<Uuid>),

    /// The draft would lock the requisition and the requester has not confirmed it.
    #[error("Requisition exceeds the approved bill-of-materials and must be acknowledged: {}", format_reasons(.0))]
    AcknowledgementRequired(Vec<String>),

    #[error("Line {0} cannot be modified")]
    LineNotEditable(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Non-success response from the requisition backend; the message is passed through as-is.
    #[error("{message}")]
    ExternalApiError { status: u16, message: String },

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn format_reasons(reasons: &[String]) -> String {
    reasons.join("; ")
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::SerializationError(err.to_string())
        } else {
            ServiceError::ExternalServiceError(err.to_string())
        }
    }
}

impl ServiceError {
    /// Errors produced locally before anything was sent to the backend.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::MissingJustification(_)
                | Self::AcknowledgementRequired(_)
                | Self::LineNotEditable(_)
        )
    }

    /// Errors that originate from the requisition backend or the transport to it.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::ExternalApiError { .. } | Self::ExternalServiceError(_) | Self::NotFound(_)
        )
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::ExternalApiError { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }
}
