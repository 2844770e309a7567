use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::RequisitionRepository;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::{
    BudgetLine, EvaluationPayload, InventoryLevel, NewRequisition, RequisitionRecord,
    UnlockRequest,
};

/// `RequisitionRepository` backed by the requisitions REST API.
#[derive(Clone, Debug)]
pub struct HttpRequisitionRepository {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

/// Error body shapes the backend is known to return.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Message { message: String },
    Nested { error: NestedError },
    Plain { error: String },
}

#[derive(Deserialize)]
struct NestedError {
    message: String,
}

impl HttpRequisitionRepository {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        api_token: Option<String>,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            config.api_base_url.clone(),
            config.request_timeout(),
            config.api_token.clone(),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request and turns non-success statuses into errors carrying
    /// the backend's own message.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ServiceError> {
        let response = builder.send().await.map_err(|e| {
            warn!("Requisition backend unreachable: {}", e);
            ServiceError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_message(status, &body);
        warn!(status = status.as_u16(), %message, "Requisition backend returned an error");

        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(message));
        }
        Err(ServiceError::ExternalApiError {
            status: status.as_u16(),
            message,
        })
    }
}

fn extract_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Message { message }) => message,
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Plain { error }) => error,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
    }
}

#[async_trait]
impl RequisitionRepository for HttpRequisitionRepository {
    #[instrument(skip(self))]
    async fn get_requisition(&self, id: Uuid) -> Result<RequisitionRecord, ServiceError> {
        let response = self
            .send(self.request(Method::GET, &format!("/requisitions/{}", id)))
            .await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, requisition), fields(project_id = %requisition.project_id))]
    async fn create_requisition(
        &self,
        requisition: &NewRequisition,
    ) -> Result<RequisitionRecord, ServiceError> {
        let response = self
            .send(self.request(Method::POST, "/requisitions").json(requisition))
            .await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, payload), fields(requisition_id = %payload.requisition_id))]
    async fn evaluate(&self, payload: &EvaluationPayload) -> Result<(), ServiceError> {
        self.send(
            self.request(
                Method::PATCH,
                &format!("/requisitions/{}/evaluate", payload.requisition_id),
            )
            .json(payload),
        )
        .await?;
        debug!(lines = payload.lines.len(), "Evaluation accepted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unlock(&self, id: Uuid, request: &UnlockRequest) -> Result<(), ServiceError> {
        self.send(
            self.request(Method::POST, &format!("/requisitions/{}/unlock", id))
                .json(request),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_budget_line(
        &self,
        project_id: Uuid,
        material_id: Uuid,
    ) -> Result<Option<BudgetLine>, ServiceError> {
        let result = self
            .send(self.request(
                Method::GET,
                &format!("/projects/{}/budget-lines/{}", project_id, material_id),
            ))
            .await;

        match result {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(ServiceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn get_inventory(&self, material_id: Uuid) -> Result<InventoryLevel, ServiceError> {
        let response = self
            .send(self.request(Method::GET, &format!("/inventory/{}", material_id)))
            .await?;
        Ok(response.json().await?)
    }
}
