use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when nobody is listening.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

// Domain events emitted by the requisition workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RequisitionCreated {
        requisition_id: Uuid,
        project_id: Uuid,
        locked: bool,
        timestamp: DateTime<Utc>,
    },
    EvaluationSubmitted {
        requisition_id: Uuid,
        evaluator: String,
        lines: usize,
        routed_to_procurement: usize,
        timestamp: DateTime<Utc>,
    },
    UnlockRequested {
        requisition_id: Uuid,
        user: String,
    },
    RequisitionUnlocked(Uuid),
    /// Unlock accepted but the backend still reports the requisition as locked.
    UnlockPendingFields {
        requisition_id: Uuid,
        reasons: Vec<String>,
    },
}

impl Event {
    pub fn requisition_id(&self) -> Uuid {
        match self {
            Event::RequisitionCreated { requisition_id, .. }
            | Event::EvaluationSubmitted { requisition_id, .. }
            | Event::UnlockRequested { requisition_id, .. }
            | Event::UnlockPendingFields { requisition_id, .. } => *requisition_id,
            Event::RequisitionUnlocked(requisition_id) => *requisition_id,
        }
    }
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Handler that writes every event to the log.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        info!(requisition_id = %event.requisition_id(), "Requisition event: {:?}", event);
        Ok(())
    }
}

// Distributes incoming events to the registered handlers until the channel closes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!(
                    "Failed to handle event: requisition_id={}, error={}",
                    event.requisition_id(),
                    e
                );
            }
        }
    }

    info!("Event processing loop stopped");
}
