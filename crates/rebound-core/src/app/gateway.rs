//! SubmissionGateway - 新しいタスクの受付
//!
//! raw body を検証し、store に pending で保存してから最初の work メッセージを
//! main queue に投入します。HTTP などの外側の層は `submit_response` の
//! (status code, ApiResponse) をそのまま返せばよい。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Stage;
use crate::domain::{MessageId, QueueName, ReboundError, Task, TaskId, WorkMessage};
use crate::ports::{Clock, QueueTransport, TaskStore};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Task {0} already exists")]
    Duplicate(TaskId),

    #[error("Failed to submit task")]
    Downstream(#[source] ReboundError),
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::Duplicate(_) => 409,
            GatewayError::Downstream(_) => 500,
        }
    }

    fn invalid(message: &str) -> Self {
        GatewayError::InvalidRequest(message.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub task_id: TaskId,
    pub status: &'static str,
    pub message_id: MessageId,
    pub submitted_at: DateTime<Utc>,
}

/// Response envelope: `{success, data}` or `{success, message, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error,
        }
    }
}

pub struct SubmissionGateway {
    store: Arc<dyn TaskStore>,
    transport: Arc<dyn QueueTransport>,
    clock: Arc<dyn Clock>,
    stage: Stage,
}

impl SubmissionGateway {
    pub fn new(
        store: Arc<dyn TaskStore>,
        transport: Arc<dyn QueueTransport>,
        clock: Arc<dyn Clock>,
        stage: Stage,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            stage,
        }
    }

    pub async fn submit(&self, raw: &str) -> Result<SubmitReceipt, GatewayError> {
        let (task_id, payload) = validate(raw).inspect_err(|e| {
            warn!(error = %e, "rejected task submission");
        })?;

        let task = Task::new(task_id.clone(), payload, self.clock.now());
        let task = self.store.put_new(task).await.map_err(|e| match e {
            ReboundError::Conflict(id) => GatewayError::Duplicate(id),
            other => GatewayError::Downstream(other),
        })?;

        let body = WorkMessage::from_task(&task)
            .encode()
            .map_err(GatewayError::Downstream)?;
        let message_id = self
            .transport
            .enqueue(QueueName::Main, body, Duration::ZERO)
            .await
            .map_err(|e| {
                error!(task_id = %task_id, error = %e, "task stored but first message not enqueued");
                GatewayError::Downstream(e)
            })?;

        info!(task_id = %task_id, message_id = %message_id, "task submitted");
        Ok(SubmitReceipt {
            task_id,
            status: "submitted",
            message_id,
            submitted_at: task.created_at,
        })
    }

    /// `submit` mapped to an HTTP status and response envelope.
    pub async fn submit_response(&self, raw: &str) -> (u16, ApiResponse) {
        match self.submit(raw).await {
            Ok(receipt) => match serde_json::to_value(&receipt) {
                Ok(data) => (200, ApiResponse::ok(data)),
                Err(e) => (
                    500,
                    ApiResponse::failure("Failed to submit task", self.detail(&e)),
                ),
            },
            Err(err) => {
                let detail = match &err {
                    GatewayError::Downstream(source) => self.detail(source),
                    _ => None,
                };
                (err.status_code(), ApiResponse::failure(err.to_string(), detail))
            }
        }
    }

    fn detail(&self, err: &dyn std::fmt::Display) -> Option<String> {
        self.stage.exposes_error_details().then(|| err.to_string())
    }
}

fn validate(raw: &str) -> Result<(TaskId, Value), GatewayError> {
    if raw.trim().is_empty() {
        return Err(GatewayError::invalid("Request body is required"));
    }
    let body: Value = serde_json::from_str(raw)
        .map_err(|_| GatewayError::invalid("Invalid JSON in request body"))?;

    let fields: &Map<String, Value> = match &body {
        Value::Null => return Err(GatewayError::invalid("Request body is required")),
        Value::Object(fields) => fields,
        _ => return Err(GatewayError::invalid("Request body must be a JSON object")),
    };

    let task_id = match fields.get("taskId") {
        None | Some(Value::Null) => return Err(GatewayError::invalid("taskId is required")),
        Some(Value::String(s)) if s.is_empty() => {
            return Err(GatewayError::invalid("taskId is required"));
        }
        Some(Value::String(s)) => TaskId::parse(s)
            .map_err(|_| GatewayError::invalid("taskId must not be blank"))?,
        Some(_) => return Err(GatewayError::invalid("taskId must be a string")),
    };

    let payload = match fields.get("payload") {
        None | Some(Value::Null) => return Err(GatewayError::invalid("payload is required")),
        Some(payload @ Value::Object(_)) => payload.clone(),
        Some(_) => return Err(GatewayError::invalid("payload must be an object")),
    };

    Ok((task_id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, TaskStatus};
    use crate::impls::{InMemoryQueueTransport, InMemoryTaskStore};
    use crate::ports::FixedClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    struct Fixture {
        store: Arc<InMemoryTaskStore>,
        transport: Arc<InMemoryQueueTransport>,
        gateway: SubmissionGateway,
    }

    fn fixture(stage: Stage) -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(InMemoryTaskStore::new(clock.clone()));
        let transport = Arc::new(InMemoryQueueTransport::new(clock.clone()));
        let gateway = SubmissionGateway::new(store.clone(), transport.clone(), clock, stage);
        Fixture {
            store,
            transport,
            gateway,
        }
    }

    #[tokio::test]
    async fn accepted_task_is_stored_and_enqueued() {
        let f = fixture(Stage::Local);
        let receipt = f
            .gateway
            .submit(r#"{"taskId":"  T1 ","payload":{"kind":"email"}}"#)
            .await
            .unwrap();
        assert_eq!(receipt.task_id.as_str(), "T1");
        assert_eq!(receipt.status, "submitted");
        assert_eq!(receipt.submitted_at, t0());

        let task = f.store.get(&receipt.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.payload, json!({"kind": "email"}));

        let sent = f.transport.sent(QueueName::Main).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_id, receipt.message_id);
        assert_eq!(sent[0].delay, Duration::ZERO);
        let msg = WorkMessage::decode(&sent[0].body).unwrap();
        assert_eq!(msg.task_id.as_str(), "T1");
        assert_eq!(msg.retry_count, 0);
    }

    #[rstest]
    #[case::empty("", "Request body is required")]
    #[case::null("null", "Request body is required")]
    #[case::not_json("{oops", "Invalid JSON in request body")]
    #[case::array("[1,2]", "Request body must be a JSON object")]
    #[case::no_task_id(r#"{"payload":{}}"#, "taskId is required")]
    #[case::empty_task_id(r#"{"taskId":"","payload":{}}"#, "taskId is required")]
    #[case::numeric_task_id(r#"{"taskId":42,"payload":{}}"#, "taskId must be a string")]
    #[case::blank_task_id(r#"{"taskId":"   ","payload":{}}"#, "taskId must not be blank")]
    #[case::no_payload(r#"{"taskId":"T1"}"#, "payload is required")]
    #[case::null_payload(r#"{"taskId":"T1","payload":null}"#, "payload is required")]
    #[case::string_payload(r#"{"taskId":"T1","payload":"x"}"#, "payload must be an object")]
    #[case::array_payload(r#"{"taskId":"T1","payload":[]}"#, "payload must be an object")]
    #[tokio::test]
    async fn invalid_requests_are_client_errors(#[case] raw: &str, #[case] message: &str) {
        let f = fixture(Stage::Local);
        let err = f.gateway.submit(raw).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), message);
        assert!(f.store.snapshot().await.is_empty());
        assert!(f.transport.sent(QueueName::Main).await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_task_id_is_a_conflict() {
        let f = fixture(Stage::Local);
        f.gateway
            .submit(r#"{"taskId":"T1","payload":{"v":1}}"#)
            .await
            .unwrap();

        let (status, response) = f
            .gateway
            .submit_response(r#"{"taskId":"T1","payload":{"v":2}}"#)
            .await;
        assert_eq!(status, 409);
        assert!(!response.success);

        let task = f.store.get(&TaskId::parse("T1").unwrap()).await.unwrap().unwrap();
        assert_eq!(task.payload, json!({"v": 1}));
        assert_eq!(f.transport.sent(QueueName::Main).await.len(), 1);
    }

    #[tokio::test]
    async fn success_envelope_carries_the_receipt() {
        let f = fixture(Stage::Prod);
        let (status, response) = f
            .gateway
            .submit_response(r#"{"taskId":"T5","payload":{}}"#)
            .await;
        assert_eq!(status, 200);

        let v = serde_json::to_value(&response).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["data"]["taskId"], "T5");
        assert_eq!(v["data"]["status"], "submitted");
        assert_eq!(v["data"]["submittedAt"], "2024-05-01T09:30:00Z");
        assert!(v.get("message").is_none());
    }

    struct BrokenTransport;

    #[async_trait]
    impl QueueTransport for BrokenTransport {
        async fn enqueue(
            &self,
            _queue: QueueName,
            _body: String,
            _delay: Duration,
        ) -> Result<MessageId, ReboundError> {
            Err(ReboundError::transient("transport", "queue unavailable"))
        }
    }

    #[rstest]
    #[case(Stage::Dev, true)]
    #[case(Stage::Prod, false)]
    #[tokio::test]
    async fn downstream_failures_hide_details_in_prod(#[case] stage: Stage, #[case] shown: bool) {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(InMemoryTaskStore::new(clock.clone()));
        let gateway = SubmissionGateway::new(store, Arc::new(BrokenTransport), clock, stage);

        let err = gateway
            .submit(r#"{"taskId":"T1","payload":{}}"#)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, GatewayError::Downstream(e) if e.kind() == ErrorKind::TransientIo)
        );

        let (status, response) = gateway
            .submit_response(r#"{"taskId":"T2","payload":{}}"#)
            .await;
        assert_eq!(status, 500);
        assert_eq!(response.message.as_deref(), Some("Failed to submit task"));
        assert_eq!(response.error.is_some(), shown);
        if shown {
            assert!(response.error.unwrap().contains("queue unavailable"));
        }
    }
}
