//! Operation envelope and reply types exchanged with the operation router.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::types::RequestId;

/// Operation names understood by the notification handler.
pub mod operations {
    pub const BATCH_BULK_NOTIFICATION: &str = "batchBulkNotification";
    pub const BATCH_UPDATE_NOTIFICATION: &str = "batchUpdateNotification";
    pub const BATCH_ENROLL_OPERATION: &str = "batchEnrollOperation";
}

/// Payload keys.
pub mod keys {
    pub const COURSE_BATCH: &str = "courseBatch";
    pub const OPERATION_TYPE: &str = "operationType";
    pub const OLD: &str = "old";
    pub const NEW: &str = "new";
    pub const COURSE_MAP: &str = "courseMap";
    pub const USER_ID: &str = "userId";
}

fn new_request_id() -> RequestId {
    uuid::Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// OperationEnvelope
// ---------------------------------------------------------------------------

/// A named operation plus its key/value payload.
///
/// Built by the caller, consumed once by the router. When the caller does
/// not provide a `requestId`, a fresh one is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationEnvelope {
    pub operation: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default = "new_request_id")]
    pub request_id: RequestId,
}

impl OperationEnvelope {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            payload: Map::new(),
            request_id: new_request_id(),
        }
    }

    /// Add a payload entry.
    ///
    /// Takes anything already convertible to JSON; structured values go in
    /// as `json!(..)` or `serde_json::to_value(..)?` at the call site.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<RequestId>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Deserialize a required payload entry.
    pub fn get<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, CoreError> {
        let value = self
            .payload
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or(CoreError::MissingField(key))?;
        serde_json::from_value(value.clone())
            .map_err(|e| CoreError::Validation(format!("Invalid {key}: {e}")))
    }

    /// A required, non-blank string entry.
    pub fn get_str(&self, key: &'static str) -> Result<&str, CoreError> {
        match self.payload.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
            Some(Value::String(_)) | Some(Value::Null) | None => Err(CoreError::MissingField(key)),
            Some(other) => Err(CoreError::Validation(format!(
                "Invalid {key}: expected a string, got {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationReply
// ---------------------------------------------------------------------------

/// What a caller gets back on its reply channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationReply {
    Ok {
        request_id: RequestId,
        result: Value,
    },
    Error {
        request_id: RequestId,
        code: String,
        message: String,
    },
    Unsupported {
        request_id: RequestId,
        operation: String,
    },
}

impl OperationReply {
    pub fn request_id(&self) -> &str {
        match self {
            OperationReply::Ok { request_id, .. }
            | OperationReply::Error { request_id, .. }
            | OperationReply::Unsupported { request_id, .. } => request_id,
        }
    }

    pub fn unsupported(envelope: &OperationEnvelope) -> Self {
        OperationReply::Unsupported {
            request_id: envelope.request_id.clone(),
            operation: envelope.operation.clone(),
        }
    }

    pub fn error(request_id: impl Into<RequestId>, err: &CoreError) -> Self {
        OperationReply::Error {
            request_id: request_id.into(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
