//! Newline-delimited JSON framing for operations read from stdin and the
//! replies written back to stdout.

use lernia_core::operation::{OperationEnvelope, OperationReply};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Envelope has no operation name")]
    MissingOperation,
}

/// Parse one input line.
///
/// Blank lines and lines starting with `#` are skipped (`Ok(None)`).
pub fn parse_line(line: &str) -> Result<Option<OperationEnvelope>, IngestError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let envelope: OperationEnvelope = serde_json::from_str(line)?;
    if envelope.operation.trim().is_empty() {
        return Err(IngestError::MissingOperation);
    }
    Ok(Some(envelope))
}

/// Output line for a handled envelope.
///
/// Operations without a reply contract are reported as `accepted`.
pub fn reply_line(request_id: &str, reply: Option<&OperationReply>) -> String {
    let value = match reply {
        Some(reply) => serde_json::to_value(reply).unwrap_or_else(|e| {
            json!({ "status": "error", "request_id": request_id, "code": "internalError", "message": e.to_string() })
        }),
        None => json!({ "status": "accepted", "request_id": request_id }),
    };
    value.to_string()
}

/// Output line for input that could not be parsed.
pub fn rejection_line(err: &IngestError) -> String {
    json!({ "status": "error", "code": "invalidRequestData", "message": err.to_string() }).to_string()
}
