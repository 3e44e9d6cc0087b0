//! HTTP error mapping

use crate::error::PipelineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

pub type ApiResult<T> = Result<T, ApiError>;

/// Wrapper translating pipeline errors into client-facing responses.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError(err)
    }
}

/// Status classification for an error.
pub fn status_for(err: &PipelineError) -> StatusCode {
    match err.root() {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::UnknownField(_)
        | PipelineError::MissingColumns { .. }
        | PipelineError::InvalidValue { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::PipelineLoad(_)
        | PipelineError::Internal(_)
        | PipelineError::BatchRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error body shared by every transport.
///
/// Server-side failures are answered with a generic message; logging them
/// is the caller's job.
pub fn error_body(err: &PipelineError) -> (StatusCode, Value) {
    let status = status_for(err);

    let message = if err.is_client_error() {
        err.to_string()
    } else {
        "Internal server error".to_string()
    };

    let mut body = json!({
        "error": message,
        "kind": err.kind(),
        "status": status.as_u16(),
    });

    if let PipelineError::MissingColumns { columns } = err.root() {
        body["missing_columns"] = json!(columns);
    }
    if let PipelineError::BatchRecord { index, .. } = err {
        body["record_index"] = json!(index);
    }

    (status, body)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = error_body(&self.0);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            status_for(&PipelineError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&PipelineError::MissingColumns { columns: vec![] }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&PipelineError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let batch = PipelineError::BatchRecord {
            index: 2,
            source: Box::new(PipelineError::InvalidValue {
                column: "Debt ratio %".into(),
                value: f64::NAN,
            }),
        };
        assert_eq!(status_for(&batch), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_error_body_details() {
        let err = PipelineError::BatchRecord {
            index: 4,
            source: Box::new(PipelineError::MissingColumns {
                columns: vec!["Debt ratio %".into()],
            }),
        };
        let (status, body) = error_body(&err);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "missing_columns");
        assert_eq!(body["record_index"], 4);
        assert_eq!(body["missing_columns"], json!(["Debt ratio %"]));
        assert_eq!(body["status"], 422);
    }

    #[test]
    fn test_internal_error_message_is_generic() {
        let (status, body) = error_body(&PipelineError::Internal("secret state".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn test_error_body_leaves_logging_to_caller() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let buffer = buffer.clone();
            move || Capture(buffer.clone())
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            error_body(&PipelineError::Internal("secret state".into()));
            assert!(buffer.lock().unwrap().is_empty());

            tracing::error!("captured");
            assert!(!buffer.lock().unwrap().is_empty());
        });
    }
}
