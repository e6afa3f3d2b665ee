use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use coral_store::Error;

/// Store errors on their way out to a client; the one place where
/// error kinds turn into status codes.
#[derive(Debug)]
pub(crate) struct GatewayError(pub Error);

pub(crate) fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        Error::BadRange => StatusCode::RANGE_NOT_SATISFIABLE,
        Error::StorageError(_) | Error::RolledBackUpload(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (status_for(&self.0), self.0.to_string()).into_response()
    }
}

impl From<Error> for GatewayError {
    fn from(value: Error) -> Self {
        Self(value)
    }
}
