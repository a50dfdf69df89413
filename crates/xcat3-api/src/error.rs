//! §7 error-to-response mapping: `{faultstring, faultcode}` with the
//! HTTP status the taxonomy in `xcat3_common::Error::http_status`
//! assigns. Every handler in this crate returns `ApiResult<T>` so `?`
//! propagation turns a core `Error` straight into the wire shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub xcat3_common::Error);

impl From<xcat3_common::Error> for ApiError {
    fn from(e: xcat3_common::Error) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct FaultBody {
    faultstring: String,
    faultcode: i32,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = FaultBody {
            faultstring: self.0.to_string(),
            faultcode: self.0.faultcode(),
        };
        (status, Json(body)).into_response()
    }
}
