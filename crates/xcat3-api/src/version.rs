//! §6 API version negotiation: `X-xCAT3-API-Version: major.minor` on the
//! request; the server always advertises its supported `min`/`max` on
//! the response, and rejects a mismatched major version with 406.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

const MIN_MAJOR: u32 = 1;
const MIN_MINOR: u32 = 0;
const MAX_MAJOR: u32 = 1;
const MAX_MINOR: u32 = 0;

fn advertise(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        "X-xCAT3-API-Minimum-Version",
        HeaderValue::from_str(&format!("{MIN_MAJOR}.{MIN_MINOR}")).expect("numeric version string is a valid header value"),
    );
    headers.insert(
        "X-xCAT3-API-Maximum-Version",
        HeaderValue::from_str(&format!("{MAX_MAJOR}.{MAX_MINOR}")).expect("numeric version string is a valid header value"),
    );
    response
}

fn parse(raw: &str) -> Option<(u32, u32)> {
    let (major, minor) = raw.split_once('.')?;
    Some((major.trim().parse().ok()?, minor.trim().parse().ok()?))
}

/// Middleware mounted on every `/v1` route: parses the request header
/// if present and rejects a mismatched major version before the
/// handler runs; always stamps the advertised min/max on the way out.
pub async fn negotiate(request: Request, next: Next) -> Response {
    if let Some(raw) = request.headers().get("X-xCAT3-API-Version").and_then(|v| v.to_str().ok()) {
        match parse(raw) {
            Some((major, _minor)) if major != MIN_MAJOR && major != MAX_MAJOR => {
                return advertise(ApiError(xcat3_common::Error::NotAcceptable(format!(
                    "requested API version {raw} is not supported; this server supports major version {MIN_MAJOR}"
                )))
                .into_response());
            }
            None => {
                return advertise(ApiError(xcat3_common::Error::NotAcceptable(format!("malformed X-xCAT3-API-Version header: {raw}"))).into_response());
            }
            _ => {}
        }
    }
    advertise(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_minor() {
        assert_eq!(parse("1.0"), Some((1, 0)));
        assert_eq!(parse("bogus"), None);
    }
}
