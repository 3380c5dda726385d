use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// JSON body extractor that reports malformed payloads as `400 bad_request`
/// with the path of the offending field.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| AppError::bad_request(format!("unreadable body: {err}")))?;

        parse_json(&bytes).map(ApiJson)
    }
}

pub fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AppError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        if path == "." {
            AppError::bad_request(format!("invalid payload: {}", err.inner()))
        } else {
            AppError::bad_request(format!("invalid payload at `{path}`: {}", err.inner()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        name: String,
        #[allow(dead_code)]
        permissions: Vec<String>,
    }

    #[test]
    fn reports_the_failing_field() {
        let err = parse_json::<Payload>(br#"{"name":"ops","permissions":[1]}"#).unwrap_err();
        match err {
            AppError::BadRequest(msg) => assert!(msg.contains("permissions[0]"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn accepts_valid_payloads() {
        let parsed = parse_json::<Payload>(br#"{"name":"ops","permissions":["A"]}"#);
        assert!(parsed.is_ok());
    }
}
