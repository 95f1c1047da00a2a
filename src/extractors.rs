//! Body and query extractors whose rejections render as [`AppError`], so a
//! malformed request gets the same error envelope as every other failure.

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON body. Missing, unparsable or mistyped bodies become `VALIDATION_ERROR`.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

/// Query string, rejected as `VALIDATION_ERROR` when it does not deserialize.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: QueryRejection| AppError::validation(e.body_text()))?;
        Ok(ApiQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request as HttpRequest};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Payload {
        hours: Option<f64>,
    }

    #[derive(Debug, Deserialize)]
    struct Flags {
        #[serde(default)]
        force: bool,
    }

    fn json_request(body: &str) -> Request {
        HttpRequest::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn json_body_errors_become_validation_errors() {
        let ApiJson(ok) = ApiJson::<Payload>::from_request(json_request(r#"{"hours":2.5}"#), &())
            .await
            .unwrap();
        assert_eq!(ok.hours, Some(2.5));

        for body in [r#"{"hours":"7.5"}"#, "{not json", ""] {
            let err = ApiJson::<Payload>::from_request(json_request(body), &())
                .await
                .err()
                .unwrap();
            assert!(matches!(err, AppError::Validation(_)), "{body}: {err:?}");
        }

        let no_type = HttpRequest::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(r#"{"hours":1}"#))
            .unwrap();
        let err = ApiJson::<Payload>::from_request(no_type, &()).await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn bad_query_values_become_validation_errors() {
        let (mut parts, _) = HttpRequest::builder()
            .uri("/users/x?force=yes")
            .body(())
            .unwrap()
            .into_parts();
        let err = ApiQuery::<Flags>::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Validation(_)));

        let (mut parts, _) = HttpRequest::builder()
            .uri("/users/x?force=true")
            .body(())
            .unwrap()
            .into_parts();
        let ApiQuery(flags) = ApiQuery::<Flags>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(flags.force);
    }
}
