use crate::errors::ServiceError;
use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

/// JSON body extractor whose rejections surface as `ServiceError::ValidationError`.
///
/// Admin handlers take it as `Result<JsonBody<T>, ServiceError>` so the
/// credential is checked before a malformed body is reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ServiceError::ValidationError(rejection.body_text())),
        }
    }
}

/// Query string extractor with the same error mapping as [`JsonBody`]
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ServiceError::ValidationError(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Payload {
        name: String,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn accepts_well_formed_bodies() {
        let JsonBody(payload) = JsonBody::<Payload>::from_request(json_request(r#"{"name":"Asha"}"#), &())
            .await
            .unwrap();
        assert_eq!(payload.name, "Asha");
    }

    #[tokio::test]
    async fn missing_and_unknown_fields_are_validation_errors() {
        let missing = JsonBody::<Payload>::from_request(json_request("{}"), &()).await;
        match missing {
            Err(ServiceError::ValidationError(msg)) => assert!(msg.contains("missing field `name`")),
            other => panic!("unexpected: {:?}", other.map(|b| b.0)),
        }

        let unknown =
            JsonBody::<Payload>::from_request(json_request(r#"{"name":"a","price":1}"#), &()).await;
        assert!(matches!(unknown, Err(ServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn missing_content_type_is_a_validation_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(r#"{"name":"Asha"}"#))
            .unwrap();
        let result = JsonBody::<Payload>::from_request(request, &()).await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }
}
