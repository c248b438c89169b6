use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::errors::AppError;

/// The caller's own upstream API key, taken from `Authorization: Bearer <key>`.
///
/// It is forwarded to the completion API for the lifetime of the request and
/// never stored.
#[derive(Clone)]
pub struct ApiKey(pub String);

impl ApiKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ApiKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::AuthRequired)?;

        let token = bearer.token().trim();
        if token.is_empty() {
            return Err(AppError::AuthRequired);
        }

        Ok(ApiKey(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, header};

    async fn extract(value: Option<&str>) -> Result<ApiKey, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = value {
            builder = builder.header(header::AUTHORIZATION, v);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        ApiKey::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_bearer_token_is_extracted() {
        let key = extract(Some("Bearer sk-test-123")).await.unwrap();
        assert_eq!(key.as_str(), "sk-test-123");
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header_is_rejected() {
        assert!(matches!(extract(None).await, Err(AppError::AuthRequired)));
        assert!(matches!(
            extract(Some("Basic dXNlcjpwYXNz")).await,
            Err(AppError::AuthRequired)
        ));
        assert!(matches!(
            extract(Some("sk-no-scheme")).await,
            Err(AppError::AuthRequired)
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        assert_eq!(format!("{:?}", ApiKey("sk-secret".into())), "ApiKey(***)");
    }
}
