use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const SESSION_HEADER: &str = "x-session-id";

const MAX_SESSION_ID_LEN: usize = 128;

/// Optional client-held session identifier selecting a document store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub Option<String>);

impl SessionId {
    /// Returns the supplied id, or mints a fresh one.
    pub fn or_new(self) -> String {
        self.0.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for SessionId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty() && s.len() <= MAX_SESSION_ID_LEN)
            .map(str::to_string);

        Ok(SessionId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(value: Option<&str>) -> SessionId {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = value {
            builder = builder.header(SESSION_HEADER, v);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        SessionId::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_session_header_is_read() {
        assert_eq!(extract(Some(" abc ")).await, SessionId(Some("abc".into())));
        assert_eq!(extract(None).await, SessionId(None));
        assert_eq!(extract(Some("")).await, SessionId(None));
        let oversized = "x".repeat(200);
        assert_eq!(extract(Some(oversized.as_str())).await, SessionId(None));
    }

    #[test]
    fn test_or_new_mints_uuid() {
        let id = SessionId(None).or_new();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_eq!(SessionId(Some("keep".into())).or_new(), "keep");
    }
}
