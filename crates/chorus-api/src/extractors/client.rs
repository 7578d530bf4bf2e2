//! Client metadata recorded on sessions.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use chorus_realtime::gateway::ClientInfo;

/// User agent and address of the caller, as reported by headers.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta(pub ClientInfo);

impl ClientMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        // The first hop of X-Forwarded-For is the original client.
        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .or_else(|| header("x-real-ip").map(String::from));

        Self(ClientInfo {
            user_agent: header("user-agent").map(String::from),
            ip_address,
        })
    }

    pub fn into_inner(self) -> ClientInfo {
        self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        headers.insert("user-agent", HeaderValue::from_static("chorus-test/1.0"));

        let ClientMeta(info) = ClientMeta::from_headers(&headers);
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("chorus-test/1.0"));
    }

    #[test]
    fn test_missing_headers() {
        let ClientMeta(info) = ClientMeta::from_headers(&HeaderMap::new());
        assert!(info.ip_address.is_none());
        assert!(info.user_agent.is_none());
    }
}
