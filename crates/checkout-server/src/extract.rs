//! Request Extractors

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};

use checkout_core::{User, pages::RequestMeta};

use crate::auth::verify_token;
use crate::error::ApiError;
use crate::state::AppState;

/// JSON body whose rejections use the API error shape
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Authenticated merchant, resolved from a bearer token
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;
        let user_id = verify_token(&state.config.jwt_secret, token)?;

        let user = state
            .store
            .get_user(&user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Unknown user".into()))?;
        Ok(AuthUser(user))
    }
}

/// Caller address and user agent for submission audit fields
#[derive(Clone, Debug, Default)]
pub struct ClientMeta(pub RequestMeta);

/// First hop of `X-Forwarded-For`, else the peer address when known
fn client_ip(parts: &Parts) -> Option<String> {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from);

    forwarded.or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Ok(ClientMeta(RequestMeta {
            ip_address: client_ip(parts),
            user_agent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let parts = parts(
            Request::builder().header("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&parts).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_peer_address_fallback() {
        let mut parts = parts(Request::builder());
        assert_eq!(client_ip(&parts), None);

        let addr: SocketAddr = "198.51.100.4:5555".parse().unwrap();
        parts.extensions.insert(ConnectInfo(addr));
        assert_eq!(client_ip(&parts).as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer tok".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("tok"));
    }
}
