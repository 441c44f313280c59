use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};

use crate::application::auth::Principal;

use super::error::ApiError;
use super::rate_limit::METRIC_RATE_LIMITED_TOTAL;
use super::state::ApiState;

/// Decode an optional bearer token. Anonymous requests pass through; a bad token is a 401.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers().get(header::AUTHORIZATION)) else {
        return next.run(request).await;
    };

    match state.auth.tokens().verify(&token) {
        Ok(principal) => {
            request.extensions_mut().insert(principal.clone());
            let mut response = next.run(request).await;
            response.extensions_mut().insert(principal);
            response
        }
        Err(err) => {
            debug!(target = "storytell::http::auth", error = %err, "bearer token rejected");
            ApiError::unauthorized("invalid or expired token").into_response()
        }
    }
}

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let forwarded = state
        .rate_limiter
        .trusts_forwarded_for()
        .then(|| forwarded_for(request.headers()))
        .flatten();
    let key = client_key(
        request.extensions().get::<Principal>(),
        forwarded.as_deref(),
        peer,
    );

    if !state.rate_limiter.allow(&key) {
        counter!(METRIC_RATE_LIMITED_TOTAL).increment(1);
        warn!(
            target = "storytell::http::rate_limit",
            client = %key,
            path = %request.uri().path(),
            limit = state.rate_limiter.limit(),
            "rate limit exceeded"
        );
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs());
    }

    next.run(request).await
}

/// Authenticated callers are limited per user, anonymous ones per address.
///
/// The forwarded address is only passed in when the deployment trusts the
/// proxy that sets it; otherwise the socket peer is used.
fn client_key(
    principal: Option<&Principal>,
    forwarded: Option<&str>,
    peer: Option<IpAddr>,
) -> String {
    if let Some(principal) = principal {
        return format!("user:{}", principal.id);
    }
    match (forwarded, peer) {
        (Some(addr), _) => format!("ip:{addr}"),
        (None, Some(addr)) => format!("ip:{addr}"),
        (None, None) => "anonymous".to_string(),
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?.trim();
    (!bearer.is_empty()).then(|| bearer.to_string())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        let value = HeaderValue::from_static("Bearer abc.def");
        assert_eq!(extract_token(Some(&value)).as_deref(), Some("abc.def"));

        let value = HeaderValue::from_static("Basic abc");
        assert_eq!(extract_token(Some(&value)), None);

        let value = HeaderValue::from_static("Bearer  ");
        assert_eq!(extract_token(Some(&value)), None);
    }

    #[test]
    fn client_key_prefers_principal() {
        let principal = Principal {
            id: Uuid::nil(),
            username: "reader".into(),
            is_admin: false,
        };
        let peer: IpAddr = "192.0.2.7".parse().expect("ip");

        assert_eq!(
            client_key(Some(&principal), Some("10.0.0.1"), Some(peer)),
            format!("user:{}", Uuid::nil())
        );
        assert_eq!(client_key(None, None, Some(peer)), "ip:192.0.2.7");
        assert_eq!(client_key(None, Some("10.0.0.1"), Some(peer)), "ip:10.0.0.1");
        assert_eq!(client_key(None, None, None), "anonymous");
    }

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        assert_eq!(forwarded_for(&headers).as_deref(), Some("10.0.0.1"));
        assert_eq!(forwarded_for(&HeaderMap::new()), None);
    }
}
