//! Request-context derivation.

use crate::request::RawRequest;
use http::header;
use meridian_core::{CallerIdentity, RequestContext, RequestId};

/// Header carrying a caller-supplied request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the proxy chain's client addresses.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Longest propagated request ID accepted.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Derives the read-only [`RequestContext`] for a request.
///
/// - The request ID is propagated from `x-request-id` when it is a short
///   run of visible ASCII, otherwise a fresh UUID v7 is minted.
/// - The client IP is the first `x-forwarded-for` hop, else the peer address.
/// - The identity comes from the `Authorization` header.
///
/// # Example
///
/// ```rust
/// use meridian_extract::{derive_request_context, RawRequest};
///
/// let request = RawRequest::builder()
///     .uri("/users".parse().unwrap())
///     .header("x-request-id", "req-1")
///     .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
///     .header("authorization", "Bearer t0k")
///     .build();
///
/// let ctx = derive_request_context(&request);
/// assert_eq!(ctx.request_id().as_str(), "req-1");
/// assert_eq!(ctx.ip(), Some("203.0.113.9"));
/// assert_eq!(ctx.identity().token(), Some("t0k"));
/// ```
#[must_use]
pub fn derive_request_context(request: &RawRequest) -> RequestContext {
    let mut builder = RequestContext::builder()
        .method(request.method().clone())
        .path(request.path());

    if let Some(id) = request
        .header(REQUEST_ID_HEADER)
        .filter(|id| is_acceptable_request_id(id))
    {
        builder = builder.request_id(RequestId::from_header(id));
    }

    let forwarded = request.header(FORWARDED_FOR_HEADER).and_then(|chain| {
        chain
            .split(',')
            .map(str::trim)
            .find(|hop| !hop.is_empty())
            .map(str::to_string)
    });
    if let Some(ip) = forwarded.or_else(|| request.remote_addr().map(|addr| addr.ip().to_string())) {
        builder = builder.ip(ip);
    }

    if let Some(agent) = request.header(header::USER_AGENT.as_str()) {
        builder = builder.user_agent(agent);
    }

    if let Some(auth) = request.header(header::AUTHORIZATION.as_str()) {
        builder = builder.identity(CallerIdentity::from_authorization(&auth));
    }

    builder.build()
}

fn is_acceptable_request_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN && id.bytes().all(|b| b.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::net::SocketAddr;

    #[test]
    fn test_fresh_request_id_when_absent() {
        let request = RawRequest::builder().build();
        let ctx = derive_request_context(&request);
        assert_eq!(ctx.request_id().as_str().len(), 36);
        assert!(ctx.identity().is_anonymous());
    }

    #[test]
    fn test_rejects_unsafe_request_id() {
        let request = RawRequest::builder()
            .header("x-request-id", "has space")
            .build();
        let ctx = derive_request_context(&request);
        assert_ne!(ctx.request_id().as_str(), "has space");
    }

    #[test]
    fn test_ip_falls_back_to_peer() {
        let peer: SocketAddr = "192.0.2.4:5555".parse().unwrap();
        let request = RawRequest::builder().remote_addr(peer).build();
        assert_eq!(derive_request_context(&request).ip(), Some("192.0.2.4"));
    }

    #[test]
    fn test_method_path_and_agent() {
        let request = RawRequest::builder()
            .method(Method::DELETE)
            .uri("/items/4?x=1".parse().unwrap())
            .header("user-agent", "test/1.0")
            .build();
        let ctx = derive_request_context(&request);
        assert_eq!(ctx.method(), &Method::DELETE);
        assert_eq!(ctx.path(), "/items/4");
        assert_eq!(ctx.user_agent(), Some("test/1.0"));
    }
}
