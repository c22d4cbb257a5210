use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, Request, request::Parts},
};
use std::net::{IpAddr, SocketAddr};
use tower_governor::{GovernorError, key_extractor::KeyExtractor};

use crate::{error::AppError, state::AppState};

/// The network address a request is attributed to.
///
/// With proxy headers trusted this is the left-most `X-Forwarded-For`
/// entry, then `X-Real-IP`; otherwise (or when neither parses) it is the
/// peer address of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Goes through the extractor so `MockConnectInfo` is honoured in tests.
        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|ConnectInfo(addr)| addr.ip());

        resolve_client_ip(&parts.headers, peer, state.config.trust_proxy_headers)
            .map(ClientIp)
            .ok_or_else(|| {
                tracing::error!("❌ Could not determine client address");
                AppError::Internal("client address unavailable".to_string())
            })
    }
}

/// Resolves the client address from headers and the connection peer.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_proxy_headers: bool,
) -> Option<IpAddr> {
    let forwarded = trust_proxy_headers
        .then(|| {
            header_ip(headers, "x-forwarded-for", |value| value.split(',').next())
                .or_else(|| header_ip(headers, "x-real-ip", Some))
        })
        .flatten();

    forwarded.or(peer).map(|ip| ip.to_canonical())
}

fn header_ip<'a, F>(headers: &'a HeaderMap, name: &str, pick: F) -> Option<IpAddr>
where
    F: FnOnce(&'a str) -> Option<&'a str>,
{
    let value = headers.get(name)?.to_str().ok()?;
    parse_ip(pick(value)?.trim())
}

/// Keys the webhook rate limiter on the same address `ClientIp` resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIpKeyExtractor {
    pub trust_proxy_headers: bool,
}

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        resolve_client_ip(req.headers(), peer, self.trust_proxy_headers)
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Parses `1.2.3.4`, `1.2.3.4:5678`, `::1` and `[::1]:5678`.
fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|sa| sa.ip()))
}
