use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;

use crate::{error::AppError, middleware_layer::client_ip::ClientIp, state::AppState};

/// Length of a rate limit window in seconds.
const WINDOW_SECS: i64 = 60;

/// A middleware that limits validate and heartbeat calls per client address.
///
/// Counts live in Redis under `rate_limit:client:<ip>` with a fixed one
/// minute window. Without Redis, or with a limit of zero, requests pass
/// through. Redis failures let the request through with a warning.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `client_ip` - The resolved client address.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`, or a 429 once the window's budget is spent.
pub async fn rate_limit_clients(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    req: Request<Body>,
    next: Next,
) -> Response {
    let limit = state.config.validate_rate_limit_per_minute;
    let Some(mut redis) = state.redis.clone() else {
        return next.run(req).await;
    };
    if limit == 0 {
        return next.run(req).await;
    }

    let key = format!("rate_limit:client:{}", ip);

    // TTL is read alongside INCR so a window left without an expiry, e.g.
    // after a failed EXPIRE, is re-armed on the next hit.
    let counted: redis::RedisResult<(i64, i64)> = redis::pipe()
        .atomic()
        .incr(&key, 1)
        .ttl(&key)
        .query_async(&mut redis)
        .await;
    let (count, ttl) = match counted {
        Ok(counted) => counted,
        Err(e) => {
            tracing::warn!("⚠️ Rate limit check skipped, Redis unavailable: {}", e);
            return next.run(req).await;
        }
    };

    let window = assess_window(count, ttl, limit);

    if window.arm_expiry {
        let expired: redis::RedisResult<()> = redis.expire(&key, WINDOW_SECS).await;
        if let Err(e) = expired {
            tracing::warn!("⚠️ Failed to set rate limit window for {}: {}", ip, e);
        }
    }

    if let Some(retry_after) = window.retry_after {
        return AppError::RateLimitExceeded(format!(
            "Too many requests. Try again in {} seconds",
            retry_after
        ))
        .into_response();
    }

    next.run(req).await
}

/// What to do with a request given the window's counter and its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowDecision {
    /// The counter has no expiry (`TTL` of -1 or -2) and needs one.
    arm_expiry: bool,
    /// Seconds until the window resets, when the request is over budget.
    retry_after: Option<i64>,
}

fn assess_window(count: i64, ttl: i64, limit: u32) -> WindowDecision {
    let arm_expiry = ttl < 0;
    let remaining = if arm_expiry {
        WINDOW_SECS
    } else {
        ttl.max(1)
    };
    let retry_after = (count > i64::from(limit)).then_some(remaining);

    WindowDecision {
        arm_expiry,
        retry_after,
    }
}
