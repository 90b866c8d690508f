//! Cross-origin resource sharing.

use async_trait::async_trait;
use portico_kernel::{
    CorsSettings, ExecutionContext, ExecutionFailure, GatewayError, GatewayResult, HttpMethod,
    Processor,
};
use tracing::debug;

pub const ORIGIN: &str = "Origin";
pub const REQUEST_METHOD: &str = "Access-Control-Request-Method";
pub const REQUEST_HEADERS: &str = "Access-Control-Request-Headers";
pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
pub const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
pub const EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
pub const MAX_AGE: &str = "Access-Control-Max-Age";

fn is_preflight(ctx: &ExecutionContext) -> bool {
    ctx.request.method == HttpMethod::Options
        && ctx.request.headers.contains(ORIGIN)
        && ctx.request.headers.contains(REQUEST_METHOD)
}

/// Value of `Access-Control-Allow-Origin` for an allowed `origin`.
fn allow_origin_value(cors: &CorsSettings, origin: &str) -> String {
    if cors.allow_origin.iter().any(|o| o == "*") && !cors.allow_credentials {
        "*".to_string()
    } else {
        origin.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Preflight
// ─────────────────────────────────────────────────────────────────────────────

/// Answers preflight requests on behalf of the API.
///
/// A valid preflight ends the response and interrupts execution; an invalid
/// one fails with `400 CORS_PREFLIGHT_FAILED`.  Other requests pass through.
pub struct CorsPreflightProcessor {
    cors: CorsSettings,
}

impl CorsPreflightProcessor {
    pub fn new(cors: CorsSettings) -> Self {
        Self { cors }
    }

    fn rejection(&self, ctx: &ExecutionContext) -> Option<&'static str> {
        let headers = &ctx.request.headers;
        let origin = headers.get(ORIGIN).unwrap_or_default();
        if !self.cors.is_origin_allowed(origin) {
            return Some("origin");
        }

        let method = headers.get(REQUEST_METHOD).unwrap_or_default().trim();
        if !self.cors.allow_methods.is_empty()
            && !self.cors.allow_methods.iter().any(|m| m.eq_ignore_ascii_case(method))
        {
            return Some("method");
        }

        let requested = headers
            .get(REQUEST_HEADERS)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty());
        let allowed = |name: &str| {
            self.cors
                .allow_headers
                .iter()
                .any(|h| h == "*" || h.eq_ignore_ascii_case(name))
        };
        for name in requested {
            if !allowed(name) {
                return Some("headers");
            }
        }
        None
    }
}

#[async_trait]
impl Processor for CorsPreflightProcessor {
    fn id(&self) -> &str {
        "cors-preflight"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        if !is_preflight(ctx) {
            return Ok(());
        }

        if let Some(reason) = self.rejection(ctx) {
            debug!(request_id = %ctx.request.id, reason, "preflight rejected");
            return Err(GatewayError::failure(
                ExecutionFailure::new(400)
                    .key("CORS_PREFLIGHT_FAILED")
                    .message("Request is not valid according to CORS specifications"),
            ));
        }

        let origin = ctx.request.headers.get(ORIGIN).unwrap_or_default().to_string();
        let headers = &mut ctx.response.headers;
        headers.set(ALLOW_ORIGIN, allow_origin_value(&self.cors, &origin));
        if !self.cors.allow_methods.is_empty() {
            headers.set(ALLOW_METHODS, self.cors.allow_methods.join(", "));
        }
        if !self.cors.allow_headers.is_empty() {
            headers.set(ALLOW_HEADERS, self.cors.allow_headers.join(", "));
        }
        if self.cors.allow_credentials {
            headers.set(ALLOW_CREDENTIALS, "true");
        }
        if self.cors.max_age >= 0 {
            headers.set(MAX_AGE, self.cors.max_age.to_string());
        }
        ctx.response.status = 200;
        ctx.response.end();
        Err(GatewayError::Interrupted)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Simple requests
// ─────────────────────────────────────────────────────────────────────────────

/// Decorates responses to cross-origin requests.
pub struct CorsSimpleRequestProcessor {
    cors: CorsSettings,
}

impl CorsSimpleRequestProcessor {
    pub fn new(cors: CorsSettings) -> Self {
        Self { cors }
    }
}

#[async_trait]
impl Processor for CorsSimpleRequestProcessor {
    fn id(&self) -> &str {
        "cors-simple-request"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        if is_preflight(ctx) {
            return Ok(());
        }
        let Some(origin) = ctx.request.headers.get(ORIGIN).map(str::to_string) else {
            return Ok(());
        };
        if !self.cors.is_origin_allowed(&origin) {
            return Err(GatewayError::failure(
                ExecutionFailure::new(400)
                    .key("CORS_ORIGIN_NOT_ALLOWED")
                    .message("Origin is not allowed"),
            ));
        }

        let headers = &mut ctx.response.headers;
        headers.set(ALLOW_ORIGIN, allow_origin_value(&self.cors, &origin));
        if !self.cors.expose_headers.is_empty() {
            headers.set(EXPOSE_HEADERS, self.cors.expose_headers.join(", "));
        }
        if self.cors.allow_credentials {
            headers.set(ALLOW_CREDENTIALS, "true");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_kernel::Request;

    fn settings() -> CorsSettings {
        CorsSettings {
            enabled: true,
            allow_origin: vec!["https://app.example.com".to_string()],
            allow_methods: vec!["GET".to_string(), "POST".to_string()],
            allow_headers: vec!["x-tenant".to_string()],
            expose_headers: vec!["x-rate-limit".to_string()],
            allow_credentials: true,
            max_age: 600,
        }
    }

    fn preflight(origin: &str, method: &str) -> ExecutionContext {
        ExecutionContext::new(
            Request::new("r1", HttpMethod::Options, "/")
                .with_header(ORIGIN, origin)
                .with_header(REQUEST_METHOD, method),
        )
    }

    #[tokio::test]
    async fn valid_preflight_is_answered_and_interrupts() {
        let mut ctx = preflight("https://app.example.com", "post");
        ctx.request.headers.set(REQUEST_HEADERS, "X-Tenant");
        let err = CorsPreflightProcessor::new(settings())
            .execute(&mut ctx)
            .await
            .unwrap_err();

        assert!(err.is_interruption());
        assert!(ctx.response.is_ended());
        assert_eq!(ctx.response.status, 200);
        assert_eq!(ctx.response.headers.get(ALLOW_ORIGIN), Some("https://app.example.com"));
        assert_eq!(ctx.response.headers.get(ALLOW_METHODS), Some("GET, POST"));
        assert_eq!(ctx.response.headers.get(ALLOW_CREDENTIALS), Some("true"));
        assert_eq!(ctx.response.headers.get(MAX_AGE), Some("600"));
    }

    #[tokio::test]
    async fn invalid_preflight_fails_with_400() {
        let processor = CorsPreflightProcessor::new(settings());
        for mut ctx in [
            preflight("https://evil.example.com", "GET"),
            preflight("https://app.example.com", "DELETE"),
        ] {
            let err = processor.execute(&mut ctx).await.unwrap_err();
            let failure = err.execution_failure().unwrap();
            assert_eq!(failure.status_code, 400);
            assert_eq!(failure.key.as_deref(), Some("CORS_PREFLIGHT_FAILED"));
        }

        let mut ctx = preflight("https://app.example.com", "GET");
        ctx.request.headers.set(REQUEST_HEADERS, "authorization");
        assert!(processor.execute(&mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn non_preflight_requests_pass_through() {
        let mut ctx = ExecutionContext::new(
            Request::new("r1", HttpMethod::Options, "/").with_header(ORIGIN, "https://x"),
        );
        CorsPreflightProcessor::new(settings()).execute(&mut ctx).await.unwrap();
        assert!(!ctx.response.is_ended());
    }

    #[tokio::test]
    async fn simple_request_gets_allow_headers() {
        let mut ctx = ExecutionContext::new(
            Request::new("r1", HttpMethod::Get, "/").with_header(ORIGIN, "https://app.example.com"),
        );
        CorsSimpleRequestProcessor::new(settings()).execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.headers.get(ALLOW_ORIGIN), Some("https://app.example.com"));
        assert_eq!(ctx.response.headers.get(EXPOSE_HEADERS), Some("x-rate-limit"));
    }

    #[tokio::test]
    async fn wildcard_origin_without_credentials_answers_star() {
        let cors = CorsSettings {
            enabled: true,
            ..CorsSettings::default()
        };
        let mut ctx = ExecutionContext::new(
            Request::new("r1", HttpMethod::Get, "/").with_header(ORIGIN, "https://any.example.com"),
        );
        CorsSimpleRequestProcessor::new(cors).execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.headers.get(ALLOW_ORIGIN), Some("*"));
    }

    #[tokio::test]
    async fn disallowed_origin_is_rejected() {
        let mut ctx = ExecutionContext::new(
            Request::new("r1", HttpMethod::Get, "/").with_header(ORIGIN, "https://evil.example.com"),
        );
        let err = CorsSimpleRequestProcessor::new(settings())
            .execute(&mut ctx)
            .await
            .unwrap_err();
        assert_eq!(
            err.execution_failure().and_then(|f| f.key.as_deref()),
            Some("CORS_ORIGIN_NOT_ALLOWED")
        );
    }
}
