//! Forwarding headers set by proxies in front of the gateway.

use async_trait::async_trait;
use portico_kernel::{ExecutionContext, GatewayResult, Processor};

pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";
pub const FORWARDED: &str = "Forwarded";
pub const X_FORWARDED_PROTO: &str = "X-Forwarded-Proto";
pub const X_FORWARDED_HOST: &str = "X-Forwarded-Host";
pub const X_FORWARDED_PORT: &str = "X-Forwarded-Port";
pub const X_FORWARDED_PREFIX: &str = "X-Forwarded-Prefix";

// ─────────────────────────────────────────────────────────────────────────────
// Client address
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves the client address and the URL the client originally addressed
/// from `X-Forwarded-*` and `Forwarded` headers.
pub struct XForwardForProcessor;

#[async_trait]
impl Processor for XForwardForProcessor {
    fn id(&self) -> &str {
        "x-forward-for"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let client = ctx
            .request
            .headers
            .get(X_FORWARDED_FOR)
            .and_then(first_value)
            .or_else(|| ctx.request.headers.get(FORWARDED).and_then(forwarded_for))
            .map(strip_port);
        if let Some(address) = client.filter(|a| !a.is_empty()) {
            ctx.request.remote_address = address.clone();
            ctx.metrics.remote_address = address;
        }

        if let Some(url) = original_url(ctx) {
            ctx.request.original_url = url;
        }
        Ok(())
    }
}

fn first_value(header: &str) -> Option<&str> {
    header.split(',').map(str::trim).find(|v| !v.is_empty())
}

/// `for=` parameter of the first `Forwarded` element.
fn forwarded_for(header: &str) -> Option<&str> {
    let element = header.split(',').next()?;
    element.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("for")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Drop a port from `1.2.3.4:80` or `[::1]:80`; bare IPv6 stays as is.
fn strip_port(address: &str) -> String {
    if let Some(rest) = address.strip_prefix('[') {
        return rest
            .split_once(']')
            .map(|(ip, _)| ip)
            .unwrap_or(rest)
            .to_string();
    }
    match address.split_once(':') {
        Some((ip, port)) if !port.contains(':') => ip.to_string(),
        _ => address.to_string(),
    }
}

fn original_url(ctx: &ExecutionContext) -> Option<String> {
    let headers = &ctx.request.headers;
    let proto = headers.get(X_FORWARDED_PROTO).and_then(first_value);
    let host = headers.get(X_FORWARDED_HOST).and_then(first_value);
    let port = headers.get(X_FORWARDED_PORT).and_then(first_value);
    if proto.is_none() && host.is_none() && port.is_none() {
        return None;
    }

    let scheme = proto.unwrap_or(&ctx.request.scheme);
    let host = host.unwrap_or(&ctx.request.host);
    let authority = match port {
        Some(port) if is_default_port(scheme, port) => host_without_port(host).to_string(),
        Some(port) => format!("{}:{port}", host_without_port(host)),
        None => host.to_string(),
    };
    Some(format!("{scheme}://{authority}{}", ctx.request.uri))
}

/// `host:port` or `[v6]:port` without the port; brackets are kept.
fn host_without_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map(|end| &host[..=end]).unwrap_or(host);
    }
    match host.split_once(':') {
        Some((name, port)) if !port.contains(':') => name,
        _ => host,
    }
}

fn is_default_port(scheme: &str, port: &str) -> bool {
    matches!((scheme, port), ("http", "80") | ("https", "443"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Prefix
// ─────────────────────────────────────────────────────────────────────────────

/// Prepends `X-Forwarded-Prefix` to the context path seen by policies.
pub struct XForwardedPrefixProcessor;

#[async_trait]
impl Processor for XForwardedPrefixProcessor {
    fn id(&self) -> &str {
        "x-forwarded-prefix"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let Some(prefix) = ctx
            .request
            .headers
            .get(X_FORWARDED_PREFIX)
            .and_then(first_value)
            .map(|p| p.trim_end_matches('/').to_string())
        else {
            return Ok(());
        };
        if !prefix.is_empty() {
            ctx.request.context_path = format!("{prefix}{}", ctx.request.context_path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_kernel::{HttpMethod, Request};

    #[test]
    fn ports_are_stripped() {
        assert_eq!(strip_port("10.0.0.1:8080"), "10.0.0.1");
        assert_eq!(strip_port("[2001:db8::1]:443"), "2001:db8::1");
        assert_eq!(strip_port("2001:db8::1"), "2001:db8::1");
        assert_eq!(strip_port("10.0.0.1"), "10.0.0.1");
    }

    #[tokio::test]
    async fn first_forwarded_value_wins() {
        let request = Request::new("r1", HttpMethod::Get, "/")
            .with_remote_address("127.0.0.1")
            .with_header(X_FORWARDED_FOR, " 203.0.113.7:5000 , 10.0.0.2");
        let mut ctx = ExecutionContext::new(request);
        XForwardForProcessor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.remote_address, "203.0.113.7");
        assert_eq!(ctx.metrics.remote_address, "203.0.113.7");
    }

    #[tokio::test]
    async fn forwarded_header_is_a_fallback() {
        let request = Request::new("r1", HttpMethod::Get, "/")
            .with_header(FORWARDED, "for=\"[2001:db8:cafe::17]:4711\";proto=https, for=10.0.0.9");
        let mut ctx = ExecutionContext::new(request);
        XForwardForProcessor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.remote_address, "2001:db8:cafe::17");
    }

    #[tokio::test]
    async fn original_url_is_rebuilt() {
        let mut request = Request::new("r1", HttpMethod::Get, "/shop/items?page=2")
            .with_header(X_FORWARDED_PROTO, "https")
            .with_header(X_FORWARDED_HOST, "api.example.com")
            .with_header(X_FORWARDED_PORT, "8443");
        request.host = "gateway.internal:8082".to_string();
        let mut ctx = ExecutionContext::new(request);
        XForwardForProcessor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.original_url, "https://api.example.com:8443/shop/items?page=2");
    }

    #[tokio::test]
    async fn forwarded_port_replaces_the_local_one() {
        let mut request = Request::new("r1", HttpMethod::Get, "/shop")
            .with_header(X_FORWARDED_PORT, "8443");
        request.host = "gateway.internal:8082".to_string();
        let mut ctx = ExecutionContext::new(request);
        XForwardForProcessor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.original_url, "http://gateway.internal:8443/shop");

        let mut request = Request::new("r1", HttpMethod::Get, "/shop")
            .with_header(X_FORWARDED_PROTO, "https")
            .with_header(X_FORWARDED_PORT, "443");
        request.host = "[::1]:8082".to_string();
        let mut ctx = ExecutionContext::new(request);
        XForwardForProcessor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.original_url, "https://[::1]/shop");
    }

    #[tokio::test]
    async fn untouched_without_headers() {
        let request = Request::new("r1", HttpMethod::Get, "/a").with_remote_address("127.0.0.1");
        let mut ctx = ExecutionContext::new(request);
        XForwardForProcessor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.remote_address, "127.0.0.1");
        assert_eq!(ctx.request.original_url, "/a");
    }

    #[tokio::test]
    async fn prefix_is_prepended_to_context_path() {
        let mut request =
            Request::new("r1", HttpMethod::Get, "/echo/x").with_header(X_FORWARDED_PREFIX, "/public/");
        request.bind_context_path("/echo");
        let mut ctx = ExecutionContext::new(request);
        XForwardedPrefixProcessor.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.context_path, "/public/echo");
        assert_eq!(ctx.request.path_info, "/x");
    }
}
