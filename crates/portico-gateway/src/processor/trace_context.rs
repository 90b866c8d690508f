//! W3C trace context propagation.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use portico_kernel::{ExecutionContext, GatewayResult, Processor};
use rand::Rng;
use regex::Regex;

pub const TRACEPARENT: &str = "traceparent";
pub const TRACESTATE: &str = "tracestate";

static TRACEPARENT_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9a-f]{2})-([0-9a-f]{32})-([0-9a-f]{16})-([0-9a-f]{2})$").expect("valid regex")
});

/// `true` for a well-formed `traceparent` with a usable version and
/// non-zero ids.
pub fn is_valid_traceparent(value: &str) -> bool {
    let Some(caps) = TRACEPARENT_FORMAT.captures(value) else {
        return false;
    };
    let all_zero = |s: &str| s.bytes().all(|b| b == b'0');
    &caps[1] != "ff" && !all_zero(&caps[2]) && !all_zero(&caps[3])
}

/// Fresh sampled `traceparent` with random trace and parent ids.
pub fn generate_traceparent() -> String {
    let mut rng = rand::thread_rng();
    let mut trace_id: u128 = rng.r#gen();
    while trace_id == 0 {
        trace_id = rng.r#gen();
    }
    let mut parent_id: u64 = rng.r#gen();
    while parent_id == 0 {
        parent_id = rng.r#gen();
    }
    format!("00-{trace_id:032x}-{parent_id:016x}-01")
}

/// Keeps a valid incoming `traceparent`/`tracestate`; otherwise starts a new
/// trace and drops the state.  The result is mirrored on the response.
pub struct TraceContextProcessor;

#[async_trait]
impl Processor for TraceContextProcessor {
    fn id(&self) -> &str {
        "trace-context"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> GatewayResult<()> {
        let incoming = ctx.request.headers.get(TRACEPARENT);
        match incoming.filter(|v| is_valid_traceparent(v.trim())).map(str::to_string) {
            Some(traceparent) => {
                ctx.response.headers.set(TRACEPARENT, traceparent);
                if let Some(state) = ctx.request.headers.get(TRACESTATE).map(str::to_string) {
                    ctx.response.headers.set(TRACESTATE, state);
                }
            }
            None => {
                let traceparent = generate_traceparent();
                ctx.request.headers.set(TRACEPARENT, &traceparent);
                ctx.request.headers.remove(TRACESTATE);
                ctx.response.headers.set(TRACEPARENT, traceparent);
                ctx.response.headers.remove(TRACESTATE);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_kernel::{HttpMethod, Request};

    const VALID: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn validation_rejects_reserved_values() {
        assert!(is_valid_traceparent(VALID));
        assert!(!is_valid_traceparent(
            "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        ));
        assert!(!is_valid_traceparent(
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01"
        ));
        assert!(!is_valid_traceparent(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01"
        ));
        assert!(!is_valid_traceparent(
            "00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01"
        ));
        assert!(!is_valid_traceparent("garbage"));
    }

    #[test]
    fn generated_values_are_valid() {
        for _ in 0..16 {
            assert!(is_valid_traceparent(&generate_traceparent()));
        }
    }

    #[tokio::test]
    async fn valid_traceparent_is_propagated_unchanged() {
        let request = Request::new("r1", HttpMethod::Get, "/")
            .with_header("traceparent", VALID)
            .with_header("tracestate", "congo=t61rcWkgMzE");
        let mut ctx = ExecutionContext::new(request);
        TraceContextProcessor.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.request.headers.get(TRACEPARENT), Some(VALID));
        assert_eq!(ctx.response.headers.get(TRACEPARENT), Some(VALID));
        assert_eq!(ctx.response.headers.get(TRACESTATE), Some("congo=t61rcWkgMzE"));
    }

    #[tokio::test]
    async fn padded_traceparent_is_mirrored_as_received() {
        let padded = format!(" {VALID} ");
        let request = Request::new("r1", HttpMethod::Get, "/").with_header("traceparent", &padded);
        let mut ctx = ExecutionContext::new(request);
        TraceContextProcessor.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.request.headers.get(TRACEPARENT), Some(padded.as_str()));
        assert_eq!(ctx.response.headers.get(TRACEPARENT), Some(padded.as_str()));
    }

    #[tokio::test]
    async fn reserved_version_is_replaced_and_state_dropped() {
        let request = Request::new("r1", HttpMethod::Get, "/")
            .with_header("traceparent", "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
            .with_header("tracestate", "congo=t61rcWkgMzE");
        let mut ctx = ExecutionContext::new(request);
        TraceContextProcessor.execute(&mut ctx).await.unwrap();

        let generated = ctx.request.headers.get(TRACEPARENT).unwrap().to_string();
        assert!(is_valid_traceparent(&generated));
        assert!(generated.starts_with("00-"));
        assert_eq!(ctx.response.headers.get(TRACEPARENT), Some(generated.as_str()));
        assert!(!ctx.request.headers.contains(TRACESTATE));
        assert!(!ctx.response.headers.contains(TRACESTATE));
    }
}
