//! Fire-and-forget metric events.
//!
//! Components report through a [`MetricsSink`]. [`NoopMetrics`] discards
//! everything; [`RecorderMetrics`] forwards to whatever recorder is installed
//! for the `metrics` crate facade (Prometheus exporter, statsd).

use std::time::Duration;

/// Outcome of a gatekeeper decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthOutcome {
    Forwarded,
    Unauthenticated,
    InsufficientScope,
    Rejected,
    UpstreamUnavailable,
}

impl AuthOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthOutcome::Forwarded => "forwarded",
            AuthOutcome::Unauthenticated => "unauthenticated",
            AuthOutcome::InsufficientScope => "insufficient_scope",
            AuthOutcome::Rejected => "rejected",
            AuthOutcome::UpstreamUnavailable => "upstream_unavailable",
        }
    }
}

/// Result of one scheduled document reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloadStatus {
    SuccessUpdated,
    SuccessNoChange,
    Failure,
}

impl ReloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReloadStatus::SuccessUpdated => "success_updated",
            ReloadStatus::SuccessNoChange => "success_no_change",
            ReloadStatus::Failure => "failure",
        }
    }
}

/// Receiver of metric events. Implementations must not block.
pub trait MetricsSink: Send + Sync + 'static {
    fn auth_decision(&self, _outcome: AuthOutcome) {}

    fn scopes_discovered(&self, _count: usize) {}

    fn live_reload(&self, _status: ReloadStatus, _elapsed: Duration) {}
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Reports events through the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderMetrics;

impl RecorderMetrics {
    pub const AUTH_DECISION: &'static str = "openapi_mcp_guard_auth_decisions_total";
    pub const DISCOVERED_SCOPES: &'static str = "openapi_mcp_guard_discovered_scopes";
    pub const LIVE_RELOAD: &'static str = "openapi_mcp_guard_live_reload_total";
    pub const LIVE_RELOAD_DURATION: &'static str = "openapi_mcp_guard_live_reload_duration_seconds";
}

impl MetricsSink for RecorderMetrics {
    fn auth_decision(&self, outcome: AuthOutcome) {
        ::metrics::counter!(Self::AUTH_DECISION, "outcome" => outcome.as_str()).increment(1);
    }

    fn scopes_discovered(&self, count: usize) {
        ::metrics::gauge!(Self::DISCOVERED_SCOPES).set(count as f64);
    }

    fn live_reload(&self, status: ReloadStatus, elapsed: Duration) {
        ::metrics::counter!(Self::LIVE_RELOAD, "status" => status.as_str()).increment(1);
        ::metrics::histogram!(Self::LIVE_RELOAD_DURATION, "status" => status.as_str())
            .record(elapsed.as_secs_f64());
    }
}
