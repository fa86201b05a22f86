use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable that turns on per-frame message tracing.
pub const TRACE_ENV_VAR: &str = "EDGEMUX_TRACE_ENABLED";

/// Process-wide diagnostic tracing toggle, read from [`TRACE_ENV_VAR`] on first use.
pub fn trace_enabled() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| parse_trace_flag(std::env::var(TRACE_ENV_VAR).ok().as_deref()))
}

fn parse_trace_flag(value: Option<&str>) -> bool {
    value.is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

/// Configuration for a [`crate::MsgMux`].
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Capacity of the event queue between the network reader and the dispatch task.
    pub event_capacity: usize,
    /// After close, events are drained until none arrives for this long.
    pub drain_window: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            event_capacity: 64,
            drain_window: Duration::from_millis(100),
        }
    }
}

/// Configuration for a [`crate::MsgChannel`].
#[derive(Debug, Clone)]
pub struct MsgChannelConfig {
    /// Stamp untraced frames with a correlation id and log each one.
    pub trace: bool,
    /// Bound on waiting for a state frame to be sent, independent of any write deadline.
    pub state_send_timeout: Duration,
}

impl Default for MsgChannelConfig {
    fn default() -> Self {
        Self {
            trace: trace_enabled(),
            state_send_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration for an [`crate::EdgeListener`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Bound on unbind and update-bind sends to the router.
    pub remote_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_flag_parsing() {
        assert!(parse_trace_flag(Some("true")));
        assert!(parse_trace_flag(Some("TRUE")));
        assert!(parse_trace_flag(Some(" True ")));
        assert!(!parse_trace_flag(Some("1")));
        assert!(!parse_trace_flag(Some("false")));
        assert!(!parse_trace_flag(None));
    }

    #[test]
    fn defaults() {
        let mux = MuxConfig::default();
        assert_eq!(mux.drain_window, Duration::from_millis(100));
        assert_eq!(
            MsgChannelConfig::default().state_send_timeout,
            Duration::from_secs(5)
        );
        assert_eq!(ListenerConfig::default().remote_timeout, Duration::from_secs(5));
    }
}
