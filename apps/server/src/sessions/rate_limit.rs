//! Per-remote-endpoint connection and message limits.
//!
//! Two independent caps per endpoint (IP): concurrent open transports, and
//! messages in a fixed one-minute window. The HTTP upgrade route refuses
//! connections over the first cap; the dispatcher closes transports that
//! blow through the second.

use std::time::{Duration, Instant};

use dashmap::DashMap;

pub const MAX_TRANSPORTS_PER_ENDPOINT: u32 = 10;
pub const MAX_MESSAGES_PER_MINUTE: u32 = 60;
const MESSAGE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct EndpointCounters {
    transports: u32,
    window_start: Instant,
    messages: u32,
}

pub struct ConnectionLimits {
    endpoints: DashMap<String, EndpointCounters>,
    max_transports: u32,
    max_messages: u32,
}

impl ConnectionLimits {
    pub fn new() -> Self {
        Self::with_limits(MAX_TRANSPORTS_PER_ENDPOINT, MAX_MESSAGES_PER_MINUTE)
    }

    pub fn with_limits(max_transports: u32, max_messages: u32) -> Self {
        Self {
            endpoints: DashMap::new(),
            max_transports,
            max_messages,
        }
    }

    /// Count a new transport for the endpoint; false means over the cap.
    pub fn try_register_transport(&self, endpoint: &str) -> bool {
        let mut entry = self
            .endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointCounters {
                transports: 0,
                window_start: Instant::now(),
                messages: 0,
            });
        if entry.transports >= self.max_transports {
            return false;
        }
        entry.transports += 1;
        true
    }

    pub fn release_transport(&self, endpoint: &str) {
        let remove = match self.endpoints.get_mut(endpoint) {
            Some(mut entry) => {
                entry.transports = entry.transports.saturating_sub(1);
                entry.transports == 0
            }
            None => false,
        };
        if remove {
            // Keeps the map bounded by currently connected endpoints; a
            // reconnecting endpoint simply starts a fresh message window.
            self.endpoints
                .remove_if(endpoint, |_, counters| counters.transports == 0);
        }
    }

    /// Count one inbound message; false means the endpoint is over budget.
    pub fn allow_message(&self, endpoint: &str) -> bool {
        let mut entry = self
            .endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointCounters {
                transports: 0,
                window_start: Instant::now(),
                messages: 0,
            });
        if entry.window_start.elapsed() >= MESSAGE_WINDOW {
            entry.window_start = Instant::now();
            entry.messages = 0;
        }
        if entry.messages >= self.max_messages {
            return false;
        }
        entry.messages += 1;
        true
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_cap_is_per_endpoint() {
        let limits = ConnectionLimits::with_limits(2, 10);
        assert!(limits.try_register_transport("1.2.3.4"));
        assert!(limits.try_register_transport("1.2.3.4"));
        assert!(!limits.try_register_transport("1.2.3.4"));
        assert!(limits.try_register_transport("5.6.7.8"));

        limits.release_transport("1.2.3.4");
        assert!(limits.try_register_transport("1.2.3.4"));
    }

    #[test]
    fn message_budget_is_enforced() {
        let limits = ConnectionLimits::with_limits(10, 3);
        for _ in 0..3 {
            assert!(limits.allow_message("1.2.3.4"));
        }
        assert!(!limits.allow_message("1.2.3.4"));
        // Other endpoints are unaffected.
        assert!(limits.allow_message("5.6.7.8"));
    }

    #[test]
    fn release_below_zero_is_harmless() {
        let limits = ConnectionLimits::new();
        limits.release_transport("9.9.9.9");
        assert!(limits.try_register_transport("9.9.9.9"));
    }
}
