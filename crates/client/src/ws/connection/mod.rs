//! Presence stream connection types.
//!
//! This module provides the shared types and the transport seam; the
//! tokio-tungstenite implementation lives in `connection_native`.

use std::time::Duration;

use async_trait::async_trait;

/// Connection state of the presence stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// `Connecting` or `Connected`: a new `connect()` would be redundant.
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

/// Shortest delay ever used between reconnect attempts.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Configuration for auto-reconnect behavior.
///
/// There is no attempt limit: a dropped stream is retried until
/// `disconnect()` is called.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Fixed delay with no growth.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Calculate delay for a given attempt number (0-based)
    ///
    /// Never below [`MIN_RECONNECT_DELAY`], so a zero `initial_delay` still backs off.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.max(MIN_RECONNECT_DELAY);
        let multiplier = if self.multiplier.is_finite() { self.multiplier.max(1.0) } else { 1.0 };
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = initial.as_secs_f64() * multiplier.powi(exponent);
        let cap = self.max_delay.max(initial);
        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            cap
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("stream error: {0}")]
    Stream(String),
}

/// One open bidirectional connection.
///
/// Dropping the connection disposes it; nothing it buffered is delivered afterwards.
#[async_trait]
pub trait Connection: Send {
    /// Next inbound text frame.
    ///
    /// `None` means the peer closed the connection; `Some(Err(_))` is a stream
    /// failure, after which the connection is considered dead.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    /// Close from our side.
    async fn close(&mut self);
}

/// Opens connections to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>, TransportError>;
}

mod connection_native;
pub use connection_native::TungsteniteTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> = (0..7).map(|a| config.delay_for_attempt(a).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60, 60]);
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn zero_initial_delay_still_backs_off() {
        let config = ReconnectConfig {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };
        let delays: Vec<u128> = (0..5).map(|a| config.delay_for_attempt(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600]);

        let flat = ReconnectConfig::fixed(Duration::ZERO);
        assert_eq!(flat.delay_for_attempt(3), MIN_RECONNECT_DELAY);
    }

    #[test]
    fn fixed_delay_never_grows() {
        let config = ReconnectConfig::fixed(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(9), Duration::from_secs(5));
    }

    #[test]
    fn active_states() {
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(ConnectionState::Connected.is_connected());
    }
}
