use secp256k1::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use wire::FeatureVector;

/// Which side of the Noise_XK handshake this session plays. The initiator
/// must know the responder's static key in advance; the responder learns
/// it during act three.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Responder,
}

/// Backoff schedule for reconnect attempts: each failed attempt doubles the
/// wait (from `base_ms`), capped at `max_ms`. A session that reaches
/// `Ready` resets the attempt counter, so the next unsolicited close again
/// starts from `base_ms`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy { base_ms: 5_000, max_ms: 300_000, multiplier: 2.0 }
    }
}

impl ReconnectPolicy {
    /// The wait before the `attempt`-th reconnect try (0-based: the first
    /// retry after the initial unsolicited close is `attempt == 0`).
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let scaled = self.base_ms as f64 * self.multiplier.powi(attempt as i32);
        if scaled.is_finite() {
            (scaled as u64).min(self.max_ms)
        } else {
            self.max_ms
        }
    }
}

/// The feature bitmasks a session advertises in its `init` message.
#[derive(Debug, Clone, Default)]
pub struct InitFeatures {
    pub global: FeatureVector,
    pub local: FeatureVector,
}

/// Static configuration for a `PeerSession`: identity, the peer's expected
/// identity (initiator only), and the timing knobs from BOLT #1's
/// ping/pong and this crate's reconnect policy.
#[derive(Clone)]
pub struct PeerSessionConfig {
    pub local_static_secret: SecretKey,
    pub remote_static_pubkey: Option<PublicKey>,
    pub role: Role,
    pub init_features: InitFeatures,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub reconnect_timeout_ms: u64,
    pub reconnect_policy: ReconnectPolicy,

    /// Which even-indexed (required) feature bits this node recognizes.
    /// This core implements no gossip or channel features of its own, so
    /// the default recognizes none — any required bit the remote sets is
    /// `UnknownRequiredFeature`.
    pub known_feature_bits: fn(u32) -> bool,
}

impl PeerSessionConfig {
    pub fn new(role: Role, local_static_secret: SecretKey) -> Self {
        PeerSessionConfig {
            local_static_secret,
            remote_static_pubkey: None,
            role,
            init_features: InitFeatures::default(),
            ping_interval_ms: 30_000,
            ping_timeout_ms: 30_000,
            reconnect_timeout_ms: 5_000,
            reconnect_policy: ReconnectPolicy::default(),
            known_feature_bits: |_| false,
        }
    }

    /// `0` disables reconnect outright, independent of the backoff policy.
    pub fn reconnect_enabled(&self) -> bool {
        self.role == Role::Initiator && self.reconnect_timeout_ms > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_ceiling() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_ms(0), 5_000);
        assert_eq!(policy.delay_ms(1), 10_000);
        assert_eq!(policy.delay_ms(2), 20_000);
        assert_eq!(policy.delay_ms(20), 300_000);
    }
}
