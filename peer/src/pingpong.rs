use wire::{Ping, Pong, DECLINE_REPLY_THRESHOLD};

use crate::error::SessionError;

/// A pluggable liveness strategy. The default `BoltPingPong` implements the
/// BOLT #1 behavior this spec fixes; an implementer wanting a different
/// liveness contract injects their own rather than subclassing
/// `PeerSession` (see the open question in the design notes).
pub trait LivenessPolicy: Send {
    /// Called on each ping-interval tick. Returns a ping to send, if the
    /// policy decides one is due. The caller is responsible for timing out
    /// a ping that goes unanswered; this just decides whether a new one
    /// should go out right now (e.g. withholding it while one is already
    /// outstanding).
    fn on_tick(&mut self) -> Option<Ping>;

    /// Called for every inbound `ping`. Returns a pong to send in reply,
    /// unless the ping declines one.
    fn on_ping(&mut self, ping: &Ping) -> Option<Pong>;

    /// Called for every inbound `pong`. Validates it against whatever ping
    /// is outstanding.
    fn on_pong(&mut self, pong: &Pong) -> Result<(), SessionError>;
}

/// The BOLT #1 ping/pong contract: one ping per interval, `num_pong_bytes
/// = 1`, and a reply demanded and checked for exact size. A second ping is
/// withheld while the first is still outstanding, so the caller's timeout
/// timer is the only thing that can end the wait.
pub struct BoltPingPong {
    outstanding: Option<u16>,
}

impl BoltPingPong {
    pub fn new() -> Self {
        BoltPingPong { outstanding: None }
    }
}

impl Default for BoltPingPong {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessPolicy for BoltPingPong {
    fn on_tick(&mut self) -> Option<Ping> {
        if self.outstanding.is_some() {
            // a reply is still owed; the deadline timer owns the timeout
            // for it, so skip sending a second ping on top.
            return None;
        }
        let num_pong_bytes = 1u16;
        self.outstanding = Some(num_pong_bytes);
        Some(Ping::new(num_pong_bytes, 0))
    }

    fn on_ping(&mut self, ping: &Ping) -> Option<Pong> {
        if ping.num_pong_bytes >= DECLINE_REPLY_THRESHOLD {
            return None;
        }
        Some(Pong::new(ping.num_pong_bytes))
    }

    fn on_pong(&mut self, pong: &Pong) -> Result<(), SessionError> {
        match self.outstanding.take() {
            None => Err(SessionError::PongUnsolicited),
            Some(expected) => {
                let got = pong.ignored.len() as u16;
                if got != expected {
                    self.outstanding = None;
                    Err(SessionError::PongSizeMismatch { expected, got })
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_then_matching_pong_clears_outstanding() {
        let mut p = BoltPingPong::new();
        let ping = p.on_tick().unwrap();
        assert_eq!(ping.num_pong_bytes, 1);
        let pong = Pong::new(ping.num_pong_bytes);
        p.on_pong(&pong).unwrap();
        // a second tick is fine now that the first was answered.
        assert!(p.on_tick().is_some());
    }

    #[test]
    fn second_tick_without_reply_withholds_a_new_ping() {
        let mut p = BoltPingPong::new();
        p.on_tick().unwrap();
        assert!(p.on_tick().is_none());
    }

    #[test]
    fn pong_with_wrong_size_is_rejected() {
        let mut p = BoltPingPong::new();
        p.on_tick().unwrap();
        let bad_pong = Pong::new(2);
        assert!(matches!(
            p.on_pong(&bad_pong),
            Err(SessionError::PongSizeMismatch { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn unsolicited_pong_is_rejected() {
        let mut p = BoltPingPong::new();
        assert!(matches!(p.on_pong(&Pong::new(1)), Err(SessionError::PongUnsolicited)));
    }

    #[test]
    fn declining_ping_elicits_no_reply() {
        let mut p = BoltPingPong::new();
        let declining = Ping::new(DECLINE_REPLY_THRESHOLD, 0);
        assert!(p.on_ping(&declining).is_none());
    }

    #[test]
    fn ordinary_ping_elicits_zero_filled_pong_of_requested_size() {
        let mut p = BoltPingPong::new();
        let ping = Ping::new(5, 0);
        let pong = p.on_ping(&ping).unwrap();
        assert_eq!(pong.ignored, vec![0u8; 5]);
    }
}
