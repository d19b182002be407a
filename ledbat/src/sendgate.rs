// Decides whether a segment may be sent now, and for how long to defer if
// not. Modeled as a free function operating on a borrowed Controller, in
// the same shape the reference sources use for background tasks that act
// on shared connection state rather than owning it.

use crate::controller::Controller;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Permit {
    Send,
    Defer(Duration),
}

pub fn try_send(controller: &mut Controller, len: usize, now: Instant) -> Permit {
    if let Some(last_ack) = controller.last_ack_received() {
        if controller.flightsize() > 0 {
            let cto = controller.cto();
            if now.saturating_duration_since(last_ack) > cto {
                let already_fired = controller
                    .last_cto_fail()
                    .map_or(false, |t| now.saturating_duration_since(t) < cto);
                if !already_fired {
                    controller.on_no_ack_in_cto();
                    controller.note_cto_fail(now);
                }
                return Permit::Defer(controller.cto());
            }
        }
    }

    if controller.rtt().is_none() {
        controller.note_sent(len, now);
        return Permit::Send;
    }

    if controller.flightsize() + len <= controller.cwnd() {
        controller.note_sent(len, now);
        return Permit::Send;
    }

    Permit::Defer(controller.cto() / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LedbatConfig;

    #[test]
    fn fresh_controller_grants_first_send() {
        let now = Instant::now();
        let mut c = Controller::new(LedbatConfig::default(), now);
        assert_eq!(try_send(&mut c, 1024, now), Permit::Send);
        assert_eq!(c.flightsize(), 1024);
    }

    #[test]
    fn full_window_defers() {
        let now = Instant::now();
        let mut c = Controller::new(LedbatConfig::default(), now);
        c.on_ack(0, &[10.0], &[0.1], now);
        while c.flightsize() + 1024 <= c.cwnd() {
            assert_eq!(try_send(&mut c, 1024, now), Permit::Send);
        }
        match try_send(&mut c, 1024, now) {
            Permit::Defer(_) => {}
            Permit::Send => panic!("expected defer once window is full"),
        }
    }

    #[test]
    fn cto_expiry_fires_once_and_defers() {
        let now = Instant::now();
        let mut c = Controller::new(LedbatConfig::default(), now);
        c.on_ack(0, &[10.0], &[0.1], now);
        c.note_sent(1024, now);
        let later = now + Duration::from_secs(2);
        let cwnd_before = c.cwnd();
        match try_send(&mut c, 1024, later) {
            Permit::Defer(_) => {}
            Permit::Send => panic!("expected defer on CTO expiry"),
        }
        assert_eq!(c.cwnd(), 1500);
        let cwnd_after_first = c.cwnd();
        assert!(cwnd_after_first <= cwnd_before);

        // a second attempt shortly after must not re-fire the CTO handler
        let shortly_after = later + Duration::from_millis(10);
        try_send(&mut c, 1024, shortly_after);
        assert_eq!(c.cwnd(), cwnd_after_first);
    }
}
