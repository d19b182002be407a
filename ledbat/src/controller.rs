// The LEDBAT congestion controller (C3): combines DelayFilters and
// RttEstimator, applies the cwnd update law from [RFC6817] section 3.3.
//
// The source this crate is patterned on carries several evolutionary,
// partially-duplicated congestion-control implementations side by side
// (a trait-object family with Cubic/NoCongestionControl variants, plus a
// second copy embedded in the sender state). There is exactly one
// algorithm in scope here, so this crate exposes one concrete type instead
// of a trait hierarchy.

use crate::delay::DelayFilters;
use crate::options::LedbatConfig;
use crate::rto::RttEstimator;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct Controller {
    config: LedbatConfig,
    cwnd: f64,
    flightsize: f64,
    delay: DelayFilters,
    rtt: RttEstimator,
    last_ack_received: Option<Instant>,
    last_data_loss: Option<Instant>,
    last_cto_fail: Option<Instant>,
    last_send_time: Option<Instant>,
}

impl Controller {
    pub fn new(config: LedbatConfig, now: Instant) -> Self {
        let cwnd = (config.init_cwnd * config.mss) as f64;
        Controller {
            delay: DelayFilters::new(&config, now),
            rtt: RttEstimator::new(&config),
            cwnd,
            flightsize: 0.0,
            config,
            last_ack_received: None,
            last_data_loss: None,
            last_cto_fail: None,
            last_send_time: None,
        }
    }

    pub fn config(&self) -> &LedbatConfig {
        &self.config
    }

    pub fn cwnd(&self) -> usize {
        self.cwnd.round().max(0.0) as usize
    }

    pub fn flightsize(&self) -> usize {
        self.flightsize.round().max(0.0) as usize
    }

    pub fn queuing_delay(&self) -> f64 {
        self.delay.queuing_delay()
    }

    pub fn rtt(&self) -> Option<f64> {
        self.rtt.rtt()
    }

    pub fn srtt(&self) -> f64 {
        self.rtt.srtt()
    }

    pub fn rttvar(&self) -> f64 {
        self.rtt.rttvar()
    }

    pub fn cto(&self) -> Duration {
        Duration::from_secs_f64(self.rtt.cto())
    }

    pub fn last_ack_received(&self) -> Option<Instant> {
        self.last_ack_received
    }

    pub fn note_sent(&mut self, bytes: usize, now: Instant) {
        self.flightsize += bytes as f64;
        self.last_send_time = Some(now);
    }

    pub fn on_ack(&mut self, bytes_acked: usize, delays_ms: &[f64], rtt_samples_s: &[f64], now: Instant) {
        self.last_ack_received = Some(now);

        for &d in delays_ms {
            self.delay.record(d, now);
        }

        let target = self.config.target_ms;
        let queuing_delay = self.delay.queuing_delay();
        let off_target = (target - queuing_delay) / target;

        self.cwnd += self.config.gain * off_target * bytes_acked as f64 * self.config.mss as f64 / self.cwnd;

        let max_allowed = self.flightsize + (self.config.allowed_increase * self.config.mss) as f64;
        self.cwnd = self.cwnd.min(max_allowed);
        self.cwnd = self.cwnd.max((self.config.min_cwnd * self.config.mss) as f64);

        self.flightsize = (self.flightsize - bytes_acked as f64).max(0.0);

        if !rtt_samples_s.is_empty() {
            self.rtt.observe(rtt_samples_s);
        }
    }

    /// Reduces cwnd in response to detected loss, rate-limited to at most
    /// once per RTT. Returns whether the reduction actually fired.
    pub fn on_data_loss(&mut self, will_retransmit: bool, loss_bytes: usize, now: Instant) -> bool {
        if let (Some(last), Some(rtt)) = (self.last_data_loss, self.rtt.rtt()) {
            if now.saturating_duration_since(last) < Duration::from_secs_f64(rtt) {
                return false;
            }
        }
        self.last_data_loss = Some(now);

        self.cwnd = self
            .cwnd
            .min((self.cwnd / 2.0).max((self.config.min_cwnd * self.config.mss) as f64));

        if !will_retransmit {
            self.flightsize = (self.flightsize - loss_bytes as f64).max(0.0);
        }
        true
    }

    pub fn on_no_ack_in_cto(&mut self) {
        self.cwnd = self.config.mss as f64;
        self.rtt.double_cto();
    }

    pub fn last_cto_fail(&self) -> Option<Instant> {
        self.last_cto_fail
    }

    pub fn note_cto_fail(&mut self, now: Instant) {
        self.last_cto_fail = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_at(now: Instant) -> Controller {
        Controller::new(LedbatConfig::default(), now)
    }

    #[test]
    fn fresh_controller_cwnd_is_init_cwnd_times_mss() {
        let now = Instant::now();
        let c = controller_at(now);
        assert_eq!(c.cwnd(), 2 * 1500);
        assert_eq!(c.flightsize(), 0);
    }

    #[test]
    fn note_sent_increases_flightsize() {
        let now = Instant::now();
        let mut c = controller_at(now);
        c.note_sent(1024, now);
        assert_eq!(c.flightsize(), 1024);
    }

    #[test]
    fn first_ack_near_zero_queuing_delay_matches_scenario() {
        let now = Instant::now();
        let mut c = controller_at(now);
        c.note_sent(1024, now);
        c.on_ack(1024, &[10.0], &[0.1], now);
        assert!((c.queuing_delay() - 0.0).abs() < 1e-9);
        // step 5 alone would give 3512, but step 6 clamps to
        // flightsize + ALLOWED_INCREASE*MSS = 2524, and step 7 then raises
        // that to the MIN_CWND*MSS floor of 3000.
        assert_eq!(c.cwnd(), 2 * 1500);
        assert_eq!(c.srtt(), 0.1);
        assert_eq!(c.rttvar(), 0.05);
        assert_eq!(c.cto(), Duration::from_secs_f64(1.0));
    }

    #[test]
    fn queue_over_target_shrinks_cwnd_to_floor() {
        let now = Instant::now();
        let mut c = controller_at(now);
        // seed a low base delay, then sustain a high queuing delay
        c.on_ack(0, &[10.0], &[], now);
        let mut last_cwnd = c.cwnd();
        for _ in 0..200 {
            c.note_sent(1024, now);
            c.on_ack(1024, &[200.0], &[], now);
            assert!(c.cwnd() <= last_cwnd);
            last_cwnd = c.cwnd();
        }
        assert_eq!(c.cwnd(), 2 * 1500);
    }

    #[test]
    fn loss_rate_limited_to_once_per_rtt() {
        let now = Instant::now();
        let mut c = controller_at(now);
        c.on_ack(0, &[10.0], &[0.1], now);
        let before = c.cwnd();
        let fired = c.on_data_loss(true, 1024, now);
        assert!(fired);
        let after_first = c.cwnd();
        assert!(after_first <= before);
        let fired_again = c.on_data_loss(true, 1024, now + Duration::from_millis(10));
        assert!(!fired_again);
        assert_eq!(c.cwnd(), after_first);
    }

    #[test]
    fn no_ack_in_cto_resets_cwnd_and_doubles_timeout() {
        let now = Instant::now();
        let mut c = controller_at(now);
        c.on_ack(0, &[10.0], &[1.0], now);
        let cto_before = c.cto();
        c.on_no_ack_in_cto();
        assert_eq!(c.cwnd(), 1500);
        assert_eq!(c.cto(), cto_before * 2);
    }
}
