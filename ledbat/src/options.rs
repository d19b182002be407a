// Tunable constants for the LEDBAT controller, following [RFC6817] section 2.

use crate::fail::Fail;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct LedbatConfig {
    pub current_filter: usize,
    pub base_history: usize,
    pub init_cwnd: usize,
    pub mss: usize,
    pub target_ms: f64,
    pub gain: f64,
    pub allowed_increase: usize,
    pub min_cwnd: usize,
    pub g: f64,
    pub k: f64,
    pub alpha: f64,
    pub beta: f64,
    pub ooo_thresh: u32,
    pub sz_data: usize,
    pub t_init_ack: Duration,
    pub t_init_data: Duration,
    pub t_idle: Duration,
}

impl Default for LedbatConfig {
    fn default() -> Self {
        LedbatConfig {
            current_filter: 8,
            base_history: 10,
            init_cwnd: 2,
            mss: 1500,
            target_ms: 50.0,
            gain: 1.0,
            allowed_increase: 1,
            min_cwnd: 2,
            g: 0.1,
            k: 4.0,
            alpha: 0.125,
            beta: 0.25,
            ooo_thresh: 3,
            sz_data: 1024,
            t_init_ack: Duration::from_secs(5),
            t_init_data: Duration::from_secs(5),
            t_idle: Duration::from_secs(10),
        }
    }
}

impl LedbatConfig {
    pub fn current_filter(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.current_filter = value;
        self
    }

    pub fn base_history(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.base_history = value;
        self
    }

    pub fn init_cwnd(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.init_cwnd = value;
        self
    }

    pub fn mss(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.mss = value;
        self
    }

    pub fn target_ms(mut self, value: f64) -> Self {
        assert!(value > 0.0);
        self.target_ms = value;
        self
    }

    pub fn gain(mut self, value: f64) -> Self {
        self.gain = value;
        self
    }

    pub fn allowed_increase(mut self, value: usize) -> Self {
        self.allowed_increase = value;
        self
    }

    pub fn min_cwnd(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.min_cwnd = value;
        self
    }

    pub fn ooo_thresh(mut self, value: u32) -> Self {
        self.ooo_thresh = value;
        self
    }

    pub fn sz_data(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.sz_data = value;
        self
    }

    pub fn t_init_ack(mut self, value: Duration) -> Self {
        assert!(value > Duration::new(0, 0));
        self.t_init_ack = value;
        self
    }

    pub fn t_init_data(mut self, value: Duration) -> Self {
        assert!(value > Duration::new(0, 0));
        self.t_init_data = value;
        self
    }

    pub fn t_idle(mut self, value: Duration) -> Self {
        assert!(value > Duration::new(0, 0));
        self.t_idle = value;
        self
    }

    /// Applies a `--ledbat-<PARAM>` style override by parameter name, for CLI
    /// callers that don't want to know about individual builder methods.
    pub fn set_named(&mut self, name: &str, value: f64) -> Result<(), Fail> {
        match name {
            "current-filter" => self.current_filter = value as usize,
            "base-history" => self.base_history = value as usize,
            "init-cwnd" => self.init_cwnd = value as usize,
            "mss" => self.mss = value as usize,
            "target" => self.target_ms = value,
            "gain" => self.gain = value,
            "allowed-increase" => self.allowed_increase = value as usize,
            "min-cwnd" => self.min_cwnd = value as usize,
            "ooo-thresh" => self.ooo_thresh = value as u32,
            "sz-data" => self.sz_data = value as usize,
            "t-init-ack" => self.t_init_ack = Duration::from_secs_f64(value),
            "t-init-data" => self.t_init_data = Duration::from_secs_f64(value),
            "t-idle" => self.t_idle = Duration::from_secs_f64(value),
            _ => {
                return Err(Fail::OutOfRange {
                    details: "unrecognized ledbat config parameter name",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let cfg = LedbatConfig::default();
        assert_eq!(cfg.current_filter, 8);
        assert_eq!(cfg.base_history, 10);
        assert_eq!(cfg.init_cwnd, 2);
        assert_eq!(cfg.mss, 1500);
        assert_eq!(cfg.target_ms, 50.0);
        assert_eq!(cfg.min_cwnd, 2);
        assert_eq!(cfg.ooo_thresh, 3);
        assert_eq!(cfg.sz_data, 1024);
    }

    #[test]
    fn builder_chains() {
        let cfg = LedbatConfig::default().target_ms(20.0).mss(576);
        assert_eq!(cfg.target_ms, 20.0);
        assert_eq!(cfg.mss, 576);
    }

    #[test]
    fn set_named_applies_override() {
        let mut cfg = LedbatConfig::default();
        cfg.set_named("target", 20.0).unwrap();
        assert_eq!(cfg.target_ms, 20.0);
        assert!(cfg.set_named("bogus", 1.0).is_err());
    }
}
