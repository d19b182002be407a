// Round-trip-time and congestion-timeout estimation per [RFC6298].

use crate::options::LedbatConfig;

#[derive(Clone, Copy, Debug)]
pub struct RttEstimator {
    rtt: Option<f64>,
    srtt: f64,
    rttvar: f64,
    cto: f64,
    g: f64,
    k: f64,
    alpha: f64,
    beta: f64,
}

impl RttEstimator {
    pub fn new(config: &LedbatConfig) -> Self {
        RttEstimator {
            rtt: None,
            srtt: 0.0,
            rttvar: 0.0,
            cto: 1.0,
            g: config.g,
            k: config.k,
            alpha: config.alpha,
            beta: config.beta,
        }
    }

    /// Folds a batch of RTT samples (seconds) observed from a single ACK into
    /// one RFC6298 update. Multiple samples are aggregated by minimum first,
    /// to avoid delayed-ACK inflation, rather than applying the update
    /// recursively once per sample.
    pub fn observe(&mut self, samples: &[f64]) {
        let sample = match samples.iter().cloned().fold(None, |acc: Option<f64>, s| {
            Some(acc.map_or(s, |a: f64| a.min(s)))
        }) {
            Some(s) => s,
            None => return,
        };

        if self.rtt.is_none() {
            self.srtt = sample;
            self.rttvar = sample / 2.0;
        } else {
            self.rttvar = (1.0 - self.beta) * self.rttvar + self.beta * (self.srtt - sample).abs();
            self.srtt = (1.0 - self.alpha) * self.srtt + self.alpha * sample;
        }
        self.rtt = Some(sample);
        self.cto = (self.srtt + self.g.max(self.k * self.rttvar)).max(1.0);
    }

    pub fn rtt(&self) -> Option<f64> {
        self.rtt
    }

    pub fn srtt(&self) -> f64 {
        self.srtt
    }

    pub fn rttvar(&self) -> f64 {
        self.rttvar
    }

    pub fn cto(&self) -> f64 {
        self.cto
    }

    pub fn double_cto(&mut self) {
        self.cto *= 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_identity() {
        let cfg = LedbatConfig::default();
        let mut e = RttEstimator::new(&cfg);
        e.observe(&[0.1]);
        assert_eq!(e.srtt(), 0.1);
        assert_eq!(e.rttvar(), 0.05);
        assert_eq!(e.cto(), 1.0_f64.max(0.1 + (0.1_f64).max(4.0 * 0.05)));
    }

    #[test]
    fn cto_floor_is_one_second() {
        let cfg = LedbatConfig::default();
        let mut e = RttEstimator::new(&cfg);
        e.observe(&[0.001]);
        assert!(e.cto() >= 1.0);
    }

    #[test]
    fn multiple_samples_aggregate_by_minimum() {
        let cfg = LedbatConfig::default();
        let mut e = RttEstimator::new(&cfg);
        e.observe(&[0.3, 0.1, 0.2]);
        assert_eq!(e.srtt(), 0.1);
    }

    #[test]
    fn double_cto_backs_off() {
        let cfg = LedbatConfig::default();
        let mut e = RttEstimator::new(&cfg);
        e.observe(&[0.1]);
        let before = e.cto();
        e.double_cto();
        assert_eq!(e.cto(), before * 2.0);
    }
}
