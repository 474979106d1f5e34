use crate::callbacks::DurationMs;
use crate::config::Options;

// https://tools.ietf.org/html/rfc4960#section-15
const RTO_ALPHA: f64 = 0.125;
const RTO_BETA: f64 = 0.25;

/// Retransmission timeout estimation per RFC 6298 / RFC 4960 section
/// 6.3.1, clamped to the configured bounds.
#[derive(Debug)]
pub(crate) struct Rto {
    min_rto_ms: f64,
    max_rto_ms: f64,
    srtt_ms: f64,
    rttvar_ms: f64,
    rto_ms: f64,
    has_measurement: bool,
}

impl Rto {
    pub(crate) fn new(options: &Options) -> Self {
        Rto {
            min_rto_ms: options.rto_min_ms as f64,
            max_rto_ms: options.rto_max_ms as f64,
            srtt_ms: 0.0,
            rttvar_ms: 0.0,
            rto_ms: options.rto_initial_ms as f64,
            has_measurement: false,
        }
    }

    /// Feeds a new round-trip sample into the estimator.
    pub(crate) fn observe_rtt(&mut self, rtt_ms: DurationMs) {
        let r = rtt_ms as f64;
        if !self.has_measurement {
            // "When the first RTT measurement R is made, set"
            self.srtt_ms = r;
            self.rttvar_ms = r / 2.0;
            self.has_measurement = true;
        } else {
            // "When a new RTT measurement R' is made, set"
            self.rttvar_ms = (1.0 - RTO_BETA) * self.rttvar_ms + RTO_BETA * (self.srtt_ms - r).abs();
            self.srtt_ms = (1.0 - RTO_ALPHA) * self.srtt_ms + RTO_ALPHA * r;
        }
        self.rto_ms = (self.srtt_ms + 4.0 * self.rttvar_ms).clamp(self.min_rto_ms, self.max_rto_ms);
    }

    pub(crate) fn rto(&self) -> DurationMs {
        self.rto_ms as DurationMs
    }

    pub(crate) fn srtt(&self) -> DurationMs {
        self.srtt_ms as DurationMs
    }
}
