// Confidence-driven pulse animation for the 3D species beacons.
//
// Each beacon breathes between its base scale and base + confidence; the
// phase is offset by the point's latitude so beacons across the globe do
// not pulse in lockstep.

use super::clock::Clock;

#[derive(Debug, Clone)]
pub struct PulseConfig {
    /// Scale of a beacon at rest (confidence 0 or phase trough).
    pub base_scale: f64,
    /// Oscillation rate in radians per second.
    pub rate: f64,
    /// Phase offset per degree of latitude, radians.
    pub lat_phase: f64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            base_scale: 0.6,
            rate: 2.0,
            lat_phase: 0.35,
        }
    }
}

/// Oscillation phase in [0, 1] at clock time `now` for a beacon at `lat`.
pub fn pulse_phase(cfg: &PulseConfig, now: f64, lat: f64) -> f64 {
    0.5 * (1.0 + (now * cfg.rate + lat * cfg.lat_phase).sin())
}

/// Render scale for one beacon: base + confidence × (0.5 + phase × 0.5).
pub fn pulse_scale(cfg: &PulseConfig, clock: &dyn Clock, confidence: f64, lat: f64) -> f64 {
    let phase = pulse_phase(cfg, clock.now(), lat);
    cfg.base_scale + confidence * (0.5 + phase * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::ManualClock;

    #[test]
    fn phase_stays_in_unit_interval() {
        let cfg = PulseConfig::default();
        for i in 0..200 {
            let phase = pulse_phase(&cfg, i as f64 * 0.173, -75.0 + i as f64);
            assert!((0.0..=1.0).contains(&phase));
        }
    }

    #[test]
    fn scale_is_bounded_by_confidence() {
        let cfg = PulseConfig::default();
        let clock = ManualClock::new(3.7);
        for lat in [-75.0, 0.0, 42.0] {
            let scale = pulse_scale(&cfg, &clock, 0.9, lat);
            // phase ∈ [0,1] → scale ∈ [base + 0.45, base + 0.9].
            assert!(scale >= cfg.base_scale + 0.9 * 0.5);
            assert!(scale <= cfg.base_scale + 0.9);
        }
    }

    #[test]
    fn zero_confidence_never_pulses() {
        let cfg = PulseConfig::default();
        let mut clock = ManualClock::new(0.0);
        let first = pulse_scale(&cfg, &clock, 0.0, 30.0);
        clock.advance(1.234);
        let later = pulse_scale(&cfg, &clock, 0.0, 30.0);
        assert_eq!(first, cfg.base_scale);
        assert_eq!(later, cfg.base_scale);
    }

    #[test]
    fn latitude_desynchronizes_beacons() {
        let cfg = PulseConfig::default();
        let clock = ManualClock::new(1.0);
        let a = pulse_scale(&cfg, &clock, 0.8, -75.0);
        let b = pulse_scale(&cfg, &clock, 0.8, 30.0);
        assert!((a - b).abs() > 1e-6);
    }
}
