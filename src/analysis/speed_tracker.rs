// src/analysis/speed_tracker.rs
//
// Closing speed from consecutive distance observations of the same track.
// Positive relative speed means the object is approaching.
//
// History is bounded: entries unseen for `stale_after_s` expire, and the
// table never holds more than `max_tracks` entries (least recently
// observed is evicted first).

use crate::config::TrackingConfig;
use crate::types::TrackId;
use std::collections::HashMap;
use tracing::debug;

/// Observations closer together than this carry no usable speed.
const MIN_DT_S: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosingSpeed {
    /// m/s, positive when approaching
    pub relative_mps: f64,
    /// `relative_mps` in km/h
    pub speed_kmh: f64,
}

#[derive(Debug, Clone, Copy)]
struct TrackSample {
    distance_m: f64,
    observed_at: f64,
}

pub struct TrackSpeedEstimator {
    history: HashMap<TrackId, TrackSample>,
    max_tracks: usize,
    stale_after_s: f64,
}

impl TrackSpeedEstimator {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            history: HashMap::new(),
            max_tracks: config.max_tracks.max(1),
            stale_after_s: config.stale_after_s,
        }
    }

    /// Record `distance_m` for `track_id` at time `now` (seconds) and return
    /// the closing speed against the previous observation, if any.
    ///
    /// The first observation of a track yields `None`. So does an observation
    /// less than 1 ms after the previous one; that one is not recorded.
    pub fn estimate_speed(
        &mut self,
        track_id: TrackId,
        distance_m: f64,
        now: f64,
    ) -> Option<ClosingSpeed> {
        if !distance_m.is_finite() {
            return None;
        }

        self.expire(now);

        let previous = match self.history.get(&track_id) {
            Some(sample) => *sample,
            None => {
                self.insert(track_id, distance_m, now);
                return None;
            }
        };

        let dt = now - previous.observed_at;
        if dt <= MIN_DT_S {
            return None;
        }

        let relative_mps = (previous.distance_m - distance_m) / dt;
        self.insert(track_id, distance_m, now);

        Some(ClosingSpeed {
            relative_mps,
            speed_kmh: relative_mps * 3.6,
        })
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn insert(&mut self, track_id: TrackId, distance_m: f64, now: f64) {
        if !self.history.contains_key(&track_id) && self.history.len() >= self.max_tracks {
            self.evict_oldest();
        }
        self.history.insert(
            track_id,
            TrackSample {
                distance_m,
                observed_at: now,
            },
        );
    }

    fn expire(&mut self, now: f64) {
        if self.stale_after_s <= 0.0 {
            return;
        }
        let before = self.history.len();
        let stale_after = self.stale_after_s;
        self.history
            .retain(|_, sample| now - sample.observed_at <= stale_after);
        let expired = before - self.history.len();
        if expired > 0 {
            debug!("Expired {} stale track(s)", expired);
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .history
            .iter()
            .min_by(|a, b| {
                a.1.observed_at
                    .partial_cmp(&b.1.observed_at)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| *id);

        if let Some(id) = oldest {
            debug!("Track history full, evicting track {}", id);
            self.history.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> TrackSpeedEstimator {
        TrackSpeedEstimator::new(&TrackingConfig::default())
    }

    #[test]
    fn test_first_observation_has_no_speed() {
        let mut est = estimator();
        assert_eq!(est.estimate_speed(1, 20.0, 0.0), None);
        assert_eq!(est.estimate_speed(2, 15.0, 0.5), None);
        assert_eq!(est.len(), 2);
    }

    #[test]
    fn test_approaching_track() {
        let mut est = estimator();
        est.estimate_speed(7, 20.0, 100.0);
        let speed = est.estimate_speed(7, 10.0, 101.0).unwrap();

        assert!((speed.relative_mps - 10.0).abs() < 1e-9);
        assert!((speed.speed_kmh - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_receding_track_is_negative() {
        let mut est = estimator();
        est.estimate_speed(3, 10.0, 0.0);
        let speed = est.estimate_speed(3, 12.0, 0.5).unwrap();
        assert!((speed.relative_mps + 4.0).abs() < 1e-9);
        assert!(speed.speed_kmh < 0.0);
    }

    #[test]
    fn test_duplicate_timestamp_does_not_update_history() {
        let mut est = estimator();
        est.estimate_speed(1, 20.0, 0.0);
        assert_eq!(est.estimate_speed(1, 5.0, 0.0005), None);
        assert_eq!(est.estimate_speed(1, 5.0, 0.001), None);

        // Still measured against the 20 m sample at t=0
        let speed = est.estimate_speed(1, 18.0, 1.0).unwrap();
        assert!((speed.relative_mps - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_track_restarts() {
        let mut est = TrackSpeedEstimator::new(&TrackingConfig {
            max_tracks: 16,
            stale_after_s: 2.0,
            ..TrackingConfig::default()
        });
        est.estimate_speed(1, 20.0, 0.0);
        assert_eq!(est.estimate_speed(1, 10.0, 5.0), None);
        assert!(est.estimate_speed(1, 9.0, 6.0).is_some());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let mut est = TrackSpeedEstimator::new(&TrackingConfig {
            max_tracks: 2,
            stale_after_s: 0.0,
            ..TrackingConfig::default()
        });
        est.estimate_speed(1, 20.0, 0.0);
        est.estimate_speed(2, 20.0, 1.0);
        est.estimate_speed(3, 20.0, 2.0);

        assert_eq!(est.len(), 2);
        // Track 1 was evicted, so this is a first observation again
        assert_eq!(est.estimate_speed(1, 19.0, 3.0), None);
        // Track 3 survived
        assert!(est.estimate_speed(3, 19.0, 3.0).is_some());
    }

    #[test]
    fn test_non_finite_distance_ignored() {
        let mut est = estimator();
        assert_eq!(est.estimate_speed(1, f64::NAN, 0.0), None);
        assert!(est.is_empty());
    }
}
