// src/alerts/arbiter.rs
//
// Cooldown arbitration. Raw signals are noisy and arrive every frame; the
// arbiter lets at most one alert per key through per cooldown window.
// Arbitration is presence-based: ten collision signals in one frame count
// the same as one.

use crate::types::{AlertEvent, AlertKind, RawSignal, Severity, TrackId, TIME_EPSILON_S};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::info;

/// Cooldown key. Signs cool down per description so different signs do not
/// suppress each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertKey {
    Kind(AlertKind),
    Sign(String),
}

impl AlertKey {
    pub fn for_signal(signal: &RawSignal) -> Self {
        match signal.kind {
            AlertKind::TrafficSign => AlertKey::Sign(signal.description.clone()),
            kind => AlertKey::Kind(kind),
        }
    }
}

pub struct AlertArbiter {
    cooldown_s: f64,
    last_emitted: HashMap<AlertKey, f64>,
}

impl AlertArbiter {
    pub fn new(cooldown_s: f64) -> Self {
        Self {
            cooldown_s,
            last_emitted: HashMap::new(),
        }
    }

    /// True when `key` has never fired or last fired more than
    /// `cooldown_s` before `now`. Records `now` when it returns true.
    /// Gaps within `TIME_EPSILON_S` of the cooldown count as inside it.
    pub fn should_emit(&mut self, key: &AlertKey, now: f64, cooldown_s: f64) -> bool {
        match self.last_emitted.get(key) {
            Some(&last) if now - last <= cooldown_s + TIME_EPSILON_S => false,
            _ => {
                self.last_emitted.insert(key.clone(), now);
                true
            }
        }
    }

    /// Arbitrate one frame's raw signals into alert events.
    ///
    /// Collision, lane departure and obstacle are checked once each (in that
    /// order) if any signal of that kind is present; every distinct sign
    /// description is checked once.
    pub fn arbitrate(
        &mut self,
        signals: &[RawSignal],
        now: f64,
        timestamp: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        let cooldown = self.cooldown_s;

        let summary_kinds = [
            (AlertKind::Collision, "Collision risk detected", Severity::High),
            (AlertKind::LaneDeparture, "Lane departure detected", Severity::High),
            (AlertKind::Obstacle, "Obstacle detected ahead", Severity::Low),
        ];

        for (kind, description, severity) in summary_kinds {
            let mut present = signals.iter().filter(|s| s.kind == kind).peekable();
            if present.peek().is_none() {
                continue;
            }
            let track_id = nearest_track(present);
            if self.should_emit(&AlertKey::Kind(kind), now, cooldown) {
                info!("🚨 {} at {:.2}s", description, now);
                events.push(AlertEvent {
                    kind,
                    description: description.to_string(),
                    severity,
                    timestamp,
                    track_id,
                });
            }
        }

        let mut seen: Vec<&str> = Vec::new();
        for signal in signals.iter().filter(|s| s.kind == AlertKind::TrafficSign) {
            if seen.contains(&signal.description.as_str()) {
                continue;
            }
            seen.push(signal.description.as_str());

            if self.should_emit(&AlertKey::for_signal(signal), now, cooldown) {
                info!("🚦 {} at {:.2}s", signal.description, now);
                events.push(AlertEvent {
                    kind: AlertKind::TrafficSign,
                    description: signal.description.clone(),
                    severity: Severity::Medium,
                    timestamp,
                    track_id: None,
                });
            }
        }

        events
    }
}

/// Track id of the closest object among signals of one kind.
fn nearest_track<'a>(signals: impl Iterator<Item = &'a RawSignal>) -> Option<TrackId> {
    signals
        .filter(|s| s.track_id.is_some())
        .min_by(|a, b| {
            let da = a.distance_m.unwrap_or(f64::INFINITY);
            let db = b.distance_m.unwrap_or(f64::INFINITY);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .and_then(|s| s.track_id)
}
