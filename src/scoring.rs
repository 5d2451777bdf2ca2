//! Time-decayed brightness and EMA mastery scoring.
//!
//! Two pure functions drive the visualization weights:
//!
//! - **brightness** — `clamp(exp(-days/30), 0.08, 1.0)` since the last
//!   activity, with a fixed baseline for never-touched concepts. The floor
//!   keeps a practiced concept from fully disappearing.
//! - **mastery** — fixed-weight exponential moving average of graded scores:
//!   `old * 0.7 + (score/100) * 0.3`.
//!
//! All constants live in [`ScoringConfig`] rather than at call sites, and both
//! storage engines evaluate the same expressions in the same order so their
//! stored results match bit for bit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tunable scoring constants with the model's canonical defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Brightness for a concept with no recorded activity.
    #[serde(default = "default_baseline")]
    pub baseline: f64,
    /// Lower clamp for decayed brightness.
    #[serde(default = "default_floor")]
    pub floor: f64,
    /// Exponential time constant in days.
    #[serde(default = "default_decay_days")]
    pub decay_days: f64,
    /// EMA weight on the previous mastery value.
    #[serde(default = "default_ema_keep")]
    pub ema_keep: f64,
    /// EMA weight on the incoming normalized score.
    #[serde(default = "default_ema_gain")]
    pub ema_gain: f64,
}

fn default_baseline() -> f64 {
    0.12
}
fn default_floor() -> f64 {
    0.08
}
fn default_decay_days() -> f64 {
    30.0
}
fn default_ema_keep() -> f64 {
    0.7
}
fn default_ema_gain() -> f64 {
    0.3
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            floor: default_floor(),
            decay_days: default_decay_days(),
            ema_keep: default_ema_keep(),
            ema_gain: default_ema_gain(),
        }
    }
}

impl ScoringConfig {
    /// Visualization brightness for a concept last touched at `last`.
    ///
    /// `None` returns the baseline. Elapsed days are clamped to zero for
    /// timestamps in the future, then decayed and clamped to `[floor, 1.0]`.
    pub fn brightness(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(last) = last else {
            return self.baseline;
        };
        let days = ((now - last).num_milliseconds() as f64 / 86_400_000.0).max(0.0);
        (-days / self.decay_days).exp().clamp(self.floor, 1.0)
    }

    /// EMA mastery update for a graded score in `0..=100`.
    ///
    /// An absent prior value is treated as `0.0`. The result stays in `[0,1]`
    /// for in-domain inputs.
    pub fn update_mastery(&self, old: Option<f64>, score: u8) -> f64 {
        old.unwrap_or(0.0) * self.ema_keep + (f64::from(score) / 100.0) * self.ema_gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cfg() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn baseline_without_activity() {
        let now = Utc::now();
        assert!((cfg().brightness(None, now) - 0.12).abs() < f64::EPSILON);
    }

    #[test]
    fn fresh_activity_is_full_brightness() {
        let now = Utc::now();
        let b = cfg().brightness(Some(now), now);
        assert!((b - 1.0).abs() < 1e-9, "b = {b}");
    }

    #[test]
    fn future_timestamp_clamps_to_now() {
        let now = Utc::now();
        let b = cfg().brightness(Some(now + Duration::days(3)), now);
        assert!((b - 1.0).abs() < 1e-9, "b = {b}");
    }

    #[test]
    fn brightness_monotonically_decreasing() {
        let now = Utc::now();
        let c = cfg();
        let mut prev = f64::MAX;
        for days in [0, 1, 7, 14, 30, 60, 90] {
            let b = c.brightness(Some(now - Duration::days(days)), now);
            assert!(b <= prev, "brightness rose at {days} days");
            prev = b;
        }
    }

    #[test]
    fn decay_matches_exponential() {
        let now = Utc::now();
        let b = cfg().brightness(Some(now - Duration::days(30)), now);
        assert!((b - (-1.0f64).exp()).abs() < 1e-6, "b = {b}");
    }

    #[test]
    fn floor_reached_after_long_absence() {
        // exp(-days/30) dips below 0.08 around day 76.
        let now = Utc::now();
        let c = cfg();
        let b = c.brightness(Some(now - Duration::days(120)), now);
        assert!((b - 0.08).abs() < f64::EPSILON, "b = {b}");
        let b = c.brightness(Some(now - Duration::days(365)), now);
        assert!((b - 0.08).abs() < f64::EPSILON, "b = {b}");
    }

    #[test]
    fn mastery_from_absent_baseline() {
        assert!((cfg().update_mastery(None, 100) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn mastery_ema_step() {
        let m = cfg().update_mastery(Some(0.3), 100);
        assert!((m - 0.51).abs() < 1e-12, "m = {m}");
    }

    #[test]
    fn mastery_chained_sequence() {
        // Scores 80 then 60 from an absent baseline: 0.24, then 0.348.
        let c = cfg();
        let m1 = c.update_mastery(None, 80);
        assert!((m1 - 0.24).abs() < 1e-12, "m1 = {m1}");
        let m2 = c.update_mastery(Some(m1), 60);
        assert!((m2 - 0.348).abs() < 1e-12, "m2 = {m2}");
    }

    #[test]
    fn mastery_stays_in_unit_interval() {
        let c = cfg();
        let mut m = None;
        for score in [0u8, 100, 100, 100, 100, 0, 50] {
            let next = c.update_mastery(m, score);
            assert!((0.0..=1.0).contains(&next), "m = {next}");
            m = Some(next);
        }
    }
}
