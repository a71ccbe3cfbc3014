//! Tick-counted durations.
//!
//! All timers in the framework count ticks, not wall-clock time, so a stalled
//! tick loop delays them instead of skipping them. Module data may still be
//! written in human units (`"10s"`, `"1m 30s"`, `"250ms"`); those are
//! converted once, at parse time, at the canonical rate of
//! [`TICKS_PER_SECOND`], rounding up to whole ticks.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Canonical simulation rate used to convert human durations into ticks.
pub const TICKS_PER_SECOND: u64 = 20;

/// Milliseconds covered by one tick at the canonical rate.
pub const MILLIS_PER_TICK: u64 = 1_000 / TICKS_PER_SECOND;

/// A duration measured in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct TickDuration(u64);

impl TickDuration {
    /// Zero ticks.
    pub const ZERO: Self = Self(0);

    /// A duration of exactly `ticks` ticks.
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// A duration of whole seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(TICKS_PER_SECOND))
    }

    /// Convert a wall-clock duration, rounding up to whole ticks.
    pub fn from_duration(duration: Duration) -> Self {
        let ticks = duration.as_millis().div_ceil(u128::from(MILLIS_PER_TICK));
        Self(u64::try_from(ticks).unwrap_or(u64::MAX))
    }

    /// Number of ticks.
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Whole seconds, rounded up.
    pub const fn secs_ceil(self) -> u64 {
        self.0.div_ceil(TICKS_PER_SECOND)
    }

    /// Whether this duration is zero ticks long.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Wall-clock equivalent at the canonical rate.
    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.0.saturating_mul(MILLIS_PER_TICK))
    }
}

impl core::fmt::Display for TickDuration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

impl<'de> Deserialize<'de> for TickDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Ticks(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Ticks(ticks) => Ok(Self(ticks)),
            Raw::Text(text) => parse_text(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// Parse `"40"` as ticks, `"40t"` as ticks, anything else via humantime.
fn parse_text(text: &str) -> Result<TickDuration, String> {
    let trimmed = text.trim();
    if let Ok(ticks) = trimmed.parse::<u64>() {
        return Ok(TickDuration(ticks));
    }
    if let Some(ticks) = trimmed.strip_suffix('t').and_then(|t| t.trim().parse::<u64>().ok()) {
        return Ok(TickDuration(ticks));
    }
    humantime::parse_duration(trimmed)
        .map(TickDuration::from_duration)
        .map_err(|e| format!("invalid duration '{trimmed}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Option<TickDuration> {
        serde_yml::from_str(yaml).ok()
    }

    #[test]
    fn integers_are_ticks() {
        assert_eq!(parse("40"), Some(TickDuration::from_ticks(40)));
        assert_eq!(parse("\"40t\""), Some(TickDuration::from_ticks(40)));
    }

    #[test]
    fn human_units_round_up() {
        assert_eq!(parse("\"10s\""), Some(TickDuration::from_ticks(200)));
        assert_eq!(parse("\"1m 30s\""), Some(TickDuration::from_ticks(1_800)));
        assert_eq!(parse("\"60ms\""), Some(TickDuration::from_ticks(2)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse("\"soon\""), None);
    }

    #[test]
    fn seconds_round_up() {
        assert_eq!(TickDuration::from_ticks(21).secs_ceil(), 2);
        assert_eq!(TickDuration::from_secs(3).ticks(), 60);
        assert_eq!(TickDuration::from_ticks(20).as_duration(), Duration::from_secs(1));
    }
}
