//! Player-facing effect payloads: status effects and progress bars.

use serde::{Deserialize, Serialize};

use crate::enums::{BarColor, EffectKind};
use crate::time::TickDuration;

/// A status effect as configured in module data and sent to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotionEffect {
    /// Which effect.
    pub kind: EffectKind,

    /// Zero-based strength level.
    #[serde(default)]
    pub amplifier: u8,

    /// How long the effect lasts.
    #[serde(default = "default_effect_duration")]
    pub duration: TickDuration,

    /// Render with the faint "beacon" particle style.
    #[serde(default)]
    pub ambient: bool,

    /// Render particles at all.
    #[serde(default = "default_true")]
    pub particles: bool,

    /// Never expire on its own; removed only by death, leave or replacement.
    #[serde(default)]
    pub hide_duration: bool,

    /// Survive the holder's death.
    #[serde(default)]
    pub death_persistent: bool,

    /// Survive the holder leaving the session (and the entity despawning).
    #[serde(default)]
    pub session_persistent: bool,
}

impl PotionEffect {
    /// A plain effect with default rendering and persistence flags.
    pub const fn new(kind: EffectKind, amplifier: u8, duration: TickDuration) -> Self {
        Self {
            kind,
            amplifier,
            duration,
            ambient: false,
            particles: true,
            hide_duration: false,
            death_persistent: false,
            session_persistent: false,
        }
    }
}

/// A progress indicator shown to a single player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressBar {
    /// Text shown above the bar.
    pub title: String,
    /// Fill fraction in `[0, 1]`.
    pub progress: f32,
    /// Bar colour.
    pub color: BarColor,
}

const fn default_effect_duration() -> TickDuration {
    TickDuration::from_secs(30)
}

const fn default_true() -> bool {
    true
}
