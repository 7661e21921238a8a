//! Practice timing and hint settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::training::HintLevel;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PracticeConfig {
    /// Pause before each automatic opponent reply.
    #[serde(default = "default_opponent_delay_ms")]
    pub opponent_delay_ms: u64,
    /// How long the wrong-move flag stays raised.
    #[serde(default = "default_feedback_delay_ms")]
    pub feedback_delay_ms: u64,
    #[serde(default = "default_max_hint")]
    pub max_hint: HintLevel,
    #[serde(default = "default_drill_advance_delay_ms")]
    pub drill_advance_delay_ms: u64,
}

fn default_opponent_delay_ms() -> u64 {
    500
}
fn default_feedback_delay_ms() -> u64 {
    600
}
fn default_max_hint() -> HintLevel {
    HintLevel::Arrow
}
fn default_drill_advance_delay_ms() -> u64 {
    300
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            opponent_delay_ms: default_opponent_delay_ms(),
            feedback_delay_ms: default_feedback_delay_ms(),
            max_hint: default_max_hint(),
            drill_advance_delay_ms: default_drill_advance_delay_ms(),
        }
    }
}

impl PracticeConfig {
    pub fn opponent_delay(&self) -> Duration {
        Duration::from_millis(self.opponent_delay_ms)
    }

    pub fn feedback_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_delay_ms)
    }

    pub fn drill_advance_delay(&self) -> Duration {
        Duration::from_millis(self.drill_advance_delay_ms)
    }
}
