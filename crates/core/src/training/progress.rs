//! Per-study practice progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Resumable practice bookkeeping, keyed by line index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeProgress {
    #[serde(default)]
    pub completed_lines: BTreeSet<usize>,
    #[serde(default)]
    pub skipped_lines: BTreeSet<usize>,
    #[serde(default)]
    pub current_line_index: usize,
    /// Cumulative over every session.
    #[serde(default)]
    pub wrong_attempts: u32,
    #[serde(default)]
    pub last_practiced_at: Option<DateTime<Utc>>,
}

impl PracticeProgress {
    /// Returns `true` if the line was not completed before.
    pub fn mark_completed(&mut self, index: usize) -> bool {
        self.completed_lines.insert(index)
    }

    pub fn mark_skipped(&mut self, index: usize) {
        self.skipped_lines.insert(index);
    }

    pub fn is_complete(&self, total: usize) -> bool {
        (0..total).all(|i| self.completed_lines.contains(&i))
    }

    /// Completed share of `total` lines, 0 for an empty study.
    pub fn completion_percent(&self, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let done = self.completed_lines.iter().filter(|i| **i < total).count();
        done as f64 / total as f64 * 100.0
    }

    pub fn remaining(&self, total: usize) -> usize {
        (0..total).filter(|i| !self.completed_lines.contains(i)).count()
    }

    /// Drops indices that no longer exist after the study's lines changed.
    pub fn clamp_to(&mut self, total: usize) {
        self.completed_lines.retain(|i| *i < total);
        self.skipped_lines.retain(|i| *i < total);
        if self.current_line_index >= total {
            self.current_line_index = 0;
        }
    }
}
