//! Mistake ledger and spaced review scheduling

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::session::PracticeEvent;
use crate::error::Result;
use crate::storage::{KeyValueStore, RepertoireStore};
use crate::tree::{MoveTree, NodeId};

/// Tally of wrong attempts at one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakeRecord {
    pub study_id: String,
    pub node_id: NodeId,
    pub expected_uci: String,
    pub wrong_attempts: u32,
    /// Correct reviews since the last miss.
    pub streak: u32,
    pub next_review_at: DateTime<Utc>,
    pub last_practiced_at: DateTime<Utc>,
}

/// Delay until the next review. A fresh miss (streak 0) is due at once;
/// after that the interval doubles per correct review, starting at a day,
/// and is divided by how often the move was missed (at most by 4).
pub fn review_interval(streak: u32, wrong_attempts: u32) -> Duration {
    if streak == 0 {
        return Duration::zero();
    }
    let base_hours: i64 = 24 << (streak - 1).min(6);
    let divisor = i64::from(wrong_attempts.clamp(1, 4));
    Duration::hours(base_hours / divisor)
}

/// Mistake records for every study, keyed by node within a study.
#[derive(Debug, Clone, Default)]
pub struct MistakeLedger {
    studies: HashMap<String, BTreeMap<NodeId, MistakeRecord>>,
}

impl MistakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the record for `node_id`: one more wrong attempt, streak back
    /// to zero, due immediately.
    pub fn record_mistake(
        &mut self,
        study_id: &str,
        node_id: NodeId,
        expected_uci: &str,
        now: DateTime<Utc>,
    ) -> &MistakeRecord {
        let record = self
            .studies
            .entry(study_id.to_string())
            .or_default()
            .entry(node_id)
            .or_insert_with(|| MistakeRecord {
                study_id: study_id.to_string(),
                node_id,
                expected_uci: expected_uci.to_string(),
                wrong_attempts: 0,
                streak: 0,
                next_review_at: now,
                last_practiced_at: now,
            });
        record.wrong_attempts += 1;
        record.streak = 0;
        record.expected_uci = expected_uci.to_string();
        record.last_practiced_at = now;
        record.next_review_at = now + review_interval(0, record.wrong_attempts);
        tracing::debug!(
            study = study_id,
            node = %node_id,
            attempts = record.wrong_attempts,
            "mistake recorded"
        );
        record
    }

    /// A correct review: extends the streak and pushes the due date out.
    /// `None` when the node has no record.
    pub fn record_success(
        &mut self,
        study_id: &str,
        node_id: NodeId,
        now: DateTime<Utc>,
    ) -> Option<&MistakeRecord> {
        let record = self.studies.get_mut(study_id)?.get_mut(&node_id)?;
        record.streak += 1;
        record.last_practiced_at = now;
        record.next_review_at = now + review_interval(record.streak, record.wrong_attempts);
        Some(record)
    }

    /// Records due at `now`, most overdue first.
    pub fn due_for_review(&self, study_id: &str, now: DateTime<Utc>) -> Vec<MistakeRecord> {
        let mut due: Vec<MistakeRecord> = self
            .studies
            .get(study_id)
            .into_iter()
            .flat_map(|records| records.values())
            .filter(|r| r.next_review_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|r| r.next_review_at);
        due
    }

    pub fn records(&self, study_id: &str) -> Vec<MistakeRecord> {
        self.studies
            .get(study_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, study_id: &str, node_id: NodeId) -> Option<&MistakeRecord> {
        self.studies.get(study_id)?.get(&node_id)
    }

    /// Forgets every record of the study. There is no undo.
    pub fn clear_all(&mut self, study_id: &str) {
        self.studies.remove(study_id);
    }

    /// Drops records whose node is no longer in `tree`.
    pub fn prune(&mut self, study_id: &str, tree: &MoveTree) -> usize {
        let Some(records) = self.studies.get_mut(study_id) else {
            return 0;
        };
        let before = records.len();
        records.retain(|id, _| tree.contains(*id));
        before - records.len()
    }

    /// Records every wrong move among `events`.
    pub fn observe(&mut self, study_id: &str, events: &[PracticeEvent], now: DateTime<Utc>) {
        for event in events {
            if let PracticeEvent::WrongMove {
                node_id,
                expected_uci,
                ..
            } = event
            {
                self.record_mistake(study_id, *node_id, expected_uci, now);
            }
        }
    }

    pub fn replace(&mut self, study_id: &str, records: Vec<MistakeRecord>) {
        let map = records.into_iter().map(|r| (r.node_id, r)).collect();
        self.studies.insert(study_id.to_string(), map);
    }

    pub fn load_from<S: KeyValueStore>(
        &mut self,
        store: &RepertoireStore<S>,
        study_id: &str,
    ) -> Result<()> {
        let records = store.load_mistakes(study_id)?;
        self.replace(study_id, records);
        Ok(())
    }

    pub fn save_to<S: KeyValueStore>(
        &self,
        store: &RepertoireStore<S>,
        study_id: &str,
    ) -> Result<()> {
        store.save_mistakes(study_id, &self.records(study_id))
    }
}
