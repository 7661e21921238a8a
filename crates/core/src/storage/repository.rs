//! Typed access to studies, progress and mistakes

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::KeyValueStore;
use crate::error::Result;
use crate::study::OpeningStudy;
use crate::training::{MistakeRecord, PracticeProgress};

const STUDY_PREFIX: &str = "study:";
const PROGRESS_PREFIX: &str = "progress:";
const MISTAKES_PREFIX: &str = "mistakes:";

/// JSON records over a [`KeyValueStore`], one key per study and concern.
pub struct RepertoireStore<S> {
    store: S,
}

impl<S: KeyValueStore> RepertoireStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Validates first; nothing is written for an invalid study.
    pub fn save_study(&self, study: &OpeningStudy) -> Result<()> {
        study.validate()?;
        self.put(&format!("{}{}", STUDY_PREFIX, study.id), study)
    }

    pub fn load_study(&self, id: &str) -> Result<Option<OpeningStudy>> {
        self.get(&format!("{}{}", STUDY_PREFIX, id))
    }

    /// Every stored study, sorted by name.
    pub fn list_studies(&self) -> Result<Vec<OpeningStudy>> {
        let mut studies = Vec::new();
        for key in self.store.keys(STUDY_PREFIX)? {
            if let Some(study) = self.get::<OpeningStudy>(&key)? {
                studies.push(study);
            }
        }
        studies.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(studies)
    }

    /// Removes the study together with its progress and mistakes.
    pub fn delete_study(&self, id: &str) -> Result<()> {
        self.store.delete(&format!("{}{}", STUDY_PREFIX, id))?;
        self.store.delete(&format!("{}{}", PROGRESS_PREFIX, id))?;
        self.store.delete(&format!("{}{}", MISTAKES_PREFIX, id))?;
        tracing::info!(study = id, "study deleted");
        Ok(())
    }

    /// Fresh progress when nothing was saved yet.
    pub fn load_progress(&self, study_id: &str) -> Result<PracticeProgress> {
        Ok(self
            .get(&format!("{}{}", PROGRESS_PREFIX, study_id))?
            .unwrap_or_default())
    }

    pub fn save_progress(&self, study_id: &str, progress: &PracticeProgress) -> Result<()> {
        self.put(&format!("{}{}", PROGRESS_PREFIX, study_id), progress)
    }

    pub fn load_mistakes(&self, study_id: &str) -> Result<Vec<MistakeRecord>> {
        Ok(self
            .get(&format!("{}{}", MISTAKES_PREFIX, study_id))?
            .unwrap_or_default())
    }

    pub fn save_mistakes(&self, study_id: &str, records: &[MistakeRecord]) -> Result<()> {
        let key = format!("{}{}", MISTAKES_PREFIX, study_id);
        if records.is_empty() {
            return self.store.delete(&key);
        }
        self.put(&key, records)
    }

    fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.store.save(key, &json)
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.load(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{MoveAttempt, Side};
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use crate::training::MistakeLedger;
    use chrono::Utc;

    fn repo() -> RepertoireStore<MemoryStore> {
        RepertoireStore::new(MemoryStore::new())
    }

    #[test]
    fn test_study_round_trip() {
        let repo = repo();
        let mut study = OpeningStudy::new("Caro-Kann", Side::Black, None).unwrap();
        let path = study
            .play_move(&[], &MoveAttempt::from_uci("e2e4").unwrap())
            .unwrap();
        study.set_practice_start(Some(path[0])).unwrap();

        repo.save_study(&study).unwrap();
        assert_eq!(repo.load_study(&study.id).unwrap(), Some(study.clone()));
        assert_eq!(repo.list_studies().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_study_is_not_saved() {
        let repo = repo();
        let mut study = OpeningStudy::new("Caro-Kann", Side::Black, None).unwrap();
        study.name = String::new();
        assert!(matches!(repo.save_study(&study), Err(Error::Validation(_))));
        assert!(repo.inner().is_empty());
    }

    #[test]
    fn test_misses_use_defaults() {
        let repo = repo();
        assert_eq!(repo.load_study("nope").unwrap(), None);
        assert_eq!(repo.load_progress("nope").unwrap(), PracticeProgress::default());
        assert!(repo.load_mistakes("nope").unwrap().is_empty());
    }

    #[test]
    fn test_delete_study_removes_everything() {
        let repo = repo();
        let study = OpeningStudy::new("Scotch", Side::White, None).unwrap();
        repo.save_study(&study).unwrap();

        let mut progress = PracticeProgress::default();
        progress.mark_completed(0);
        repo.save_progress(&study.id, &progress).unwrap();
        assert_eq!(repo.load_progress(&study.id).unwrap(), progress);

        let mut ledger = MistakeLedger::new();
        ledger.record_mistake(&study.id, crate::tree::NodeId::new(), "e2e4", Utc::now());
        ledger.save_to(&repo, &study.id).unwrap();
        let mut reloaded = MistakeLedger::new();
        reloaded.load_from(&repo, &study.id).unwrap();
        assert_eq!(reloaded.records(&study.id), ledger.records(&study.id));

        repo.delete_study(&study.id).unwrap();
        assert!(repo.inner().is_empty());
    }
}
