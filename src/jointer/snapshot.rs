//! Snapshotting the learner's state to disk.
//!
//! A snapshot carries the epoch counter plus one opaque JSON blob per
//! collaborator; each collaborator defines its own state schema. Buffered
//! abductions are deliberately not persisted, they belong to the epoch
//! that produced them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SeshatResult, SnapshotError};

use super::Jointer;

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub epoch: u64,
    pub perception: serde_json::Value,
    pub syntax: serde_json::Value,
    pub semantics: serde_json::Value,
}

impl Jointer {
    pub fn snapshot(&self) -> SeshatResult<Snapshot> {
        Ok(Snapshot {
            epoch: self.epoch,
            perception: self.perception.save_state()?,
            syntax: self.syntax.save_state()?,
            semantics: self.semantics.save_state()?,
        })
    }

    pub fn restore(&mut self, snapshot: Snapshot) -> SeshatResult<()> {
        self.perception.load_state(snapshot.perception)?;
        self.syntax.load_state(snapshot.syntax)?;
        self.semantics.load_state(snapshot.semantics)?;
        self.epoch = snapshot.epoch;
        self.buffer.clear();
        self.trees.clear();
        Ok(())
    }

    pub fn save_snapshot(&self, path: &Path) -> SeshatResult<()> {
        let snapshot = self.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|source| SnapshotError::Serde { source })?;
        std::fs::write(path, json).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), epoch = snapshot.epoch, "snapshot written");
        Ok(())
    }

    pub fn load_snapshot(&mut self, path: &Path) -> SeshatResult<()> {
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let snapshot: Snapshot =
            serde_json::from_str(&json).map_err(|source| SnapshotError::Serde { source })?;
        self.restore(snapshot)?;
        info!(path = %path.display(), epoch = self.epoch, "snapshot restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{NoisyPerception, PrecedenceSyntax, SlotStore};
    use crate::config::JointerConfig;
    use crate::domain::Symbol;

    fn noisy_jointer() -> Jointer {
        Jointer::new(
            Box::new(NoisyPerception::confused(&[(Symbol(3), Symbol(8))])),
            Box::new(PrecedenceSyntax::new()),
            Box::new(SlotStore::solved()),
            JointerConfig::default(),
        )
        .unwrap()
    }

    fn glyphs(text: &str) -> Vec<Vec<String>> {
        vec![text.chars().map(|c| c.to_string()).collect()]
    }

    #[test]
    fn restore_carries_epoch_and_collaborator_state() {
        let mut trained = noisy_jointer();
        let batch = glyphs("3+4");
        trained.deduce(&batch);
        trained.abduce(&[7], &batch);
        trained.learn();
        assert_eq!(trained.epoch(), 1);

        let snapshot = trained.snapshot().unwrap();
        let mut restored = noisy_jointer();
        restored.restore(snapshot).unwrap();
        assert_eq!(restored.epoch(), 1);

        // The retrained decoder state came along: '3' now decodes right.
        let a = trained.deduce(&batch);
        let b = restored.deduce(&batch);
        assert_eq!(a.sentences, b.sentences);
        assert_eq!(a.results, b.results);
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seshat.snapshot.json");

        let mut trained = noisy_jointer();
        let batch = glyphs("3*3");
        trained.deduce(&batch);
        trained.abduce(&[9], &batch);
        trained.learn();
        trained.save_snapshot(&path).unwrap();

        let mut restored = noisy_jointer();
        restored.load_snapshot(&path).unwrap();
        assert_eq!(restored.epoch(), trained.epoch());
        assert_eq!(
            restored.deduce(&batch).results,
            trained.deduce(&batch).results
        );
    }

    #[test]
    fn missing_snapshot_file_is_an_io_error() {
        let mut jointer = noisy_jointer();
        let err = jointer
            .load_snapshot(Path::new("/nonexistent/seshat.snapshot.json"))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::SeshatError::Snapshot(SnapshotError::Io { .. })
        ));
    }
}
