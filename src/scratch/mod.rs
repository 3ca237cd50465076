use std::time::{Duration, Instant};

use time::OffsetDateTime;

use crate::autosave::{SaveStatus, WriteScheduler};
use crate::storage::{StorageHandle, SCRATCH_KEY};

pub const DEFAULT_SCRATCH: &str = "# Welcome to Penguin 🐧\nStart typing...";

/// The standalone draft buffer. It shares nothing with the note collection:
/// one plain string under its own key, saved on its own (slower) debounce.
pub struct ScratchPad {
    content: String,
    loaded: bool,
    scheduler: WriteScheduler,
}

impl ScratchPad {
    pub fn new(debounce: Duration) -> Self {
        Self {
            content: String::new(),
            loaded: false,
            scheduler: WriteScheduler::new(debounce),
        }
    }

    /// Reads the persisted draft; an absent key or a failed read yields the
    /// welcome placeholder.
    pub fn load(&mut self, storage: &StorageHandle) {
        self.content = match storage.load_scratch() {
            Ok(Some(content)) => content,
            Ok(None) => DEFAULT_SCRATCH.to_string(),
            Err(err) => {
                tracing::warn!(?err, "failed to read scratch draft, using placeholder");
                DEFAULT_SCRATCH.to_string()
            }
        };
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replaces the draft and schedules a save. Does nothing before `load`
    /// or when the content is unchanged.
    pub fn update(&mut self, content: &str) {
        if !self.loaded || self.content == content {
            return;
        }
        self.content.clear();
        self.content.push_str(content);
        self.scheduler.schedule(self.content.clone());
    }

    /// True from the first unsaved edit until the write lands.
    pub fn is_saving(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.scheduler.status()
    }

    pub fn maybe_flush(&mut self, storage: &StorageHandle) -> bool {
        match self.scheduler.take_due(Instant::now()) {
            Some(payload) => self.commit(storage, &payload),
            None => false,
        }
    }

    pub fn flush_now(&mut self, storage: &StorageHandle) {
        if let Some(payload) = self.scheduler.flush() {
            self.commit(storage, &payload);
        }
    }

    fn commit(&mut self, storage: &StorageHandle, payload: &str) -> bool {
        match storage.put(SCRATCH_KEY, payload) {
            Ok(()) => {
                self.scheduler.mark_saved(OffsetDateTime::now_utc());
                true
            }
            Err(err) => {
                tracing::warn!(?err, "failed to persist scratch draft");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPaths, StorageOptions};
    use crate::storage;
    use tempfile::TempDir;

    fn setup_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let base = temp.path();
        let paths = ConfigPaths {
            config_dir: base.join("config"),
            config_file: base.join("config/config.toml"),
            data_dir: base.join("data"),
            database_path: base.join("data/penguin.db"),
            export_dir: base.join("exports"),
        };
        paths.ensure_directories()?;
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        let handle = storage::init(&paths, &options)?;
        Ok((temp, handle))
    }

    #[test]
    fn absent_draft_loads_the_placeholder() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let mut scratch = ScratchPad::new(Duration::from_millis(0));
        scratch.load(&storage);
        assert!(scratch.is_loaded());
        assert_eq!(scratch.content(), DEFAULT_SCRATCH);
        Ok(())
    }

    #[test]
    fn persisted_draft_wins_over_placeholder() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.save_scratch("my draft")?;
        let mut scratch = ScratchPad::new(Duration::from_millis(0));
        scratch.load(&storage);
        assert_eq!(scratch.content(), "my draft");
        Ok(())
    }

    #[test]
    fn edits_persist_after_the_debounce() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let mut scratch = ScratchPad::new(Duration::from_millis(0));
        scratch.load(&storage);

        scratch.update("first");
        scratch.update("second");
        assert!(scratch.is_saving());
        assert!(scratch.maybe_flush(&storage));
        assert!(!scratch.is_saving());
        assert!(!scratch.maybe_flush(&storage), "only one write per burst");

        assert_eq!(storage.load_scratch()?.as_deref(), Some("second"));
        Ok(())
    }

    #[test]
    fn edits_before_load_are_ignored() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let mut scratch = ScratchPad::new(Duration::from_millis(0));
        scratch.update("too early");
        assert!(!scratch.is_saving());
        assert!(!scratch.maybe_flush(&storage));
        Ok(())
    }

    #[test]
    fn unchanged_content_schedules_nothing() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.save_scratch("same")?;
        let mut scratch = ScratchPad::new(Duration::from_millis(0));
        scratch.load(&storage);

        scratch.update("same");
        assert!(!scratch.is_saving());
        Ok(())
    }

    #[test]
    fn flush_now_commits_a_pending_draft() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let mut scratch = ScratchPad::new(Duration::from_secs(60));
        scratch.load(&storage);

        scratch.update("late edit");
        scratch.flush_now(&storage);
        assert_eq!(storage.load_scratch()?.as_deref(), Some("late edit"));
        Ok(())
    }
}
