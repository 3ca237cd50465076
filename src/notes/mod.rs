use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::autosave::{SaveStatus, WriteScheduler};
use crate::storage::{Note, StorageHandle, NOTES_KEY};

pub const DEFAULT_NOTE_TITLE: &str = "Untitled Note";
pub const DEFAULT_NOTE_CONTENT: &str = "# New Note";

/// One leading run of `#` markers plus a single whitespace character. Only
/// that much is stripped when deriving a title, so `#NoSpace` keeps its hash.
static HEADING_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#+\s").expect("valid heading pattern"));

/// Title shown for a note: first content line with heading markers stripped,
/// or the placeholder when that leaves nothing.
pub fn derive_title(content: &str) -> String {
    let first_line = content.split('\n').next().unwrap_or("");
    let stripped = HEADING_MARKERS.replace(first_line, "");
    if stripped.is_empty() {
        DEFAULT_NOTE_TITLE.to_string()
    } else {
        stripped.into_owned()
    }
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Owns the note collection, the active selection and the debounced
/// persistence of both. The active note is always derived by lookup against
/// the collection; nothing here holds a copy of it.
pub struct Notebook {
    notes: Vec<Note>,
    active_id: Option<String>,
    loaded: bool,
    scheduler: WriteScheduler,
}

impl Notebook {
    pub fn new(debounce: Duration) -> Self {
        Self {
            notes: Vec::new(),
            active_id: None,
            loaded: false,
            scheduler: WriteScheduler::new(debounce),
        }
    }

    /// Reads the persisted collection. Present data replaces the in-memory
    /// state and activates the head note; an absent key seeds one default
    /// note and persists it right away; a failed read starts empty. Writes
    /// are only scheduled once this has run.
    pub fn load(&mut self, storage: &StorageHandle) {
        match storage.load_notes() {
            Ok(Some(notes)) => {
                self.notes = notes;
                self.active_id = self.notes.first().map(|note| note.id.clone());
            }
            Ok(None) => {
                let note = default_note();
                self.active_id = Some(note.id.clone());
                self.notes = vec![note];
                if let Err(err) = storage.save_notes(&self.notes) {
                    tracing::warn!(?err, "failed to persist first-run note");
                }
                tracing::info!("seeded first-run note");
            }
            Err(err) => {
                tracing::warn!(?err, "failed to read note collection, starting empty");
                self.notes = Vec::new();
                self.active_id = None;
            }
        }
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn note_at(&self, index: usize) -> Option<&Note> {
        self.notes.get(index)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.notes.iter().position(|note| note.id == id)
    }

    pub fn active(&self) -> Option<&Note> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// Makes the note with `id` active. Unknown ids are ignored.
    pub fn select(&mut self, id: &str) {
        if self.get(id).is_some() {
            self.active_id = Some(id.to_string());
        }
    }

    /// New note with placeholder title and content, prepended and activated.
    pub fn create(&mut self) -> String {
        let now = now_ms();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_NOTE_TITLE.to_string(),
            content: DEFAULT_NOTE_CONTENT.to_string(),
            created_at: now,
            updated_at: now,
        };
        let id = note.id.clone();
        self.notes.insert(0, note);
        self.active_id = Some(id.clone());
        self.schedule_save();
        id
    }

    /// Replaces a note's content, re-deriving its title and bumping
    /// `updated_at`. Collection order is untouched. Unknown ids are ignored.
    pub fn update(&mut self, id: &str, content: &str) {
        let Some(note) = self.notes.iter_mut().find(|note| note.id == id) else {
            return;
        };
        note.content = content.to_string();
        note.title = derive_title(content);
        note.updated_at = now_ms();
        self.schedule_save();
    }

    /// Removes a note; deleting the active note clears the selection.
    /// Unknown ids are ignored.
    pub fn delete(&mut self, id: &str) {
        let before = self.notes.len();
        self.notes.retain(|note| note.id != id);
        if self.notes.len() == before {
            return;
        }
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
        }
        self.schedule_save();
    }

    pub fn save_status(&self) -> SaveStatus {
        self.scheduler.status()
    }

    pub fn has_pending_write(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Commits the pending collection write once its debounce window has
    /// elapsed. Returns whether a write happened.
    pub fn maybe_flush(&mut self, storage: &StorageHandle) -> bool {
        match self.scheduler.take_due(Instant::now()) {
            Some(payload) => self.commit(storage, &payload),
            None => false,
        }
    }

    /// Commits any pending write immediately. Called on shutdown.
    pub fn flush_now(&mut self, storage: &StorageHandle) {
        if let Some(payload) = self.scheduler.flush() {
            self.commit(storage, &payload);
        }
    }

    fn commit(&mut self, storage: &StorageHandle, payload: &str) -> bool {
        match storage.put(NOTES_KEY, payload) {
            Ok(()) => {
                self.scheduler.mark_saved(OffsetDateTime::now_utc());
                true
            }
            Err(err) => {
                tracing::warn!(?err, "failed to persist note collection");
                false
            }
        }
    }

    fn schedule_save(&mut self) {
        if !self.loaded {
            return;
        }
        match serde_json::to_string(&self.notes) {
            Ok(payload) => self.scheduler.schedule(payload),
            Err(err) => tracing::warn!(?err, "failed to encode note collection"),
        }
    }
}

fn default_note() -> Note {
    let now = now_ms();
    Note {
        id: Uuid::new_v4().to_string(),
        title: DEFAULT_NOTE_TITLE.to_string(),
        content: DEFAULT_NOTE_CONTENT.to_string(),
        created_at: now,
        updated_at: now,
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

    fn loaded_notebook(storage: &StorageHandle) -> Notebook {
        let mut notebook = Notebook::new(Duration::from_millis(0));
        notebook.load(storage);
        notebook
    }

    fn stored_note(id: &str, title: &str) -> Note {
        Note {
            id: id.to_string(),
            title: title.to_string(),
            content: format!("# {title}\nbody"),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn title_derivation_strips_heading_markers() {
        assert_eq!(derive_title("# Hello\nbody"), "Hello");
        assert_eq!(derive_title("## Second level"), "Second level");
        assert_eq!(derive_title("plain text\nrest"), "plain text");
        assert_eq!(derive_title("#NoSpace"), "#NoSpace");
        assert_eq!(derive_title("# "), DEFAULT_NOTE_TITLE);
        assert_eq!(derive_title(""), DEFAULT_NOTE_TITLE);
    }

    #[test]
    fn first_run_seeds_one_default_note_and_persists_it() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let notebook = loaded_notebook(&storage);

        assert!(notebook.is_loaded());
        assert_eq!(notebook.len(), 1);
        let seeded = &notebook.notes()[0];
        assert_eq!(seeded.title, DEFAULT_NOTE_TITLE);
        assert_eq!(seeded.content, DEFAULT_NOTE_CONTENT);
        assert_eq!(notebook.active_id(), Some(seeded.id.as_str()));

        // The seed is already on disk: a second startup must not seed again.
        let again = loaded_notebook(&storage);
        assert_eq!(again.len(), 1);
        assert_eq!(again.notes()[0].id, seeded.id);
        Ok(())
    }

    #[test]
    fn load_with_data_activates_the_head_note() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.save_notes(&[stored_note("a", "First"), stored_note("b", "Second")])?;

        let notebook = loaded_notebook(&storage);
        assert_eq!(notebook.len(), 2);
        assert_eq!(notebook.active_id(), Some("a"));
        Ok(())
    }

    #[test]
    fn persisted_empty_list_is_data_not_absence() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.save_notes(&[])?;

        let notebook = loaded_notebook(&storage);
        assert!(notebook.is_empty());
        assert_eq!(notebook.active_id(), None);
        Ok(())
    }

    #[test]
    fn corrupt_collection_falls_back_to_empty() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.put(NOTES_KEY, "[{broken")?;

        let notebook = loaded_notebook(&storage);
        assert!(notebook.is_loaded());
        assert!(notebook.is_empty());
        assert_eq!(notebook.active_id(), None);
        Ok(())
    }

    #[test]
    fn create_prepends_and_activates() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let mut notebook = loaded_notebook(&storage);
        let first_id = notebook.notes()[0].id.clone();

        let new_id = notebook.create();
        assert_eq!(notebook.len(), 2);
        assert_eq!(notebook.notes()[0].id, new_id);
        assert_eq!(notebook.notes()[1].id, first_id);
        assert_eq!(notebook.active_id(), Some(new_id.as_str()));

        let note = notebook.active().expect("active note");
        assert_eq!(note.created_at, note.updated_at);
        Ok(())
    }

    #[test]
    fn update_rederives_title_and_keeps_order() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.save_notes(&[stored_note("a", "First"), stored_note("b", "Second")])?;
        let mut notebook = loaded_notebook(&storage);

        notebook.update("b", "# Hello\nbody");
        let ids: Vec<&str> = notebook.notes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);

        let updated = notebook.get("b").expect("note present");
        assert_eq!(updated.title, "Hello");
        assert_eq!(updated.content, "# Hello\nbody");
        assert!(updated.updated_at >= updated.created_at);
        Ok(())
    }

    #[test]
    fn deleting_the_active_note_clears_selection() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.save_notes(&[stored_note("a", "First"), stored_note("b", "Second")])?;
        let mut notebook = loaded_notebook(&storage);

        notebook.select("a");
        notebook.delete("a");
        assert_eq!(notebook.active_id(), None);
        assert_eq!(notebook.len(), 1);
        Ok(())
    }

    #[test]
    fn deleting_another_note_preserves_selection() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.save_notes(&[stored_note("a", "First"), stored_note("b", "Second")])?;
        let mut notebook = loaded_notebook(&storage);

        notebook.select("a");
        notebook.delete("b");
        assert_eq!(notebook.active_id(), Some("a"));
        Ok(())
    }

    #[test]
    fn unknown_ids_are_silent_no_ops() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let mut notebook = loaded_notebook(&storage);
        let snapshot: Vec<Note> = notebook.notes().to_vec();

        notebook.update("missing", "# changed");
        notebook.delete("missing");
        notebook.select("missing");

        assert_eq!(notebook.notes(), snapshot.as_slice());
        assert!(!notebook.has_pending_write());
        Ok(())
    }

    #[test]
    fn no_write_is_scheduled_before_load() {
        let mut notebook = Notebook::new(Duration::from_millis(0));
        notebook.create();
        assert!(!notebook.has_pending_write());
    }

    #[test]
    fn rapid_updates_collapse_into_one_final_write() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let mut notebook = loaded_notebook(&storage);
        let id = notebook.active_id().expect("seeded note").to_string();

        for i in 0..10 {
            notebook.update(&id, &format!("# v{i}"));
        }
        assert!(notebook.maybe_flush(&storage), "one due write expected");
        assert!(!notebook.maybe_flush(&storage), "no second write");

        let stored = storage.load_notes()?.expect("collection present");
        assert_eq!(stored[0].content, "# v9");
        assert_eq!(stored[0].title, "v9");
        Ok(())
    }

    #[test]
    fn flush_now_commits_without_waiting() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let mut notebook = Notebook::new(Duration::from_secs(60));
        notebook.load(&storage);
        let id = notebook.active_id().expect("seeded note").to_string();

        notebook.update(&id, "# Shutdown edit");
        assert!(!notebook.maybe_flush(&storage), "window has not elapsed");

        notebook.flush_now(&storage);
        let stored = storage.load_notes()?.expect("collection present");
        assert_eq!(stored[0].content, "# Shutdown edit");
        Ok(())
    }
}
