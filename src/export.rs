//! Single-note export to plain `.md` files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::storage::Note;

/// Derives a safe file name from a note title. Every character outside
/// `[A-Za-z0-9]` becomes an underscore and the result is lowercased; an
/// empty title falls back to `untitled`.
pub fn export_filename(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        return "untitled.md".to_string();
    }
    format!("{sanitized}.md")
}

/// Writes the note body to `<dir>/<sanitized-title>.md`, creating the
/// directory if needed. An existing file with the same name is replaced.
pub fn export_note(note: &Note, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating export directory {}", dir.display()))?;
    let path = dir.join(export_filename(&note.title));
    fs::write(&path, &note.content)
        .with_context(|| format!("writing export file {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn note(title: &str, content: &str) -> Note {
        Note {
            id: "test-note".to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(export_filename("My Note"), "my_note.md");
        assert_eq!(export_filename("Meeting: 2024/05"), "meeting__2024_05.md");
        assert_eq!(export_filename("CamelCase123"), "camelcase123.md");
        assert_eq!(export_filename("???"), "___.md");
        assert_eq!(export_filename(""), "untitled.md");
    }

    #[test]
    fn exports_note_body_to_disk() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let note = note("Groceries", "# Groceries\n- milk\n- eggs\n");
        let path = export_note(&note, dir.path())?;
        assert_eq!(path, dir.path().join("groceries.md"));
        assert_eq!(fs::read_to_string(&path)?, "# Groceries\n- milk\n- eggs\n");
        Ok(())
    }

    #[test]
    fn existing_export_is_replaced() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let first = note("Daily", "old body");
        let second = note("Daily", "new body");
        export_note(&first, dir.path())?;
        let path = export_note(&second, dir.path())?;
        assert_eq!(fs::read_to_string(&path)?, "new body");
        Ok(())
    }

    #[test]
    fn creates_missing_export_directory() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let nested = dir.path().join("exports").join("notes");
        let path = export_note(&note("Deep", "body"), &nested)?;
        assert!(path.exists());
        Ok(())
    }
}
