use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::App;
use crate::config::AppConfig;
use crate::export;
use crate::storage::StorageHandle;

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// 1-based position of the note, counted in sidebar order
    pub position: usize,
    /// Write the file here instead of the configured export directory
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    if !atty::is(atty::Stream::Stdout) {
        bail!("stdout is not a terminal; the editor needs an interactive tty");
    }
    app.run()
}

pub fn list_notes(storage: StorageHandle) -> Result<()> {
    let output = render_note_list(&storage)?;
    print!("{output}");
    Ok(())
}

fn render_note_list(storage: &StorageHandle) -> Result<String> {
    let notes = storage
        .load_notes()
        .context("reading note collection")?
        .unwrap_or_default();
    if notes.is_empty() {
        return Ok("No notes yet.\n".to_string());
    }
    let mut out = String::new();
    for (index, note) in notes.iter().enumerate() {
        let _ = writeln!(&mut out, "{:>3}  {}", index + 1, note.title);
        let _ = writeln!(
            &mut out,
            "     updated {}",
            format_timestamp(note.updated_at)
        );
    }
    Ok(out)
}

pub fn export_note(config: Arc<AppConfig>, storage: StorageHandle, args: ExportArgs) -> Result<()> {
    let path = run_export(&config, &storage, &args)?;
    println!("Exported to {}", path.display());
    Ok(())
}

fn run_export(config: &AppConfig, storage: &StorageHandle, args: &ExportArgs) -> Result<PathBuf> {
    if args.position == 0 {
        bail!("note positions start at 1");
    }
    let notes = storage
        .load_notes()
        .context("reading note collection")?
        .unwrap_or_default();
    let Some(note) = notes.get(args.position - 1) else {
        bail!(
            "no note at position {} ({} stored)",
            args.position,
            notes.len()
        );
    };
    let dir = args
        .out
        .clone()
        .unwrap_or_else(|| config.export.directory.clone());
    export::export_note(note, &dir)
}

fn format_timestamp(epoch_ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000)
        .map(|dt| dt.format(&Rfc3339).unwrap_or_else(|_| epoch_ms.to_string()))
        .unwrap_or_else(|_| epoch_ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPaths, StorageOptions};
    use crate::storage::{self, Note};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn setup_storage() -> Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new().context("creating temp dir")?;
        let root = temp.path();
        let paths = ConfigPaths {
            config_dir: root.join("config"),
            config_file: root.join("config/config.toml"),
            data_dir: root.join("data"),
            database_path: root.join("data/penguin.db"),
            export_dir: root.join("exports"),
        };
        let handle = storage::init(&paths, &StorageOptions::default())?;
        Ok((temp, handle))
    }

    fn note(title: &str, content: &str) -> Note {
        Note {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn list_prints_titles_in_stored_order() -> Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.save_notes(&[note("Second bright idea", "# Second"), note("Older", "# Older")])?;

        let output = render_note_list(&storage)?;

        let first = output.find("Second bright idea").expect("first title");
        let second = output.find("Older").expect("second title");
        assert!(first < second);
        assert!(output.contains("  1  "));
        assert!(output.contains("  2  "));
        assert!(output.contains("updated 2023-11-14"));
        Ok(())
    }

    #[test]
    fn list_reports_an_empty_store() -> Result<()> {
        let (_temp, storage) = setup_storage()?;
        let output = render_note_list(&storage)?;
        assert_eq!(output, "No notes yet.\n");
        Ok(())
    }

    #[test]
    fn export_writes_the_requested_note() -> Result<()> {
        let (temp, storage) = setup_storage()?;
        storage.save_notes(&[note("Keep", "# Keep"), note("Ship It", "# Ship\ncargo")])?;
        let config = AppConfig::default();
        let args = ExportArgs {
            position: 2,
            out: Some(temp.path().join("out")),
        };

        let path = run_export(&config, &storage, &args)?;

        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("ship_it.md"));
        assert_eq!(std::fs::read_to_string(&path)?, "# Ship\ncargo");
        Ok(())
    }

    #[test]
    fn export_rejects_positions_outside_the_collection() -> Result<()> {
        let (temp, storage) = setup_storage()?;
        storage.save_notes(&[note("Only", "# Only")])?;
        let config = AppConfig::default();

        let zero = ExportArgs {
            position: 0,
            out: Some(temp.path().join("out")),
        };
        assert!(run_export(&config, &storage, &zero).is_err());

        let beyond = ExportArgs {
            position: 5,
            out: Some(temp.path().join("out")),
        };
        let err = run_export(&config, &storage, &beyond).unwrap_err();
        assert!(err.to_string().contains("position 5"));
        Ok(())
    }
}
