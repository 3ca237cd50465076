use ratatui::style::Color;

use crate::storage::StorageHandle;

/// The one dark/light flag the whole UI styles itself from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeMode {
    Dark,
    Light,
}

impl ThemeMode {
    pub fn as_store(self) -> &'static str {
        match self {
            ThemeMode::Dark => "dark",
            ThemeMode::Light => "light",
        }
    }

    pub fn from_store(raw: &str) -> Option<Self> {
        match raw {
            "dark" => Some(ThemeMode::Dark),
            "light" => Some(ThemeMode::Light),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }
}

/// Concrete colors for one mode. Values are Tailwind palette stops:
/// gray-900 surfaces on dark, white on light, blue accents on both.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub mode: ThemeMode,
    pub background: Color,
    pub surface: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub border: Color,
    pub selection_fg: Color,
    pub selection_bg: Color,
    pub danger: Color,
    pub code_fg: Color,
    pub code_bg: Color,
}

impl Palette {
    pub fn for_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Dark => Self {
                mode,
                background: Color::Rgb(17, 24, 39),
                surface: Color::Rgb(31, 41, 55),
                text: Color::Rgb(243, 244, 246),
                muted: Color::Rgb(156, 163, 175),
                accent: Color::Rgb(96, 165, 250),
                border: Color::Rgb(55, 65, 81),
                selection_fg: Color::Rgb(255, 255, 255),
                selection_bg: Color::Rgb(37, 99, 235),
                danger: Color::Rgb(248, 113, 113),
                code_fg: Color::Rgb(229, 231, 235),
                code_bg: Color::Rgb(31, 41, 55),
            },
            ThemeMode::Light => Self {
                mode,
                background: Color::Rgb(255, 255, 255),
                surface: Color::Rgb(249, 250, 251),
                text: Color::Rgb(31, 41, 55),
                muted: Color::Rgb(107, 114, 128),
                accent: Color::Rgb(37, 99, 235),
                border: Color::Rgb(229, 231, 235),
                selection_fg: Color::Rgb(255, 255, 255),
                selection_bg: Color::Rgb(37, 99, 235),
                danger: Color::Rgb(220, 38, 38),
                code_fg: Color::Rgb(17, 24, 39),
                code_bg: Color::Rgb(243, 244, 246),
            },
        }
    }

    /// Syntect theme paired with this mode for fenced code blocks.
    pub fn code_theme_name(&self) -> &'static str {
        match self.mode {
            ThemeMode::Dark => "base16-ocean.dark",
            ThemeMode::Light => "InspiredGitHub",
        }
    }
}

/// Single source of truth for the theme. Initialization order: persisted
/// value, then the injected environment probe, then dark.
pub struct ThemeState {
    mode: ThemeMode,
    palette: Palette,
}

impl ThemeState {
    pub fn load<F>(storage: &StorageHandle, probe: F) -> Self
    where
        F: FnOnce() -> Option<ThemeMode>,
    {
        let mode = match storage.load_theme() {
            Ok(Some(mode)) => mode,
            Ok(None) => probe().unwrap_or(ThemeMode::Dark),
            Err(err) => {
                tracing::warn!(?err, "failed to read theme preference");
                probe().unwrap_or(ThemeMode::Dark)
            }
        };
        Self {
            mode,
            palette: Palette::for_mode(mode),
        }
    }

    /// Flips the mode and persists it immediately. A failed write is logged
    /// and otherwise ignored.
    pub fn toggle(&mut self, storage: &StorageHandle) {
        self.mode = self.mode.toggled();
        self.palette = Palette::for_mode(self.mode);
        if let Err(err) = storage.save_theme(self.mode) {
            tracing::warn!(?err, "failed to persist theme preference");
        }
    }

    pub fn mode(&self) -> ThemeMode {
        self.mode
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}

/// Reads the terminal's reported color scheme via the `COLORFGBG`
/// convention. Absent or unparsable values yield `None`.
pub fn detect_terminal_preference() -> Option<ThemeMode> {
    let raw = std::env::var("COLORFGBG").ok()?;
    classify_colorfgbg(&raw)
}

fn classify_colorfgbg(raw: &str) -> Option<ThemeMode> {
    let bg = raw.rsplit(';').next()?.trim();
    let code: u8 = bg.parse().ok()?;
    // xterm convention: a background of 7 or 15 means a light terminal
    if code == 7 || code == 15 {
        Some(ThemeMode::Light)
    } else {
        Some(ThemeMode::Dark)
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
    fn store_strings_round_trip() {
        assert_eq!(ThemeMode::from_store("dark"), Some(ThemeMode::Dark));
        assert_eq!(ThemeMode::from_store("light"), Some(ThemeMode::Light));
        assert_eq!(ThemeMode::from_store("sepia"), None);
        assert_eq!(ThemeMode::Dark.as_store(), "dark");
    }

    #[test]
    fn colorfgbg_classification() {
        assert_eq!(classify_colorfgbg("0;15"), Some(ThemeMode::Light));
        assert_eq!(classify_colorfgbg("15;0"), Some(ThemeMode::Dark));
        assert_eq!(classify_colorfgbg("12;8"), Some(ThemeMode::Dark));
        assert_eq!(classify_colorfgbg("default;default"), None);
        assert_eq!(classify_colorfgbg(""), None);
    }

    #[test]
    fn persisted_mode_wins_over_probe() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        storage.save_theme(ThemeMode::Dark)?;

        let mut probed = false;
        let state = ThemeState::load(&storage, || {
            probed = true;
            Some(ThemeMode::Light)
        });
        assert_eq!(state.mode(), ThemeMode::Dark);
        assert!(!probed, "probe must not run when a value is persisted");
        Ok(())
    }

    #[test]
    fn probe_applies_when_nothing_persisted() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let state = ThemeState::load(&storage, || Some(ThemeMode::Light));
        assert_eq!(state.mode(), ThemeMode::Light);

        let fallback = ThemeState::load(&storage, || None);
        assert_eq!(fallback.mode(), ThemeMode::Dark);
        Ok(())
    }

    #[test]
    fn toggle_persists_across_reload() -> anyhow::Result<()> {
        let (_temp, storage) = setup_storage()?;
        let mut state = ThemeState::load(&storage, || None);
        assert_eq!(state.mode(), ThemeMode::Dark);

        state.toggle(&storage);
        assert_eq!(state.mode(), ThemeMode::Light);

        let reloaded = ThemeState::load(&storage, || Some(ThemeMode::Dark));
        assert_eq!(reloaded.mode(), ThemeMode::Light);
        Ok(())
    }
}
