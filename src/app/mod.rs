use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::config::theme::{detect_terminal_preference, ThemeMode, ThemeState};
use crate::config::AppConfig;
use crate::export;
use crate::markdown;
use crate::notes::Notebook;
use crate::scratch::ScratchPad;
use crate::storage::StorageHandle;
use crate::ui;

pub mod buffer;
pub mod state;

pub use buffer::TextBuffer;
pub use state::{synced_offset, AppState, OverlayState, PaneFocus, Route, ScrollSync};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Quit,
    GoHome,
    CycleFocus,
    FocusInput,
    SelectNext,
    SelectPrevious,
    NewNote,
    DeleteNote,
    ExportNote,
    ToggleTheme,
    ToggleScratch,
}

pub struct App {
    config: Arc<AppConfig>,
    storage: StorageHandle,
    notebook: Notebook,
    scratch: ScratchPad,
    theme: ThemeState,
    state: AppState,
    list_state: ListState,
    last_size: Rect,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, storage: StorageHandle) -> Self {
        let mut notebook = Notebook::new(config.autosave.notes_debounce());
        notebook.load(&storage);
        let mut scratch = ScratchPad::new(config.autosave.scratch_debounce());
        scratch.load(&storage);
        let theme = ThemeState::load(&storage, detect_terminal_preference);

        let mut state = AppState::new();
        if let Some(note) = notebook.active() {
            state.load_note(&note.content);
        }

        Self {
            config,
            storage,
            notebook,
            scratch,
            theme,
            state,
            list_state: ListState::default(),
            last_size: Rect::default(),
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            let size = terminal.size().context("querying terminal size")?;
            self.prepare_frame(size);

            terminal
                .draw(|frame| {
                    ui::draw_app(
                        frame,
                        &self.state,
                        &self.notebook,
                        &self.scratch,
                        self.theme.palette(),
                        &mut self.list_state,
                    );
                })
                .context("drawing frame")?;
            self.state.sync.settle();

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(_, _) => self.state.mark_preview_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }

        // Debounce windows still open at quit are committed, not dropped.
        self.notebook.flush_now(&self.storage);
        self.scratch.flush_now(&self.storage);
        Ok(())
    }

    /// Per-frame bookkeeping that happens before widgets render: the sidebar
    /// selection mirrors the active note, the preview cache is rebuilt when
    /// stale and the caret is scrolled back into view.
    fn prepare_frame(&mut self, size: Rect) {
        self.last_size = size;

        let selected = self
            .notebook
            .active_id()
            .and_then(|id| self.notebook.position_of(id));
        self.list_state.select(selected);

        if self.state.route != Route::Editor || !self.notebook.is_loaded() {
            return;
        }

        let layout = ui::editor_layout(size);
        let input_inner = ui::inner_rect(layout.input);
        let preview_inner = ui::inner_rect(layout.preview);

        if self.state.preview_dirty || self.state.preview_width != preview_inner.width {
            let lines = markdown::render(
                self.state.input.text(),
                self.theme.palette(),
                preview_inner.width,
            );
            self.state.set_preview(lines, preview_inner.width);
        }

        if self.state.focus == PaneFocus::Input {
            let before = self.state.input_scroll;
            self.state.follow_input_cursor(input_inner.height);
            if self.state.input_scroll != before {
                self.sync_from_input(&layout);
            }
        }

        self.state
            .clamp_scrolls(input_inner.height, preview_inner.height);
    }

    fn on_tick(&mut self) {
        self.notebook.maybe_flush(&self.storage);
        self.scratch.maybe_flush(&self.storage);
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        match self.state.route {
            Route::Home => self.handle_home_key(key),
            Route::Editor => self.handle_editor_key(key),
        }
    }

    /// Routes a key press to the open overlay. Returns false when no overlay
    /// is open so the active route takes the key instead.
    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            Some(OverlayState::Scratch(_)) => {
                self.handle_scratch_key(key);
                true
            }
            Some(OverlayState::DeleteConfirm(_)) => {
                self.handle_delete_confirm_key(key);
                true
            }
            None => false,
        }
    }

    fn handle_home_key(&mut self, key: KeyEvent) {
        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        match key.code {
            KeyCode::Enter => self.state.enter_editor(),
            KeyCode::Char('t') if plain => self.toggle_theme(),
            KeyCode::Char('q') if plain => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            _ => {}
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => {
                    self.should_quit = true;
                    return;
                }
                KeyCode::Char('s') => {
                    self.manual_save();
                    return;
                }
                _ => {}
            }
        }

        match self.state.focus {
            PaneFocus::Sidebar => self.handle_sidebar_key(key),
            PaneFocus::Input => self.handle_input_key(key),
            PaneFocus::Preview => self.handle_preview_key(key),
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match key.code {
            KeyCode::Char('q') if plain => Some(Action::Quit),
            KeyCode::Esc => Some(Action::GoHome),
            KeyCode::Tab => Some(Action::CycleFocus),
            KeyCode::Enter => Some(Action::FocusInput),
            KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('j') if plain => Some(Action::SelectNext),
            KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char('k') if plain => Some(Action::SelectPrevious),
            KeyCode::Char('n') if plain => Some(Action::NewNote),
            KeyCode::Char('d') if plain => Some(Action::DeleteNote),
            KeyCode::Char('x') if plain => Some(Action::ExportNote),
            KeyCode::Char('t') if plain => Some(Action::ToggleTheme),
            KeyCode::Char('`') if plain => Some(Action::ToggleScratch),
            _ => None,
        };
        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Left => self.apply_input_motion(|buffer| buffer.move_word_left()),
                KeyCode::Right => self.apply_input_motion(|buffer| buffer.move_word_right()),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc => self.state.focus = PaneFocus::Sidebar,
            KeyCode::Enter => self.apply_input_edit(|buffer| buffer.insert_newline()),
            KeyCode::Backspace => self.apply_input_edit(|buffer| buffer.backspace()),
            KeyCode::Delete => self.apply_input_edit(|buffer| buffer.delete()),
            KeyCode::Tab => self.apply_input_edit(|buffer| buffer.insert_char('\t')),
            KeyCode::Left => self.apply_input_motion(|buffer| buffer.move_left()),
            KeyCode::Right => self.apply_input_motion(|buffer| buffer.move_right()),
            KeyCode::Up => self.apply_input_motion(|buffer| buffer.move_up()),
            KeyCode::Down => self.apply_input_motion(|buffer| buffer.move_down()),
            KeyCode::Home => self.apply_input_motion(|buffer| buffer.move_home()),
            KeyCode::End => self.apply_input_motion(|buffer| buffer.move_end()),
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER) =>
            {
                self.apply_input_edit(|buffer| buffer.insert_char(ch));
            }
            _ => {}
        }
    }

    fn handle_preview_key(&mut self, key: KeyEvent) {
        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let layout = ui::editor_layout(self.last_size);
        let page = i32::from(ui::inner_rect(layout.preview).height.max(1));
        match key.code {
            KeyCode::Down => self.scroll_preview(1, &layout),
            KeyCode::Char('j') if plain => self.scroll_preview(1, &layout),
            KeyCode::Up => self.scroll_preview(-1, &layout),
            KeyCode::Char('k') if plain => self.scroll_preview(-1, &layout),
            KeyCode::PageDown => self.scroll_preview(page, &layout),
            KeyCode::PageUp => self.scroll_preview(-page, &layout),
            // Everything else keeps the sidebar commands reachable.
            _ => self.handle_sidebar_key(key),
        }
    }

    fn handle_scratch_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Left => self.apply_scratch_change(|buffer| buffer.move_word_left()),
                KeyCode::Right => self.apply_scratch_change(|buffer| buffer.move_word_right()),
                KeyCode::Char('s') => self.manual_save(),
                KeyCode::Char('c') => self.should_quit = true,
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc => self.state.close_overlay(),
            KeyCode::Enter => self.apply_scratch_change(|buffer| buffer.insert_newline()),
            KeyCode::Backspace => self.apply_scratch_change(|buffer| buffer.backspace()),
            KeyCode::Delete => self.apply_scratch_change(|buffer| buffer.delete()),
            KeyCode::Tab => self.apply_scratch_change(|buffer| buffer.insert_char('\t')),
            KeyCode::Left => self.apply_scratch_change(|buffer| buffer.move_left()),
            KeyCode::Right => self.apply_scratch_change(|buffer| buffer.move_right()),
            KeyCode::Up => self.apply_scratch_change(|buffer| buffer.move_up()),
            KeyCode::Down => self.apply_scratch_change(|buffer| buffer.move_down()),
            KeyCode::Home => self.apply_scratch_change(|buffer| buffer.move_home()),
            KeyCode::End => self.apply_scratch_change(|buffer| buffer.move_end()),
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER) =>
            {
                self.apply_scratch_change(|buffer| buffer.insert_char(ch));
            }
            _ => {}
        }
    }

    fn handle_delete_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => self.confirm_delete(),
            KeyCode::Esc => {
                self.state.close_overlay();
                self.state.set_status_message(Some("Delete canceled"));
            }
            _ => {}
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::GoHome => self.state.go_home(),
            Action::CycleFocus => self.state.cycle_focus(),
            Action::FocusInput => {
                if self.notebook.active().is_some() {
                    self.state.focus = PaneFocus::Input;
                }
            }
            Action::SelectNext => self.select_relative(1),
            Action::SelectPrevious => self.select_relative(-1),
            Action::NewNote => self.create_note(),
            Action::DeleteNote => self.open_delete_for_active(),
            Action::ExportNote => self.export_active(),
            Action::ToggleTheme => self.toggle_theme(),
            Action::ToggleScratch => self.open_scratch(),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.state.route != Route::Editor {
            return;
        }

        if self.state.delete_confirm().is_some() {
            self.handle_popup_mouse(mouse);
            return;
        }
        if self.state.is_scratch_open() {
            return;
        }

        let layout = ui::editor_layout(self.last_size);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.handle_click(mouse.column, mouse.row, &layout);
            }
            MouseEventKind::ScrollDown => self.handle_wheel(1, mouse.column, mouse.row, &layout),
            MouseEventKind::ScrollUp => self.handle_wheel(-1, mouse.column, mouse.row, &layout),
            _ => {}
        }
    }

    fn handle_popup_mouse(&mut self, mouse: MouseEvent) {
        let MouseEventKind::Down(MouseButton::Left) = mouse.kind else {
            return;
        };
        let Some(overlay) = self.state.delete_confirm() else {
            return;
        };
        let popup = ui::popup_rect(overlay.anchor, self.last_size);
        let (delete, cancel) = ui::popup_button_rects(popup);

        if ui::rect_contains(delete, mouse.column, mouse.row) {
            self.confirm_delete();
        } else if ui::rect_contains(cancel, mouse.column, mouse.row)
            || !ui::rect_contains(popup, mouse.column, mouse.row)
        {
            self.state.close_overlay();
            self.state.set_status_message(Some("Delete canceled"));
        }
    }

    fn handle_click(&mut self, column: u16, row: u16, layout: &ui::EditorLayout) {
        if let Some(hit) = ui::sidebar_hit(layout.sidebar, self.list_state.offset(), column, row) {
            let Some(note) = self.notebook.note_at(hit.index) else {
                return;
            };
            let id = note.id.clone();
            let title = note.title.clone();
            let content = note.content.clone();
            if hit.on_close {
                let anchor = Rect::new(column, row, 1, 1);
                self.state.open_delete_confirm(id, title, anchor);
            } else {
                self.notebook.select(&id);
                self.state.load_note(&content);
                self.state.focus = PaneFocus::Sidebar;
            }
            return;
        }

        if ui::rect_contains(layout.input, column, row) {
            if self.notebook.active().is_some() {
                self.state.focus = PaneFocus::Input;
            }
        } else if ui::rect_contains(layout.preview, column, row) {
            self.state.focus = PaneFocus::Preview;
        }
    }

    fn handle_wheel(&mut self, direction: i32, column: u16, row: u16, layout: &ui::EditorLayout) {
        let step = i32::from(self.config.editor.scroll_step.max(1));
        if ui::rect_contains(layout.input, column, row) {
            self.scroll_input(direction * step, layout);
        } else if ui::rect_contains(layout.preview, column, row) {
            self.scroll_preview(direction * step, layout);
        } else if ui::rect_contains(layout.sidebar, column, row) {
            self.select_relative(i64::from(direction.signum()));
        }
    }

    /// Applies a text mutation to the note buffer, pushes the new content
    /// into the notebook and invalidates the preview cache.
    fn apply_input_edit<F>(&mut self, change: F)
    where
        F: FnOnce(&mut TextBuffer) -> bool,
    {
        let Some(id) = self.notebook.active_id().map(str::to_string) else {
            return;
        };
        if !change(&mut self.state.input) {
            return;
        }
        let content = self.state.input.text().to_string();
        self.notebook.update(&id, &content);
        self.state.mark_preview_dirty();
    }

    /// Cursor movement only. Nothing is scheduled and the preview stays as
    /// rendered.
    fn apply_input_motion<F>(&mut self, motion: F)
    where
        F: FnOnce(&mut TextBuffer) -> bool,
    {
        motion(&mut self.state.input);
    }

    fn apply_scratch_change<F>(&mut self, change: F)
    where
        F: FnOnce(&mut TextBuffer) -> bool,
    {
        let Some(overlay) = self.state.scratch_overlay_mut() else {
            return;
        };
        if change(&mut overlay.buffer) {
            let content = overlay.buffer.text().to_string();
            self.scratch.update(&content);
        }
    }

    fn select_relative(&mut self, delta: i64) {
        if self.notebook.is_empty() {
            return;
        }
        let len = self.notebook.len() as i64;
        let next = match self
            .notebook
            .active_id()
            .and_then(|id| self.notebook.position_of(id))
        {
            Some(index) => (index as i64 + delta).clamp(0, len - 1),
            None if delta < 0 => len - 1,
            None => 0,
        };
        let Some(note) = self.notebook.note_at(next as usize) else {
            return;
        };
        let id = note.id.clone();
        let content = note.content.clone();
        self.notebook.select(&id);
        self.state.load_note(&content);
    }

    fn create_note(&mut self) {
        let id = self.notebook.create();
        if let Some(note) = self.notebook.get(&id) {
            let content = note.content.clone();
            self.state.load_note(&content);
        }
        self.state.focus = PaneFocus::Input;
        self.state.set_status_message(Some("Note created"));
    }

    fn open_delete_for_active(&mut self) {
        let Some(note) = self.notebook.active() else {
            self.state.set_status_message(Some("No note selected"));
            return;
        };
        let id = note.id.clone();
        let title = note.title.clone();
        let anchor = self.close_anchor_for(&id);
        self.state.open_delete_confirm(id, title, anchor);
    }

    fn confirm_delete(&mut self) {
        let Some(overlay) = self.state.delete_confirm() else {
            return;
        };
        let id = overlay.note_id.clone();
        let title = overlay.title.clone();
        let was_active = self.notebook.active_id() == Some(id.as_str());

        self.notebook.delete(&id);
        self.state.close_overlay();
        if was_active {
            self.state.load_note("");
            self.state.focus = PaneFocus::Sidebar;
        }
        self.state
            .set_status_message(Some(format!("Deleted \"{title}\"")));
    }

    fn export_active(&mut self) {
        let Some(note) = self.notebook.active() else {
            self.state.set_status_message(Some("No note selected"));
            return;
        };
        match export::export_note(note, &self.config.export.directory) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "note exported");
                self.state
                    .set_status_message(Some(format!("Exported to {}", path.display())));
            }
            Err(err) => {
                tracing::error!(?err, "failed to export note");
                self.state.set_status_message(Some("Export failed"));
            }
        }
    }

    fn toggle_theme(&mut self) {
        self.theme.toggle(&self.storage);
        // Cached preview lines carry the old palette's colors.
        self.state.mark_preview_dirty();
        let label = match self.theme.mode() {
            ThemeMode::Dark => "dark",
            ThemeMode::Light => "light",
        };
        self.state
            .set_status_message(Some(format!("Theme: {label}")));
    }

    fn open_scratch(&mut self) {
        self.state.open_scratch(self.scratch.content().to_string());
    }

    fn manual_save(&mut self) {
        self.notebook.flush_now(&self.storage);
        self.scratch.flush_now(&self.storage);
        self.state.set_status_message(Some("Saved"));
    }

    /// The preview tracks the input's scrolled fraction. The guard keeps the
    /// position written here from echoing back within the same frame.
    fn sync_from_input(&mut self, layout: &ui::EditorLayout) {
        if !self.config.editor.sync_scroll {
            return;
        }
        if !self.state.sync.begin() {
            return;
        }
        let input_inner = ui::inner_rect(layout.input);
        let preview_inner = ui::inner_rect(layout.preview);
        self.state.preview_scroll = synced_offset(
            self.state.input_scroll,
            self.state.input.line_count(),
            input_inner.height,
            self.state.preview_cache.len(),
            preview_inner.height,
        );
    }

    fn sync_from_preview(&mut self, layout: &ui::EditorLayout) {
        if !self.config.editor.sync_scroll {
            return;
        }
        if !self.state.sync.begin() {
            return;
        }
        let input_inner = ui::inner_rect(layout.input);
        let preview_inner = ui::inner_rect(layout.preview);
        self.state.input_scroll = synced_offset(
            self.state.preview_scroll,
            self.state.preview_cache.len(),
            preview_inner.height,
            self.state.input.line_count(),
            input_inner.height,
        );
    }

    fn scroll_input(&mut self, delta: i32, layout: &ui::EditorLayout) {
        let view = ui::inner_rect(layout.input).height;
        let max = self
            .state
            .input
            .line_count()
            .saturating_sub(view as usize)
            .min(u16::MAX as usize) as i32;
        let next = (i32::from(self.state.input_scroll) + delta).clamp(0, max);
        if next as u16 != self.state.input_scroll {
            self.state.input_scroll = next as u16;
            self.sync_from_input(layout);
        }
    }

    fn scroll_preview(&mut self, delta: i32, layout: &ui::EditorLayout) {
        let view = ui::inner_rect(layout.preview).height;
        let max = self
            .state
            .preview_cache
            .len()
            .saturating_sub(view as usize)
            .min(u16::MAX as usize) as i32;
        let next = (i32::from(self.state.preview_scroll) + delta).clamp(0, max);
        if next as u16 != self.state.preview_scroll {
            self.state.preview_scroll = next as u16;
            self.sync_from_preview(layout);
        }
    }

    /// Screen cell of the selected note's close glyph, anchoring the
    /// confirmation popup when the delete came from the keyboard.
    fn close_anchor_for(&self, id: &str) -> Rect {
        let layout = ui::editor_layout(self.last_size);
        let inner = ui::inner_rect(layout.sidebar);
        let column = inner.x.saturating_add(inner.width).saturating_sub(2);
        let row = self
            .notebook
            .position_of(id)
            .map(|index| index.saturating_sub(self.list_state.offset()))
            .map(|visible| inner.y.saturating_add((visible as u16).saturating_mul(2)))
            .unwrap_or(inner.y);
        Rect::new(column, row, 1, 1)
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("leaving alternate screen")?;
    Ok(())
}
