use ratatui::layout::Rect;
use ratatui::text::Line;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

use crate::app::buffer::TextBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Editor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneFocus {
    Sidebar,
    Input,
    Preview,
}

impl PaneFocus {
    pub fn next(self) -> Self {
        match self {
            PaneFocus::Sidebar => PaneFocus::Input,
            PaneFocus::Input => PaneFocus::Preview,
            PaneFocus::Preview => PaneFocus::Sidebar,
        }
    }
}

/// Guard that keeps pane scrolling from feeding back into itself. A sync
/// pass may only start from `Idle`; the follower position written during
/// the pass is ignored as a trigger until the guard settles at frame end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollSync {
    #[default]
    Idle,
    Syncing,
}

impl ScrollSync {
    /// Claims the guard for one sync pass. Returns false while a pass is
    /// already in flight.
    pub fn begin(&mut self) -> bool {
        if *self == ScrollSync::Idle {
            *self = ScrollSync::Syncing;
            true
        } else {
            false
        }
    }

    pub fn settle(&mut self) {
        *self = ScrollSync::Idle;
    }

    pub fn is_syncing(&self) -> bool {
        *self == ScrollSync::Syncing
    }
}

/// Maps a scroll position in one pane to the equivalent position in the
/// other, keeping the scrolled fraction equal. Panes that fit entirely in
/// view pin the follower to the top.
pub fn synced_offset(
    src_top: u16,
    src_content: usize,
    src_view: u16,
    dst_content: usize,
    dst_view: u16,
) -> u16 {
    let src_span = src_content.saturating_sub(src_view as usize);
    let dst_span = dst_content.saturating_sub(dst_view as usize);
    if src_span == 0 || dst_span == 0 {
        return 0;
    }
    let fraction = (f64::from(src_top) / src_span as f64).clamp(0.0, 1.0);
    (fraction * dst_span as f64).round().min(dst_span as f64) as u16
}

#[derive(Debug, Clone)]
pub struct DeleteConfirmOverlay {
    pub note_id: String,
    pub title: String,
    /// Screen cell the confirmation should point at, captured from the
    /// delete control that opened it.
    pub anchor: Rect,
}

#[derive(Debug, Clone)]
pub struct ScratchOverlay {
    pub buffer: TextBuffer,
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    DeleteConfirm(DeleteConfirmOverlay),
    Scratch(ScratchOverlay),
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub route: Route,
    pub focus: PaneFocus,
    pub overlay: Option<OverlayState>,
    pub input: TextBuffer,
    pub input_scroll: u16,
    pub preview_scroll: u16,
    pub preview_cache: Vec<Line<'static>>,
    pub preview_width: u16,
    pub preview_dirty: bool,
    pub sync: ScrollSync,
    pub status_message: Option<String>,
}

impl Default for Route {
    fn default() -> Self {
        Route::Home
    }
}

impl Default for PaneFocus {
    fn default() -> Self {
        PaneFocus::Sidebar
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_editor(&mut self) {
        self.route = Route::Editor;
        self.focus = PaneFocus::Sidebar;
    }

    pub fn go_home(&mut self) {
        self.route = Route::Home;
        self.overlay = None;
        self.focus = PaneFocus::Sidebar;
    }

    pub fn cycle_focus(&mut self) {
        self.focus = self.focus.next();
    }

    /// Loads the active note body into the input buffer and resets both
    /// pane scroll positions.
    pub fn load_note(&mut self, content: &str) {
        self.input = TextBuffer::new(content.to_string());
        self.input_scroll = 0;
        self.preview_scroll = 0;
        self.preview_dirty = true;
    }

    pub fn mark_preview_dirty(&mut self) {
        self.preview_dirty = true;
    }

    pub fn set_preview(&mut self, lines: Vec<Line<'static>>, width: u16) {
        self.preview_cache = lines;
        self.preview_width = width;
        self.preview_dirty = false;
    }

    /// Keeps the cursor row inside the input viewport.
    pub fn follow_input_cursor(&mut self, view_rows: u16) {
        if view_rows == 0 {
            return;
        }
        let (row, _) = self.input.cursor_line_col();
        let row = row.min(u16::MAX as usize) as u16;
        if row < self.input_scroll {
            self.input_scroll = row;
        } else if row >= self.input_scroll + view_rows {
            self.input_scroll = row + 1 - view_rows;
        }
    }

    /// Clamps both scroll offsets to their content, after edits shrink a
    /// pane.
    pub fn clamp_scrolls(&mut self, input_view: u16, preview_view: u16) {
        let input_max = self
            .input
            .line_count()
            .saturating_sub(input_view as usize)
            .min(u16::MAX as usize) as u16;
        self.input_scroll = self.input_scroll.min(input_max);
        let preview_max = self
            .preview_cache
            .len()
            .saturating_sub(preview_view as usize)
            .min(u16::MAX as usize) as u16;
        self.preview_scroll = self.preview_scroll.min(preview_max);
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn open_delete_confirm(&mut self, note_id: String, title: String, anchor: Rect) {
        self.overlay = Some(OverlayState::DeleteConfirm(DeleteConfirmOverlay {
            note_id,
            title,
            anchor,
        }));
    }

    pub fn open_scratch(&mut self, content: String) {
        self.overlay = Some(OverlayState::Scratch(ScratchOverlay {
            buffer: TextBuffer::new(content),
        }));
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn delete_confirm(&self) -> Option<&DeleteConfirmOverlay> {
        match self.overlay() {
            Some(OverlayState::DeleteConfirm(ref overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn scratch_overlay_mut(&mut self) -> Option<&mut ScratchOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::Scratch(ref mut overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn is_scratch_open(&self) -> bool {
        matches!(self.overlay(), Some(OverlayState::Scratch(_)))
    }
}

const DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:short] [day padding:none], [year]");

/// Formats a millisecond timestamp as a short relative label, switching to
/// an absolute date once it is more than a few days old.
pub fn format_note_date(epoch_ms: i64) -> String {
    let dt = match OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000) {
        Ok(dt) => dt,
        Err(_) => return epoch_ms.to_string(),
    };
    let diff = OffsetDateTime::now_utc() - dt;
    if diff.is_negative() || diff < Duration::seconds(45) {
        return "just now".to_string();
    }
    if diff < Duration::minutes(90) {
        let mins = diff.whole_minutes().max(1);
        return format!("{mins}m ago");
    }
    if diff < Duration::hours(36) {
        let hours = diff.whole_hours().max(1);
        return format!("{hours}h ago");
    }
    if diff < Duration::days(10) {
        let days = diff.whole_days().max(1);
        return format!("{days}d ago");
    }
    dt.format(DATE_FORMAT)
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_offset_matches_scrolled_fraction() {
        // 5 of 80 scrollable rows maps to 2.5 of 40, rounded up.
        assert_eq!(synced_offset(5, 100, 20, 60, 20), 3);
    }

    #[test]
    fn sync_offset_reaches_the_bottom_together() {
        assert_eq!(synced_offset(80, 100, 20, 60, 20), 40);
    }

    #[test]
    fn sync_offset_pins_short_content_to_top() {
        assert_eq!(synced_offset(4, 10, 20, 200, 20), 0);
        assert_eq!(synced_offset(4, 100, 20, 10, 20), 0);
    }

    #[test]
    fn sync_guard_refuses_reentry() {
        let mut guard = ScrollSync::default();
        assert!(guard.begin());
        assert!(!guard.begin());
        guard.settle();
        assert!(guard.begin());
    }

    #[test]
    fn focus_cycle_wraps_around() {
        let mut state = AppState::new();
        assert_eq!(state.focus, PaneFocus::Sidebar);
        state.cycle_focus();
        assert_eq!(state.focus, PaneFocus::Input);
        state.cycle_focus();
        assert_eq!(state.focus, PaneFocus::Preview);
        state.cycle_focus();
        assert_eq!(state.focus, PaneFocus::Sidebar);
    }

    #[test]
    fn cursor_stays_inside_input_view() {
        let mut state = AppState::new();
        state.input = TextBuffer::new("a\nb\nc\nd\ne\nf".to_string());
        state.follow_input_cursor(3);
        assert_eq!(state.input_scroll, 3); // cursor on row 5, last visible row

        state.input.move_up();
        state.input.move_up();
        state.input.move_up();
        state.input.move_up();
        state.follow_input_cursor(3);
        assert_eq!(state.input_scroll, 1);
    }

    #[test]
    fn clamp_scrolls_after_content_shrinks() {
        let mut state = AppState::new();
        state.input = TextBuffer::new("one\ntwo".to_string());
        state.input_scroll = 40;
        state.preview_scroll = 40;
        state.clamp_scrolls(10, 10);
        assert_eq!(state.input_scroll, 0);
        assert_eq!(state.preview_scroll, 0);
    }

    #[test]
    fn delete_confirm_keeps_its_anchor() {
        let mut state = AppState::new();
        let anchor = Rect::new(30, 4, 1, 1);
        state.open_delete_confirm("id-1".to_string(), "Groceries".to_string(), anchor);
        let overlay = state.delete_confirm().expect("overlay open");
        assert_eq!(overlay.anchor, anchor);
        assert_eq!(overlay.title, "Groceries");
    }

    #[test]
    fn old_timestamps_format_as_absolute_dates() {
        // 2020-01-05T00:00:00Z
        let label = format_note_date(1_578_182_400_000);
        assert_eq!(label, "Jan 5, 2020");
    }

    #[test]
    fn recent_timestamps_format_relative() {
        let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        assert_eq!(format_note_date(now_ms), "just now");
        let label = format_note_date(now_ms - 10 * 60 * 1000);
        assert_eq!(label, "10m ago");
    }
}
