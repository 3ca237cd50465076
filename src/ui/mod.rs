use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use time::{macros::format_description, OffsetDateTime};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::state::{
    format_note_date, AppState, DeleteConfirmOverlay, OverlayState, PaneFocus, Route,
    ScratchOverlay,
};
use crate::autosave::SaveStatus;
use crate::config::theme::{Palette, ThemeMode};
use crate::notes::Notebook;
use crate::scratch::ScratchPad;

pub const DELETE_POPUP_WIDTH: u16 = 34;
pub const DELETE_POPUP_HEIGHT: u16 = 7;

pub fn draw_app(
    frame: &mut Frame,
    state: &AppState,
    notebook: &Notebook,
    scratch: &ScratchPad,
    palette: &Palette,
    list_state: &mut ListState,
) {
    let backdrop = Block::default().style(
        Style::default()
            .bg(palette.background)
            .fg(palette.text),
    );
    frame.render_widget(backdrop, frame.size());

    match state.route {
        Route::Home => draw_home(frame, palette),
        Route::Editor => draw_editor(frame, state, notebook, palette, list_state),
    }

    match state.overlay() {
        Some(OverlayState::Scratch(overlay)) => draw_scratch(frame, overlay, scratch, palette),
        Some(OverlayState::DeleteConfirm(overlay)) => draw_delete_popup(frame, overlay, palette),
        None => {}
    }
}

fn draw_home(frame: &mut Frame, palette: &Palette) {
    let area = centered_rect(70, 50, frame.size());
    let theme_label = match palette.mode {
        ThemeMode::Dark => "dark",
        ThemeMode::Light => "light",
    };
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Penguin 🐧",
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "The distraction-free, local-first markdown editor.",
            Style::default().fg(palette.text),
        )),
        Line::from(Span::styled(
            "Built for speed. Designed for focus.",
            Style::default().fg(palette.muted),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Enter open notebook • t theme • q quit",
            Style::default().fg(palette.muted),
        )),
        Line::from(Span::styled(
            format!("Theme: {theme_label}"),
            Style::default().fg(palette.muted),
        )),
    ];
    let hero = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(hero, area);
}

fn draw_editor(
    frame: &mut Frame,
    state: &AppState,
    notebook: &Notebook,
    palette: &Palette,
    list_state: &mut ListState,
) {
    if !notebook.is_loaded() {
        let area = centered_rect(60, 20, frame.size());
        let loading = Paragraph::new(Line::from(Span::styled(
            "Loading your workspace...",
            Style::default().fg(palette.muted),
        )))
        .alignment(Alignment::Center);
        frame.render_widget(loading, area);
        return;
    }

    let layout = editor_layout(frame.size());
    draw_sidebar(frame, layout.sidebar, state, notebook, palette, list_state);
    draw_input(frame, layout.input, state, notebook, palette);
    draw_preview(frame, layout.preview, state, notebook, palette);
    draw_status(frame, layout.status, state, notebook, palette);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorLayout {
    pub sidebar: Rect,
    pub input: Rect,
    pub preview: Rect,
    pub status: Rect,
}

/// Splits the screen into the fixed-width sidebar, the two equal editor
/// panes and the status line. Mouse dispatch reuses the same geometry.
pub fn editor_layout(area: Rect) -> EditorLayout {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(40)])
        .split(vertical[0]);

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[1]);

    EditorLayout {
        sidebar: columns[0],
        input: panes[0],
        preview: panes[1],
        status: vertical[1],
    }
}

/// The drawable region inside a bordered block.
pub fn inner_rect(area: Rect) -> Rect {
    Rect {
        x: area.x.saturating_add(1),
        y: area.y.saturating_add(1),
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
}

pub fn rect_contains(rect: Rect, column: u16, row: u16) -> bool {
    column >= rect.x
        && column < rect.x.saturating_add(rect.width)
        && row >= rect.y
        && row < rect.y.saturating_add(rect.height)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidebarHit {
    pub index: usize,
    pub on_close: bool,
}

/// Maps a mouse position inside the sidebar to a note index. Entries are
/// two rows tall; the close glyph sits in the last cells of the title row.
pub fn sidebar_hit(area: Rect, offset: usize, column: u16, row: u16) -> Option<SidebarHit> {
    let inner = inner_rect(area);
    if !rect_contains(inner, column, row) {
        return None;
    }
    let rel = row - inner.y;
    let index = offset + (rel / 2) as usize;
    let on_title_row = rel % 2 == 0;
    let close_from = inner
        .x
        .saturating_add(inner.width)
        .saturating_sub(2);
    Some(SidebarHit {
        index,
        on_close: on_title_row && column >= close_from,
    })
}

/// Places the delete confirmation next to its anchor, pulled back inside
/// the frame when the anchor sits near an edge.
pub fn popup_rect(anchor: Rect, frame: Rect) -> Rect {
    let width = DELETE_POPUP_WIDTH.min(frame.width);
    let height = DELETE_POPUP_HEIGHT.min(frame.height);
    let max_x = frame
        .x
        .saturating_add(frame.width)
        .saturating_sub(width);
    let max_y = frame
        .y
        .saturating_add(frame.height)
        .saturating_sub(height);
    let x = anchor.x.saturating_add(2).min(max_x).max(frame.x);
    let y = anchor.y.min(max_y).max(frame.y);
    Rect {
        x,
        y,
        width,
        height,
    }
}

/// Screen positions of the `[ Delete ]` and `[ Cancel ]` buttons inside
/// the confirmation popup.
pub fn popup_button_rects(popup: Rect) -> (Rect, Rect) {
    let y = popup
        .y
        .saturating_add(popup.height.saturating_sub(2));
    let delete = Rect::new(popup.x.saturating_add(2), y, 10, 1);
    let cancel = Rect::new(popup.x.saturating_add(14), y, 10, 1);
    (delete, cancel)
}

/// Truncates to a display width, marking cut text with an ellipsis.
fn fit_width(text: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width.saturating_sub(1) {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn pad_to(mut text: String, width: usize) -> String {
    let used = text.width();
    if used < width {
        text.push_str(&" ".repeat(width - used));
    }
    text
}

fn pane_border(palette: &Palette, focused: bool) -> Style {
    if focused {
        Style::default().fg(palette.accent)
    } else {
        Style::default().fg(palette.border)
    }
}

fn draw_sidebar(
    frame: &mut Frame,
    area: Rect,
    state: &AppState,
    notebook: &Notebook,
    palette: &Palette,
    list_state: &mut ListState,
) {
    let focused = state.focus == PaneFocus::Sidebar && state.overlay().is_none();
    let inner_width = area.width.saturating_sub(2) as usize;
    let title_width = inner_width.saturating_sub(2);

    let mut items = Vec::with_capacity(notebook.len().max(1));
    for note in notebook.notes() {
        let is_active = notebook.active_id() == Some(note.id.as_str());
        let title_style = if is_active {
            Style::default()
                .fg(palette.text)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(palette.text)
        };
        let title = pad_to(fit_width(&note.title, title_width), title_width);
        let title_line = Line::from(vec![
            Span::styled(title, title_style),
            Span::raw(" "),
            Span::styled("✕", Style::default().fg(palette.muted)),
        ]);
        let meta_line = Line::from(Span::styled(
            format!("  {}", format_note_date(note.updated_at)),
            Style::default().fg(palette.muted),
        ));
        items.push(ListItem::new(vec![title_line, meta_line]));
    }
    if items.is_empty() {
        items.push(ListItem::new(vec![
            Line::from(Span::styled(
                "No notes yet.",
                Style::default().fg(palette.text),
            )),
            Line::from(Span::styled(
                "Press `n` to create one.",
                Style::default().fg(palette.muted),
            )),
        ]));
    }

    let list = List::new(items)
        .block(
            Block::default()
                .title(" Your Notes ")
                .borders(Borders::ALL)
                .border_style(pane_border(palette, focused)),
        )
        .highlight_style(
            Style::default()
                .bg(palette.selection_bg)
                .fg(palette.selection_fg),
        );
    frame.render_stateful_widget(list, area, list_state);
}

fn draw_input(
    frame: &mut Frame,
    area: Rect,
    state: &AppState,
    notebook: &Notebook,
    palette: &Palette,
) {
    let focused = state.focus == PaneFocus::Input && state.overlay().is_none();
    let title = if matches!(notebook.save_status(), SaveStatus::Pending { .. }) {
        " Editor (saving...) "
    } else {
        " Editor "
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(pane_border(palette, focused));

    if notebook.active().is_none() {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "Select a note to view",
                Style::default().fg(palette.text),
            )),
            Line::from(Span::styled(
                "or press `n` to start one",
                Style::default().fg(palette.muted),
            )),
        ])
        .alignment(Alignment::Center)
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let inner = inner_rect(area);
    let paragraph = Paragraph::new(state.input.text().to_string())
        .style(Style::default().fg(palette.text))
        .block(block)
        .scroll((state.input_scroll, 0));
    frame.render_widget(paragraph, area);

    if focused && inner.width > 0 && inner.height > 0 {
        let (row, col) = state.input.cursor_line_col();
        let row = row.min(u16::MAX as usize) as u16;
        if row >= state.input_scroll && row < state.input_scroll + inner.height {
            let col = (col.min(u16::MAX as usize) as u16).min(inner.width - 1);
            frame.set_cursor(inner.x + col, inner.y + row - state.input_scroll);
        }
    }
}

fn draw_preview(
    frame: &mut Frame,
    area: Rect,
    state: &AppState,
    notebook: &Notebook,
    palette: &Palette,
) {
    let focused = state.focus == PaneFocus::Preview && state.overlay().is_none();
    let block = Block::default()
        .title(" Preview ")
        .borders(Borders::ALL)
        .border_style(pane_border(palette, focused));

    if notebook.active().is_none() {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "Nothing to preview yet.",
                Style::default().fg(palette.muted),
            )),
        ])
        .alignment(Alignment::Center)
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let paragraph = Paragraph::new(Text::from(state.preview_cache.clone()))
        .block(block)
        .scroll((state.preview_scroll, 0));
    frame.render_widget(paragraph, area);
}

fn draw_status(
    frame: &mut Frame,
    area: Rect,
    state: &AppState,
    notebook: &Notebook,
    palette: &Palette,
) {
    let theme_label = match palette.mode {
        ThemeMode::Dark => "dark",
        ThemeMode::Light => "light",
    };
    let mut spans = vec![
        Span::raw(format!("Theme: {theme_label}")),
        Span::raw(format!(" | Notes: {}", notebook.len())),
    ];
    match notebook.save_status() {
        SaveStatus::Idle => spans.push(Span::raw(" | Save: idle")),
        SaveStatus::Pending { since } => {
            spans.push(Span::raw(" | Save: "));
            spans.push(Span::styled(
                "saving...",
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                format!(" since {}", format_time_short(since)),
                Style::default().fg(palette.muted),
            ));
        }
        SaveStatus::Saved { at } => {
            spans.push(Span::raw(" | Save: saved "));
            spans.push(Span::styled(
                format_time_short(at),
                Style::default().fg(palette.muted),
            ));
        }
    }
    if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(palette.accent),
        ));
    }

    let keys = "j/k move • Enter edit • n new • d delete • x export • t theme • ` scratch • Tab focus • Esc home • q quit";
    let text = Text::from(vec![
        Line::from(spans),
        Line::from(Span::styled(keys, Style::default().fg(palette.muted))),
    ]);
    let paragraph = Paragraph::new(text).style(Style::default().fg(palette.muted));
    frame.render_widget(paragraph, area);
}

fn format_time_short(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

fn draw_scratch(
    frame: &mut Frame,
    overlay: &ScratchOverlay,
    scratch: &ScratchPad,
    palette: &Palette,
) {
    let area = centered_rect(70, 70, frame.size());
    frame.render_widget(Clear, area);
    let block = Block::default()
        .title(" Scratch Pad ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.accent))
        .style(Style::default().bg(palette.surface).fg(palette.text));
    frame.render_widget(block, area);

    let inner = inner_rect(area);
    if inner.height < 2 || inner.width == 0 {
        return;
    }
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);

    let (row, col) = overlay.buffer.cursor_line_col();
    let body_height = sections[0].height;
    let scroll = (row.min(u16::MAX as usize) as u16).saturating_sub(body_height.saturating_sub(1));
    let body = Paragraph::new(overlay.buffer.text().to_string())
        .style(Style::default().fg(palette.text))
        .scroll((scroll, 0));
    frame.render_widget(body, sections[0]);

    let col = (col.min(u16::MAX as usize) as u16).min(sections[0].width.saturating_sub(1));
    let cursor_row = (row.min(u16::MAX as usize) as u16).saturating_sub(scroll);
    if cursor_row < body_height {
        frame.set_cursor(sections[0].x + col, sections[0].y + cursor_row);
    }

    let saving = match scratch.save_status() {
        SaveStatus::Pending { .. } => Span::styled(
            "Saving...",
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        ),
        SaveStatus::Saved { at } => Span::styled(
            format!("Saved {}", format_time_short(at)),
            Style::default().fg(palette.muted),
        ),
        SaveStatus::Idle => Span::raw(""),
    };
    let footer = Line::from(vec![
        saving,
        Span::styled(
            "  Esc close • text autosaves",
            Style::default().fg(palette.muted),
        ),
    ]);
    frame.render_widget(Paragraph::new(footer), sections[1]);
}

fn draw_delete_popup(frame: &mut Frame, overlay: &DeleteConfirmOverlay, palette: &Palette) {
    let popup = popup_rect(overlay.anchor, frame.size());
    frame.render_widget(Clear, popup);
    let block = Block::default()
        .title(" Delete note ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.danger))
        .style(Style::default().bg(palette.surface).fg(palette.text));
    frame.render_widget(block, popup);

    let inner = inner_rect(popup);
    if inner.height < 2 {
        return;
    }
    let question = Rect {
        height: inner.height.saturating_sub(1),
        ..inner
    };
    let lines = vec![
        Line::from(Span::styled(
            fit_width(&format!("Delete \"{}\"?", overlay.title), inner.width as usize),
            Style::default()
                .fg(palette.text)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "This cannot be undone.",
            Style::default().fg(palette.muted),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Enter confirm • Esc cancel",
            Style::default().fg(palette.muted),
        )),
    ];
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), question);

    let (delete, cancel) = popup_button_rects(popup);
    frame.render_widget(
        Paragraph::new(Span::styled(
            "[ Delete ]",
            Style::default()
                .fg(palette.danger)
                .add_modifier(Modifier::BOLD),
        )),
        delete,
    );
    frame.render_widget(
        Paragraph::new(Span::styled(
            "[ Cancel ]",
            Style::default().fg(palette.muted),
        )),
        cancel,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}
