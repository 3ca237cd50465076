//! Markdown to terminal-text rendering for the preview pane.
//!
//! The renderer walks pulldown-cmark events and produces pre-wrapped
//! [`Line`]s so the preview widget never re-wraps. Headings, emphasis,
//! lists, quotes, tables and fenced code are styled from the active
//! [`Palette`]; raw HTML is dropped.

mod code;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::theme::Palette;

/// Renders `source` into display lines wrapped to `width` columns.
pub fn render(source: &str, palette: &Palette, width: u16) -> Vec<Line<'static>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    let parser = Parser::new_ext(source, options);
    Renderer::new(palette, width).run(parser)
}

#[derive(Debug)]
enum ListKind {
    Bullet,
    Ordered(u64),
}

#[derive(Default)]
struct TableBuf {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    current_row: Vec<String>,
    current_cell: String,
    in_cell: bool,
}

struct Renderer<'a> {
    palette: &'a Palette,
    width: usize,
    lines: Vec<Line<'static>>,
    chunks: Vec<(String, Style)>,
    bold: usize,
    italic: usize,
    strike: usize,
    link: usize,
    image: usize,
    heading: Option<HeadingLevel>,
    quote_depth: usize,
    list_stack: Vec<ListKind>,
    pending_marker: Option<String>,
    item_indent: String,
    fence_lang: Option<String>,
    fence_buf: String,
    table: Option<TableBuf>,
}

impl<'a> Renderer<'a> {
    fn new(palette: &'a Palette, width: u16) -> Self {
        Self {
            palette,
            width: (width as usize).max(1),
            lines: Vec::new(),
            chunks: Vec::new(),
            bold: 0,
            italic: 0,
            strike: 0,
            link: 0,
            image: 0,
            heading: None,
            quote_depth: 0,
            list_stack: Vec::new(),
            pending_marker: None,
            item_indent: String::new(),
            fence_lang: None,
            fence_buf: String::new(),
            table: None,
        }
    }

    fn run(mut self, parser: Parser<'_>) -> Vec<Line<'static>> {
        for event in parser {
            match event {
                Event::Start(tag) => self.start_tag(tag),
                Event::End(end) => self.end_tag(end),
                Event::Text(text) => self.text(&text),
                Event::Code(text) => self.inline_code(&text),
                Event::SoftBreak => self.text(" "),
                Event::HardBreak => self.wrap_flush(),
                Event::Rule => self.emit_rule(),
                // Raw HTML is not rendered in the preview.
                _ => {}
            }
        }
        self.wrap_flush();
        while self.lines.last().is_some_and(line_is_blank) {
            self.lines.pop();
        }
        self.lines
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => self.heading = Some(level),
            Tag::BlockQuote { .. } => self.quote_depth += 1,
            Tag::CodeBlock(kind) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split(|c: char| c == ',' || c.is_whitespace())
                        .next()
                        .unwrap_or("")
                        .to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.fence_lang = Some(lang);
                self.fence_buf.clear();
            }
            Tag::List(start) => {
                // A nested list opens before the enclosing tight item ends,
                // so flush the item text it interrupts.
                self.wrap_flush();
                self.list_stack.push(match start {
                    Some(n) => ListKind::Ordered(n),
                    None => ListKind::Bullet,
                });
            }
            Tag::Item => {
                let depth = self.list_stack.len().max(1);
                let indent = "  ".repeat(depth - 1);
                let marker = match self.list_stack.last_mut() {
                    Some(ListKind::Ordered(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                let prefix = format!("{indent}{marker}");
                self.item_indent = " ".repeat(prefix.width());
                self.pending_marker = Some(prefix);
            }
            Tag::Table { .. } => self.table = Some(TableBuf::default()),
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.current_cell.clear();
                    table.in_cell = true;
                }
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { .. } => self.link += 1,
            Tag::Image { .. } => self.image += 1,
            _ => {}
        }
    }

    fn end_tag(&mut self, end: TagEnd) {
        match end {
            TagEnd::Paragraph => {
                self.wrap_flush();
                self.ensure_blank();
            }
            TagEnd::Heading { .. } => {
                self.wrap_flush();
                self.ensure_blank();
                self.heading = None;
            }
            TagEnd::BlockQuote { .. } => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock { .. } => self.emit_fence(),
            TagEnd::List { .. } => {
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.ensure_blank();
                }
            }
            TagEnd::Item => {
                self.wrap_flush();
                self.pending_marker = None;
                self.item_indent.clear();
            }
            TagEnd::Table { .. } => self.emit_table(),
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.header = std::mem::take(&mut table.current_row);
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.current_row);
                    table.rows.push(row);
                }
            }
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.current_cell);
                    table.current_row.push(cell.trim().to_string());
                    table.in_cell = false;
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link { .. } => self.link = self.link.saturating_sub(1),
            TagEnd::Image { .. } => self.image = self.image.saturating_sub(1),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.fence_lang.is_some() {
            self.fence_buf.push_str(text);
            return;
        }
        if let Some(table) = self.table.as_mut() {
            if table.in_cell {
                table.current_cell.push_str(text);
            }
            return;
        }
        let style = self.chunk_style();
        self.chunks.push((text.to_string(), style));
    }

    fn inline_code(&mut self, text: &str) {
        if let Some(table) = self.table.as_mut() {
            if table.in_cell {
                table.current_cell.push_str(text);
            }
            return;
        }
        let style = Style::default()
            .fg(self.palette.code_fg)
            .bg(self.palette.code_bg);
        self.chunks.push((text.to_string(), style));
    }

    fn chunk_style(&self) -> Style {
        if let Some(level) = self.heading {
            let base = Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD);
            return match level {
                HeadingLevel::H1 => base.add_modifier(Modifier::UNDERLINED),
                HeadingLevel::H2 => base,
                _ => Style::default()
                    .fg(self.palette.text)
                    .add_modifier(Modifier::BOLD),
            };
        }
        let mut style = Style::default().fg(self.palette.text);
        if self.link > 0 {
            style = style
                .fg(self.palette.accent)
                .add_modifier(Modifier::UNDERLINED);
        }
        if self.image > 0 {
            style = style
                .fg(self.palette.muted)
                .add_modifier(Modifier::ITALIC);
        }
        if self.bold > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.italic > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.strike > 0 {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        style
    }

    fn prefix_spans(&mut self) -> Vec<Span<'static>> {
        let mut spans = Vec::new();
        if self.quote_depth > 0 {
            spans.push(Span::styled(
                "▌ ".repeat(self.quote_depth),
                Style::default().fg(self.palette.accent),
            ));
        }
        if let Some(marker) = self.pending_marker.take() {
            spans.push(Span::styled(
                marker,
                Style::default().fg(self.palette.muted),
            ));
        } else if !self.item_indent.is_empty() {
            spans.push(Span::raw(self.item_indent.clone()));
        }
        spans
    }

    fn prefix_width(&self) -> usize {
        self.quote_depth * 2 + self.item_indent.width()
    }

    fn effective_width(&self) -> usize {
        self.width.saturating_sub(self.prefix_width()).max(1)
    }

    fn emit_line(&mut self, content: Vec<Span<'static>>) {
        let mut spans = self.prefix_spans();
        spans.extend(content);
        self.lines.push(Line::from(spans));
    }

    /// Wraps the accumulated inline chunks into as many display lines as
    /// needed. Whitespace collapses the way a rendered document collapses
    /// it, so consecutive spaces and soft breaks become a single space.
    fn wrap_flush(&mut self) {
        let chunks = std::mem::take(&mut self.chunks);
        let words = build_words(chunks);
        if words.is_empty() {
            if self.pending_marker.is_some() {
                self.emit_line(Vec::new());
            }
            return;
        }

        let effective = self.effective_width();
        let mut segments: Vec<(String, Style)> = Vec::new();
        let mut line_width = 0usize;
        for word in words {
            if word.width > effective {
                if !segments.is_empty() {
                    let spans = finish_segments(std::mem::take(&mut segments));
                    self.emit_line(spans);
                    line_width = 0;
                }
                self.emit_split_word(word, effective);
                continue;
            }
            let sep = usize::from(!segments.is_empty());
            if line_width + sep + word.width > effective && !segments.is_empty() {
                let spans = finish_segments(std::mem::take(&mut segments));
                self.emit_line(spans);
                line_width = 0;
            }
            if !segments.is_empty() {
                segments.push((" ".to_string(), Style::default()));
                line_width += 1;
            }
            line_width += word.width;
            segments.extend(word.segments);
        }
        if !segments.is_empty() {
            let spans = finish_segments(segments);
            self.emit_line(spans);
        }
    }

    /// Hard-splits a word that cannot fit on one line by itself.
    fn emit_split_word(&mut self, word: Word, effective: usize) {
        let mut piece: Vec<(String, Style)> = Vec::new();
        let mut piece_width = 0usize;
        for (text, style) in word.segments {
            for ch in text.chars() {
                let w = ch.width().unwrap_or(0);
                if piece_width + w > effective && !piece.is_empty() {
                    let spans = finish_segments(std::mem::take(&mut piece));
                    self.emit_line(spans);
                    piece_width = 0;
                }
                push_char(&mut piece, ch, style);
                piece_width += w;
            }
        }
        if !piece.is_empty() {
            let spans = finish_segments(piece);
            self.emit_line(spans);
        }
    }

    fn emit_fence(&mut self) {
        let code = std::mem::take(&mut self.fence_buf);
        let lang = self.fence_lang.take().unwrap_or_default();
        let plain = Style::default()
            .fg(self.palette.code_fg)
            .bg(self.palette.code_bg);
        match code::highlight_fence(&code, &lang, self.palette.code_theme_name(), plain) {
            Some(lines) => {
                for line in lines {
                    self.emit_line(line.spans);
                }
            }
            None => {
                for raw in code.lines() {
                    self.emit_line(vec![Span::styled(raw.to_string(), plain)]);
                }
            }
        }
        self.ensure_blank();
    }

    fn emit_rule(&mut self) {
        self.wrap_flush();
        let bar = "─".repeat(self.effective_width());
        let style = Style::default().fg(self.palette.muted);
        self.emit_line(vec![Span::styled(bar, style)]);
        self.ensure_blank();
    }

    fn emit_table(&mut self) {
        let table = match self.table.take() {
            Some(table) => table,
            None => return,
        };
        let mut widths: Vec<usize> = Vec::new();
        for row in std::iter::once(&table.header).chain(table.rows.iter()) {
            for (idx, cell) in row.iter().enumerate() {
                if widths.len() <= idx {
                    widths.resize(idx + 1, 0);
                }
                widths[idx] = widths[idx].max(cell.width());
            }
        }
        if widths.is_empty() {
            return;
        }

        let header_style = Style::default()
            .fg(self.palette.text)
            .add_modifier(Modifier::BOLD);
        let body_style = Style::default().fg(self.palette.text);
        let rule_style = Style::default().fg(self.palette.muted);

        let header = table_row(&table.header, &widths);
        self.emit_line(vec![Span::styled(header, header_style)]);
        let divider: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
        self.emit_line(vec![Span::styled(divider.join("─┼─"), rule_style)]);
        for row in &table.rows {
            self.emit_line(vec![Span::styled(table_row(row, &widths), body_style)]);
        }
        self.ensure_blank();
    }

    fn ensure_blank(&mut self) {
        if !self.lines.is_empty() && !self.lines.last().is_some_and(line_is_blank) {
            self.lines.push(Line::default());
        }
    }
}

struct Word {
    segments: Vec<(String, Style)>,
    width: usize,
}

fn push_char(segments: &mut Vec<(String, Style)>, ch: char, style: Style) {
    match segments.last_mut() {
        Some((text, last_style)) if *last_style == style => text.push(ch),
        _ => segments.push((ch.to_string(), style)),
    }
}

/// Splits styled chunks into whitespace-delimited words. A word keeps its
/// per-segment styling so emphasis boundaries inside a word survive the
/// wrap.
fn build_words(chunks: Vec<(String, Style)>) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Vec<(String, Style)> = Vec::new();
    let mut current_width = 0usize;
    for (text, style) in chunks {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if !current.is_empty() {
                    words.push(Word {
                        segments: std::mem::take(&mut current),
                        width: current_width,
                    });
                    current_width = 0;
                }
            } else {
                push_char(&mut current, ch, style);
                current_width += ch.width().unwrap_or(0);
            }
        }
    }
    if !current.is_empty() {
        words.push(Word {
            segments: current,
            width: current_width,
        });
    }
    words
}

fn finish_segments(segments: Vec<(String, Style)>) -> Vec<Span<'static>> {
    segments
        .into_iter()
        .map(|(text, style)| Span::styled(text, style))
        .collect()
}

fn table_row(cells: &[String], widths: &[usize]) -> String {
    let mut padded = Vec::with_capacity(widths.len());
    for (idx, width) in widths.iter().enumerate() {
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        let pad = width.saturating_sub(cell.width());
        padded.push(format!("{cell}{}", " ".repeat(pad)));
    }
    padded.join(" │ ")
}

fn line_is_blank(line: &Line<'_>) -> bool {
    line.spans.iter().all(|span| span.content.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::theme::{Palette, ThemeMode};

    fn palette() -> Palette {
        Palette::for_mode(ThemeMode::Dark)
    }

    fn texts(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn empty_source_renders_nothing() {
        assert!(render("", &palette(), 40).is_empty());
    }

    #[test]
    fn paragraph_wraps_at_width() {
        let lines = render("alpha beta gamma delta epsilon", &palette(), 12);
        let rows = texts(&lines);
        assert!(rows.len() > 1);
        for row in &rows {
            assert!(row.chars().count() <= 12, "row too wide: {row:?}");
        }
        assert_eq!(rows.join(" "), "alpha beta gamma delta epsilon");
    }

    #[test]
    fn heading_markers_are_hidden() {
        let lines = render("# Title", &palette(), 40);
        let rows = texts(&lines);
        assert_eq!(rows, vec!["Title"]);
        let style = lines[0].spans[0].style;
        assert!(style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn blocks_are_separated_by_one_blank_line() {
        let lines = render("# A\n\n\n\nfirst\n\nsecond", &palette(), 40);
        assert_eq!(texts(&lines), vec!["A", "", "first", "", "second"]);
    }

    #[test]
    fn soft_break_joins_as_space() {
        let lines = render("one\ntwo", &palette(), 40);
        assert_eq!(texts(&lines), vec!["one two"]);
    }

    #[test]
    fn hard_break_forces_a_new_line() {
        let lines = render("one  \ntwo", &palette(), 40);
        assert_eq!(texts(&lines), vec!["one", "two"]);
    }

    #[test]
    fn strikethrough_sets_crossed_out() {
        let lines = render("~~gone~~", &palette(), 40);
        let span = &lines[0].spans[0];
        assert!(span.style.add_modifier.contains(Modifier::CROSSED_OUT));
    }

    #[test]
    fn inline_code_uses_code_colors() {
        let pal = palette();
        let lines = render("before `code` after", &pal, 40);
        let code_span = lines[0]
            .spans
            .iter()
            .find(|span| span.content.as_ref() == "code")
            .expect("code span present");
        assert_eq!(code_span.style.fg, Some(pal.code_fg));
        assert_eq!(code_span.style.bg, Some(pal.code_bg));
    }

    #[test]
    fn link_text_is_underlined_without_url() {
        let lines = render("[click here](https://example.com)", &palette(), 40);
        let rows = texts(&lines);
        assert_eq!(rows, vec!["click here"]);
        let span = &lines[0].spans[0];
        assert!(span.style.add_modifier.contains(Modifier::UNDERLINED));
    }

    #[test]
    fn bullet_list_gets_markers() {
        let lines = render("- first\n- second", &palette(), 40);
        assert_eq!(texts(&lines), vec!["• first", "• second"]);
    }

    #[test]
    fn ordered_list_counts_upward() {
        let lines = render("1. one\n1. two\n1. three", &palette(), 40);
        assert_eq!(texts(&lines), vec!["1. one", "2. two", "3. three"]);
    }

    #[test]
    fn nested_list_indents() {
        let lines = render("- outer\n  - inner", &palette(), 40);
        assert_eq!(texts(&lines), vec!["• outer", "  • inner"]);
    }

    #[test]
    fn wrapped_item_continuation_aligns_under_text() {
        let lines = render("- alpha beta gamma delta", &palette(), 14);
        let rows = texts(&lines);
        assert!(rows.len() > 1);
        assert!(rows[0].starts_with("• "));
        for row in &rows[1..] {
            assert!(row.starts_with("  "), "continuation missing indent: {row:?}");
        }
    }

    #[test]
    fn block_quote_gets_bar_prefix() {
        let lines = render("> quoted text", &palette(), 40);
        assert_eq!(texts(&lines), vec!["▌ quoted text"]);
    }

    #[test]
    fn fenced_rust_code_is_highlighted() {
        let lines = render("```rust\nfn main() {}\n```", &palette(), 40);
        let rows = texts(&lines);
        assert!(rows.contains(&"fn main() {}".to_string()));
        let code_line = lines
            .iter()
            .find(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
                    == "fn main() {}"
            })
            .expect("code line present");
        assert!(code_line.spans.len() > 1, "expected token spans");
    }

    #[test]
    fn unknown_fence_language_renders_plain() {
        let pal = palette();
        let lines = render("```nosuchlang\nplain body\n```", &pal, 40);
        let code_line = lines
            .iter()
            .find(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
                    == "plain body"
            })
            .expect("code line present");
        assert_eq!(code_line.spans.len(), 1);
        assert_eq!(code_line.spans[0].style.fg, Some(pal.code_fg));
    }

    #[test]
    fn rule_spans_the_full_width() {
        let lines = render("above\n\n---", &palette(), 10);
        let rows = texts(&lines);
        assert_eq!(rows.last().map(String::as_str), Some("──────────"));
    }

    #[test]
    fn table_columns_align() {
        let lines = render("|a|bb|\n|-|-|\n|ccc|d|", &palette(), 40);
        let rows = texts(&lines);
        assert_eq!(rows[0], "a   │ bb");
        assert_eq!(rows[1], "────┼───");
        assert!(rows[2].starts_with("ccc │ d"));
    }

    #[test]
    fn zero_width_does_not_panic() {
        let lines = render("hello wide world", &palette(), 0);
        assert!(!lines.is_empty());
    }

    #[test]
    fn image_alt_text_is_muted() {
        let pal = palette();
        let lines = render("![diagram](x.png)", &pal, 40);
        assert_eq!(texts(&lines), vec!["diagram"]);
        assert_eq!(lines[0].spans[0].style.fg, Some(pal.muted));
    }
}
