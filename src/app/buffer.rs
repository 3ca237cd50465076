//! Cursor-addressed editing for the note input pane and the scratch pad.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// A plain text buffer with a byte-offset cursor. All cursor motion is
/// grapheme-aware so combined characters never split.
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    text: String,
    cursor: usize,
    preferred_column: Option<usize>,
}

impl TextBuffer {
    pub fn new(text: String) -> Self {
        let cursor = text.len();
        Self {
            text,
            cursor,
            preferred_column: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Replaces the whole content, moving the cursor to the end.
    pub fn set_text(&mut self, text: String) {
        self.cursor = text.len();
        self.text = text;
        self.preferred_column = None;
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        let mut scratch = [0u8; 4];
        let encoded = ch.encode_utf8(&mut scratch);
        self.text.insert_str(self.cursor, encoded);
        self.cursor += encoded.len();
        self.preferred_column = None;
        true
    }

    pub fn insert_newline(&mut self) -> bool {
        self.text.insert(self.cursor, '\n');
        self.cursor += 1;
        self.preferred_column = Some(0);
        true
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let prev = prev_grapheme_boundary(&self.text, self.cursor);
        self.text.drain(prev..self.cursor);
        self.cursor = prev;
        self.preferred_column = None;
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.text.len() {
            return false;
        }
        let next = next_grapheme_boundary(&self.text, self.cursor);
        if next == self.cursor {
            return false;
        }
        self.text.drain(self.cursor..next);
        self.preferred_column = None;
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor = prev_grapheme_boundary(&self.text, self.cursor);
        self.preferred_column = None;
        true
    }

    pub fn move_right(&mut self) -> bool {
        if self.cursor >= self.text.len() {
            return false;
        }
        let next = next_grapheme_boundary(&self.text, self.cursor);
        if next == self.cursor {
            return false;
        }
        self.cursor = next;
        self.preferred_column = None;
        true
    }

    pub fn move_home(&mut self) -> bool {
        let start = line_start(&self.text, self.cursor);
        if self.cursor == start {
            return false;
        }
        self.cursor = start;
        self.preferred_column = Some(0);
        true
    }

    pub fn move_end(&mut self) -> bool {
        let end = line_end(&self.text, self.cursor);
        if self.cursor == end {
            return false;
        }
        self.cursor = end;
        self.preferred_column = Some(column_at(
            &self.text,
            line_start(&self.text, self.cursor),
            self.cursor,
        ));
        true
    }

    pub fn move_up(&mut self) -> bool {
        let current_line_start = line_start(&self.text, self.cursor);
        let current_column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.text, current_line_start, self.cursor));
        if current_line_start == 0 {
            if self.cursor == 0 {
                return false;
            }
            self.cursor = 0;
            self.preferred_column = Some(current_column);
            return true;
        }
        let prev_line_end = current_line_start.saturating_sub(1);
        let prev_line_start = line_start(&self.text, prev_line_end);
        let target = position_for_column(&self.text, prev_line_start, current_column);
        if self.cursor == target {
            return false;
        }
        self.cursor = target;
        self.preferred_column = Some(current_column);
        true
    }

    pub fn move_down(&mut self) -> bool {
        let current_line_start = line_start(&self.text, self.cursor);
        let current_column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.text, current_line_start, self.cursor));
        let current_line_end = line_end(&self.text, self.cursor);
        if current_line_end == self.text.len() {
            if self.cursor == self.text.len() {
                return false;
            }
            self.cursor = self.text.len();
            self.preferred_column = Some(current_column);
            return true;
        }
        let next_line_start = current_line_end + 1;
        let target = position_for_column(&self.text, next_line_start, current_column);
        if self.cursor == target {
            return false;
        }
        self.cursor = target;
        self.preferred_column = Some(current_column);
        true
    }

    pub fn move_word_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let mut idx = self.cursor;
        while idx > 0 {
            let prev = prev_grapheme_boundary(&self.text, idx);
            if self.text[prev..idx].trim().is_empty() {
                idx = prev;
            } else {
                break;
            }
        }
        while idx > 0 {
            let prev = prev_grapheme_boundary(&self.text, idx);
            if self.text[prev..idx].trim().is_empty() {
                break;
            }
            idx = prev;
        }
        self.cursor = idx;
        self.preferred_column = None;
        true
    }

    pub fn move_word_right(&mut self) -> bool {
        if self.cursor >= self.text.len() {
            return false;
        }
        let mut idx = self.cursor;
        let len = self.text.len();
        while idx < len {
            let next = next_grapheme_boundary(&self.text, idx);
            if self.text[idx..next].trim().is_empty() {
                idx = next;
            } else {
                break;
            }
        }
        while idx < len {
            let next = next_grapheme_boundary(&self.text, idx);
            if self.text[idx..next].trim().is_empty() {
                break;
            }
            idx = next;
        }
        while idx < len {
            let next = next_grapheme_boundary(&self.text, idx);
            if self.text[idx..next].trim().is_empty() {
                idx = next;
            } else {
                break;
            }
        }
        if idx == self.cursor {
            return false;
        }
        self.cursor = idx.min(len);
        self.preferred_column = None;
        true
    }

    /// Returns the cursor position as `(row, column)` where the column is
    /// measured in display cells, ready for terminal cursor placement.
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let row = self.text[..self.cursor].matches('\n').count();
        let start = line_start(&self.text, self.cursor);
        let col = self.text[start..self.cursor].width();
        (row, col)
    }

    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }
}

fn prev_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor == 0 {
        return 0;
    }
    let mut last = 0;
    for (idx, _) in text[..cursor].grapheme_indices(true) {
        last = idx;
    }
    last
}

fn next_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor >= text.len() {
        return text.len();
    }
    let mut iter = text[cursor..].graphemes(true);
    if let Some(grapheme) = iter.next() {
        cursor + grapheme.len()
    } else {
        text.len()
    }
}

fn line_start(text: &str, cursor: usize) -> usize {
    text[..cursor].rfind('\n').map(|idx| idx + 1).unwrap_or(0)
}

fn line_end(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .find('\n')
        .map(|idx| cursor + idx)
        .unwrap_or(text.len())
}

fn column_at(text: &str, line_start: usize, cursor: usize) -> usize {
    text[line_start..cursor].graphemes(true).count()
}

fn position_for_column(text: &str, line_start: usize, column: usize) -> usize {
    let line_end = line_end(text, line_start);
    let mut position = line_start;
    let mut count = 0;
    for grapheme in text[line_start..line_end].graphemes(true) {
        if count >= column {
            break;
        }
        position += grapheme.len();
        count += 1;
    }
    if column > count {
        line_end
    } else {
        position
    }
}
