//! Text selection over the combined scrollback + active grid buffer.
//!
//! Anchor and head are stored in absolute buffer coordinates (0 = oldest
//! scrollback row) so an active selection survives further output scrolling
//! the grid. Consumer calls take viewport-relative coordinates and are
//! translated on entry.

use crate::cell::SemanticTag;
use crate::term::state::TerminalState;

/// Granularity of a selection gesture
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SelectionUnit {
    #[default]
    Character,
    Word,
    Line,
}

/// An absolute position in the combined buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferPos {
    /// 0-indexed row over scrollback ++ active grid
    pub line: usize,
    pub col: u16,
}

/// Selection state
#[derive(Clone, Debug)]
pub struct TextSelection {
    pub anchor: BufferPos,
    pub head: BufferPos,
    pub unit: SelectionUnit,
    /// Whether the gesture is still in progress (button held)
    pub active: bool,
}

impl TextSelection {
    /// Endpoints ordered so start <= end in row-major order.
    pub fn normalized(&self) -> (BufferPos, BufferPos) {
        let a = self.anchor;
        let h = self.head;
        if (a.line, a.col) <= (h.line, h.col) {
            (a, h)
        } else {
            (h, a)
        }
    }
}

impl TerminalState {
    /// Begin a character selection at a viewport-relative position.
    pub fn selection_start(&mut self, row: u16, col: u16) {
        let pos = self.viewport_to_absolute(row, col);
        self.selection = Some(TextSelection {
            anchor: pos,
            head: pos,
            unit: SelectionUnit::Character,
            active: true,
        });
        self.active_screen_mut().mark_all_dirty();
        self.touch();
    }

    /// Extend the selection head to a viewport-relative position.
    pub fn selection_update(&mut self, row: u16, col: u16) {
        let pos = self.viewport_to_absolute(row, col);
        if let Some(sel) = self.selection.as_mut() {
            sel.head = pos;
        }
        self.active_screen_mut().mark_all_dirty();
        self.touch();
    }

    /// Finish the gesture (button released); the range is kept.
    pub fn selection_end(&mut self) {
        if let Some(sel) = self.selection.as_mut() {
            sel.active = false;
        }
    }

    pub fn clear_selection(&mut self) {
        if self.selection.is_some() {
            self.selection = None;
            self.active_screen_mut().mark_all_dirty();
            self.touch();
        }
    }

    pub fn selection_is_active(&self) -> bool {
        self.selection.is_some()
    }

    /// Select the word containing the viewport-relative position. A word is
    /// a maximal run of alphanumerics plus the configured extra characters;
    /// clicking anything else produces no selection.
    pub fn select_word(&mut self, row: u16, col: u16) {
        let pos = self.viewport_to_absolute(row, col);
        let word_chars = crate::config::config().selection.word_chars;

        let Some(ch) = self.char_at(pos.line, pos.col) else {
            self.clear_selection();
            return;
        };
        if !is_word_char(ch, &word_chars) {
            self.clear_selection();
            return;
        }

        let mut start = pos.col;
        while start > 0 {
            match self.char_at(pos.line, start - 1) {
                Some(c) if is_word_char(c, &word_chars) => start -= 1,
                _ => break,
            }
        }
        let mut end = pos.col;
        while end + 1 < self.cols {
            match self.char_at(pos.line, end + 1) {
                Some(c) if is_word_char(c, &word_chars) => end += 1,
                _ => break,
            }
        }

        self.selection = Some(TextSelection {
            anchor: BufferPos {
                line: pos.line,
                col: start,
            },
            head: BufferPos {
                line: pos.line,
                col: end,
            },
            unit: SelectionUnit::Word,
            active: false,
        });
        self.active_screen_mut().mark_all_dirty();
        self.touch();
    }

    /// Select the full logical row at the viewport-relative row, spanning
    /// soft-wrap continuations in both directions.
    pub fn select_line(&mut self, row: u16) {
        let abs = self
            .active_screen()
            .visible_row_to_absolute(row)
            .min(self.active_screen().total_lines().saturating_sub(1));

        // A row's wrapped flag means it flows onto the next row. Walk up
        // while the preceding row wraps into this one, then down while this
        // logical line keeps wrapping.
        let mut first = abs;
        while first > 0 {
            let prev_wraps = self
                .active_screen()
                .get_row_absolute(first - 1)
                .map(|r| r.wrapped)
                .unwrap_or(false);
            if !prev_wraps {
                break;
            }
            first -= 1;
        }
        let mut last = abs;
        let total = self.active_screen().total_lines();
        while last + 1 < total {
            let wraps = self
                .active_screen()
                .get_row_absolute(last)
                .map(|r| r.wrapped)
                .unwrap_or(false);
            if !wraps {
                break;
            }
            last += 1;
        }

        self.selection = Some(TextSelection {
            anchor: BufferPos {
                line: first,
                col: 0,
            },
            head: BufferPos {
                line: last,
                col: self.cols - 1,
            },
            unit: SelectionUnit::Line,
            active: false,
        });
        self.active_screen_mut().mark_all_dirty();
        self.touch();
    }

    /// Whether the viewport-relative cell is inside the selection.
    pub fn is_selected(&self, row: u16, col: u16) -> bool {
        let Some(sel) = &self.selection else {
            return false;
        };
        let abs = self.active_screen().visible_row_to_absolute(row);
        let (start, end) = sel.normalized();

        if abs < start.line || abs > end.line {
            return false;
        }
        if start.line == end.line {
            col >= start.col && col <= end.col
        } else if abs == start.line {
            col >= start.col
        } else if abs == end.line {
            col <= end.col
        } else {
            true
        }
    }

    /// Extract the selected text. Rows are joined in order; a soft-wrapped
    /// boundary inserts no newline; trailing blanks are trimmed per row.
    pub fn selected_text(&self) -> Option<String> {
        let sel = self.selection.as_ref()?;
        let (start, end) = sel.normalized();
        let screen = self.active_screen();
        let mut out = String::new();

        for line in start.line..=end.line {
            let Some(row) = screen.get_row_absolute(line) else {
                continue;
            };

            let col_start = if line == start.line {
                start.col as usize
            } else {
                0
            };
            let col_end = if line == end.line {
                (end.col as usize + 1).min(row.cells.len())
            } else {
                row.cells.len()
            };

            let mut line_buf = String::new();
            for cell in row.cells.get(col_start..col_end).unwrap_or(&[]) {
                if cell.is_continuation() {
                    continue;
                }
                line_buf.push_str(cell.display_str());
            }
            while line_buf.ends_with(' ') {
                line_buf.pop();
            }
            out.push_str(&line_buf);

            // A hard break only where the emitted row did not soft-wrap.
            if line < end.line {
                let wraps = screen
                    .get_row_absolute(line)
                    .map(|r| r.wrapped)
                    .unwrap_or(false);
                if !wraps {
                    out.push('\n');
                }
            }
        }

        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Semantic tag of the row under a viewport-relative position.
    pub fn tag_at_viewport_row(&self, row: u16) -> SemanticTag {
        let abs = self.active_screen().visible_row_to_absolute(row);
        self.row_tag(abs).unwrap_or(SemanticTag::None)
    }

    fn viewport_to_absolute(&self, row: u16, col: u16) -> BufferPos {
        let screen = self.active_screen();
        let line = screen
            .visible_row_to_absolute(row)
            .min(screen.total_lines().saturating_sub(1));
        BufferPos {
            line,
            col: col.min(self.cols.saturating_sub(1)),
        }
    }

    fn char_at(&self, line: usize, col: u16) -> Option<char> {
        let row = self.active_screen().get_row_absolute(line)?;
        let cell = row.cells.get(col as usize)?;
        if cell.grapheme.is_empty() {
            None
        } else {
            Some(cell.c())
        }
    }
}

fn is_word_char(ch: char, extra: &str) -> bool {
    ch.is_alphanumeric() || extra.contains(ch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state_with(lines: &[&str]) -> TerminalState {
        let mut st = TerminalState::with_scrollback(25, lines.len().max(1) as u16, 100);
        for (i, line) in lines.iter().enumerate() {
            st.cursor_position(i as u16 + 1, 1);
            for ch in line.chars() {
                st.put_char(ch);
            }
        }
        st
    }

    #[test]
    fn character_selection_extracts_range() {
        let mut st = state_with(&["hello world", "second line"]);
        st.selection_start(0, 6);
        st.selection_update(1, 5);
        st.selection_end();
        assert!(st.selection_is_active());
        assert_eq!(st.selected_text().as_deref(), Some("world\nsecond"));
    }

    #[test]
    fn reversed_drag_normalizes() {
        let mut st = state_with(&["hello world"]);
        st.selection_start(0, 4);
        st.selection_update(0, 0);
        assert_eq!(st.selected_text().as_deref(), Some("hello"));
    }

    #[test]
    fn word_selection_at_run() {
        let mut st = state_with(&["cd /usr/local/bin now"]);
        st.select_word(0, 8);
        assert_eq!(st.selected_text().as_deref(), Some("/usr/local/bin"));
    }

    #[test]
    fn word_selection_on_whitespace_is_empty() {
        let mut st = state_with(&["ab cd"]);
        st.select_word(0, 2);
        assert!(!st.selection_is_active());
        assert_eq!(st.selected_text(), None);
    }

    #[test]
    fn line_selection_spans_wrapped_rows() {
        let mut st = TerminalState::with_scrollback(5, 4, 100);
        // 12 chars on a 5-wide grid: wraps onto three rows
        for ch in "abcdefghijkl".chars() {
            st.put_char(ch);
        }
        st.select_line(1);
        assert_eq!(st.selected_text().as_deref(), Some("abcdefghijkl"));
    }

    #[test]
    fn wrapped_boundary_inserts_no_newline() {
        let mut st = TerminalState::with_scrollback(5, 4, 100);
        for ch in "abcdefg".chars() {
            st.put_char(ch);
        }
        st.cursor_position(3, 1);
        for ch in "xyz".chars() {
            st.put_char(ch);
        }
        st.selection_start(0, 0);
        st.selection_update(2, 4);
        assert_eq!(st.selected_text().as_deref(), Some("abcdefg\nxyz"));
    }

    #[test]
    fn selection_survives_scrolling_into_history() {
        let mut st = TerminalState::with_scrollback(10, 2, 100);
        for ch in "keep".chars() {
            st.put_char(ch);
        }
        st.selection_start(0, 0);
        st.selection_update(0, 3);
        st.selection_end();
        // Push the selected row into scrollback.
        st.cursor_position(2, 1);
        st.linefeed();
        st.linefeed();
        assert_eq!(st.selected_text().as_deref(), Some("keep"));
    }

    #[test]
    fn is_selected_tracks_bounds() {
        let mut st = state_with(&["hello"]);
        st.selection_start(0, 1);
        st.selection_update(0, 3);
        assert!(!st.is_selected(0, 0));
        assert!(st.is_selected(0, 2));
        assert!(!st.is_selected(0, 4));
    }

    #[test]
    fn resize_drops_selection() {
        let mut st = state_with(&["hello"]);
        st.selection_start(0, 0);
        st.selection_update(0, 4);
        st.resize(30, 5).unwrap();
        assert!(!st.selection_is_active());
    }
}
