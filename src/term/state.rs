//! Terminal state management
//!
//! This module defines the terminal's screen buffers, bounded scrollback,
//! cursor state, and emulator mode flags. All mutation happens through the
//! VT parser or explicit consumer calls made under the engine lock.

use std::collections::{HashSet, VecDeque};

use unicode_width::UnicodeWidthChar;

use crate::cell::{Cell, CellAttrs, SemanticTag};
use crate::error::TermError;
use crate::palette::Palette;

/// Terminal state holding all screen data
pub struct TerminalState {
    pub cols: u16,
    pub rows: u16,
    pub primary_screen: ScreenBuffer,
    pub alternate_screen: ScreenBuffer,
    pub using_alternate: bool,
    pub primary_cursor: CursorState,
    pub alternate_cursor: CursorState,
    pub current_attrs: CellAttrs,
    pub modes: TerminalModes,
    pub palette: Palette,
    pub title: String,
    /// Working directory reported via OSC 7
    pub working_dir: String,
    /// Scroll region (top, bottom) - 0-indexed, inclusive
    pub scroll_region: (u16, u16),
    /// Text selection state, stored in absolute buffer coordinates
    pub selection: Option<crate::term::selection::TextSelection>,
    /// Last printed character, for REP
    pub last_printed: Option<char>,
    /// Accumulated precise (pixel) scroll remainder
    pub(crate) scroll_pending: f32,
    /// Edge-triggered bell flag
    bell_pending: bool,
    /// Edge-triggered change flag, consumed by the gateway after each feed
    dirty: bool,
}

impl TerminalState {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_scrollback(cols, rows, crate::config::config().terminal.scrollback_lines)
    }

    pub fn with_scrollback(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            primary_screen: ScreenBuffer::new(cols, rows, scrollback_limit),
            // The alt screen never accumulates history.
            alternate_screen: ScreenBuffer::new(cols, rows, 0),
            using_alternate: false,
            primary_cursor: CursorState::default(),
            alternate_cursor: CursorState::default(),
            current_attrs: CellAttrs::default(),
            modes: TerminalModes::default(),
            palette: Palette::default(),
            title: String::new(),
            working_dir: String::new(),
            scroll_region: (0, rows - 1),
            selection: None,
            last_printed: None,
            scroll_pending: 0.0,
            bell_pending: false,
            dirty: false,
        }
    }

    pub fn active_screen(&self) -> &ScreenBuffer {
        if self.using_alternate {
            &self.alternate_screen
        } else {
            &self.primary_screen
        }
    }

    pub fn active_screen_mut(&mut self) -> &mut ScreenBuffer {
        if self.using_alternate {
            &mut self.alternate_screen
        } else {
            &mut self.primary_screen
        }
    }

    pub fn active_cursor(&self) -> &CursorState {
        if self.using_alternate {
            &self.alternate_cursor
        } else {
            &self.primary_cursor
        }
    }

    pub fn active_cursor_mut(&mut self) -> &mut CursorState {
        if self.using_alternate {
            &mut self.alternate_cursor
        } else {
            &mut self.primary_cursor
        }
    }

    /// Mark the state as changed since the last gateway check.
    pub(crate) fn touch(&mut self) {
        self.dirty = true;
    }

    /// Consume the change flag.
    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Ring the bell (edge-triggered; consumed by `take_bell`).
    pub fn ring_bell(&mut self) {
        self.bell_pending = true;
        self.touch();
    }

    /// Consume the pending-bell flag.
    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.bell_pending)
    }

    /// Resize the terminal. Zero dimensions are rejected without mutating
    /// anything. Rows are truncated or padded; wrapped lines are not
    /// reflowed.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), TermError> {
        if cols == 0 || rows == 0 {
            return Err(TermError::InvalidDimensions { cols, rows });
        }
        if cols == self.cols && rows == self.rows {
            return Ok(());
        }
        self.cols = cols;
        self.rows = rows;
        self.primary_screen.resize(cols, rows);
        self.alternate_screen.resize(cols, rows);
        self.scroll_region = (0, rows - 1);

        let max_col = cols - 1;
        let max_row = rows - 1;
        self.primary_cursor.col = self.primary_cursor.col.min(max_col);
        self.primary_cursor.row = self.primary_cursor.row.min(max_row);
        self.alternate_cursor.col = self.alternate_cursor.col.min(max_col);
        self.alternate_cursor.row = self.alternate_cursor.row.min(max_row);

        // A selection recorded against the old geometry is dropped rather
        // than remapped.
        self.selection = None;
        self.touch();
        Ok(())
    }

    /// Put a character at the current cursor position
    pub fn put_char(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0) as u16;

        if width == 0 {
            self.append_to_previous_cell(ch);
            return;
        }

        let (cursor_row, cursor_col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col)
        };

        // Deferred wrap: the cursor may rest one past the last column and
        // only wraps when the next printable arrives.
        if cursor_col + width > self.cols && cursor_col > 0 {
            if self.modes.auto_wrap {
                {
                    let row = cursor_row as usize;
                    let screen = self.active_screen_mut();
                    screen.rows[row].wrapped = true;
                }
                self.active_cursor_mut().col = 0;
                self.linefeed();
            } else {
                self.active_cursor_mut().col = self.cols - width.min(self.cols);
            }
        }

        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };

        if col >= self.cols as usize {
            return;
        }

        self.handle_wide_char_overwrite(row, col);

        let attrs = self.current_attrs.clone();
        let cols = self.cols;
        let insert = self.modes.insert_mode;

        let screen = self.active_screen_mut();

        if insert {
            // Shift the tail right; the last cell falls off.
            screen.rows[row].cells.pop();
            screen.rows[row].cells.insert(col, Cell::default());
        }

        screen.rows[row].cells[col] = Cell {
            grapheme: ch.to_string(),
            width: width as u8,
            attrs: attrs.clone(),
        };

        if width == 2 && col + 1 < cols as usize {
            screen.rows[row].cells[col + 1] = Cell::continuation(&attrs);
        }

        screen.mark_dirty(row);
        self.active_cursor_mut().col += width;
        self.last_printed = Some(ch);
        self.touch();
    }

    /// Repeat the last printed character n times (REP).
    pub fn repeat_last(&mut self, n: u16) {
        if let Some(ch) = self.last_printed {
            for _ in 0..n {
                self.put_char(ch);
            }
        }
    }

    fn append_to_previous_cell(&mut self, ch: char) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };

        if col > 0 {
            let screen = self.active_screen_mut();
            screen.rows[row].cells[col - 1].grapheme.push(ch);
            screen.mark_dirty(row);
            self.touch();
        }
    }

    /// Splitting a wide character leaves a blank in the orphaned half.
    fn handle_wide_char_overwrite(&mut self, row: usize, col: usize) {
        let attrs = self.current_attrs.clone();
        let cols = self.cols as usize;
        let screen = self.active_screen_mut();

        if col > 0 && screen.rows[row].cells[col].is_continuation() {
            screen.rows[row].cells[col - 1] = Cell {
                grapheme: " ".to_string(),
                width: 1,
                attrs: attrs.clone(),
            };
        }

        if screen.rows[row].cells[col].width == 2 && col + 1 < cols {
            screen.rows[row].cells[col + 1] = Cell {
                grapheme: " ".to_string(),
                width: 1,
                attrs,
            };
        }
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        self.active_cursor_mut().col = 0;
        self.touch();
    }

    /// Line feed - move cursor down, scroll if needed
    pub fn linefeed(&mut self) {
        let cursor_row = self.active_cursor().row;
        let scroll_bottom = self.scroll_region.1;
        let rows = self.rows;

        if cursor_row == scroll_bottom {
            self.scroll_up(1);
        } else if cursor_row < rows - 1 {
            self.active_cursor_mut().row += 1;
        }
        if self.modes.linefeed_newline {
            self.active_cursor_mut().col = 0;
        }
        self.touch();
    }

    /// Backspace - move cursor left
    pub fn backspace(&mut self) {
        let cursor = self.active_cursor_mut();
        if cursor.col > 0 {
            cursor.col -= 1;
            self.touch();
        }
    }

    /// Horizontal tab - next 8-column tab stop
    pub fn horizontal_tab(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = ((cursor.col / 8) + 1) * 8;
        if cursor.col >= cols {
            cursor.col = cols - 1;
        }
        self.touch();
    }

    /// Scroll the scroll region up by n lines; rows leaving the top of the
    /// primary screen enter scrollback.
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;
        let is_primary = !self.using_alternate;

        let screen = self.active_screen_mut();

        for _ in 0..n {
            if (top as usize) < screen.rows.len() && (bottom as usize) < screen.rows.len() {
                let removed_row = screen.rows.remove(top as usize);
                if is_primary && top == 0 {
                    screen.push_to_scrollback(removed_row);
                }
                screen.rows.insert(bottom as usize, Row::new(cols));
            }
        }
        screen.mark_all_dirty();
        self.touch();
    }

    /// Scroll the scroll region down by n lines
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;

        let screen = self.active_screen_mut();

        for _ in 0..n {
            if (bottom as usize) < screen.rows.len() && (top as usize) <= screen.rows.len() {
                screen.rows.remove(bottom as usize);
                screen.rows.insert(top as usize, Row::new(cols));
            }
        }
        screen.mark_all_dirty();
        self.touch();
    }

    pub fn cursor_up(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_sub(n);
        self.touch();
    }

    pub fn cursor_down(&mut self, n: u16) {
        let rows = self.rows;
        let cursor = self.active_cursor_mut();
        cursor.row = (cursor.row + n).min(rows - 1);
        self.touch();
    }

    pub fn cursor_forward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = (cursor.col + n).min(cols - 1);
        self.touch();
    }

    pub fn cursor_backward(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_sub(n);
        self.touch();
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        let rows = self.rows;
        let cols = self.cols;
        let origin = self.modes.origin_mode;
        let (top, bottom) = self.scroll_region;
        let cursor = self.active_cursor_mut();
        if origin {
            cursor.row = (top + row.saturating_sub(1)).min(bottom);
        } else {
            cursor.row = row.saturating_sub(1).min(rows - 1);
        }
        cursor.col = col.saturating_sub(1).min(cols - 1);
        self.touch();
    }

    /// Erase in display. Mode 3 also clears scrollback, xterm-style.
    pub fn erase_in_display(&mut self, mode: u16) {
        match mode {
            0 => {
                self.erase_in_line(0);
                let cursor_row = self.active_cursor().row as usize;
                let rows = self.rows as usize;
                let attrs = self.current_attrs.clone();
                let screen = self.active_screen_mut();
                for r in (cursor_row + 1)..rows {
                    if r < screen.rows.len() {
                        screen.rows[r].clear(&attrs);
                        screen.mark_dirty(r);
                    }
                }
            }
            1 => {
                let cursor_row = self.active_cursor().row as usize;
                let attrs = self.current_attrs.clone();
                {
                    let screen = self.active_screen_mut();
                    for r in 0..cursor_row {
                        if r < screen.rows.len() {
                            screen.rows[r].clear(&attrs);
                            screen.mark_dirty(r);
                        }
                    }
                }
                self.erase_in_line(1);
            }
            2 | 3 => {
                let rows = self.rows as usize;
                let attrs = self.current_attrs.clone();
                let screen = self.active_screen_mut();
                for r in 0..rows {
                    if r < screen.rows.len() {
                        screen.rows[r].clear(&attrs);
                        screen.mark_dirty(r);
                    }
                }
                if mode == 3 {
                    screen.clear_scrollback();
                }
            }
            _ => {}
        }
        self.touch();
    }

    /// Erase in line
    pub fn erase_in_line(&mut self, mode: u16) {
        let (cursor_row, cursor_col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let cols = self.cols as usize;
        let attrs = self.current_attrs.clone();

        let screen = self.active_screen_mut();
        let row = cursor_row;

        if row >= screen.rows.len() {
            return;
        }

        match mode {
            0 => {
                for c in cursor_col..cols {
                    if c < screen.rows[row].cells.len() {
                        screen.rows[row].cells[c].clear(&attrs);
                    }
                }
            }
            1 => {
                for c in 0..=cursor_col {
                    if c < screen.rows[row].cells.len() {
                        screen.rows[row].cells[c].clear(&attrs);
                    }
                }
            }
            2 => {
                screen.rows[row].clear(&attrs);
            }
            _ => {}
        }
        screen.mark_dirty(row);
        self.touch();
    }

    /// Insert blank characters at the cursor (ICH)
    pub fn insert_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let screen = self.active_screen_mut();
        for _ in 0..n {
            if col < screen.rows[row].cells.len() {
                screen.rows[row].cells.pop();
                screen.rows[row].cells.insert(col, Cell::default());
            }
        }
        screen.mark_dirty(row);
        self.touch();
    }

    /// Delete characters at the cursor, pulling the tail left (DCH)
    pub fn delete_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let screen = self.active_screen_mut();
        for _ in 0..n {
            if col < screen.rows[row].cells.len() {
                screen.rows[row].cells.remove(col);
                screen.rows[row].cells.push(Cell::default());
            }
        }
        screen.mark_dirty(row);
        self.touch();
    }

    /// Erase characters at the cursor without shifting (ECH)
    pub fn erase_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let attrs = self.current_attrs.clone();
        let screen = self.active_screen_mut();
        for i in 0..n as usize {
            if col + i < screen.rows[row].cells.len() {
                screen.rows[row].cells[col + i].clear(&attrs);
            }
        }
        screen.mark_dirty(row);
        self.touch();
    }

    /// Insert lines at cursor position
    pub fn insert_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let total_rows = self.rows as usize;
        let cols = self.cols;

        let screen = self.active_screen_mut();

        for _ in 0..n {
            if cursor_row < screen.rows.len() {
                screen.rows.insert(cursor_row, Row::new(cols));
                if screen.rows.len() > total_rows {
                    screen.rows.pop();
                }
            }
        }
        screen.mark_all_dirty();
        self.touch();
    }

    /// Delete lines at cursor position
    pub fn delete_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let cols = self.cols;

        let screen = self.active_screen_mut();

        for _ in 0..n {
            if cursor_row < screen.rows.len() {
                screen.rows.remove(cursor_row);
                screen.rows.push(Row::new(cols));
            }
        }
        screen.mark_all_dirty();
        self.touch();
    }

    /// Set scroll region (1-indexed, inclusive)
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let rows = self.rows;
        let top = top.saturating_sub(1).min(rows - 1);
        let bottom = bottom.saturating_sub(1).min(rows - 1);
        if top < bottom {
            self.scroll_region = (top, bottom);
            self.touch();
        }
    }

    /// Save cursor position and attributes (DECSC)
    pub fn save_cursor(&mut self) {
        let (col, row) = {
            let cursor = self.active_cursor();
            (cursor.col, cursor.row)
        };
        let attrs = self.current_attrs.clone();
        let saved = SavedCursor { col, row, attrs };
        self.active_cursor_mut().saved = Some(saved);
    }

    /// Restore cursor position and attributes (DECRC)
    pub fn restore_cursor(&mut self) {
        let saved = self.active_cursor().saved.clone();
        if let Some(saved) = saved {
            let cursor = self.active_cursor_mut();
            cursor.col = saved.col;
            cursor.row = saved.row;
            self.current_attrs = saved.attrs;
            self.touch();
        }
    }

    /// Set or reset a DEC private mode
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.modes.cursor_keys_app = enable,
            5 => self.modes.reverse_video = enable,
            6 => {
                self.modes.origin_mode = enable;
                self.cursor_position(1, 1);
            }
            7 => self.modes.auto_wrap = enable,
            12 => self.active_cursor_mut().blink = enable,
            25 => self.active_cursor_mut().visible = enable,
            47 | 1047 => {
                if enable {
                    self.using_alternate = true;
                    self.alternate_screen = ScreenBuffer::new(self.cols, self.rows, 0);
                } else {
                    self.using_alternate = false;
                }
                self.active_screen_mut().mark_all_dirty();
            }
            66 => self.modes.app_keypad = enable,
            1000 => {
                self.modes.mouse_mode = if enable { MouseMode::Normal } else { MouseMode::Off };
            }
            1002 => {
                self.modes.mouse_mode = if enable {
                    MouseMode::ButtonEvent
                } else {
                    MouseMode::Off
                };
            }
            1003 => {
                self.modes.mouse_mode = if enable {
                    MouseMode::AnyEvent
                } else {
                    MouseMode::Off
                };
            }
            1004 => self.modes.focus_events = enable,
            1005 => {
                self.modes.mouse_format = if enable {
                    MouseFormat::Utf8
                } else {
                    MouseFormat::Default
                };
            }
            1006 => {
                self.modes.mouse_format = if enable {
                    MouseFormat::Sgr
                } else {
                    MouseFormat::Default
                };
            }
            1015 => {
                self.modes.mouse_format = if enable {
                    MouseFormat::Urxvt
                } else {
                    MouseFormat::Default
                };
            }
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.save_cursor();
                    self.using_alternate = true;
                    self.alternate_screen = ScreenBuffer::new(self.cols, self.rows, 0);
                    self.alternate_cursor = CursorState::default();
                } else {
                    self.using_alternate = false;
                    self.restore_cursor();
                }
                self.active_screen_mut().mark_all_dirty();
            }
            2004 => self.modes.bracketed_paste = enable,
            _ => {
                tracing::debug!("unhandled private mode {mode} (enable={enable})");
            }
        }
        self.touch();
    }

    /// Reverse index - cursor up, scroll if at top of region
    pub fn reverse_index(&mut self) {
        let cursor_row = self.active_cursor().row;
        let scroll_top = self.scroll_region.0;

        if cursor_row == scroll_top {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    /// Index - cursor down, scroll if at bottom of region
    pub fn index(&mut self) {
        self.linefeed();
    }

    /// Tag the current cursor row with an OSC 133 semantic marker.
    pub fn tag_cursor_row(&mut self, tag: SemanticTag) {
        let row = self.active_cursor().row as usize;
        let screen = self.active_screen_mut();
        if let Some(r) = screen.rows.get_mut(row) {
            r.tag = tag;
            self.touch();
        }
    }

    /// Semantic tag of an absolute buffer row. Out-of-range rows report
    /// `None` rather than failing; a stale index after resize is benign.
    pub fn row_tag(&self, abs_row: usize) -> Option<SemanticTag> {
        self.active_screen().get_row_absolute(abs_row).map(|r| r.tag)
    }

    /// Move the viewport to the previous prompt-start row above the current
    /// viewport top. Returns whether the viewport moved.
    pub fn jump_prev_prompt(&mut self) -> bool {
        let screen = self.active_screen();
        let top = screen.viewport_top_absolute();
        let mut found = None;
        for abs in (0..top).rev() {
            if screen.get_row_absolute(abs).map(|r| r.tag) == Some(SemanticTag::PromptStart) {
                found = Some(abs);
                break;
            }
        }
        match found {
            Some(abs) => {
                let sb = self.active_screen().scrollback_len();
                let offset = sb.saturating_sub(abs).min(sb);
                self.active_screen_mut().set_viewport(offset);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Move the viewport to the next prompt-start row below the current
    /// viewport top. Returns whether the viewport moved.
    pub fn jump_next_prompt(&mut self) -> bool {
        let screen = self.active_screen();
        let top = screen.viewport_top_absolute();
        let total = screen.scrollback_len() + screen.rows.len();
        let mut found = None;
        for abs in (top + 1)..total {
            if screen.get_row_absolute(abs).map(|r| r.tag) == Some(SemanticTag::PromptStart) {
                found = Some(abs);
                break;
            }
        }
        match found {
            Some(abs) => {
                let sb = self.active_screen().scrollback_len();
                // A prompt already inside the visible grid clamps to the
                // bottom; if that is where we are, nothing moves.
                let offset = sb.saturating_sub(abs);
                if offset == self.active_screen().viewport_offset() {
                    return false;
                }
                self.active_screen_mut().set_viewport(offset);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Full reset (RIS), preserving geometry and scrollback limit.
    pub fn full_reset(&mut self) {
        let limit = self.primary_screen.scrollback_limit;
        *self = Self::with_scrollback(self.cols, self.rows, limit);
        self.touch();
    }
}

/// Screen buffer with bounded scrollback
pub struct ScreenBuffer {
    /// Visible rows
    pub rows: Vec<Row>,
    /// Scrollback ring, oldest at the front
    scrollback: VecDeque<Row>,
    /// Maximum scrollback lines; 0 disables scrollback
    pub scrollback_limit: usize,
    /// Viewport offset (0 = at bottom, >0 = scrolled up into history)
    scroll_offset: usize,
    pub dirty_lines: HashSet<usize>,
    pub full_redraw: bool,
}

impl ScreenBuffer {
    pub fn new(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
            scrollback: VecDeque::new(),
            scrollback_limit,
            scroll_offset: 0,
            dirty_lines: HashSet::new(),
            full_redraw: true,
        }
    }

    pub fn resize(&mut self, new_cols: u16, new_rows: u16) {
        while self.rows.len() < new_rows as usize {
            self.rows.push(Row::new(new_cols));
        }
        self.rows.truncate(new_rows as usize);

        for row in &mut self.rows {
            row.resize(new_cols);
        }
        for row in &mut self.scrollback {
            row.resize(new_cols);
        }

        self.scroll_offset = self.scroll_offset.min(self.scrollback.len());
        self.mark_all_dirty();
    }

    /// Push an evicted top row into scrollback; at capacity the oldest row
    /// is dropped first (FIFO).
    pub fn push_to_scrollback(&mut self, row: Row) {
        if self.scrollback_limit == 0 {
            return;
        }
        if self.scrollback.len() == self.scrollback_limit {
            self.scrollback.pop_front();
        }
        self.scrollback.push_back(row);
        // The offset is bottom-relative, so a pinned viewport drifts with
        // history growth unless we track the push.
        if self.scroll_offset > 0 {
            self.scroll_offset = (self.scroll_offset + 1).min(self.scrollback.len());
        }
    }

    pub fn scrollback_len(&self) -> usize {
        self.scrollback.len()
    }

    /// Total addressable lines (scrollback + visible).
    pub fn total_lines(&self) -> usize {
        self.scrollback.len() + self.rows.len()
    }

    pub fn clear_scrollback(&mut self) {
        self.scrollback.clear();
        self.scroll_offset = 0;
        self.mark_all_dirty();
    }

    /// Row shown at the given viewport line, accounting for scroll offset.
    pub fn get_row_at(&self, visible_row: usize) -> Option<&Row> {
        let absolute = self.viewport_top_absolute() + visible_row;
        self.get_row_absolute(absolute)
    }

    /// Absolute index of the viewport's top row.
    pub fn viewport_top_absolute(&self) -> usize {
        self.scrollback.len().saturating_sub(self.scroll_offset)
    }

    /// Get a row by absolute buffer position (0 = oldest scrollback line).
    pub fn get_row_absolute(&self, abs_row: usize) -> Option<&Row> {
        let sb = self.scrollback.len();
        if abs_row < sb {
            self.scrollback.get(abs_row)
        } else {
            self.rows.get(abs_row - sb)
        }
    }

    pub fn get_row_absolute_mut(&mut self, abs_row: usize) -> Option<&mut Row> {
        let sb = self.scrollback.len();
        if abs_row < sb {
            self.scrollback.get_mut(abs_row)
        } else {
            self.rows.get_mut(abs_row - sb)
        }
    }

    /// Reposition the viewport; out-of-range offsets clamp to
    /// `[0, scrollback_len]`.
    pub fn set_viewport(&mut self, offset: usize) {
        let clamped = offset.min(self.scrollback.len());
        if clamped != self.scroll_offset {
            self.scroll_offset = clamped;
            self.mark_all_dirty();
        }
    }

    pub fn viewport_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Scroll the viewport up (into history) by n lines.
    pub fn scroll_view_up(&mut self, n: usize) {
        self.set_viewport(self.scroll_offset.saturating_add(n));
    }

    /// Scroll the viewport down (towards live output) by n lines.
    pub fn scroll_view_down(&mut self, n: usize) {
        self.set_viewport(self.scroll_offset.saturating_sub(n));
    }

    /// Snap the viewport back to live output.
    pub fn scroll_to_bottom(&mut self) {
        self.set_viewport(0);
    }

    pub fn is_scrolled(&self) -> bool {
        self.scroll_offset > 0
    }

    /// Convert a viewport-relative row to an absolute buffer row.
    pub fn visible_row_to_absolute(&self, visible_row: u16) -> usize {
        self.viewport_top_absolute() + visible_row as usize
    }

    pub fn mark_dirty(&mut self, line: usize) {
        self.dirty_lines.insert(line);
    }

    pub fn mark_all_dirty(&mut self) {
        self.full_redraw = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty_lines.clear();
        self.full_redraw = false;
    }
}

/// A single row
pub struct Row {
    pub cells: Vec<Cell>,
    /// This row soft-wraps onto the next one (no hard newline between).
    pub wrapped: bool,
    /// OSC 133 semantic marker.
    pub tag: SemanticTag,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
            wrapped: false,
            tag: SemanticTag::None,
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        self.cells.resize(new_cols as usize, Cell::default());
    }

    pub fn clear(&mut self, attrs: &CellAttrs) {
        for cell in &mut self.cells {
            cell.clear(attrs);
        }
        self.wrapped = false;
        self.tag = SemanticTag::None;
    }
}

/// Cursor shape (DECSCUSR)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Block,
    Underline,
    Bar,
}

/// Cursor state
#[derive(Clone)]
pub struct CursorState {
    pub col: u16,
    pub row: u16,
    pub visible: bool,
    pub shape: CursorShape,
    pub blink: bool,
    pub saved: Option<SavedCursor>,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
            shape: CursorShape::Block,
            blink: true,
            saved: None,
        }
    }
}

impl CursorState {
    /// Apply a DECSCUSR parameter (`CSI Ps SP q`).
    pub fn set_decscusr(&mut self, n: u16) {
        let (shape, blink) = match n {
            0 | 1 => (CursorShape::Block, true),
            2 => (CursorShape::Block, false),
            3 => (CursorShape::Underline, true),
            4 => (CursorShape::Underline, false),
            5 => (CursorShape::Bar, true),
            6 => (CursorShape::Bar, false),
            _ => return,
        };
        self.shape = shape;
        self.blink = blink;
    }
}

/// Saved cursor state (DECSC)
#[derive(Clone)]
pub struct SavedCursor {
    pub col: u16,
    pub row: u16,
    pub attrs: CellAttrs,
}

/// Mouse tracking mode (DECSET 1000/1002/1003)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MouseMode {
    #[default]
    Off,
    Normal,
    ButtonEvent,
    AnyEvent,
}

/// Mouse coordinate encoding (DECSET 1005/1006/1015)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MouseFormat {
    #[default]
    Default,
    Utf8,
    Sgr,
    Urxvt,
}

/// Terminal modes
#[derive(Clone)]
pub struct TerminalModes {
    /// DECCKM: cursor keys send SS3 sequences
    pub cursor_keys_app: bool,
    /// DECNKM / ESC = : application keypad
    pub app_keypad: bool,
    pub auto_wrap: bool,
    pub origin_mode: bool,
    pub insert_mode: bool,
    pub linefeed_newline: bool,
    pub bracketed_paste: bool,
    pub focus_events: bool,
    pub reverse_video: bool,
    pub mouse_mode: MouseMode,
    pub mouse_format: MouseFormat,
    /// Kitty keyboard protocol flag stack; the top entry is active.
    kitty_stack: Vec<u8>,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self {
            cursor_keys_app: false,
            app_keypad: false,
            auto_wrap: true,
            origin_mode: false,
            insert_mode: false,
            linefeed_newline: false,
            bracketed_paste: false,
            focus_events: false,
            reverse_video: false,
            mouse_mode: MouseMode::Off,
            mouse_format: MouseFormat::Default,
            kitty_stack: Vec::new(),
        }
    }
}

impl TerminalModes {
    /// Whether the kitty keyboard protocol is active.
    pub fn kitty_keyboard(&self) -> bool {
        self.kitty_flags() != 0
    }

    /// Active kitty enhancement flags (0 when inactive).
    pub fn kitty_flags(&self) -> u8 {
        self.kitty_stack.last().copied().unwrap_or(0)
    }

    /// CSI > flags u
    pub fn kitty_push(&mut self, flags: u8) {
        // Unbounded push would let a hostile child exhaust memory.
        if self.kitty_stack.len() < 16 {
            self.kitty_stack.push(flags);
        }
    }

    /// CSI < n u
    pub fn kitty_pop(&mut self, n: u16) {
        for _ in 0..n.max(1) {
            if self.kitty_stack.pop().is_none() {
                break;
            }
        }
    }
}
