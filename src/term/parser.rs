//! VT sequence parser
//!
//! Parses ANSI/VT escape sequences and updates terminal state. The parser is
//! fed one byte at a time; results are identical regardless of how the input
//! is chunked, and an incomplete UTF-8 sequence at a chunk boundary is
//! carried over to the next feed call. Malformed sequences are discarded and
//! the machine resets to ground; nothing the child writes is fatal.

use crate::cell::{Color, SemanticTag, UnderlineStyle};
use crate::palette::Rgb;
use crate::term::state::TerminalState;

/// Upper bound on collected OSC/DCS payload bytes.
const MAX_STRING_LEN: usize = 4096;
/// Upper bound on CSI parameters.
const MAX_PARAMS: usize = 32;

/// Response that needs to be sent back to the child
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// DSR 5 status report
    StatusOk,
    /// Primary device attributes
    DeviceAttributes,
    /// Secondary device attributes
    SecondaryDeviceAttributes,
    /// Kitty keyboard flags query reply
    KittyFlags(u8),
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::CursorPosition(row, col) => format!("\x1b[{row};{col}R").into_bytes(),
            Response::StatusOk => b"\x1b[0n".to_vec(),
            // VT220-class answers
            Response::DeviceAttributes => b"\x1b[?62;c".to_vec(),
            Response::SecondaryDeviceAttributes => b"\x1b[>1;10;0c".to_vec(),
            Response::KittyFlags(flags) => format!("\x1b[?{flags}u").into_bytes(),
        }
    }
}

#[derive(Clone, Copy, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    /// ESC received within OSC, waiting for the ST backslash
    EscapeInOsc,
    /// DCS/SOS/PM/APC payload, consumed and ignored
    StringIgnore,
    /// ESC received within an ignored string
    EscapeInIgnore,
}

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    /// Parallel to `params`: whether the entry was introduced by ':'
    subparams: Vec<bool>,
    intermediates: Vec<u8>,
    current_param: Option<u16>,
    current_is_sub: bool,
    osc: Vec<u8>,
    /// Pending UTF-8 continuation bytes across feed calls
    utf8_buf: [u8; 4],
    utf8_len: usize,
    utf8_need: usize,
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            subparams: Vec::with_capacity(16),
            intermediates: Vec::with_capacity(4),
            current_param: None,
            current_is_sub: false,
            osc: Vec::new(),
            utf8_buf: [0; 4],
            utf8_len: 0,
            utf8_need: 0,
        }
    }

    /// Feed a whole buffer, collecting any responses due back to the child.
    pub fn feed(&mut self, bytes: &[u8], state: &mut TerminalState) -> Vec<Response> {
        let mut responses = Vec::new();
        for &byte in bytes {
            if let Some(r) = self.feed_byte(byte, state) {
                responses.push(r);
            }
        }
        responses
    }

    /// Feed a single byte to the parser
    pub fn feed_byte(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        // Complete a pending multi-byte character first.
        if self.utf8_need > 0 {
            if byte & 0xC0 == 0x80 {
                self.utf8_buf[self.utf8_len] = byte;
                self.utf8_len += 1;
                if self.utf8_len == self.utf8_need {
                    if let Ok(s) = std::str::from_utf8(&self.utf8_buf[..self.utf8_len]) {
                        if let Some(ch) = s.chars().next() {
                            state.put_char(ch);
                        }
                    }
                    self.utf8_len = 0;
                    self.utf8_need = 0;
                }
                return None;
            }
            // Broken sequence: drop it and reprocess this byte from scratch.
            tracing::debug!("discarding malformed UTF-8 sequence");
            self.utf8_len = 0;
            self.utf8_need = 0;
        }

        // C0 controls act from any state except string collection.
        if byte < 0x20
            && !matches!(
                self.state,
                ParserState::OscString
                    | ParserState::EscapeInOsc
                    | ParserState::StringIgnore
                    | ParserState::EscapeInIgnore
            )
        {
            match byte {
                0x1B => self.enter_escape(),
                0x07 => state.ring_bell(),
                0x08 => state.backspace(),
                0x09 => state.horizontal_tab(),
                0x0A | 0x0B | 0x0C => state.linefeed(),
                0x0D => state.carriage_return(),
                _ => {}
            }
            return None;
        }

        match self.state {
            ParserState::Ground => self.ground(byte, state),
            ParserState::Escape => self.escape(byte, state),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte),
            ParserState::CsiEntry => self.csi_entry(byte, state),
            ParserState::CsiParam => self.csi_param(byte, state),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, state),
            ParserState::OscString => self.osc_string(byte, state),
            ParserState::EscapeInOsc => self.escape_in_osc(byte, state),
            ParserState::StringIgnore => self.string_ignore(byte),
            ParserState::EscapeInIgnore => self.escape_in_ignore(byte, state),
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.clear_sequence();
    }

    fn clear_sequence(&mut self) {
        self.params.clear();
        self.subparams.clear();
        self.intermediates.clear();
        self.current_param = None;
        self.current_is_sub = false;
    }

    fn ground(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        if (0x20..0x7F).contains(&byte) {
            state.put_char(byte as char);
        } else if byte >= 0x80 {
            let need = if byte & 0xE0 == 0xC0 {
                2
            } else if byte & 0xF0 == 0xE0 {
                3
            } else if byte & 0xF8 == 0xF0 {
                4
            } else {
                // Stray continuation byte
                tracing::debug!("discarding stray UTF-8 continuation byte {byte:#x}");
                return None;
            };
            self.utf8_buf[0] = byte;
            self.utf8_len = 1;
            self.utf8_need = need;
        }
        None
    }

    fn escape(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            b'[' => {
                self.state = ParserState::CsiEntry;
                self.clear_sequence();
                return None;
            }
            b']' => {
                self.state = ParserState::OscString;
                self.osc.clear();
                return None;
            }
            b'P' | b'X' | b'^' | b'_' => {
                // DCS/SOS/PM/APC: consume until ST, ignore
                self.state = ParserState::StringIgnore;
                return None;
            }
            b'7' => state.save_cursor(),
            b'8' => state.restore_cursor(),
            b'D' => state.index(),
            b'E' => {
                state.carriage_return();
                state.linefeed();
            }
            b'M' => state.reverse_index(),
            b'=' => {
                state.modes.app_keypad = true;
                state.touch();
            }
            b'>' => {
                state.modes.app_keypad = false;
                state.touch();
            }
            b'c' => state.full_reset(),
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::EscapeIntermediate;
                return None;
            }
            _ => {
                tracing::debug!("unknown escape final {:?}", byte as char);
            }
        }
        self.state = ParserState::Ground;
        None
    }

    fn escape_intermediate(&mut self, byte: u8) -> Option<Response> {
        match byte {
            0x20..=0x2F => {
                self.intermediates.push(byte);
            }
            // Final byte; charset designations and the like are ignored
            _ => {
                self.state = ParserState::Ground;
            }
        }
        None
    }

    fn csi_entry(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some((byte - b'0') as u16);
                self.state = ParserState::CsiParam;
            }
            b';' | b':' => {
                self.push_param(0, false);
                self.current_is_sub = byte == b':';
                self.state = ParserState::CsiParam;
            }
            b'?' | b'>' | b'<' | b'!' | b'=' => {
                self.intermediates.push(byte);
            }
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                return self.execute_csi(byte, state);
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
        None
    }

    fn csi_param(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            b';' | b':' => {
                let p = self.current_param.take().unwrap_or(0);
                let sub = self.current_is_sub;
                self.push_param(p, sub);
                self.current_is_sub = byte == b':';
            }
            0x20..=0x2F => {
                if let Some(p) = self.current_param.take() {
                    let sub = self.current_is_sub;
                    self.push_param(p, sub);
                }
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                if let Some(p) = self.current_param.take() {
                    let sub = self.current_is_sub;
                    self.push_param(p, sub);
                }
                return self.execute_csi(byte, state);
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
        None
    }

    fn csi_intermediate(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            0x20..=0x2F => {
                self.intermediates.push(byte);
            }
            0x40..=0x7E => {
                return self.execute_csi(byte, state);
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
        None
    }

    fn push_param(&mut self, value: u16, is_sub: bool) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(value);
            self.subparams.push(is_sub);
        }
    }

    fn osc_string(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            0x07 => {
                self.execute_osc(state);
                self.state = ParserState::Ground;
            }
            0x1B => {
                self.state = ParserState::EscapeInOsc;
            }
            0x9C => {
                self.execute_osc(state);
                self.state = ParserState::Ground;
            }
            _ => {
                if self.osc.len() < MAX_STRING_LEN {
                    self.osc.push(byte);
                }
            }
        }
        None
    }

    /// Handle ESC received within an OSC sequence
    fn escape_in_osc(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        if byte == b'\\' {
            // ST (ESC \)
            self.execute_osc(state);
            self.state = ParserState::Ground;
            None
        } else {
            // Not ST: terminate the OSC and treat this as a fresh escape.
            self.execute_osc(state);
            self.enter_escape();
            self.escape(byte, state)
        }
    }

    fn string_ignore(&mut self, byte: u8) -> Option<Response> {
        match byte {
            0x1B => self.state = ParserState::EscapeInIgnore,
            0x9C | 0x07 => self.state = ParserState::Ground,
            _ => {}
        }
        None
    }

    fn escape_in_ignore(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        if byte == b'\\' {
            self.state = ParserState::Ground;
            None
        } else {
            self.enter_escape();
            self.escape(byte, state)
        }
    }

    fn execute_csi(&mut self, final_byte: u8, state: &mut TerminalState) -> Option<Response> {
        let is_private = self.intermediates.contains(&b'?');
        let is_gt = self.intermediates.contains(&b'>');
        let is_lt = self.intermediates.contains(&b'<');
        let first = self.params.first().copied();

        let response = match (is_private, is_gt, final_byte) {
            // Cursor movement
            (false, false, b'A') => {
                state.cursor_up(first.unwrap_or(1).max(1));
                None
            }
            (false, false, b'B') => {
                state.cursor_down(first.unwrap_or(1).max(1));
                None
            }
            (false, false, b'C') => {
                state.cursor_forward(first.unwrap_or(1).max(1));
                None
            }
            (false, false, b'D') => {
                state.cursor_backward(first.unwrap_or(1).max(1));
                None
            }
            (false, false, b'E') => {
                // CNL - Cursor Next Line
                state.cursor_down(first.unwrap_or(1).max(1));
                state.carriage_return();
                None
            }
            (false, false, b'F') => {
                // CPL - Cursor Previous Line
                state.cursor_up(first.unwrap_or(1).max(1));
                state.carriage_return();
                None
            }
            (false, false, b'G') => {
                // CHA - Cursor Character Absolute
                let col = first.unwrap_or(1);
                let cols = state.cols;
                state.active_cursor_mut().col = col.saturating_sub(1).min(cols - 1);
                state.touch();
                None
            }
            (false, false, b'H') | (false, false, b'f') => {
                // CUP - Cursor Position
                let row = first.unwrap_or(1);
                let col = self.params.get(1).copied().unwrap_or(1);
                state.cursor_position(row, col);
                None
            }
            (false, false, b'd') => {
                // VPA - Line Position Absolute
                let row = first.unwrap_or(1);
                let rows = state.rows;
                state.active_cursor_mut().row = row.saturating_sub(1).min(rows - 1);
                state.touch();
                None
            }

            // Erase
            (false, false, b'J') => {
                state.erase_in_display(first.unwrap_or(0));
                None
            }
            (false, false, b'K') => {
                state.erase_in_line(first.unwrap_or(0));
                None
            }

            // Line operations
            (false, false, b'L') => {
                state.insert_lines(first.unwrap_or(1).max(1));
                None
            }
            (false, false, b'M') => {
                state.delete_lines(first.unwrap_or(1).max(1));
                None
            }

            // Character operations
            (false, false, b'@') => {
                state.insert_chars(first.unwrap_or(1).max(1));
                None
            }
            (false, false, b'P') => {
                state.delete_chars(first.unwrap_or(1).max(1));
                None
            }
            (false, false, b'X') => {
                state.erase_chars(first.unwrap_or(1).max(1));
                None
            }
            (false, false, b'b') => {
                // REP - repeat last printed character
                state.repeat_last(first.unwrap_or(1).max(1));
                None
            }

            // Scroll
            (false, false, b'S') => {
                state.scroll_up(first.unwrap_or(1).max(1));
                None
            }
            (false, false, b'T') => {
                state.scroll_down(first.unwrap_or(1).max(1));
                None
            }

            // Scroll region
            (false, false, b'r') => {
                let top = first.unwrap_or(1);
                let bottom = self.params.get(1).copied().unwrap_or(state.rows);
                state.set_scroll_region(top, bottom);
                state.cursor_position(1, 1);
                None
            }

            // SGR - Select Graphic Rendition
            (false, false, b'm') => {
                self.execute_sgr(state);
                None
            }

            // Save/restore cursor
            (false, false, b's') => {
                state.save_cursor();
                None
            }

            // Kitty keyboard protocol
            (false, true, b'u') => {
                state.modes.kitty_push(first.unwrap_or(0).min(255) as u8);
                state.touch();
                None
            }
            (false, false, b'u') if is_lt => {
                state.modes.kitty_pop(first.unwrap_or(1));
                state.touch();
                None
            }
            (true, false, b'u') => Some(Response::KittyFlags(state.modes.kitty_flags())),
            (false, false, b'u') => {
                state.restore_cursor();
                None
            }

            // Device Status Report
            (false, false, b'n') => match first {
                Some(5) => Some(Response::StatusOk),
                Some(6) => {
                    let cursor = state.active_cursor();
                    Some(Response::CursorPosition(cursor.row + 1, cursor.col + 1))
                }
                _ => None,
            },

            // Device Attributes
            (false, false, b'c') => Some(Response::DeviceAttributes),
            (false, true, b'c') => Some(Response::SecondaryDeviceAttributes),

            // Private modes (DEC)
            (true, false, b'h') => {
                for i in 0..self.params.len() {
                    state.set_private_mode(self.params[i], true);
                }
                None
            }
            (true, false, b'l') => {
                for i in 0..self.params.len() {
                    state.set_private_mode(self.params[i], false);
                }
                None
            }

            // Standard modes
            (false, false, b'h') => {
                for &p in &self.params {
                    match p {
                        4 => state.modes.insert_mode = true,
                        20 => state.modes.linefeed_newline = true,
                        _ => {}
                    }
                }
                state.touch();
                None
            }
            (false, false, b'l') => {
                for &p in &self.params {
                    match p {
                        4 => state.modes.insert_mode = false,
                        20 => state.modes.linefeed_newline = false,
                        _ => {}
                    }
                }
                state.touch();
                None
            }

            _ => {
                // DECSCUSR (CSI Ps SP q)
                if final_byte == b'q' && self.intermediates.contains(&b' ') {
                    let n = first.unwrap_or(0);
                    state.active_cursor_mut().set_decscusr(n);
                    state.touch();
                    self.state = ParserState::Ground;
                    return None;
                }

                tracing::debug!(
                    "unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                    self.intermediates,
                    self.params,
                    final_byte as char
                );
                None
            }
        };

        self.state = ParserState::Ground;
        response
    }

    fn execute_sgr(&self, state: &mut TerminalState) {
        if self.params.is_empty() {
            state.current_attrs.reset();
            state.touch();
            return;
        }

        let mut i = 0;
        while i < self.params.len() {
            let param = self.params[i];
            match param {
                0 => state.current_attrs.reset(),
                1 => state.current_attrs.flags |= crate::cell::AttrFlags::BOLD,
                2 => state.current_attrs.flags |= crate::cell::AttrFlags::DIM,
                3 => state.current_attrs.flags |= crate::cell::AttrFlags::ITALIC,
                4 => {
                    // A 4:n subparameter selects the underline style.
                    if self.subparams.get(i + 1) == Some(&true) {
                        i += 1;
                        state.current_attrs.underline = UnderlineStyle::from_sgr(self.params[i]);
                    } else {
                        state.current_attrs.underline = UnderlineStyle::Single;
                    }
                }
                5 => state.current_attrs.flags |= crate::cell::AttrFlags::BLINK,
                7 => state.current_attrs.flags |= crate::cell::AttrFlags::INVERSE,
                8 => state.current_attrs.flags |= crate::cell::AttrFlags::HIDDEN,
                9 => state.current_attrs.flags |= crate::cell::AttrFlags::STRIKETHROUGH,
                21 => state.current_attrs.underline = UnderlineStyle::Double,

                22 => {
                    state.current_attrs.flags &=
                        !(crate::cell::AttrFlags::BOLD | crate::cell::AttrFlags::DIM);
                }
                23 => state.current_attrs.flags &= !crate::cell::AttrFlags::ITALIC,
                24 => state.current_attrs.underline = UnderlineStyle::None,
                25 => state.current_attrs.flags &= !crate::cell::AttrFlags::BLINK,
                27 => state.current_attrs.flags &= !crate::cell::AttrFlags::INVERSE,
                28 => state.current_attrs.flags &= !crate::cell::AttrFlags::HIDDEN,
                29 => state.current_attrs.flags &= !crate::cell::AttrFlags::STRIKETHROUGH,

                30..=37 => state.current_attrs.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some((color, consumed)) = self.extended_color(i) {
                        state.current_attrs.fg = color;
                        i += consumed;
                    }
                }
                39 => state.current_attrs.fg = Color::Default,

                40..=47 => state.current_attrs.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some((color, consumed)) = self.extended_color(i) {
                        state.current_attrs.bg = color;
                        i += consumed;
                    }
                }
                49 => state.current_attrs.bg = Color::Default,

                58 => {
                    if let Some((color, consumed)) = self.extended_color(i) {
                        state.current_attrs.underline_color = color;
                        i += consumed;
                    }
                }
                59 => state.current_attrs.underline_color = Color::Default,

                90..=97 => state.current_attrs.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => state.current_attrs.bg = Color::Indexed((param - 100 + 8) as u8),

                _ => {}
            }
            i += 1;
        }
        state.touch();
    }

    /// Parse a 38/48/58 extended color starting at `params[i]`.
    /// Returns the color and how many extra parameters were consumed.
    fn extended_color(&self, i: usize) -> Option<(Color, usize)> {
        match self.params.get(i + 1)? {
            5 => {
                let n = self.params.get(i + 2)?;
                Some((Color::Indexed((*n).min(255) as u8), 2))
            }
            2 => {
                let r = *self.params.get(i + 2)? as u8;
                let g = *self.params.get(i + 3)? as u8;
                let b = *self.params.get(i + 4)? as u8;
                Some((Color::Rgb(r, g, b), 4))
            }
            _ => None,
        }
    }

    fn execute_osc(&mut self, state: &mut TerminalState) {
        let raw = std::mem::take(&mut self.osc);
        let text = String::from_utf8_lossy(&raw);
        let mut parts = text.splitn(2, ';');
        let code = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("");

        match code {
            "0" | "1" | "2" => {
                state.title = rest.to_string();
                state.touch();
            }
            "4" => self.osc_palette_set(rest, state),
            "7" => {
                // file://host/path or a bare path
                let dir = rest
                    .strip_prefix("file://")
                    .map(|uri| match uri.find('/') {
                        Some(idx) => &uri[idx..],
                        None => uri,
                    })
                    .unwrap_or(rest);
                state.working_dir = dir.to_string();
                state.touch();
            }
            "10" => {
                if let Some(rgb) = Rgb::parse(rest) {
                    state.palette.named.foreground = rgb;
                    state.touch();
                }
            }
            "11" => {
                if let Some(rgb) = Rgb::parse(rest) {
                    state.palette.named.background = rgb;
                    state.touch();
                }
            }
            "104" => {
                if rest.is_empty() {
                    state.palette.reset_all();
                } else {
                    for idx in rest.split(';').filter_map(|s| s.parse::<u8>().ok()) {
                        state.palette.reset(idx);
                    }
                }
                state.touch();
            }
            "133" => {
                let marker = rest.split(';').next().unwrap_or("");
                match marker {
                    "A" => state.tag_cursor_row(SemanticTag::PromptStart),
                    "B" => state.tag_cursor_row(SemanticTag::Command),
                    "C" => state.tag_cursor_row(SemanticTag::Output),
                    // D reports the exit status of the finished command
                    "D" => {}
                    _ => tracing::debug!("unknown OSC 133 marker {marker:?}"),
                }
            }
            _ => {
                tracing::debug!("unhandled OSC {code}");
            }
        }
    }

    /// OSC 4: one or more `index;colorspec` pairs.
    fn osc_palette_set(&self, rest: &str, state: &mut TerminalState) {
        let mut parts = rest.split(';');
        while let (Some(idx), Some(spec)) = (parts.next(), parts.next()) {
            let Ok(index) = idx.parse::<u8>() else {
                continue;
            };
            if let Some(rgb) = Rgb::parse(spec) {
                state.palette.set(index, rgb);
                state.touch();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::AttrFlags;
    use crate::palette::Palette;
    use crate::term::state::{MouseFormat, MouseMode};
    use pretty_assertions::assert_eq;

    fn state() -> TerminalState {
        TerminalState::with_scrollback(80, 24, 100)
    }

    fn feed_all(parser: &mut VtParser, state: &mut TerminalState, bytes: &[u8]) -> Vec<Response> {
        parser.feed(bytes, state)
    }

    #[test]
    fn cursor_position_sequence() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b[5;10H");
        assert_eq!(st.active_cursor().row, 4);
        assert_eq!(st.active_cursor().col, 9);
    }

    #[test]
    fn clear_home_then_text() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b[2J\x1b[H");
        feed_all(&mut parser, &mut st, b"hi");
        assert_eq!(st.active_cursor().row, 0);
        assert_eq!(st.active_cursor().col, 2);
        assert_eq!(st.active_screen().rows[0].cells[0].c(), 'h');
        assert_eq!(st.active_screen().rows[0].cells[1].c(), 'i');
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let input: &[u8] =
            b"\x1b[1;31mred\x1b[0m \xe6\xbc\xa2 \x1b[2;2Hok\x1b]0;title\x07\x1b[?1049h";

        let mut whole_state = state();
        let mut parser = VtParser::new();
        parser.feed(input, &mut whole_state);

        let mut byte_state = state();
        let mut parser = VtParser::new();
        for &b in input {
            parser.feed_byte(b, &mut byte_state);
        }

        assert_eq!(
            whole_state.active_cursor().row,
            byte_state.active_cursor().row
        );
        assert_eq!(
            whole_state.active_cursor().col,
            byte_state.active_cursor().col
        );
        assert_eq!(whole_state.title, byte_state.title);
        assert_eq!(whole_state.using_alternate, byte_state.using_alternate);
        for row in 0..24 {
            for col in 0..80 {
                assert_eq!(
                    whole_state.primary_screen.rows[row].cells[col],
                    byte_state.primary_screen.rows[row].cells[col],
                    "cell mismatch at {row},{col}"
                );
            }
        }
    }

    #[test]
    fn utf8_split_across_feeds() {
        let mut st = state();
        let mut parser = VtParser::new();
        // 漢 = e6 bc a2, split mid-sequence
        parser.feed(b"\xe6\xbc", &mut st);
        assert_eq!(st.active_cursor().col, 0);
        parser.feed(b"\xa2", &mut st);
        assert_eq!(st.active_screen().rows[0].cells[0].c(), '漢');
        assert_eq!(st.active_cursor().col, 2);
    }

    #[test]
    fn sgr_colors_and_reset() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b[1;31m");
        assert_eq!(st.current_attrs.fg, Color::Indexed(1));
        assert!(st.current_attrs.flags.contains(AttrFlags::BOLD));
        feed_all(&mut parser, &mut st, b"\x1b[m");
        assert_eq!(st.current_attrs.fg, Color::Default);
        assert!(st.current_attrs.flags.is_empty());
    }

    #[test]
    fn sgr_truecolor_and_256() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b[38;2;10;20;30m\x1b[48;5;200m");
        assert_eq!(st.current_attrs.fg, Color::Rgb(10, 20, 30));
        assert_eq!(st.current_attrs.bg, Color::Indexed(200));
    }

    #[test]
    fn sgr_curly_underline_with_color() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b[4:3m\x1b[58;5;196m");
        assert_eq!(st.current_attrs.underline, UnderlineStyle::Curly);
        assert_eq!(st.current_attrs.underline_color, Color::Indexed(196));
        feed_all(&mut parser, &mut st, b"\x1b[24m\x1b[59m");
        assert_eq!(st.current_attrs.underline, UnderlineStyle::None);
        assert_eq!(st.current_attrs.underline_color, Color::Default);
    }

    #[test]
    fn decset_modes() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b[?1h\x1b[?2004h\x1b[?1004h");
        assert!(st.modes.cursor_keys_app);
        assert!(st.modes.bracketed_paste);
        assert!(st.modes.focus_events);
        feed_all(&mut parser, &mut st, b"\x1b[?2004l");
        assert!(!st.modes.bracketed_paste);
    }

    #[test]
    fn mouse_mode_and_format() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b[?1002h\x1b[?1006h");
        assert_eq!(st.modes.mouse_mode, MouseMode::ButtonEvent);
        assert_eq!(st.modes.mouse_format, MouseFormat::Sgr);
        feed_all(&mut parser, &mut st, b"\x1b[?1006l\x1b[?1002l");
        assert_eq!(st.modes.mouse_mode, MouseMode::Off);
        assert_eq!(st.modes.mouse_format, MouseFormat::Default);
    }

    #[test]
    fn osc_title_with_bel_and_st() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b]0;hello\x07");
        assert_eq!(st.title, "hello");
        feed_all(&mut parser, &mut st, b"\x1b]2;world\x1b\\");
        assert_eq!(st.title, "world");
    }

    #[test]
    fn osc_7_working_directory() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b]7;file://hostname/home/user\x07");
        assert_eq!(st.working_dir, "/home/user");
    }

    #[test]
    fn osc_4_palette_override() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b]4;1;rgb:ff/00/00\x07");
        assert_eq!(st.palette.get(1), Rgb::new(255, 0, 0));
        feed_all(&mut parser, &mut st, b"\x1b]104;1\x07");
        assert_eq!(st.palette.get(1), Palette::default().get(1));
    }

    #[test]
    fn osc_133_tags_rows() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b]133;A\x07prompt$ ");
        feed_all(&mut parser, &mut st, b"\r\n\x1b]133;C\x07output");
        assert_eq!(st.row_tag(0), Some(SemanticTag::PromptStart));
        assert_eq!(st.row_tag(1), Some(SemanticTag::Output));
    }

    #[test]
    fn dsr_reports_cursor() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b[3;7H");
        let responses = feed_all(&mut parser, &mut st, b"\x1b[6n");
        assert_eq!(responses, vec![Response::CursorPosition(3, 7)]);
        assert_eq!(responses[0].to_bytes(), b"\x1b[3;7R");
    }

    #[test]
    fn kitty_push_pop_and_query() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b[>1u");
        assert!(st.modes.kitty_keyboard());
        let responses = feed_all(&mut parser, &mut st, b"\x1b[?u");
        assert_eq!(responses, vec![Response::KittyFlags(1)]);
        feed_all(&mut parser, &mut st, b"\x1b[<u");
        assert!(!st.modes.kitty_keyboard());
    }

    #[test]
    fn malformed_sequences_are_discarded() {
        let mut st = state();
        let mut parser = VtParser::new();
        // Bogus escape, orphan continuation bytes, unterminated CSI garbage
        feed_all(&mut parser, &mut st, b"\x1b\x01\x80\x80\x1b[99;99;99;99~ok");
        assert_eq!(st.active_screen().rows[0].cells[0].c(), 'o');
        assert_eq!(st.active_screen().rows[0].cells[1].c(), 'k');
    }

    #[test]
    fn dcs_passthrough_is_ignored() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1bPsecret payload\x1b\\visible");
        let row: String = (0..7)
            .map(|c| st.active_screen().rows[0].cells[c].c())
            .collect();
        assert_eq!(row, "visible");
    }

    #[test]
    fn rep_repeats_last_char() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"x\x1b[3b");
        let row: String = (0..4)
            .map(|c| st.active_screen().rows[0].cells[c].c())
            .collect();
        assert_eq!(row, "xxxx");
    }

    #[test]
    fn app_keypad_via_esc() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x1b=");
        assert!(st.modes.app_keypad);
        feed_all(&mut parser, &mut st, b"\x1b>");
        assert!(!st.modes.app_keypad);
    }

    #[test]
    fn bell_sets_pending_flag() {
        let mut st = state();
        let mut parser = VtParser::new();
        feed_all(&mut parser, &mut st, b"\x07");
        assert!(st.take_bell());
    }
}
