//! Mouse and scroll reporting.
//!
//! Pointer events are translated into child-bound byte sequences according
//! to the current tracking mode and coordinate format. All encoders are
//! driven off `TerminalState` so the mode is read transactionally while the
//! caller holds the engine lock.

use crate::input::Mods;
use crate::term::state::{MouseFormat, MouseMode, TerminalState};

/// Physical mouse button
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    fn code(self) -> u16 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }
}

/// Legacy single-byte coordinates stop at 223 (255 - 32).
const LEGACY_COORD_MAX: u16 = 223;

impl TerminalState {
    /// Encode a press/release event. Returns the bytes due to the child,
    /// empty when mouse tracking is off.
    pub fn mouse_event(
        &self,
        button: MouseButton,
        col: u16,
        row: u16,
        pressed: bool,
        mods: Mods,
    ) -> Vec<u8> {
        if self.modes.mouse_mode == MouseMode::Off {
            return Vec::new();
        }
        let cb = button.code() + mod_bits(mods);
        encode(self.modes.mouse_format, cb, col, row, pressed)
    }

    /// Encode a motion event. Only button-event (while a button is held)
    /// and any-event modes report motion.
    pub fn mouse_motion(
        &self,
        held: Option<MouseButton>,
        col: u16,
        row: u16,
        mods: Mods,
    ) -> Vec<u8> {
        let report = match self.modes.mouse_mode {
            MouseMode::Off | MouseMode::Normal => false,
            MouseMode::ButtonEvent => held.is_some(),
            MouseMode::AnyEvent => true,
        };
        if !report {
            return Vec::new();
        }
        // Motion with no button is reported as button 3 + motion flag.
        let base = held.map(MouseButton::code).unwrap_or(3);
        let cb = base + 32 + mod_bits(mods);
        encode(self.modes.mouse_format, cb, col, row, true)
    }

    /// Translate a scroll gesture.
    ///
    /// Positive `delta` scrolls up (towards history). With mouse tracking
    /// enabled the child receives wheel button reports; otherwise the alt
    /// screen receives cursor-key sequences and the primary screen adjusts
    /// the viewport directly, returning no bytes. `precise` deltas are in
    /// pixels and accumulate in units of `cell_height`.
    pub fn scroll(
        &mut self,
        delta: f32,
        precise: bool,
        cell_height: f32,
        col: u16,
        row: u16,
    ) -> Vec<u8> {
        let lines = if precise {
            if cell_height <= 0.0 {
                return Vec::new();
            }
            self.scroll_pending += delta;
            let whole = (self.scroll_pending / cell_height).trunc();
            self.scroll_pending -= whole * cell_height;
            whole as i32
        } else {
            delta as i32
        };
        if lines == 0 {
            return Vec::new();
        }

        if self.modes.mouse_mode != MouseMode::Off {
            let cb = if lines > 0 { 64 } else { 65 };
            let mut out = Vec::new();
            for _ in 0..lines.unsigned_abs() {
                out.extend(encode(self.modes.mouse_format, cb, col, row, true));
            }
            return out;
        }

        if self.using_alternate {
            // Full-screen apps get arrow keys in place of wheel motion.
            let key: &[u8] = match (lines > 0, self.modes.cursor_keys_app) {
                (true, false) => b"\x1b[A",
                (true, true) => b"\x1bOA",
                (false, false) => b"\x1b[B",
                (false, true) => b"\x1bOB",
            };
            let mut out = Vec::new();
            for _ in 0..lines.unsigned_abs() {
                out.extend_from_slice(key);
            }
            return out;
        }

        // Primary screen: move the viewport through scrollback.
        if lines > 0 {
            self.active_screen_mut().scroll_view_up(lines as usize);
        } else {
            self.active_screen_mut().scroll_view_down(lines.unsigned_abs() as usize);
        }
        self.touch();
        Vec::new()
    }
}

fn mod_bits(mods: Mods) -> u16 {
    let mut bits = 0;
    if mods.contains(Mods::SHIFT) {
        bits += 4;
    }
    if mods.contains(Mods::ALT) {
        bits += 8;
    }
    if mods.contains(Mods::CTRL) {
        bits += 16;
    }
    bits
}

fn encode(format: MouseFormat, cb: u16, col: u16, row: u16, pressed: bool) -> Vec<u8> {
    match format {
        MouseFormat::Sgr => {
            let suffix = if pressed { 'M' } else { 'm' };
            format!("\x1b[<{};{};{}{}", cb, col + 1, row + 1, suffix).into_bytes()
        }
        MouseFormat::Urxvt => {
            let cb = cb + 32;
            format!("\x1b[{};{};{}M", cb, col + 1, row + 1).into_bytes()
        }
        MouseFormat::Utf8 => {
            // Release folds into the button bits in non-SGR formats.
            let cb = if pressed { cb } else { 3 + (cb & !0b11) };
            let mut out = b"\x1b[M".to_vec();
            push_utf8_coord(&mut out, cb + 32);
            push_utf8_coord(&mut out, col + 1 + 32);
            push_utf8_coord(&mut out, row + 1 + 32);
            out
        }
        MouseFormat::Default => {
            let cb = if pressed { cb } else { 3 + (cb & !0b11) };
            let x = (col + 1).min(LEGACY_COORD_MAX) + 32;
            let y = (row + 1).min(LEGACY_COORD_MAX) + 32;
            vec![0x1B, b'[', b'M', (cb + 32) as u8, x as u8, y as u8]
        }
    }
}

/// UTF-8 mouse format: values above 127 become two-byte characters.
fn push_utf8_coord(out: &mut Vec<u8>, value: u16) {
    let value = value.min(2047);
    if value < 128 {
        out.push(value as u8);
    } else {
        out.push(0xC0 | (value >> 6) as u8);
        out.push(0x80 | (value & 0x3F) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state() -> TerminalState {
        TerminalState::with_scrollback(80, 24, 100)
    }

    fn sgr_state() -> TerminalState {
        let mut st = state();
        st.set_private_mode(1000, true);
        st.set_private_mode(1006, true);
        st
    }

    #[test]
    fn sgr_press_and_release() {
        let st = sgr_state();
        let press = st.mouse_event(MouseButton::Left, 5, 3, true, Mods::empty());
        assert_eq!(press, b"\x1b[<0;6;4M".to_vec());
        let release = st.mouse_event(MouseButton::Left, 5, 3, false, Mods::empty());
        assert_eq!(release, b"\x1b[<0;6;4m".to_vec());
    }

    #[test]
    fn sgr_with_modifiers() {
        let st = sgr_state();
        let bytes = st.mouse_event(MouseButton::Right, 0, 0, true, Mods::CTRL | Mods::SHIFT);
        assert_eq!(bytes, b"\x1b[<22;1;1M".to_vec());
    }

    #[test]
    fn tracking_off_produces_nothing() {
        let st = state();
        assert!(st
            .mouse_event(MouseButton::Left, 1, 1, true, Mods::empty())
            .is_empty());
    }

    #[test]
    fn legacy_encoding_and_clamp() {
        let mut st = state();
        st.set_private_mode(1000, true);
        let bytes = st.mouse_event(MouseButton::Left, 5, 3, true, Mods::empty());
        assert_eq!(bytes, vec![0x1B, b'[', b'M', 32, 38, 36]);
        // Out-of-range coordinates clamp instead of wrapping.
        let far = st.mouse_event(MouseButton::Left, 500, 500, true, Mods::empty());
        assert_eq!(far[4], 255);
        assert_eq!(far[5], 255);
    }

    #[test]
    fn legacy_release_is_button_three() {
        let mut st = state();
        st.set_private_mode(1000, true);
        let bytes = st.mouse_event(MouseButton::Left, 0, 0, false, Mods::empty());
        assert_eq!(bytes[3], 32 + 3);
    }

    #[test]
    fn urxvt_format() {
        let mut st = state();
        st.set_private_mode(1000, true);
        st.set_private_mode(1015, true);
        let bytes = st.mouse_event(MouseButton::Middle, 2, 2, true, Mods::empty());
        assert_eq!(bytes, b"\x1b[33;3;3M".to_vec());
    }

    #[test]
    fn motion_gated_by_mode() {
        let mut st = state();
        st.set_private_mode(1000, true);
        assert!(st.mouse_motion(Some(MouseButton::Left), 1, 1, Mods::empty()).is_empty());
        st.set_private_mode(1002, true);
        assert!(!st.mouse_motion(Some(MouseButton::Left), 1, 1, Mods::empty()).is_empty());
        assert!(st.mouse_motion(None, 1, 1, Mods::empty()).is_empty());
        st.set_private_mode(1003, true);
        assert!(!st.mouse_motion(None, 1, 1, Mods::empty()).is_empty());
    }

    #[test]
    fn scroll_reports_wheel_when_tracking() {
        let mut st = sgr_state();
        let up = st.scroll(2.0, false, 0.0, 4, 5);
        assert_eq!(up, b"\x1b[<64;5;6M\x1b[<64;5;6M".to_vec());
        let down = st.scroll(-1.0, false, 0.0, 4, 5);
        assert_eq!(down, b"\x1b[<65;5;6M".to_vec());
    }

    #[test]
    fn scroll_moves_viewport_on_primary() {
        let mut st = TerminalState::with_scrollback(4, 2, 100);
        for _ in 0..6 {
            st.linefeed();
        }
        let bytes = st.scroll(3.0, false, 0.0, 0, 0);
        assert!(bytes.is_empty());
        assert!(st.active_screen().is_scrolled());
        let bytes = st.scroll(-10.0, false, 0.0, 0, 0);
        assert!(bytes.is_empty());
        assert!(!st.active_screen().is_scrolled());
    }

    #[test]
    fn scroll_sends_arrows_on_alt_screen() {
        let mut st = state();
        st.set_private_mode(1049, true);
        let up = st.scroll(1.0, false, 0.0, 0, 0);
        assert_eq!(up, b"\x1b[A".to_vec());
        st.modes.cursor_keys_app = true;
        let down = st.scroll(-1.0, false, 0.0, 0, 0);
        assert_eq!(down, b"\x1bOB".to_vec());
    }

    #[test]
    fn precise_deltas_accumulate() {
        let mut st = state();
        st.set_private_mode(1049, true);
        // Three 6px ticks at 16px cells: nothing, nothing, one line.
        assert!(st.scroll(6.0, true, 16.0, 0, 0).is_empty());
        assert!(st.scroll(6.0, true, 16.0, 0, 0).is_empty());
        assert_eq!(st.scroll(6.0, true, 16.0, 0, 0), b"\x1b[A".to_vec());
    }
}
