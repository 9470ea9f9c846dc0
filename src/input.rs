//! Keyboard, paste, and focus encoding.
//!
//! Keys are translated into child-bound bytes honouring the emulator's
//! input modes: DECCKM application cursor keys, application keypad, the
//! kitty keyboard protocol when a non-zero flag set is active, bracketed
//! paste, and focus reporting.

use bitflags::bitflags;

use crate::term::state::TerminalState;

bitflags! {
    /// Keyboard modifiers
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct Mods: u8 {
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
        const SUPER = 0b1000;
    }
}

/// A key as delivered by the embedding platform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
    /// Numeric keypad key: digits, `+ - * / . =`
    Keypad(char),
    KeypadEnter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEventKind {
    Press,
    Repeat,
    Release,
}

/// Kitty flag bit: report event types (repeat and release)
const KITTY_REPORT_EVENTS: u8 = 0b10;

impl TerminalState {
    /// Encode a key event. Returns the bytes due to the child, empty when
    /// the event is not reportable (e.g. a release outside the kitty
    /// protocol, or a bare modifier).
    pub fn key_event(&self, key: Key, mods: Mods, kind: KeyEventKind) -> Vec<u8> {
        if self.modes.kitty_keyboard() {
            return self.encode_kitty(key, mods, kind);
        }
        if kind == KeyEventKind::Release {
            return Vec::new();
        }
        self.encode_legacy(key, mods)
    }

    /// Encode pasted text. Under bracketed paste the payload is wrapped in
    /// the 200~/201~ markers and any embedded end marker is stripped so the
    /// child cannot be broken out of paste mode mid-payload.
    pub fn paste(&self, text: &str) -> Vec<u8> {
        if self.modes.bracketed_paste {
            let mut out = b"\x1b[200~".to_vec();
            out.extend_from_slice(text.replace("\x1b[201~", "").as_bytes());
            out.extend_from_slice(b"\x1b[201~");
            out
        } else {
            text.as_bytes().to_vec()
        }
    }

    /// Encode a focus change, empty unless focus reporting is enabled.
    pub fn focus(&self, gained: bool) -> Vec<u8> {
        if !self.modes.focus_events {
            return Vec::new();
        }
        if gained {
            b"\x1b[I".to_vec()
        } else {
            b"\x1b[O".to_vec()
        }
    }

    fn encode_legacy(&self, key: Key, mods: Mods) -> Vec<u8> {
        let app_cursor = self.modes.cursor_keys_app;
        let mut out = Vec::new();

        match key {
            Key::Char(ch) => {
                if mods.contains(Mods::ALT) {
                    out.push(0x1B);
                }
                if mods.contains(Mods::CTRL) {
                    if let Some(b) = ctrl_byte(ch) {
                        out.push(b);
                        return out;
                    }
                }
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            Key::Enter => {
                if mods.contains(Mods::ALT) {
                    out.push(0x1B);
                }
                out.push(if self.modes.linefeed_newline {
                    b'\n'
                } else {
                    b'\r'
                });
            }
            Key::Tab => {
                if mods.contains(Mods::SHIFT) {
                    out.extend_from_slice(b"\x1b[Z");
                } else {
                    if mods.contains(Mods::ALT) {
                        out.push(0x1B);
                    }
                    out.push(b'\t');
                }
            }
            Key::Backspace => {
                if mods.contains(Mods::ALT) {
                    out.push(0x1B);
                }
                out.push(if mods.contains(Mods::CTRL) { 0x08 } else { 0x7F });
            }
            Key::Escape => out.push(0x1B),
            Key::Up | Key::Down | Key::Right | Key::Left | Key::Home | Key::End => {
                let final_byte = match key {
                    Key::Up => b'A',
                    Key::Down => b'B',
                    Key::Right => b'C',
                    Key::Left => b'D',
                    Key::Home => b'H',
                    _ => b'F',
                };
                if mods.is_empty() {
                    // SS3 only for unmodified keys in application mode.
                    let intro: &[u8] = if app_cursor { b"\x1bO" } else { b"\x1b[" };
                    out.extend_from_slice(intro);
                    out.push(final_byte);
                } else {
                    out.extend(format!("\x1b[1;{}{}", mod_param(mods), final_byte as char).into_bytes());
                }
            }
            Key::PageUp | Key::PageDown | Key::Insert | Key::Delete => {
                let num = match key {
                    Key::Insert => 2,
                    Key::Delete => 3,
                    Key::PageUp => 5,
                    _ => 6,
                };
                if mods.is_empty() {
                    out.extend(format!("\x1b[{}~", num).into_bytes());
                } else {
                    out.extend(format!("\x1b[{};{}~", num, mod_param(mods)).into_bytes());
                }
            }
            Key::F(n @ 1..=4) => {
                if mods.is_empty() {
                    out.extend_from_slice(b"\x1bO");
                    out.push(b'O' + n);
                } else {
                    out.extend(format!("\x1b[1;{}{}", mod_param(mods), (b'O' + n) as char).into_bytes());
                }
            }
            Key::F(n) => {
                let Some(num) = fkey_number(n) else {
                    return Vec::new();
                };
                if mods.is_empty() {
                    out.extend(format!("\x1b[{}~", num).into_bytes());
                } else {
                    out.extend(format!("\x1b[{};{}~", num, mod_param(mods)).into_bytes());
                }
            }
            Key::Keypad(ch) => {
                if self.modes.app_keypad {
                    if let Some(b) = keypad_app_byte(ch) {
                        out.extend_from_slice(b"\x1bO");
                        out.push(b);
                        return out;
                    }
                }
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            Key::KeypadEnter => {
                if self.modes.app_keypad {
                    out.extend_from_slice(b"\x1bOM");
                } else {
                    out.push(b'\r');
                }
            }
        }
        out
    }

    fn encode_kitty(&self, key: Key, mods: Mods, kind: KeyEventKind) -> Vec<u8> {
        let report_events = self.modes.kitty_flags() & KITTY_REPORT_EVENTS != 0;
        if kind == KeyEventKind::Release && !report_events {
            return Vec::new();
        }
        let event = match kind {
            KeyEventKind::Press => 1,
            KeyEventKind::Repeat => 2,
            KeyEventKind::Release => 3,
        };
        let needs_event = report_events && event != 1;

        // Functional keys keep their CSI encodings, with the modifier and
        // event fields folded into the parameter list.
        let functional: Option<(u16, char)> = match key {
            Key::Up => Some((1, 'A')),
            Key::Down => Some((1, 'B')),
            Key::Right => Some((1, 'C')),
            Key::Left => Some((1, 'D')),
            Key::Home => Some((1, 'H')),
            Key::End => Some((1, 'F')),
            Key::Insert => Some((2, '~')),
            Key::Delete => Some((3, '~')),
            Key::PageUp => Some((5, '~')),
            Key::PageDown => Some((6, '~')),
            Key::F(n @ 1..=4) => Some((1, (b'O' + n) as char)),
            Key::F(n) => fkey_number(n).map(|num| (num, '~')),
            _ => None,
        };
        if let Some((num, final_ch)) = functional {
            let mods_field = if mods.is_empty() && !needs_event {
                String::new()
            } else if needs_event {
                format!(";{}:{}", mod_param(mods), event)
            } else {
                format!(";{}", mod_param(mods))
            };
            return if final_ch == '~' {
                format!("\x1b[{}{}~", num, mods_field).into_bytes()
            } else {
                format!("\x1b[{}{}{}", num, mods_field, final_ch).into_bytes()
            };
        }

        // Everything else uses the CSI u form keyed on the unicode value.
        let code = match key {
            Key::Char(ch) | Key::Keypad(ch) => ch as u32,
            Key::Enter | Key::KeypadEnter => 13,
            Key::Tab => 9,
            Key::Backspace => 127,
            Key::Escape => 27,
            _ => return Vec::new(),
        };
        if mods.is_empty() && !needs_event {
            format!("\x1b[{}u", code).into_bytes()
        } else if needs_event {
            format!("\x1b[{};{}:{}u", code, mod_param(mods), event).into_bytes()
        } else {
            format!("\x1b[{};{}u", code, mod_param(mods)).into_bytes()
        }
    }
}

/// xterm modifier parameter: 1 + bitmask
fn mod_param(mods: Mods) -> u8 {
    let mut param = 1;
    if mods.contains(Mods::SHIFT) {
        param += 1;
    }
    if mods.contains(Mods::ALT) {
        param += 2;
    }
    if mods.contains(Mods::CTRL) {
        param += 4;
    }
    if mods.contains(Mods::SUPER) {
        param += 8;
    }
    param
}

fn ctrl_byte(ch: char) -> Option<u8> {
    match ch {
        'a'..='z' => Some(ch as u8 - b'a' + 1),
        'A'..='Z' => Some(ch as u8 - b'A' + 1),
        ' ' | '@' => Some(0),
        '[' => Some(27),
        '\\' => Some(28),
        ']' => Some(29),
        '^' => Some(30),
        '_' => Some(31),
        _ => None,
    }
}

/// DECKPAM SS3 final bytes
fn keypad_app_byte(ch: char) -> Option<u8> {
    match ch {
        '0'..='9' => Some(b'p' + (ch as u8 - b'0')),
        '*' => Some(b'j'),
        '+' => Some(b'k'),
        '-' => Some(b'm'),
        '.' => Some(b'n'),
        '/' => Some(b'o'),
        '=' => Some(b'X'),
        _ => None,
    }
}

fn fkey_number(n: u8) -> Option<u16> {
    match n {
        5 => Some(15),
        6 => Some(17),
        7 => Some(18),
        8 => Some(19),
        9 => Some(20),
        10 => Some(21),
        11 => Some(23),
        12 => Some(24),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state() -> TerminalState {
        TerminalState::with_scrollback(80, 24, 100)
    }

    #[test]
    fn plain_characters_pass_through() {
        let st = state();
        assert_eq!(
            st.key_event(Key::Char('a'), Mods::empty(), KeyEventKind::Press),
            b"a".to_vec()
        );
        assert_eq!(
            st.key_event(Key::Char('é'), Mods::empty(), KeyEventKind::Press),
            "é".as_bytes().to_vec()
        );
    }

    #[test]
    fn ctrl_and_alt_combine() {
        let st = state();
        assert_eq!(
            st.key_event(Key::Char('c'), Mods::CTRL, KeyEventKind::Press),
            vec![0x03]
        );
        assert_eq!(
            st.key_event(Key::Char('b'), Mods::ALT, KeyEventKind::Press),
            vec![0x1B, b'b']
        );
        assert_eq!(
            st.key_event(Key::Char('c'), Mods::CTRL | Mods::ALT, KeyEventKind::Press),
            vec![0x1B, 0x03]
        );
    }

    #[test]
    fn cursor_keys_follow_decckm() {
        let mut st = state();
        assert_eq!(
            st.key_event(Key::Up, Mods::empty(), KeyEventKind::Press),
            b"\x1b[A".to_vec()
        );
        st.modes.cursor_keys_app = true;
        assert_eq!(
            st.key_event(Key::Up, Mods::empty(), KeyEventKind::Press),
            b"\x1bOA".to_vec()
        );
        // Modified arrows always use the CSI form.
        assert_eq!(
            st.key_event(Key::Up, Mods::CTRL, KeyEventKind::Press),
            b"\x1b[1;5A".to_vec()
        );
    }

    #[test]
    fn tilde_keys_and_function_keys() {
        let st = state();
        assert_eq!(
            st.key_event(Key::PageUp, Mods::empty(), KeyEventKind::Press),
            b"\x1b[5~".to_vec()
        );
        assert_eq!(
            st.key_event(Key::Delete, Mods::SHIFT, KeyEventKind::Press),
            b"\x1b[3;2~".to_vec()
        );
        assert_eq!(
            st.key_event(Key::F(1), Mods::empty(), KeyEventKind::Press),
            b"\x1bOP".to_vec()
        );
        assert_eq!(
            st.key_event(Key::F(5), Mods::empty(), KeyEventKind::Press),
            b"\x1b[15~".to_vec()
        );
    }

    #[test]
    fn keypad_follows_deckpam() {
        let mut st = state();
        assert_eq!(
            st.key_event(Key::Keypad('5'), Mods::empty(), KeyEventKind::Press),
            b"5".to_vec()
        );
        assert_eq!(
            st.key_event(Key::KeypadEnter, Mods::empty(), KeyEventKind::Press),
            b"\r".to_vec()
        );
        st.modes.app_keypad = true;
        assert_eq!(
            st.key_event(Key::Keypad('5'), Mods::empty(), KeyEventKind::Press),
            b"\x1bOu".to_vec()
        );
        assert_eq!(
            st.key_event(Key::KeypadEnter, Mods::empty(), KeyEventKind::Press),
            b"\x1bOM".to_vec()
        );
    }

    #[test]
    fn release_ignored_without_kitty() {
        let st = state();
        assert!(st
            .key_event(Key::Char('a'), Mods::empty(), KeyEventKind::Release)
            .is_empty());
    }

    #[test]
    fn kitty_csi_u_encoding() {
        let mut st = state();
        st.modes.kitty_push(1);
        assert_eq!(
            st.key_event(Key::Char('a'), Mods::empty(), KeyEventKind::Press),
            b"\x1b[97u".to_vec()
        );
        assert_eq!(
            st.key_event(Key::Char('a'), Mods::CTRL, KeyEventKind::Press),
            b"\x1b[97;5u".to_vec()
        );
        assert_eq!(
            st.key_event(Key::Escape, Mods::empty(), KeyEventKind::Press),
            b"\x1b[27u".to_vec()
        );
        // Flag set 1 does not report releases.
        assert!(st
            .key_event(Key::Char('a'), Mods::empty(), KeyEventKind::Release)
            .is_empty());
    }

    #[test]
    fn kitty_event_types_when_enabled() {
        let mut st = state();
        st.modes.kitty_push(0b11);
        assert_eq!(
            st.key_event(Key::Char('a'), Mods::empty(), KeyEventKind::Release),
            b"\x1b[97;1:3u".to_vec()
        );
        assert_eq!(
            st.key_event(Key::Char('a'), Mods::SHIFT, KeyEventKind::Repeat),
            b"\x1b[97;2:2u".to_vec()
        );
        assert_eq!(
            st.key_event(Key::Up, Mods::empty(), KeyEventKind::Release),
            b"\x1b[1;1:3A".to_vec()
        );
    }

    #[test]
    fn kitty_pop_restores_legacy() {
        let mut st = state();
        st.modes.kitty_push(1);
        st.modes.kitty_pop(1);
        assert_eq!(
            st.key_event(Key::Char('a'), Mods::empty(), KeyEventKind::Press),
            b"a".to_vec()
        );
    }

    #[test]
    fn bracketed_paste_wraps_and_sanitizes() {
        let mut st = state();
        assert_eq!(st.paste("hi"), b"hi".to_vec());
        st.set_private_mode(2004, true);
        assert_eq!(st.paste("hi"), b"\x1b[200~hi\x1b[201~".to_vec());
        assert_eq!(
            st.paste("a\x1b[201~b"),
            b"\x1b[200~ab\x1b[201~".to_vec()
        );
    }

    #[test]
    fn focus_reports_only_when_enabled() {
        let mut st = state();
        assert!(st.focus(true).is_empty());
        st.set_private_mode(1004, true);
        assert_eq!(st.focus(true), b"\x1b[I".to_vec());
        assert_eq!(st.focus(false), b"\x1b[O".to_vec());
    }
}
