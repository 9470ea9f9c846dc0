//! 256-entry indexed color table plus named default colors.
//!
//! The table is seeded from a color scheme (the base 16 ANSI colors) plus the
//! standard 6x6x6 color cube and grayscale ramp, and can be overridden at
//! runtime by OSC 4 palette-set sequences and reset by OSC 104.

use crate::config::ColorScheme;

/// An RGB triple stored in the palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse an X11 `rgb:RR/GG/BB` or `#RRGGBB` color specification.
    pub fn parse(spec: &str) -> Option<Self> {
        if let Some(rest) = spec.strip_prefix("rgb:") {
            let mut parts = rest.split('/');
            let r = parse_hex_component(parts.next()?)?;
            let g = parse_hex_component(parts.next()?)?;
            let b = parse_hex_component(parts.next()?)?;
            if parts.next().is_some() {
                return None;
            }
            return Some(Self::new(r, g, b));
        }
        if let Some(hex) = spec.strip_prefix('#') {
            if hex.len() == 6 {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                return Some(Self::new(r, g, b));
            }
        }
        None
    }
}

/// X11 color components may be 1, 2, 3, or 4 hex digits; scale to 8 bits.
fn parse_hex_component(s: &str) -> Option<u8> {
    if s.is_empty() || s.len() > 4 {
        return None;
    }
    let v = u16::from_str_radix(s, 16).ok()?;
    let max = (1u32 << (4 * s.len() as u32)) - 1;
    Some(((v as u32 * 255) / max) as u8)
}

/// Named default colors alongside the indexed table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NamedColors {
    pub foreground: Rgb,
    pub background: Rgb,
    pub cursor: Rgb,
    pub selection_fg: Rgb,
    pub selection_bg: Rgb,
}

/// The 256-entry indexed color table.
#[derive(Clone)]
pub struct Palette {
    table: [Rgb; 256],
    /// Scheme values kept for OSC 104 reset.
    base: [Rgb; 256],
    pub named: NamedColors,
}

impl Palette {
    /// Build a palette from a color scheme's base-16 colors.
    pub fn from_scheme(scheme: &ColorScheme) -> Self {
        let mut table = [Rgb::new(0, 0, 0); 256];

        table[..16].copy_from_slice(&scheme.ansi);

        // 6x6x6 color cube (indices 16..232)
        for i in 0..216 {
            let r = i / 36;
            let g = (i / 6) % 6;
            let b = i % 6;
            table[16 + i] = Rgb::new(cube_level(r), cube_level(g), cube_level(b));
        }

        // Grayscale ramp (indices 232..256)
        for i in 0..24 {
            let v = (8 + i * 10) as u8;
            table[232 + i] = Rgb::new(v, v, v);
        }

        Self {
            table,
            base: table,
            named: NamedColors {
                foreground: scheme.foreground,
                background: scheme.background,
                cursor: scheme.cursor,
                selection_fg: scheme.selection_fg,
                selection_bg: scheme.selection_bg,
            },
        }
    }

    pub fn get(&self, index: u8) -> Rgb {
        self.table[index as usize]
    }

    /// Override one entry (OSC 4).
    pub fn set(&mut self, index: u8, color: Rgb) {
        self.table[index as usize] = color;
    }

    /// Reset one entry to its scheme value (OSC 104 with an index).
    pub fn reset(&mut self, index: u8) {
        self.table[index as usize] = self.base[index as usize];
    }

    /// Reset every entry (OSC 104 without parameters).
    pub fn reset_all(&mut self) {
        self.table = self.base;
    }

    /// The full indexed table, for bulk renderer queries.
    pub fn table(&self) -> &[Rgb; 256] {
        &self.table
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_scheme(&ColorScheme::default())
    }
}

fn cube_level(n: usize) -> u8 {
    if n == 0 {
        0
    } else {
        (55 + n * 40) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cube_and_grayscale_match_xterm() {
        let p = Palette::default();
        // 16 is black, 231 is white in the cube
        assert_eq!(p.get(16), Rgb::new(0, 0, 0));
        assert_eq!(p.get(231), Rgb::new(255, 255, 255));
        // First and last grayscale steps
        assert_eq!(p.get(232), Rgb::new(8, 8, 8));
        assert_eq!(p.get(255), Rgb::new(238, 238, 238));
    }

    #[test]
    fn set_and_reset_entry() {
        let mut p = Palette::default();
        let original = p.get(1);
        p.set(1, Rgb::new(1, 2, 3));
        assert_eq!(p.get(1), Rgb::new(1, 2, 3));
        p.reset(1);
        assert_eq!(p.get(1), original);
    }

    #[test]
    fn reset_all_restores_scheme() {
        let mut p = Palette::default();
        p.set(5, Rgb::new(9, 9, 9));
        p.set(200, Rgb::new(9, 9, 9));
        p.reset_all();
        assert_eq!(p.get(5), Palette::default().get(5));
        assert_eq!(p.get(200), Palette::default().get(200));
    }

    #[test]
    fn parse_x11_rgb_spec() {
        assert_eq!(Rgb::parse("rgb:ff/00/80"), Some(Rgb::new(255, 0, 128)));
        assert_eq!(Rgb::parse("#102030"), Some(Rgb::new(16, 32, 48)));
        // Scaled 4-digit components
        assert_eq!(Rgb::parse("rgb:ffff/0000/8080"), Some(Rgb::new(255, 0, 128)));
        assert_eq!(Rgb::parse("nonsense"), None);
    }
}
