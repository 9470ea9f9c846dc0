//! Cell-level data: character content, colors, and attribute flags.
//!
//! A `Cell` is the unit of the grid. Wide characters occupy two columns;
//! the second column holds a zero-width continuation cell that is never
//! independently addressable as content.

use bitflags::bitflags;

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// Underline rendering style (SGR 4 and 4:n subparameters)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UnderlineStyle {
    #[default]
    None,
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

impl UnderlineStyle {
    /// Map an SGR 4:n subparameter to a style.
    pub fn from_sgr(n: u16) -> Self {
        match n {
            1 => UnderlineStyle::Single,
            2 => UnderlineStyle::Double,
            3 => UnderlineStyle::Curly,
            4 => UnderlineStyle::Dotted,
            5 => UnderlineStyle::Dashed,
            _ => UnderlineStyle::None,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
    }
}

/// Graphic attributes applied to newly written cells
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub underline_color: Color,
    pub underline: UnderlineStyle,
    pub flags: AttrFlags,
}

impl CellAttrs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A single cell
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    /// Base character plus any combining marks appended to it.
    pub grapheme: String,
    /// Display width: 1 for narrow, 2 for wide, 0 for a continuation cell.
    pub width: u8,
    pub attrs: CellAttrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            grapheme: String::new(),
            width: 1,
            attrs: CellAttrs::default(),
        }
    }
}

impl Cell {
    pub fn clear(&mut self, attrs: &CellAttrs) {
        self.grapheme.clear();
        self.width = 1;
        self.attrs = attrs.clone();
    }

    /// The right half of a wide character.
    pub fn continuation(attrs: &CellAttrs) -> Self {
        Self {
            grapheme: String::new(),
            width: 0,
            attrs: attrs.clone(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    pub fn is_wide(&self) -> bool {
        self.width == 2
    }

    /// First character of the cell (space if empty).
    pub fn c(&self) -> char {
        self.grapheme.chars().next().unwrap_or(' ')
    }

    /// Display string (space if empty).
    pub fn display_str(&self) -> &str {
        if self.grapheme.is_empty() {
            " "
        } else {
            &self.grapheme
        }
    }
}

/// Semantic row tag set by OSC 133 shell-integration markers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SemanticTag {
    #[default]
    None,
    /// OSC 133;A - start of a shell prompt
    PromptStart,
    /// OSC 133;B - start of user command input
    Command,
    /// OSC 133;C - start of command output
    Output,
}
