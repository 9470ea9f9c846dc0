//! Terminal emulation core: screen state, VT parser, and selection.

pub mod parser;
pub mod selection;
pub mod state;

pub use parser::{Response, VtParser};
pub use selection::{BufferPos, SelectionUnit, TextSelection};
pub use state::{
    CursorShape, CursorState, MouseFormat, MouseMode, Row, ScreenBuffer, TerminalModes,
    TerminalState,
};
