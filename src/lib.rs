//! Headless terminal emulation engine.
//!
//! The crate turns a child process byte stream into a queryable screen
//! model: a VT/xterm escape parser, a cell grid with bounded scrollback,
//! text selection, and encoders that translate keyboard, mouse, paste and
//! focus events into child-bound bytes under the emulator's input modes.
//!
//! [`Terminal`] is the concurrency gateway. A feeder thread pumps child
//! output through the parser while renderers and input handlers take the
//! same lock, then poll [`Terminal::check_dirty`] or block in
//! [`Terminal::wait_dirty`] to learn when the screen changed.
//!
//! ```no_run
//! use vtcore::Terminal;
//!
//! let mut term = Terminal::new(80, 24)?;
//! # let reader: Box<dyn std::io::Read + Send> = Box::new(std::io::empty());
//! # let writer: Box<dyn std::io::Write + Send> = Box::new(std::io::sink());
//! term.attach(reader, writer)?;
//! while !term.child_exited() {
//!     if term.wait_dirty(std::time::Duration::from_millis(100)) {
//!         let state = term.lock();
//!         // draw from state.active_screen()
//!     }
//! }
//! # Ok::<(), vtcore::TermError>(())
//! ```

pub mod cell;
pub mod config;
pub mod error;
pub mod input;
pub mod mouse;
pub mod palette;
pub mod session;
pub mod term;

pub use cell::{AttrFlags, Cell, CellAttrs, Color, SemanticTag, UnderlineStyle};
pub use config::{Config, ColorScheme};
pub use error::TermError;
pub use input::{Key, KeyEventKind, Mods};
pub use mouse::MouseButton;
pub use palette::{Palette, Rgb};
pub use session::{Terminal, TerminalGuard};
pub use term::{
    BufferPos, CursorShape, CursorState, MouseFormat, MouseMode, Response, Row, ScreenBuffer,
    SelectionUnit, TerminalModes, TerminalState, TextSelection, VtParser,
};
