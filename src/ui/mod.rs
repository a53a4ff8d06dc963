//! Terminal output for the viewer

mod terminal;

pub use terminal::{render_lines, TerminalSink};
