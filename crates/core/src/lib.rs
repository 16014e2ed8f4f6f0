//! Relic Core: the simulated text-mode console
//!
//! Generated programs write to a fixed-size character grid with per-cell
//! foreground/background colors. This crate owns that grid and the palette
//! every dialect resolves its color names against.
//!
//! # Modules
//!
//! - `color`: RGB values and the sixteen-entry CGA palette
//! - `console`: `ConsoleGrid`, `ConsoleCell` and the `ConsoleSink` trait
//! - `blink`: cursor blink timer that only toggles a visibility flag

pub mod blink;
pub mod color;
pub mod console;

pub use blink::{BlinkTimer, CursorBlink, DEFAULT_BLINK_INTERVAL};
pub use color::{DEFAULT_BG, DEFAULT_FG, PALETTE, Rgb, palette, palette_index};
pub use console::{ConsoleCell, ConsoleGrid, ConsoleSink, SharedConsole};
