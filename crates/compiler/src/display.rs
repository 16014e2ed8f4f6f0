//! Showing the console on a real terminal
//!
//! [`write_grid`] dumps a finished grid as text, optionally colored.
//! [`view`] takes over the terminal and shows a shared console with its
//! blinking cursor until a key is pressed.

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyEventKind},
    execute, queue,
    style::{
        Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
    },
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use relic_core::{BlinkTimer, ConsoleGrid, CursorBlink, DEFAULT_BLINK_INTERVAL, Rgb, SharedConsole};
use std::io::{self, Write};
use std::time::Duration;
use tracing::debug;

/// Write `grid` to `out`, one line per row. With `ansi` each cell carries
/// its colors.
pub fn write_grid<W: Write>(out: &mut W, grid: &ConsoleGrid, ansi: bool) -> io::Result<()> {
    if !ansi {
        write!(out, "{}", grid)?;
        return out.flush();
    }
    for row in 0..grid.rows() {
        queue_row(out, grid, row, None)?;
        queue!(out, ResetColor, Print('\n'))?;
    }
    out.flush()
}

/// Queue one row of colored cells. `cursor` is the column drawn reversed.
fn queue_row<W: Write>(
    out: &mut W,
    grid: &ConsoleGrid,
    row: usize,
    cursor: Option<usize>,
) -> io::Result<()> {
    for col in 0..grid.cols() {
        let Some(cell) = grid.cell(row, col) else {
            continue;
        };
        queue!(
            out,
            SetForegroundColor(term_color(cell.fg)),
            SetBackgroundColor(term_color(cell.bg))
        )?;
        if cursor == Some(col) {
            queue!(
                out,
                SetAttribute(Attribute::Reverse),
                Print(cell.ch),
                SetAttribute(Attribute::NoReverse)
            )?;
        } else {
            queue!(out, Print(cell.ch))?;
        }
    }
    Ok(())
}

/// Draw the whole grid from the top-left corner, marking the cursor cell
/// when `cursor_visible`.
pub fn draw_frame<W: Write>(out: &mut W, grid: &ConsoleGrid, cursor_visible: bool) -> io::Result<()> {
    let (x, y) = grid.cursor();
    for row in 0..grid.rows() {
        queue!(out, MoveTo(0, row as u16))?;
        let cursor = (cursor_visible && row == y).then_some(x);
        queue_row(out, grid, row, cursor)?;
    }
    queue!(out, ResetColor)?;
    out.flush()
}

/// Show `console` full screen with a blinking cursor until a key is pressed.
pub fn view(console: &SharedConsole) -> io::Result<()> {
    let blink = CursorBlink::new();
    let mut timer = BlinkTimer::start(blink.clone(), DEFAULT_BLINK_INTERVAL)?;

    enable_raw_mode()?;
    let mut out = io::stdout();
    execute!(out, EnterAlternateScreen, Hide)?;

    let result = view_loop(&mut out, console, &blink);

    let _ = disable_raw_mode();
    let _ = execute!(out, LeaveAlternateScreen, Show);
    timer.stop();
    result
}

fn view_loop<W: Write>(out: &mut W, console: &SharedConsole, blink: &CursorBlink) -> io::Result<()> {
    loop {
        match console.lock() {
            Ok(grid) => draw_frame(out, &grid, blink.is_visible())?,
            Err(_) => return Err(io::Error::other("console lock poisoned")),
        }

        if event::poll(Duration::from_millis(50))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            debug!(?key.code, "leaving console view");
            return Ok(());
        }
    }
}

fn term_color(color: Rgb) -> Color {
    Color::Rgb {
        r: color.r(),
        g: color.g(),
        b: color.b(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relic_core::ConsoleSink;

    fn rendered(grid: &ConsoleGrid, cursor_visible: bool) -> String {
        let mut out = Vec::new();
        draw_frame(&mut out, grid, cursor_visible).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_plain_dump_matches_display() {
        let mut grid = ConsoleGrid::new(4, 2);
        grid.put_str("ab");
        let mut out = Vec::new();
        write_grid(&mut out, &grid, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), grid.to_string());
    }

    #[test]
    fn test_ansi_dump_carries_colors() {
        let mut grid = ConsoleGrid::new(2, 1);
        grid.set_color(relic_core::PALETTE[14], relic_core::PALETTE[1]);
        grid.put_str("x");
        let mut out = Vec::new();
        write_grid(&mut out, &grid, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("38;2;255;255;85"), "{:?}", text);
        assert!(text.contains('x'));
    }

    #[test]
    fn test_cursor_cell_reversed_only_while_visible() {
        let mut grid = ConsoleGrid::new(4, 2);
        grid.put_str("ab");
        let reverse = "\u{1b}[7m";
        assert!(rendered(&grid, true).contains(reverse));
        assert!(!rendered(&grid, false).contains(reverse));
    }

    #[test]
    fn test_frame_repaints_every_row_from_the_left() {
        let grid = ConsoleGrid::new(3, 2);
        let frame = rendered(&grid, false);
        assert!(frame.contains("\u{1b}[1;1H"));
        assert!(frame.contains("\u{1b}[2;1H"));
    }
}
