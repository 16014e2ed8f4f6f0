//! Simulated text-mode console
//!
//! A fixed-size grid of character cells, each with its own foreground and
//! background color, plus a cursor and the current color pair. Generated
//! programs only ever talk to the grid through [`ConsoleSink`].
//!
//! The grid has exactly one writer (the program being executed). The cursor
//! blink flag lives outside the grid, see [`crate::blink`].

use crate::color::{DEFAULT_BG, DEFAULT_FG, Rgb};
use std::fmt;
use std::sync::{Arc, Mutex};

/// One character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleCell {
    pub ch: char,
    pub fg: Rgb,
    pub bg: Rgb,
}

impl Default for ConsoleCell {
    fn default() -> Self {
        ConsoleCell {
            ch: ' ',
            fg: DEFAULT_FG,
            bg: DEFAULT_BG,
        }
    }
}

/// Receiver of console operations issued by an executing program.
///
/// Coordinates are zero-based `(row, col)`, matching the `@ row,col` order
/// used by the source dialects.
pub trait ConsoleSink {
    /// Move the cursor. Out-of-range coordinates are clamped.
    fn goto(&mut self, row: usize, col: usize);
    /// Set the current foreground and background colors.
    fn set_color(&mut self, fg: Rgb, bg: Rgb);
    /// Current `(fg, bg)` pair.
    fn colors(&self) -> (Rgb, Rgb);
    /// Write text at the cursor with the current colors, advancing it.
    fn put_str(&mut self, text: &str);
    /// Move the cursor to the start of the next row, scrolling if needed.
    fn newline(&mut self);
    /// Blank every cell with the current colors and home the cursor.
    fn clear(&mut self);
}

/// Fixed-size character grid.
#[derive(Debug, Clone)]
pub struct ConsoleGrid {
    cols: usize,
    rows: usize,
    cells: Vec<ConsoleCell>,
    x: usize,
    y: usize,
    fg: Rgb,
    bg: Rgb,
}

/// A grid shared between the executing program and a presentation layer.
pub type SharedConsole = Arc<Mutex<ConsoleGrid>>;

impl ConsoleGrid {
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        ConsoleGrid {
            cols,
            rows,
            cells: vec![ConsoleCell::default(); cols * rows],
            x: 0,
            y: 0,
            fg: DEFAULT_FG,
            bg: DEFAULT_BG,
        }
    }

    pub fn shared(cols: usize, rows: usize) -> SharedConsole {
        Arc::new(Mutex::new(Self::new(cols, rows)))
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Cursor position as `(x, y)`.
    pub fn cursor(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&ConsoleCell> {
        if row < self.rows && col < self.cols {
            self.cells.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Text of one row with trailing blanks removed.
    pub fn row_text(&self, row: usize) -> String {
        if row >= self.rows {
            return String::new();
        }
        let start = row * self.cols;
        let text: String = self.cells[start..start + self.cols]
            .iter()
            .map(|c| c.ch)
            .collect();
        text.trim_end().to_string()
    }

    /// All rows, with trailing blank rows dropped.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = (0..self.rows).map(|r| self.row_text(r)).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }

    fn scroll_up(&mut self) {
        self.cells.drain(0..self.cols);
        let blank = ConsoleCell {
            ch: ' ',
            fg: self.fg,
            bg: self.bg,
        };
        self.cells.extend(std::iter::repeat_n(blank, self.cols));
    }

    fn put_char(&mut self, ch: char) {
        if self.x >= self.cols {
            self.newline();
        }
        let idx = self.y * self.cols + self.x;
        self.cells[idx] = ConsoleCell {
            ch,
            fg: self.fg,
            bg: self.bg,
        };
        self.x += 1;
    }
}

impl ConsoleSink for ConsoleGrid {
    fn goto(&mut self, row: usize, col: usize) {
        self.y = row.min(self.rows - 1);
        self.x = col.min(self.cols - 1);
    }

    fn set_color(&mut self, fg: Rgb, bg: Rgb) {
        self.fg = fg;
        self.bg = bg;
    }

    fn colors(&self) -> (Rgb, Rgb) {
        (self.fg, self.bg)
    }

    fn put_str(&mut self, text: &str) {
        for ch in text.chars() {
            match ch {
                '\n' => self.newline(),
                '\r' => self.x = 0,
                '\t' => {
                    let next = (self.x / 8 + 1) * 8;
                    while self.x < next.min(self.cols) {
                        self.put_char(' ');
                    }
                }
                c => self.put_char(c),
            }
        }
    }

    fn newline(&mut self) {
        self.x = 0;
        if self.y + 1 >= self.rows {
            self.scroll_up();
        } else {
            self.y += 1;
        }
    }

    fn clear(&mut self) {
        let blank = ConsoleCell {
            ch: ' ',
            fg: self.fg,
            bg: self.bg,
        };
        self.cells.fill(blank);
        self.x = 0;
        self.y = 0;
    }
}

impl ConsoleSink for SharedConsole {
    fn goto(&mut self, row: usize, col: usize) {
        if let Ok(mut grid) = self.lock() {
            grid.goto(row, col);
        }
    }

    fn set_color(&mut self, fg: Rgb, bg: Rgb) {
        if let Ok(mut grid) = self.lock() {
            grid.set_color(fg, bg);
        }
    }

    fn colors(&self) -> (Rgb, Rgb) {
        self.lock()
            .map(|grid| grid.colors())
            .unwrap_or((DEFAULT_FG, DEFAULT_BG))
    }

    fn put_str(&mut self, text: &str) {
        if let Ok(mut grid) = self.lock() {
            grid.put_str(text);
        }
    }

    fn newline(&mut self) {
        if let Ok(mut grid) = self.lock() {
            grid.newline();
        }
    }

    fn clear(&mut self) {
        if let Ok(mut grid) = self.lock() {
            grid.clear();
        }
    }
}

impl fmt::Display for ConsoleGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::PALETTE;

    #[test]
    fn test_goto_and_print() {
        let mut grid = ConsoleGrid::new(80, 25);
        grid.goto(5, 10);
        grid.put_str("hi");
        assert_eq!(grid.cell(5, 10).unwrap().ch, 'h');
        assert_eq!(grid.cell(5, 11).unwrap().ch, 'i');
        assert_eq!(grid.cursor(), (12, 5));
        assert_eq!(grid.row_text(5), format!("{}hi", " ".repeat(10)));
    }

    #[test]
    fn test_colors_apply_per_cell() {
        let mut grid = ConsoleGrid::new(10, 2);
        grid.put_str("a");
        grid.set_color(PALETTE[15], PALETTE[1]);
        grid.put_str("b");
        let a = grid.cell(0, 0).unwrap();
        let b = grid.cell(0, 1).unwrap();
        assert_eq!((a.fg, a.bg), (DEFAULT_FG, DEFAULT_BG));
        assert_eq!((b.fg, b.bg), (PALETTE[15], PALETTE[1]));
    }

    #[test]
    fn test_wrap_at_right_edge() {
        let mut grid = ConsoleGrid::new(4, 3);
        grid.put_str("abcdef");
        assert_eq!(grid.row_text(0), "abcd");
        assert_eq!(grid.row_text(1), "ef");
    }

    #[test]
    fn test_scroll_at_bottom() {
        let mut grid = ConsoleGrid::new(4, 2);
        grid.put_str("one\ntwo\nsix");
        assert_eq!(grid.lines(), vec!["two".to_string(), "six".to_string()]);
    }

    #[test]
    fn test_goto_clamps() {
        let mut grid = ConsoleGrid::new(40, 25);
        grid.goto(100, 100);
        assert_eq!(grid.cursor(), (39, 24));
    }

    #[test]
    fn test_clear_homes_cursor() {
        let mut grid = ConsoleGrid::new(10, 3);
        grid.goto(2, 2);
        grid.put_str("x");
        grid.clear();
        assert_eq!(grid.cursor(), (0, 0));
        assert!(grid.lines().is_empty());
    }

    #[test]
    fn test_shared_console_writes_through() {
        let mut shared = ConsoleGrid::shared(10, 3);
        shared.put_str("ok");
        assert_eq!(shared.lock().unwrap().row_text(0), "ok");
    }
}
