//! Structured host-script emitter
//!
//! Generated code is kept as `(indent, text)` records in two segments:
//! the header (declarations, classes, globals) and the body (statements).
//! Indentation is a counter per segment, so the rendered text is always
//! consistently tab-indented. The emitter performs no validation.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub indent: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Body,
}

/// The frozen output of one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedProgram {
    pub header: Vec<Line>,
    pub body: Vec<Line>,
}

impl GeneratedProgram {
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.header.iter().chain(self.body.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.body.is_empty()
    }

    /// Render as host-script source, one tab per indent level.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            for _ in 0..line.indent {
                out.push('\t');
            }
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for GeneratedProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug)]
pub struct Emitter {
    header: Vec<Line>,
    body: Vec<Line>,
    header_indent: usize,
    body_indent: usize,
    segment: Segment,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            header: Vec::new(),
            body: Vec::new(),
            header_indent: 0,
            body_indent: 0,
            segment: Segment::Body,
        }
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn select(&mut self, segment: Segment) {
        self.segment = segment;
    }

    pub fn level(&self) -> usize {
        match self.segment {
            Segment::Header => self.header_indent,
            Segment::Body => self.body_indent,
        }
    }

    fn level_mut(&mut self) -> &mut usize {
        match self.segment {
            Segment::Header => &mut self.header_indent,
            Segment::Body => &mut self.body_indent,
        }
    }

    /// Append one line at the current indent of the selected segment.
    pub fn emit(&mut self, text: impl Into<String>) {
        let line = Line {
            indent: self.level(),
            text: text.into(),
        };
        match self.segment {
            Segment::Header => self.header.push(line),
            Segment::Body => self.body.push(line),
        }
    }

    pub fn indent(&mut self) {
        *self.level_mut() += 1;
    }

    pub fn dedent(&mut self) {
        let level = self.level_mut();
        *level = level.saturating_sub(1);
    }

    /// Number of lines emitted so far in the selected segment.
    pub fn len(&self) -> usize {
        match self.segment {
            Segment::Header => self.header.len(),
            Segment::Body => self.body.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.body.is_empty()
    }

    pub fn reset(&mut self) {
        *self = Emitter::new();
    }

    pub fn snapshot(&self) -> GeneratedProgram {
        GeneratedProgram {
            header: self.header.clone(),
            body: self.body.clone(),
        }
    }

    /// Like [`snapshot`](Self::snapshot) but leaves the emitter empty.
    pub fn take(&mut self) -> GeneratedProgram {
        let program = GeneratedProgram {
            header: std::mem::take(&mut self.header),
            body: std::mem::take(&mut self.body),
        };
        self.reset();
        program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_respects_indent() {
        let mut e = Emitter::new();
        e.emit("def main():");
        e.indent();
        e.emit("print(1)");
        e.dedent();
        e.emit("main()");
        assert_eq!(e.snapshot().render(), "def main():\n\tprint(1)\nmain()\n");
    }

    #[test]
    fn test_header_precedes_body_regardless_of_emit_order() {
        let mut e = Emitter::new();
        e.emit("body_line()");
        e.select(Segment::Header);
        e.emit("x = None");
        let program = e.snapshot();
        assert_eq!(program.render(), "x = None\nbody_line()\n");
    }

    #[test]
    fn test_segments_keep_separate_indent() {
        let mut e = Emitter::new();
        e.indent();
        e.select(Segment::Header);
        assert_eq!(e.level(), 0);
        e.select(Segment::Body);
        assert_eq!(e.level(), 1);
    }

    #[test]
    fn test_dedent_saturates() {
        let mut e = Emitter::new();
        e.dedent();
        assert_eq!(e.level(), 0);
    }

    #[test]
    fn test_take_resets() {
        let mut e = Emitter::new();
        e.indent();
        e.emit("x = 1");
        let program = e.take();
        assert_eq!(program.body.len(), 1);
        assert!(e.is_empty());
        assert_eq!(e.level(), 0);
    }
}
