//! Per-dialect lexical tables
//!
//! Everything the Skipper and Scanner need to know about a dialect lives in
//! one static [`DialectRules`] value: comment syntax, reserved words,
//! operator characters, string quoting, color mnemonics, console size.

use relic_core::{PALETTE, Rgb};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// dBase-like 4GL.
    DBase,
    Pascal,
    Basic,
    Lisp,
}

impl Dialect {
    pub fn rules(self) -> &'static DialectRules {
        match self {
            Dialect::DBase => &DBASE_RULES,
            Dialect::Pascal => &PASCAL_RULES,
            Dialect::Basic => &BASIC_RULES,
            Dialect::Lisp => &LISP_RULES,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::DBase => "dbase",
            Dialect::Pascal => "pascal",
            Dialect::Basic => "basic",
            Dialect::Lisp => "lisp",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A block comment style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockComment {
    pub open: &'static str,
    pub close: &'static str,
    /// Whether an inner `open` increments the depth.
    pub nests: bool,
    /// Which nesting counter this style uses.
    pub slot: usize,
}

/// How string literals are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"..."` with backslash escapes.
    Double,
    /// `'...'` with `''` as the embedded quote.
    Single,
}

#[derive(Debug)]
pub struct DialectRules {
    pub dialect: Dialect,
    pub line_comments: &'static [&'static str],
    pub block_comments: &'static [BlockComment],
    /// Lowercase reserved words.
    pub keywords: &'static [&'static str],
    pub operators: &'static str,
    /// Characters allowed inside (not at the start of) an identifier,
    /// beyond letters, digits and `_`.
    pub ident_extra: &'static str,
    pub braces_allowed: bool,
    pub quote: QuoteStyle,
    /// Lowercase color mnemonics and their palette index.
    pub colors: &'static [(&'static str, usize)],
    pub console_cols: usize,
    pub console_rows: usize,
}

/// Number of independent block-comment nesting counters.
pub const COMMENT_SLOTS: usize = 2;

impl DialectRules {
    pub fn is_keyword(&self, word: &str) -> bool {
        let lower = word.to_ascii_lowercase();
        self.keywords.contains(&lower.as_str())
    }

    pub fn is_operator(&self, c: char) -> bool {
        self.operators.contains(c)
    }

    /// Resolve a color mnemonic (case-insensitive) to its RGB value.
    pub fn color(&self, name: &str) -> Option<Rgb> {
        let lower = name.trim().to_ascii_lowercase();
        self.colors
            .iter()
            .find(|(n, _)| *n == lower)
            .and_then(|(_, idx)| PALETTE.get(*idx).copied())
    }
}

/// `#` starts a directive-style line comment in every dialect.
const DIRECTIVE: &str = "#";

pub static DBASE_RULES: DialectRules = DialectRules {
    dialect: Dialect::DBase,
    line_comments: &["**", "&&", "//", DIRECTIVE],
    block_comments: &[BlockComment {
        open: "/*",
        close: "*/",
        nests: false,
        slot: 0,
    }],
    keywords: &[
        "say", "set", "color", "to", "for", "next", "step", "class", "of", "endclass", "local",
        "parameter", "if", "else", "endif", "do", "while", "enddo", "clear", "return", "new",
        "this",
    ],
    operators: "+-*/%=<>@?^",
    ident_extra: "",
    braces_allowed: false,
    quote: QuoteStyle::Double,
    colors: &[
        ("n", 0),
        ("b", 1),
        ("g", 2),
        ("bg", 3),
        ("r", 4),
        ("rb", 5),
        ("gr", 6),
        ("w", 7),
        ("n+", 8),
        ("b+", 9),
        ("g+", 10),
        ("bg+", 11),
        ("r+", 12),
        ("rb+", 13),
        ("gr+", 14),
        ("w+", 15),
    ],
    console_cols: 80,
    console_rows: 25,
};

pub static PASCAL_RULES: DialectRules = DialectRules {
    dialect: Dialect::Pascal,
    line_comments: &["//", DIRECTIVE],
    block_comments: &[
        BlockComment {
            open: "{",
            close: "}",
            nests: true,
            slot: 0,
        },
        BlockComment {
            open: "(*",
            close: "*)",
            nests: true,
            slot: 1,
        },
    ],
    keywords: &[
        "program",
        "var",
        "procedure",
        "function",
        "begin",
        "end",
        "if",
        "then",
        "else",
        "while",
        "do",
        "for",
        "to",
        "downto",
        "div",
        "mod",
        "and",
        "or",
        "not",
        "true",
        "false",
    ],
    operators: "+-*/=<>:",
    ident_extra: "",
    braces_allowed: true,
    quote: QuoteStyle::Single,
    colors: &[
        ("black", 0),
        ("blue", 1),
        ("green", 2),
        ("cyan", 3),
        ("red", 4),
        ("magenta", 5),
        ("brown", 6),
        ("lightgray", 7),
        ("darkgray", 8),
        ("lightblue", 9),
        ("lightgreen", 10),
        ("lightcyan", 11),
        ("lightred", 12),
        ("lightmagenta", 13),
        ("yellow", 14),
        ("white", 15),
    ],
    console_cols: 80,
    console_rows: 25,
};

pub static BASIC_RULES: DialectRules = DialectRules {
    dialect: Dialect::Basic,
    line_comments: &[DIRECTIVE],
    block_comments: &[],
    keywords: &[
        "print", "let", "goto", "if", "then", "end", "rem", "cls", "color", "locate", "left$",
        "right$",
    ],
    operators: "+-*/=<>;",
    ident_extra: "$",
    braces_allowed: false,
    quote: QuoteStyle::Double,
    colors: &[],
    console_cols: 40,
    console_rows: 25,
};

pub static LISP_RULES: DialectRules = DialectRules {
    dialect: Dialect::Lisp,
    line_comments: &[";", DIRECTIVE],
    block_comments: &[],
    keywords: &[
        "defun", "setq", "if", "while", "progn", "print", "goto", "color", "cls", "t", "nil",
    ],
    operators: "+-*/=<>",
    ident_extra: "-?!*",
    braces_allowed: false,
    quote: QuoteStyle::Double,
    colors: &[
        ("black", 0),
        ("blue", 1),
        ("green", 2),
        ("cyan", 3),
        ("red", 4),
        ("magenta", 5),
        ("brown", 6),
        ("light-gray", 7),
        ("dark-gray", 8),
        ("light-blue", 9),
        ("light-green", 10),
        ("light-cyan", 11),
        ("light-red", 12),
        ("light-magenta", 13),
        ("yellow", 14),
        ("white", 15),
    ],
    console_cols: 80,
    console_rows: 25,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbase_color_mnemonics() {
        let rules = Dialect::DBase.rules();
        assert_eq!(rules.color("w+"), Some(Rgb(0xFFFFFF)));
        assert_eq!(rules.color("B"), Some(Rgb(0x0000AA)));
        assert_eq!(rules.color("gr+"), Some(PALETTE[14]));
        assert_eq!(rules.color("q"), None);
    }

    #[test]
    fn test_keywords_are_lowercase_and_case_insensitive() {
        for dialect in [Dialect::DBase, Dialect::Pascal, Dialect::Basic, Dialect::Lisp] {
            let rules = dialect.rules();
            for kw in rules.keywords {
                assert_eq!(*kw, kw.to_ascii_lowercase());
                assert!(rules.is_keyword(&kw.to_ascii_uppercase()));
            }
        }
    }

    #[test]
    fn test_console_sizes() {
        assert_eq!(
            (
                Dialect::DBase.rules().console_cols,
                Dialect::DBase.rules().console_rows
            ),
            (80, 25)
        );
        assert_eq!(Dialect::Basic.rules().console_cols, 40);
    }

    #[test]
    fn test_every_color_index_is_in_palette() {
        for dialect in [Dialect::DBase, Dialect::Pascal, Dialect::Lisp] {
            for (name, idx) in dialect.rules().colors {
                assert!(*idx < PALETTE.len(), "{} -> {}", name, idx);
            }
        }
    }
}
