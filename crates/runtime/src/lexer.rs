//! Host-script tokenizer
//!
//! The host script is line oriented and indented with tabs. The lexer turns
//! leading tabs into `Indent`/`Dedent` tokens and ends every logical line
//! with `Newline`. Blank lines and lines whose first non-tab character is
//! `#` are ignored.

use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// A token with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

const OPERATORS: [&str; 18] = [
    "//", "==", "!=", "<=", ">=", "(", ")", ",", ":", ".", "=", "<", ">", "+", "-", "*", "/", "%",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let mut tokens = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut last_line = 0;

    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        last_line = line;
        let depth = raw.chars().take_while(|c| *c == '\t').count();
        let rest = &raw[depth..];
        if rest.trim().is_empty() || rest.trim_start().starts_with('#') {
            continue;
        }
        if rest.starts_with(' ') {
            return Err(ScriptError::syntax(line, "indentation must use tabs"));
        }

        let top = *indents.last().unwrap_or(&0);
        if depth > top {
            if depth != top + 1 {
                return Err(ScriptError::syntax(line, "unexpected indent"));
            }
            indents.push(depth);
            tokens.push(Token {
                tok: Tok::Indent,
                line,
            });
        } else {
            while depth < *indents.last().unwrap_or(&0) {
                indents.pop();
                tokens.push(Token {
                    tok: Tok::Dedent,
                    line,
                });
            }
            if depth != *indents.last().unwrap_or(&0) {
                return Err(ScriptError::syntax(line, "inconsistent dedent"));
            }
        }

        tokenize_line(rest, line, &mut tokens)?;
        tokens.push(Token {
            tok: Tok::Newline,
            line,
        });
    }

    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token {
            tok: Tok::Dedent,
            line: last_line,
        });
    }
    tokens.push(Token {
        tok: Tok::Eof,
        line: last_line,
    });
    Ok(tokens)
}

fn tokenize_line(text: &str, line: usize, out: &mut Vec<Token>) -> Result<(), ScriptError> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == ' ' || c == '\t' {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            out.push(Token {
                tok: Tok::Name(chars[start..i].iter().collect()),
                line,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let (tok, next) = lex_number(&chars, i, line)?;
            out.push(Token { tok, line });
            i = next;
            continue;
        }

        if c == '"' {
            let (s, next) = lex_string(&chars, i, line)?;
            out.push(Token {
                tok: Tok::Str(s),
                line,
            });
            i = next;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(op) => {
                out.push(Token {
                    tok: Tok::Op(*op),
                    line,
                });
                i += op.len();
            }
            None => {
                return Err(ScriptError::syntax(
                    line,
                    format!("unexpected character '{}'", c),
                ));
            }
        }
    }
    Ok(())
}

fn lex_number(chars: &[char], start: usize, line: usize) -> Result<(Tok, usize), ScriptError> {
    let mut i = start;
    if chars[i] == '0' && chars.get(i + 1).is_some_and(|c| *c == 'x' || *c == 'X') {
        i += 2;
        let digits_start = i;
        while i < chars.len() && chars[i].is_ascii_hexdigit() {
            i += 1;
        }
        let digits: String = chars[digits_start..i].iter().collect();
        let value = i64::from_str_radix(&digits, 16)
            .map_err(|_| ScriptError::syntax(line, format!("invalid hex literal '0x{}'", digits)))?;
        return Ok((Tok::Int(value), i));
    }

    let mut is_float = false;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            i += 1;
        } else if chars[i] == '.' && !is_float && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            i += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..i].iter().collect();
    let tok = if is_float {
        Tok::Float(
            text.parse()
                .map_err(|_| ScriptError::syntax(line, format!("invalid number '{}'", text)))?,
        )
    } else {
        Tok::Int(
            text.parse()
                .map_err(|_| ScriptError::syntax(line, format!("integer '{}' out of range", text)))?,
        )
    };
    Ok((tok, i))
}

fn lex_string(chars: &[char], start: usize, line: usize) -> Result<(String, usize), ScriptError> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| ScriptError::syntax(line, "dangling escape in string"))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    'a' => '\u{7}',
                    '\\' => '\\',
                    '"' => '"',
                    other => {
                        return Err(ScriptError::syntax(
                            line,
                            format!("unknown escape '\\{}'", other),
                        ));
                    }
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ScriptError::syntax(line, "unterminated string"))
}

/// Render `text` as a host-script string literal.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{7}' => out.push_str("\\a"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
