//! Tokenized program images
//!
//! Encodes parsed BASIC lines into the byte layout of a Commodore-style
//! program file: a two-byte load address, then for each line a link pointer
//! to the next line, the line number, the tokenized text and a `0x00`
//! terminator. A zero link ends the program. All words are little-endian.

use super::{BasicLine, BasicToken, TokenClass};
use crate::error::{ErrorKind, ParseError, Result};

/// Where the program image is loaded.
pub const LOAD_ADDRESS: u16 = 0x0801;

/// Keyword opcodes. `LOCATE`, `COLOR` and `CLS` use the BASIC 7.0
/// numbers (`CLS` is stored as `SCNCLR`).
const COMMANDS: &[(&str, u8)] = &[
    ("END", 0x80),
    ("LET", 0x88),
    ("GOTO", 0x89),
    ("IF", 0x8B),
    ("REM", 0x8F),
    ("PRINT", 0x99),
    ("THEN", 0xA7),
    ("LEFT$", 0xC8),
    ("RIGHT$", 0xC9),
    ("LOCATE", 0xE6),
    ("COLOR", 0xE7),
    ("CLS", 0xE8),
];

const OPERATORS: &[(&str, &[u8])] = &[
    ("+", &[0xAA]),
    ("-", &[0xAB]),
    ("*", &[0xAC]),
    ("/", &[0xAD]),
    (">", &[0xB1]),
    ("=", &[0xB2]),
    ("<", &[0xB3]),
    ("<>", &[0xB3, 0xB1]),
    ("<=", &[0xB3, 0xB2]),
    (">=", &[0xB1, 0xB2]),
];

pub fn opcode(command: &str) -> Option<u8> {
    COMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, code)| *code)
}

/// Encode a whole program, load address first.
///
/// Fails when a line number does not fit a word or the image would run
/// past the end of the 64K address space.
pub fn encode(lines: &[BasicLine]) -> Result<Vec<u8>> {
    let mut out = LOAD_ADDRESS.to_le_bytes().to_vec();
    let mut address = LOAD_ADDRESS;

    for line in lines {
        let number = u16::try_from(line.number).map_err(|_| {
            too_large(line, format!("line number {} does not fit in 16 bits", line.number))
        })?;
        let body = encode_line(line);
        // link (2) + number (2) + body + terminator (1)
        let next = u16::try_from(body.len())
            .ok()
            .and_then(|len| len.checked_add(5))
            .and_then(|len| address.checked_add(len))
            .ok_or_else(|| {
                too_large(line, format!("line {} runs past the end of memory", line.number))
            })?;
        out.extend_from_slice(&next.to_le_bytes());
        out.extend_from_slice(&number.to_le_bytes());
        out.extend_from_slice(&body);
        out.push(0x00);
        address = next;
    }

    out.extend_from_slice(&[0x00, 0x00]);
    Ok(out)
}

fn too_large(line: &BasicLine, message: String) -> ParseError {
    ParseError::new(ErrorKind::SyntaxError, line.source_line, 1, message)
}

fn encode_line(line: &BasicLine) -> Vec<u8> {
    let mut out = Vec::new();
    for token in &line.tokens {
        encode_token(token, &mut out);
        if token.class == TokenClass::Command
            && token.text == "REM"
            && let Some(remark) = &line.remark
        {
            out.push(b' ');
            push_text(remark, &mut out);
        }
    }
    out
}

fn encode_token(token: &BasicToken, out: &mut Vec<u8>) {
    match token.class {
        TokenClass::Command => match opcode(&token.text) {
            Some(code) => out.push(code),
            None => push_text(&token.text, out),
        },
        TokenClass::Symbol => match OPERATORS.iter().find(|(op, _)| *op == token.text) {
            Some((_, bytes)) => out.extend_from_slice(bytes),
            None => push_text(&token.text, out),
        },
        TokenClass::Str | TokenClass::Variable | TokenClass::Number => {
            push_text(&token.text, out)
        }
    }
}

/// Plain text is stored as ASCII; anything else becomes `?`.
fn push_text(text: &str, out: &mut Vec<u8>) {
    out.extend(text.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParserContext;
    use crate::dialect::basic::read_program;
    use crate::rules::Dialect;

    fn image(src: &str) -> Vec<u8> {
        let mut ctx = ParserContext::new(Dialect::Basic, src, "test.bas");
        encode(&read_program(&mut ctx).unwrap()).unwrap()
    }

    #[test]
    fn test_two_line_program_layout() {
        let bytes = image("10 PRINT \"HI\"\n20 END\n");
        assert_eq!(
            bytes,
            vec![
                0x01, 0x08, // load address
                0x0B, 0x08, 0x0A, 0x00, 0x99, b'"', b'H', b'I', b'"', 0x00, // line 10
                0x11, 0x08, 0x14, 0x00, 0x80, 0x00, // line 20
                0x00, 0x00,
            ]
        );
    }

    #[test]
    fn test_empty_program_is_just_the_terminator() {
        assert_eq!(image(""), vec![0x01, 0x08, 0x00, 0x00]);
    }

    #[test]
    fn test_operators_and_keywords() {
        let bytes = image("10 IF A <> 1 THEN 10");
        assert_eq!(
            &bytes[6..bytes.len() - 3],
            &[0x8B, b'A', 0xB3, 0xB1, b'1', 0xA7, b'1', b'0']
        );
    }

    #[test]
    fn test_remark_is_stored_as_text() {
        let bytes = image("10 REM hi");
        assert_eq!(&bytes[6..bytes.len() - 3], &[0x8F, b' ', b'h', b'i']);
    }

    #[test]
    fn test_large_line_numbers_are_little_endian() {
        let bytes = image("1000 CLS");
        assert_eq!(&bytes[4..6], &[0xE8, 0x03]);
    }

    #[test]
    fn test_line_too_long_for_memory() {
        let src = format!("10 CLS\n20 REM {}", "x".repeat(70_000));
        let mut ctx = ParserContext::new(Dialect::Basic, &src, "test.bas");
        let err = encode(&read_program(&mut ctx).unwrap()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_line_number_wider_than_a_word() {
        let line = BasicLine {
            number: 70_000,
            source_line: 3,
            tokens: Vec::new(),
            remark: None,
        };
        let err = encode(&[line]).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("16 bits"), "{}", err.message);
    }

    #[test]
    fn test_every_keyword_has_an_opcode() {
        for keyword in crate::rules::Dialect::Basic.rules().keywords {
            assert!(
                opcode(&keyword.to_ascii_uppercase()).is_some(),
                "{} has no opcode",
                keyword
            );
        }
    }
}
