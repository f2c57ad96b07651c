//! Minimal synchronous G-code line tokenizer: enough to recognize the
//! words a motion command needs (G/M/X/Y/Z/A/F/I/J/S/P) without the
//! macro expansion, infix expressions, or async streaming the original
//! parser carried — those are Marlin/RepRap extensions this controller
//! does not speak.
//!
//! Grounded on `src/gcode/parser.rs`'s `GCodeCommand::Word { letter,
//! value, span }` shape for the per-word token, narrowed to a
//! synchronous, single-line API since the serial transport already
//! frames complete lines before handing them here.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct GCodeSpan {
    pub range: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Word {
    pub letter: char,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedLine {
    pub words: Vec<Word>,
}

impl ParsedLine {
    pub fn get(&self, letter: char) -> Option<f64> {
        self.words
            .iter()
            .find(|w| w.letter.eq_ignore_ascii_case(&letter))
            .map(|w| w.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GCodeError {
    pub message: String,
    pub span: GCodeSpan,
}

impl std::fmt::Display for GCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at {:?})", self.message, self.span)
    }
}

impl std::error::Error for GCodeError {}

pub struct Tokenizer;

impl Tokenizer {
    /// Strips comments (`;` to end of line and balanced `(...)`), a
    /// trailing `*checksum`, then splits the remainder into `letter value`
    /// words. Blank lines (comment-only or empty) tokenize to zero words,
    /// which callers treat as a no-op rather than an error.
    pub fn tokenize(line: &str) -> Result<ParsedLine, GCodeError> {
        let without_semicolon = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let stripped = strip_paren_comments(without_semicolon);
        let without_checksum = match stripped.find('*') {
            Some(idx) => &stripped[..idx],
            None => &stripped,
        };

        let mut words = Vec::new();
        let mut chars = without_checksum.char_indices().peekable();
        while let Some((start, c)) = chars.next() {
            if c.is_whitespace() {
                continue;
            }
            if !c.is_ascii_alphabetic() {
                return Err(GCodeError {
                    message: format!("unexpected character '{c}'"),
                    span: GCodeSpan { range: start..start + c.len_utf8() },
                });
            }
            let letter = c.to_ascii_uppercase();
            let mut num_str = String::new();
            let mut end = start + c.len_utf8();
            while let Some(&(idx, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' || d == '-' || d == '+' {
                    num_str.push(d);
                    end = idx + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str.parse::<f64>().map_err(|_| GCodeError {
                message: format!("invalid numeric value for '{letter}'"),
                span: GCodeSpan { range: start..end },
            })?;
            words.push(Word { letter, value });
        }
        Ok(ParsedLine { words })
    }
}

fn strip_paren_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut depth = 0u32;
    for c in input.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_linear_move() {
        let line = Tokenizer::tokenize("G1 X10.5 Y-2 F600").unwrap();
        assert_eq!(line.get('G'), Some(1.0));
        assert_eq!(line.get('X'), Some(10.5));
        assert_eq!(line.get('Y'), Some(-2.0));
        assert_eq!(line.get('F'), Some(600.0));
    }

    #[test]
    fn strips_semicolon_and_paren_comments() {
        let line = Tokenizer::tokenize("G1 X1 (move to start) Y2 ; trailing comment").unwrap();
        assert_eq!(line.get('X'), Some(1.0));
        assert_eq!(line.get('Y'), Some(2.0));
    }

    #[test]
    fn strips_trailing_checksum() {
        let line = Tokenizer::tokenize("G1 X1*37").unwrap();
        assert_eq!(line.get('X'), Some(1.0));
    }

    #[test]
    fn comment_only_line_has_no_words() {
        let line = Tokenizer::tokenize("; just a comment").unwrap();
        assert!(line.words.is_empty());
    }

    #[test]
    fn rejects_unexpected_characters() {
        let err = Tokenizer::tokenize("G1 X1 @").unwrap_err();
        assert!(err.message.contains('@'));
    }
}
