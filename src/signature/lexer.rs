//! Logical-line lexer for unit source text.
//!
//! Splits Python source into logical lines the way the language does:
//! comments are dropped, bracketed expressions and backslash continuations
//! are joined, and string literals (including triple-quoted ones spanning
//! several physical lines) are kept intact. Structural errors are reported
//! as [`HarnessError::UnparsableSource`] with the physical line number.

use crate::error::{HarnessError, HarnessResult};

/// One logical line of source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based physical line where the logical line starts.
    pub line: usize,
    /// Indentation width (tabs advance to the next multiple of 8).
    pub indent: usize,
    /// Line text with comments removed and continuations joined.
    pub text: String,
}

/// Lexer state over a source buffer.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    /// Create a lexer for the given source.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
            }
        }
        c
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Measure leading whitespace at the start of a physical line.
    fn measure_indent(&mut self) -> usize {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\u{c}' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }
        width
    }

    /// Read a string literal whose opening quote is at the current position.
    fn read_string(&mut self, out: &mut String) -> HarnessResult<()> {
        let start_line = self.line;
        let quote = self.advance().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        out.push(quote);
        if triple {
            out.push(quote);
            out.push(quote);
            self.pos += 2;
        }

        loop {
            let Some(c) = self.advance() else {
                return Err(unparsable(start_line, "unterminated string literal"));
            };
            match c {
                '\\' => {
                    out.push(c);
                    match self.advance() {
                        Some(next) => out.push(next),
                        None => return Err(unparsable(start_line, "unterminated string literal")),
                    }
                }
                '\n' if !triple => {
                    return Err(unparsable(start_line, "unterminated string literal"));
                }
                c if c == quote => {
                    out.push(c);
                    if !triple {
                        return Ok(());
                    }
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        out.push(quote);
                        out.push(quote);
                        self.pos += 2;
                        return Ok(());
                    }
                }
                _ => out.push(c),
            }
        }
    }

    /// Consume the whole buffer into logical lines.
    pub fn logical_lines(mut self) -> HarnessResult<Vec<LogicalLine>> {
        let mut lines = Vec::new();
        let mut current = String::new();
        let mut start_line = 1;
        let mut indent = 0;
        let mut brackets: Vec<(char, usize)> = Vec::new();
        let mut at_line_start = true;

        loop {
            if at_line_start {
                let width = self.measure_indent();
                match self.peek() {
                    None => break,
                    Some('\n') | Some('\r') => {
                        self.advance();
                        continue;
                    }
                    Some('#') => {
                        self.skip_comment();
                        continue;
                    }
                    Some(_) => {
                        indent = width;
                        start_line = self.line;
                        at_line_start = false;
                    }
                }
            }

            let Some(c) = self.peek() else {
                break;
            };

            match c {
                '#' => self.skip_comment(),
                '\'' | '"' => self.read_string(&mut current)?,
                '(' | '[' | '{' => {
                    brackets.push((c, self.line));
                    current.push(c);
                    self.advance();
                }
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match brackets.pop() {
                        Some((open, _)) if open == expected => {}
                        Some((open, _)) => {
                            return Err(unparsable(
                                self.line,
                                &format!("closing '{c}' does not match opening '{open}'"),
                            ));
                        }
                        None => {
                            return Err(unparsable(self.line, &format!("unmatched '{c}'")));
                        }
                    }
                    current.push(c);
                    self.advance();
                }
                '\\' => {
                    self.advance();
                    match self.peek() {
                        Some('\n') => {
                            self.advance();
                            current.push(' ');
                        }
                        Some('\r') if self.peek_at(1) == Some('\n') => {
                            self.pos += 1;
                            self.advance();
                            current.push(' ');
                        }
                        None => {
                            return Err(unparsable(self.line, "unexpected end after line continuation"));
                        }
                        Some(_) => current.push('\\'),
                    }
                }
                '\r' => {
                    self.advance();
                }
                '\n' => {
                    self.advance();
                    if brackets.is_empty() {
                        flush(&mut lines, &mut current, start_line, indent);
                        at_line_start = true;
                    } else {
                        current.push(' ');
                    }
                }
                _ => {
                    current.push(c);
                    self.advance();
                }
            }
        }

        if let Some((open, line)) = brackets.last() {
            return Err(unparsable(*line, &format!("'{open}' was never closed")));
        }
        flush(&mut lines, &mut current, start_line, indent);
        Ok(lines)
    }
}

fn flush(lines: &mut Vec<LogicalLine>, current: &mut String, line: usize, indent: usize) {
    let text = current.trim().to_string();
    if !text.is_empty() {
        lines.push(LogicalLine { line, indent, text });
    }
    current.clear();
}

/// Build an `UnparsableSource` error.
pub(crate) fn unparsable(line: usize, message: &str) -> HarnessError {
    HarnessError::UnparsableSource {
        line,
        message: message.to_string(),
    }
}

/// Split source into logical lines.
pub fn logical_lines(source: &str) -> HarnessResult<Vec<LogicalLine>> {
    Lexer::new(source).logical_lines()
}

/// Byte offsets of characters in `text` that sit outside strings and brackets.
///
/// The callback sees each depth-0 character with its byte offset and the
/// character that follows it; returning `true` stops the scan.
pub(crate) fn scan_top_level(text: &str, mut visit: impl FnMut(usize, char, Option<char>) -> bool) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut iter = text.char_indices().peekable();

    while let Some((offset, c)) = iter.next() {
        let next = iter.peek().map(|(_, n)| *n);
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                if visit(offset, c, next) {
                    return;
                }
            }
            _ => {}
        }
    }
}

/// Split on a separator that appears outside strings and brackets.
pub(crate) fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    scan_top_level(text, |offset, c, _| {
        if c == sep {
            parts.push(&text[start..offset]);
            start = offset + c.len_utf8();
        }
        false
    });
    parts.push(&text[start..]);
    parts
}

/// First top-level occurrence of `target` that is not followed by `=`.
pub(crate) fn find_top_level(text: &str, target: char) -> Option<usize> {
    let mut found = None;
    scan_top_level(text, |offset, c, next| {
        if c == target && next != Some('=') {
            found = Some(offset);
            return true;
        }
        false
    });
    found
}
