//! Property block scanning.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::Properties;

/// Parses a property block such as `{name=R1 value="10 k"}`.
///
/// Enclosing braces are optional. Keys are separated from values by `=`,
/// optionally surrounded by whitespace. Quoted values may contain whitespace,
/// and `\"` and `\\` inside them are unescaped. Words without a `=` are ignored.
/// Scanning never fails; malformed input yields whatever pairs could be read.
pub fn parse_properties(block: &str) -> Properties {
    let block = block.trim();
    let inner = block.strip_prefix('{').unwrap_or(block);
    let inner = inner.strip_suffix('}').unwrap_or(inner);

    let mut props = Properties::new();
    let mut scanner = Scanner::new(inner);
    while let Some((key, value)) = scanner.next_pair() {
        props.insert(key, value);
    }
    props
}

struct Scanner<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.src.len())
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.chars.next();
        }
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset();
        while self.peek().is_some_and(&f) {
            self.chars.next();
        }
        let end = self.offset();
        &self.src[start..end]
    }

    fn quoted(&mut self) -> String {
        let mut value = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '"' => break,
                '\\' => match self.peek() {
                    Some(next @ ('"' | '\\')) => {
                        self.chars.next();
                        value.push(next);
                    }
                    _ => value.push('\\'),
                },
                c => value.push(c),
            }
        }
        value
    }

    fn next_pair(&mut self) -> Option<(&'a str, String)> {
        loop {
            self.skip_whitespace();
            self.peek()?;

            let key = self.take_while(|c| !c.is_whitespace() && c != '=');
            self.skip_whitespace();
            if self.peek() != Some('=') {
                // Bare word.
                continue;
            }
            self.chars.next();
            self.skip_whitespace();

            let value = if self.peek() == Some('"') {
                self.chars.next();
                self.quoted()
            } else {
                self.take_while(|c| !c.is_whitespace()).to_string()
            };

            if key.is_empty() || key.contains('"') {
                continue;
            }
            return Some((key, value));
        }
    }
}
