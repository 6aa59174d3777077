//! Explicit-position cursor over a string.

use regex::{Captures, Regex};

/// A byte-position cursor over borrowed text.
///
/// Regex matches are made relative to the cursor instead of through shared
/// match state, so nested scans just use their own cursor.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Text from the cursor to the end.
    pub fn rest(&self) -> &'a str {
        self.text.get(self.pos..).unwrap_or("")
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// Move to an absolute position. Positions past the end are allowed and
    /// behave as end of input.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Move forward by `n` bytes.
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    /// The character under the cursor.
    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Match `re` exactly at the cursor. Group offsets are absolute.
    pub fn match_at(&self, re: &Regex) -> Option<Captures<'a>> {
        self.find(re)
            .filter(|caps| caps.get(0).map_or(false, |m| m.start() == self.pos))
    }

    /// Search `re` from the cursor onward. Group offsets are absolute.
    pub fn find(&self, re: &Regex) -> Option<Captures<'a>> {
        if self.pos > self.text.len() || !self.text.is_char_boundary(self.pos) {
            return None;
        }
        re.captures_at(self.text, self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_and_advance() {
        let mut cursor = Cursor::new("ab");
        assert_eq!(cursor.peek(), Some('a'));
        cursor.advance(1);
        assert_eq!(cursor.peek(), Some('b'));
        assert_eq!(cursor.rest(), "b");
        cursor.advance(1);
        assert!(cursor.is_eof());
        assert_eq!(cursor.peek(), None);
        cursor.seek(10);
        assert_eq!(cursor.rest(), "");
    }

    #[test]
    fn test_match_at_is_anchored() {
        let re = Regex::new(r"\d+").unwrap();
        let mut cursor = Cursor::new("ab12");
        assert!(cursor.match_at(&re).is_none());
        let found = cursor.find(&re).unwrap();
        assert_eq!(found.get(0).unwrap().start(), 2);
        cursor.seek(2);
        assert_eq!(cursor.match_at(&re).unwrap().get(0).unwrap().as_str(), "12");
        cursor.seek(5);
        assert!(cursor.find(&re).is_none());
    }
}
