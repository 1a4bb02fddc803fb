//! Property path parsing.
//!
//! Paths look like `scene.objects["Cube"].location[0]`: dot-separated field
//! names, each optionally followed by bracketed string keys or integer
//! indices. Dots inside brackets or quotes never split a segment.

use std::fmt;

/// One step of a property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Field(String),
    Key(String),
    Index(usize),
}

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPath {
    segments: Vec<Segment>,
}

/// Why a path string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub reason: String,
    pub position: usize,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.reason, self.position)
    }
}

impl PropertyPath {
    pub fn parse(source: &str) -> Result<Self, PathError> {
        PathParser::new(source).parse()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Split a trailing array index off the path.
    ///
    /// `a.location[1]` becomes (`a.location`, `Some(1)`); paths without a
    /// trailing index come back unchanged with `None`.
    pub fn split_component(&self) -> (PropertyPath, Option<usize>) {
        match self.segments.split_last() {
            Some((Segment::Index(i), rest)) if !rest.is_empty() => (
                PropertyPath {
                    segments: rest.to_vec(),
                },
                Some(*i),
            ),
            _ => (self.clone(), None),
        }
    }

    /// Whether `self` equals `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &PropertyPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if i == 0 => write!(f, "{name}")?,
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Key(key) => write!(f, "[\"{key}\"]")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

struct PathParser {
    chars: Vec<char>,
    pos: usize,
}

impl PathParser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.trim().chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<PropertyPath, PathError> {
        if self.chars.is_empty() {
            return Err(self.error("empty path"));
        }

        let mut segments = Vec::new();
        loop {
            segments.push(Segment::Field(self.field()?));
            while self.peek() == Some('[') {
                segments.push(self.bracket()?);
            }
            match self.peek() {
                None => break,
                Some('.') => {
                    self.pos += 1;
                }
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            }
        }

        Ok(PropertyPath { segments })
    }

    fn field(&mut self) -> Result<String, PathError> {
        let mut name = String::new();
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return Err(self.error("expected a field name")),
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(name)
    }

    fn bracket(&mut self) -> Result<Segment, PathError> {
        self.pos += 1; // '['
        self.skip_spaces();

        let segment = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut key = String::new();
                loop {
                    match self.peek() {
                        None => return Err(self.error("unterminated string key")),
                        Some(c) if c == quote => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            key.push(c);
                            self.pos += 1;
                        }
                    }
                }
                Segment::Key(key)
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                let mut digits = String::new();
                while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                    digits.push(c);
                    self.pos += 1;
                }
                let index = digits.parse().map_err(|_| PathError {
                    reason: format!("index out of bounds: {digits}"),
                    position: start,
                })?;
                Segment::Index(index)
            }
            _ => return Err(self.error("expected a quoted key or an index")),
        };

        self.skip_spaces();
        if self.peek() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        self.pos += 1;
        Ok(segment)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> PathError {
        PathError {
            reason: reason.into(),
            position: self.pos,
        }
    }
}
