use super::SubdocError;
use std::fmt;
use std::str::FromStr;

/// One step of a sub-document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    /// Array position; negative values count from the end.
    Index(i64),
}

/// A parsed sub-document path. Keeps the caller's original spelling for
/// display and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdocPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl SubdocPath {
    pub fn parse(raw: &str) -> Result<Self, SubdocError> {
        let invalid = |reason: &str| SubdocError::PathInvalid {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("path is empty"));
        }

        let chars: Vec<char> = raw.chars().collect();
        let mut segments = Vec::new();
        let mut expect_field = true;
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '[' => {
                    if expect_field && !segments.is_empty() {
                        return Err(invalid("array index must follow a field"));
                    }
                    let close = chars[i + 1..]
                        .iter()
                        .position(|c| *c == ']')
                        .ok_or_else(|| invalid("unterminated array index"))?
                        + i
                        + 1;
                    let digits: String = chars[i + 1..close].iter().collect();
                    let index = digits
                        .parse::<i64>()
                        .map_err(|_| invalid("array index is not an integer"))?;
                    segments.push(PathSegment::Index(index));
                    expect_field = false;
                    i = close + 1;
                }
                '.' if !expect_field => {
                    expect_field = true;
                    i += 1;
                    if i == chars.len() {
                        return Err(invalid("path ends with '.'"));
                    }
                }
                '.' => return Err(invalid("empty field name")),
                '`' if expect_field => {
                    let mut name = String::new();
                    i += 1;
                    loop {
                        match chars.get(i) {
                            None => return Err(invalid("unterminated backtick")),
                            // A doubled backtick is a literal backtick
                            Some('`') if chars.get(i + 1) == Some(&'`') => {
                                name.push('`');
                                i += 2;
                            }
                            Some('`') => {
                                i += 1;
                                break;
                            }
                            Some(c) => {
                                name.push(*c);
                                i += 1;
                            }
                        }
                    }
                    if name.is_empty() {
                        return Err(invalid("empty field name"));
                    }
                    segments.push(PathSegment::Field(name));
                    expect_field = false;
                }
                _ if expect_field => {
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        if chars[i] == '`' || chars[i] == ']' {
                            return Err(invalid("unexpected character in field name"));
                        }
                        i += 1;
                    }
                    segments.push(PathSegment::Field(chars[start..i].iter().collect()));
                    expect_field = false;
                }
                _ => return Err(invalid("expected '.' or '[' after a segment")),
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for SubdocPath {
    type Err = SubdocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SubdocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
