use std::fmt;
use std::str::FromStr;

use crate::{Result, error::QueryError, index::bins::MAX_COORDINATE};

/// A query interval on a named sequence.
///
/// Coordinates are 0-based and half-open. Text expressions use the 1-based, inclusive
/// `NAME[:START[-END]]` convention, so `chr1:2090-3000` becomes `[2089, 3000)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    name: String,
    start: u64,
    end: u64,
}
impl Region {
    /// Creates a region covering `[start, end)` of `name`
    pub fn new(name: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(QueryError::InvalidRange { start, end }.into());
        }
        Ok(Self {
            name: name.into(),
            start,
            end,
        })
    }

    /// Creates a region covering the entire sequence
    pub fn whole(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: 0,
            end: MAX_COORDINATE,
        }
    }

    /// Parses a `NAME[:START[-END]]` expression
    ///
    /// Thousands separators are accepted in the coordinates. If the text after the last
    /// colon is not a coordinate range the whole expression is taken as the name.
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(QueryError::MalformedRegion(expr.to_string()).into());
        }
        let Some((name, range)) = expr
            .rsplit_once(':')
            .filter(|(_, range)| is_range(range))
        else {
            return Ok(Self::whole(expr));
        };
        if name.is_empty() {
            return Err(QueryError::MalformedRegion(expr.to_string()).into());
        }

        let range = range.replace(',', "");
        let (start, end) = match range.split_once('-') {
            Some((start, end)) => (start, Some(end).filter(|end| !end.is_empty())),
            None => (range.as_str(), None),
        };
        let start = parse_coordinate(start, expr)?;
        let end = match end {
            Some(end) => parse_coordinate(end, expr)?,
            None => MAX_COORDINATE.max(start),
        };
        // both bounds are inclusive here, so only an end below the start is inverted
        if end < start {
            return Err(QueryError::InvalidRange { start, end }.into());
        }
        Self::new(name, start.saturating_sub(1), end)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

fn is_range(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || b == b',' || b == b'-')
}

fn parse_coordinate(text: &str, expr: &str) -> Result<u64> {
    text.parse::<u64>()
        .map_err(|_| QueryError::MalformedRegion(expr.to_string()).into())
}

impl FromStr for Region {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == 0 && self.end >= MAX_COORDINATE {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}-{}", self.name, self.start + 1, self.end)
        }
    }
}
