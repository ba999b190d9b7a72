use std::fmt;
use std::ops::Range;

/// Byte range of a token or node in the pattern source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn merge(&self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn to_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let merged = Span::new(4, 6).merge(Span::new(0, 2));
        assert_eq!(merged, Span::new(0, 6));
        assert_eq!(merged.to_range(), 0..6);
    }

    #[test]
    fn test_span_display() {
        assert_eq!(Span::from(3..9).to_string(), "3..9");
    }
}
