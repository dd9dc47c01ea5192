use std::ops::Range;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Every structural operation compiles down to one or more of these. The
/// primitive is pure: it turns one text into another and never touches the
/// filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until apply_to() is called"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to insert at [byte_start, byte_end)
    pub new_text: String,
    /// Verification of what we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("before-text verification failed at byte {byte_start}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        expected: String,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in text of length {text_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        text_len: usize,
    },

    #[error("edits overlap at byte {at}")]
    Overlapping { at: usize },

    #[error("edit boundary at byte {at} splits a UTF-8 character")]
    InvalidUtf8Edit { at: usize },
}

impl Edit {
    /// Replace `range`, expecting it currently holds `expected_before`.
    pub fn replace(range: Range<usize>, new_text: impl Into<String>, expected_before: &str) -> Self {
        Self {
            byte_start: range.start,
            byte_end: range.end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before),
        }
    }

    /// Insert text at `offset`.
    pub fn insert(offset: usize, new_text: impl Into<String>) -> Self {
        Self::replace(offset..offset, new_text, "")
    }

    /// Delete `range`, expecting it currently holds `expected_before`.
    pub fn delete(range: Range<usize>, expected_before: &str) -> Self {
        Self::replace(range, String::new(), expected_before)
    }

    pub fn range(&self) -> Range<usize> {
        self.byte_start..self.byte_end
    }

    pub fn is_insertion(&self) -> bool {
        self.byte_start == self.byte_end
    }

    /// Validate the edit against `source`, returning the current span text.
    fn validate<'a>(&self, source: &'a str) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > source.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                text_len: source.len(),
            });
        }

        for at in [self.byte_start, self.byte_end] {
            if !source.is_char_boundary(at) {
                return Err(EditError::InvalidUtf8Edit { at });
            }
        }

        let current = &source[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                expected: format!("{:?}", self.expected_before),
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Apply this edit to `source`, producing the new text.
    pub fn apply_to(&self, source: &str) -> Result<String, EditError> {
        let current = self.validate(source)?;

        let mut out = String::with_capacity(source.len() - current.len() + self.new_text.len());
        out.push_str(&source[..self.byte_start]);
        out.push_str(&self.new_text);
        out.push_str(&source[self.byte_end..]);
        Ok(out)
    }

    /// Apply several non-overlapping edits to one text.
    ///
    /// Edits are sorted by byte_start descending and applied bottom-to-top
    /// to avoid offset invalidation.
    pub fn apply_all(source: &str, mut edits: Vec<Edit>) -> Result<String, EditError> {
        for edit in &edits {
            edit.validate(source)?;
        }

        edits.sort_by(|a, b| b.byte_start.cmp(&a.byte_start));

        // For non-overlapping regions: earlier edit's end <= later edit's start
        for window in edits.windows(2) {
            let (later, earlier) = (&window[0], &window[1]);
            if earlier.byte_end > later.byte_start {
                return Err(EditError::Overlapping {
                    at: later.byte_start,
                });
            }
        }

        let mut out = source.to_string();
        for edit in &edits {
            out.replace_range(edit.range(), &edit.new_text);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_verification_exact_match() {
        let verify = EditVerification::ExactMatch("hello world".to_string());
        assert!(verify.matches("hello world"));
        assert!(!verify.matches("hello"));
    }

    #[test]
    fn test_edit_verification_hash() {
        let verify = EditVerification::Hash(xxh3_64(b"hello world"));
        assert!(verify.matches("hello world"));
        assert!(!verify.matches("goodbye world"));
    }

    #[test]
    fn test_edit_verification_from_text_large() {
        let text = "x".repeat(2000);
        assert!(matches!(
            EditVerification::from_text(&text),
            EditVerification::Hash(_)
        ));
        assert!(matches!(
            EditVerification::from_text("small"),
            EditVerification::ExactMatch(_)
        ));
    }

    #[test]
    fn test_replace_and_insert() {
        let edit = Edit::replace(0..5, "HELLO", "hello");
        assert_eq!(edit.apply_to("hello world").unwrap(), "HELLO world");

        let edit = Edit::insert(5, ",");
        assert!(edit.is_insertion());
        assert_eq!(edit.apply_to("hello world").unwrap(), "hello, world");
    }

    #[test]
    fn test_invalid_range() {
        let edit = Edit::replace(5..20, "replacement", "");
        assert!(matches!(
            edit.apply_to("hello world"),
            Err(EditError::InvalidByteRange { .. })
        ));
    }

    #[test]
    fn test_before_text_mismatch() {
        let edit = Edit::delete(0..5, "HELLO");
        assert!(matches!(
            edit.apply_to("hello world"),
            Err(EditError::BeforeTextMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_split_characters() {
        let edit = Edit::insert(1, "x");
        assert_eq!(
            edit.apply_to("é"),
            Err(EditError::InvalidUtf8Edit { at: 1 })
        );
    }

    #[test]
    fn test_apply_all_bottom_to_top() {
        let source = "line1\nline2\nline3\n";
        let edits = vec![
            Edit::replace(0..5, "LINE1", "line1"),
            Edit::replace(12..17, "LINE3", "line3"),
            Edit::delete(6..12, "line2\n"),
        ];
        assert_eq!(Edit::apply_all(source, edits).unwrap(), "LINE1\nLINE3\n");
    }

    #[test]
    fn test_apply_all_rejects_overlap() {
        let edits = vec![
            Edit::replace(0..5, "a", "hello"),
            Edit::replace(3..8, "b", "lo wo"),
        ];
        assert!(matches!(
            Edit::apply_all("hello world", edits),
            Err(EditError::Overlapping { .. })
        ));
    }
}
