//! Line and indentation arithmetic over raw source text.
//!
//! Everything here works on byte offsets. Offsets handed out are always line
//! boundaries or positions next to ASCII whitespace, so they are valid
//! `str` slice boundaries.

use std::fmt;

/// Line terminator used by `text`: CRLF when any CRLF is present.
pub fn newline_style(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Offset of the first byte of the line containing `offset`.
pub fn line_start(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    text.as_bytes()[..offset]
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |idx| idx + 1)
}

/// Offset just past the terminator of the line containing `offset`
/// (or the end of text for the last line).
pub fn next_line_start(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    text.as_bytes()[offset..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(text.len(), |idx| offset + idx + 1)
}

/// Offset of the terminator of the line containing `offset` (or the end of
/// text for an unterminated last line).
pub fn line_end(text: &str, offset: usize) -> usize {
    let next = next_line_start(text, offset);
    let line = &text[..next];
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.len().max(offset.min(text.len()))
}

/// Zero-based line number of `offset`.
pub fn line_index(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    text.as_bytes()[..offset]
        .iter()
        .filter(|b| **b == b'\n')
        .count()
}

/// Text of the line containing `offset`, without its terminator.
pub fn line_at(text: &str, offset: usize) -> &str {
    let start = line_start(text, offset);
    let end = next_line_start(text, offset);
    text[start..end].trim_end_matches(['\n', '\r'])
}

/// Leading spaces and tabs of `line`.
pub fn indentation(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// True when only spaces/tabs sit between the line start and `offset`.
pub fn only_indentation_before(text: &str, offset: usize) -> bool {
    text[line_start(text, offset)..offset]
        .chars()
        .all(|c| c == ' ' || c == '\t')
}

/// True when only whitespace sits between `offset` and the end of its line.
pub fn only_whitespace_after(text: &str, offset: usize) -> bool {
    text[offset..next_line_start(text, offset)].trim().is_empty()
}

/// Count blank lines directly above the line starting at `start`.
///
/// Returns the count and the offset where the first of those blank lines
/// begins (equal to `start` when there are none).
pub fn blank_lines_before(text: &str, start: usize) -> (usize, usize) {
    let mut count = 0;
    let mut cursor = start;
    while cursor > 0 {
        let previous = line_start(text, cursor - 1);
        if !is_blank(&text[previous..cursor]) {
            break;
        }
        count += 1;
        cursor = previous;
    }
    (count, cursor)
}

/// Count blank lines starting at line boundary `start`.
///
/// Returns the count and the offset just past the last of them.
pub fn blank_lines_after(text: &str, start: usize) -> (usize, usize) {
    let mut count = 0;
    let mut cursor = start;
    while cursor < text.len() {
        let end = next_line_start(text, cursor);
        if !is_blank(&text[cursor..end]) {
            break;
        }
        count += 1;
        cursor = end;
    }
    (count, cursor)
}

/// The nearest non-blank line above the line starting at `start`.
pub fn previous_nonblank_line(text: &str, start: usize) -> Option<&str> {
    let (_, first_blank) = blank_lines_before(text, start);
    if first_blank == 0 {
        return None;
    }
    Some(line_at(text, first_blank - 1))
}

/// The nearest non-blank line at or below line boundary `start`.
pub fn next_nonblank_line(text: &str, start: usize) -> Option<&str> {
    let (_, after_blanks) = blank_lines_after(text, start);
    if after_blanks >= text.len() {
        return None;
    }
    Some(line_at(text, after_blanks))
}

/// Number of blank lines separating two regions, if the gap holds nothing
/// but blank lines.
pub fn blank_gap(text: &str, first_end: usize, second_start: usize) -> Option<usize> {
    let gap_start = next_line_start(text, first_end);
    let gap_end = line_start(text, second_start);
    if gap_start > gap_end {
        return None;
    }
    let gap = &text[gap_start..gap_end];
    if gap.trim().is_empty() {
        Some(gap.matches('\n').count())
    } else {
        None
    }
}

/// Strip leading blank lines and trailing whitespace from a caller payload.
pub fn trim_payload(payload: &str) -> &str {
    let trimmed = payload.trim_end();
    let mut start = 0;
    for line in trimmed.split_inclusive('\n') {
        if !is_blank(line) {
            break;
        }
        start += line.len();
    }
    &trimmed[start..]
}

/// Place a payload at `indent`.
///
/// A payload written at column zero is shifted uniformly so its first line
/// sits at `indent`; relative indentation inside the payload is untouched.
/// A payload that already carries leading indentation is used verbatim.
pub fn position_payload(payload: &str, indent: &str, newline: &str) -> String {
    let body = trim_payload(payload);
    if indent.is_empty() || !indentation(body).is_empty() {
        return body.lines().collect::<Vec<_>>().join(newline);
    }

    body.lines()
        .map(|line| {
            if is_blank(line) {
                String::new()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join(newline)
}

/// Measured indentation of a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Indentation {
    pub spaces: usize,
    pub tabs: usize,
}

impl Indentation {
    pub fn of(line: &str) -> Self {
        let prefix = indentation(line);
        Self {
            spaces: prefix.chars().filter(|c| *c == ' ').count(),
            tabs: prefix.chars().filter(|c| *c == '\t').count(),
        }
    }

    pub fn from_columns(spaces: usize) -> Self {
        Self { spaces, tabs: 0 }
    }

    /// Width with tabs expanded to `tab_width` columns.
    pub fn width(&self, tab_width: usize) -> usize {
        self.spaces + self.tabs * tab_width
    }
}

impl fmt::Display for Indentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.spaces, self.tabs) {
            (spaces, 0) => write!(f, "{spaces} spaces"),
            (0, tabs) => write!(f, "{tabs} tabs"),
            (spaces, tabs) => write!(f, "{tabs} tabs + {spaces} spaces"),
        }
    }
}
