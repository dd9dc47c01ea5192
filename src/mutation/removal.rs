//! Byte range to delete when an entity goes away.

use crate::index::Entity;
use crate::layout;
use std::ops::Range;

/// The entity's lines plus whichever adjacent blank lines would otherwise
/// be left doubled up or dangling at the start or end of a scope.
///
/// An entity sharing its lines with other code is removed by its exact
/// byte range and no blank lines are touched.
pub(crate) fn removal_range(text: &str, entity: &Entity) -> Range<usize> {
    let exact = entity.byte_start..entity.byte_end;
    if !layout::only_indentation_before(text, entity.byte_start)
        || !layout::only_whitespace_after(text, entity.byte_end)
    {
        return exact;
    }

    let mut start = layout::line_start(text, entity.byte_start);
    let mut end = layout::next_line_start(text, entity.byte_end);

    let (blanks_before, first_blank) = layout::blank_lines_before(text, start);
    let (_, after_blanks) = layout::blank_lines_after(text, end);

    let opens_scope = match layout::previous_nonblank_line(text, start) {
        None => true,
        Some(line) => line.trim_end().ends_with([':', '{']),
    };
    let closes_scope = match layout::next_nonblank_line(text, end) {
        None => true,
        Some(line) => {
            layout::indentation(line).len() < entity.indent.len()
                || line.trim_start().starts_with(['}', ')', ']'])
        }
    };

    if closes_scope {
        start = first_blank;
    } else if opens_scope || blanks_before > 0 {
        end = after_blanks;
    }

    // Never strand the last line of the file without its terminator.
    if end == text.len() && start > 0 && !text.ends_with('\n') {
        start = start.min(trailing_newline_start(text, start));
    }

    start..end
}

/// Start of the line terminator just before `offset`.
fn trailing_newline_start(text: &str, offset: usize) -> usize {
    let before = &text[..offset];
    if before.ends_with("\r\n") {
        offset - 2
    } else if before.ends_with('\n') {
        offset - 1
    } else {
        offset
    }
}
