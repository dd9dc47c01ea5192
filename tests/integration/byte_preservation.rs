//! Everything outside the edited span survives byte for byte.

use proptest::prelude::*;
use surgical_edit::mutation::apply;
use surgical_edit::{index, EditOperation, SourceUnit};

/// A Python module of `names.len()` functions with arbitrary comments and
/// spacing between them.
fn module(names: &[String], comments: &[String], gaps: &[usize], crlf: bool) -> String {
    let newline = if crlf { "\r\n" } else { "\n" };
    let mut text = String::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            text.push_str(&newline.repeat(gaps[i % gaps.len()] + 1));
        } else {
            text.push_str("# header");
            text.push_str(newline);
            text.push_str(newline);
        }
        let comment = &comments[i % comments.len()];
        text.push_str(&format!(
            "def {name}(x):{newline}    # {comment}{newline}    return x  # {comment}"
        ));
    }
    text.push_str(newline);
    text
}

fn names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("f_[a-z]{1,8}", 1..6).prop_map(|set| set.into_iter().collect())
}

fn comments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[ -~&&[^\\\\]]{0,30}", 1..4)
}

proptest! {
    #[test]
    fn add_function_is_one_insertion(
        names in names(),
        comments in comments(),
        gaps in prop::collection::vec(1usize..4, 1..4),
        crlf in any::<bool>(),
    ) {
        let text = module(&names, &comments, &gaps, crlf);
        let unit = SourceUnit::new(text.as_str(), "python");
        let structure = index(&unit).unwrap();
        let op = EditOperation::AddFunction {
            code: "def zz_added():\n    return 0".into(),
            class: None,
        };

        let mutation = apply(&unit, &structure, &op).unwrap();
        prop_assert_eq!(mutation.edits.len(), 1);
        let edit = &mutation.edits[0];
        prop_assert!(edit.is_insertion());

        let offset = edit.range().start;
        let inserted_len = mutation.new_text.len() - text.len();
        prop_assert_eq!(&mutation.new_text[..offset], &text[..offset]);
        prop_assert_eq!(&mutation.new_text[offset + inserted_len..], &text[offset..]);
    }

    #[test]
    fn remove_function_deletes_one_span(
        names in names(),
        comments in comments(),
        gaps in prop::collection::vec(1usize..4, 1..4),
        pick in any::<prop::sample::Index>(),
    ) {
        let text = module(&names, &comments, &gaps, false);
        let unit = SourceUnit::new(text.as_str(), "python");
        let structure = index(&unit).unwrap();
        let target = pick.get(&names).clone();

        let mutation = apply(&unit, &structure, &EditOperation::RemoveFunction { name: target.clone() }).unwrap();
        prop_assert_eq!(mutation.edits.len(), 1);
        let range = mutation.edits[0].range();
        prop_assert_eq!(
            &mutation.new_text,
            &format!("{}{}", &text[..range.start], &text[range.end..])
        );

        let after = index(&unit.with_text(mutation.new_text.as_str())).unwrap();
        prop_assert!(after.find_callables(&target).is_empty());
        prop_assert_eq!(after.callables().count(), names.len() - 1);
    }
}
