//! Tag set normalization.
//!
//! Tags are stored on the page record as a deduplicated, naturally sorted
//! list. The persisted form is always a list (never null) so that equal tag
//! sets compare equal structurally.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One run of either digits or non-digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk<'a> {
    /// ASCII digits.
    Number(&'a str),
    /// Anything else.
    Text(&'a str),
}

fn chunks(s: &str) -> impl Iterator<Item = Chunk<'_>> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(if digits { Chunk::Number(head) } else { Chunk::Text(head) })
    })
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_chunks(a: Chunk<'_>, b: Chunk<'_>) -> Ordering {
    match (a, b) {
        (Chunk::Number(x), Chunk::Number(y)) => compare_numbers(x, y),
        (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
        (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
        (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
    }
}

/// Natural ordering: digit runs compare by numeric value.
///
/// Strings that are equal under that rule (e.g. `"a1"` and `"a01"`) are
/// ordered by the first digit run that differs in length, shorter first, and
/// then by byte order, so the result is a total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);
    let mut run_length = Ordering::Equal;
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => match compare_chunks(x, y) {
                Ordering::Equal => {
                    if run_length == Ordering::Equal {
                        if let (Chunk::Number(x), Chunk::Number(y)) = (x, y) {
                            run_length = x.len().cmp(&y.len());
                        }
                    }
                }
                other => return other,
            },
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return run_length.then_with(|| a.cmp(b)),
        }
    }
}

/// Canonicalize a raw tag collection.
///
/// Each tag is trimmed of surrounding whitespace first, so `" a"` and `"a"`
/// are the same tag. Empty tags are then dropped, exact (case-sensitive)
/// duplicates removed, and the rest sorted with [`natural_cmp`].
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let unique: BTreeSet<String> = raw
        .into_iter()
        .map(|tag| tag.as_ref().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    let mut tags: Vec<String> = unique.into_iter().collect();
    tags.sort_by(|a, b| natural_cmp(a, b));
    tags
}

/// Split a space-separated tag field.
pub fn parse_tag_list(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Difference between two tag sets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagDelta {
    /// Tags present only in the new set.
    pub added: Vec<String>,
    /// Tags present only in the old set.
    pub removed: Vec<String>,
}

impl TagDelta {
    /// Compute the delta from `old` to `new`, both naturally sorted.
    pub fn between(old: &[String], new: &[String]) -> Self {
        let old_set: BTreeSet<&String> = old.iter().collect();
        let new_set: BTreeSet<&String> = new.iter().collect();
        Self {
            added: new.iter().filter(|t| !old_set.contains(t)).cloned().collect(),
            removed: old.iter().filter(|t| !new_set.contains(t)).cloned().collect(),
        }
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
