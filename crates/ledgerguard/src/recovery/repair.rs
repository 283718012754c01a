//! Structural repair of truncated or garbled JSON objects.
//!
//! Repair never invents content. It drops what cannot be closed and keeps
//! the longest prefix that, once its open strings and delimiters are closed,
//! parses as a non-empty object.
//!
//! The input is scanned once. Every comma outside a string is a candidate
//! cut point and remembers which delimiters were open there. Candidates are
//! tried from the end; a parse error jumps straight to the last cut point at
//! or before the error instead of stepping back one comma at a time.

use serde_json::{Deserializer, Value};

/// Upper bound on closed prefixes handed to the parser for one document.
const MAX_CANDIDATES: usize = 4096;

/// Attempts to salvage a non-empty JSON object from `raw`.
pub(super) fn repair(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let body = raw.get(start..)?;

    if let Some(Ok(value)) = Deserializer::from_str(body).into_iter::<Value>().next()
        && is_acceptable(&value)
    {
        return Some(value);
    }

    let outline = Outline::scan(body);
    let lines = LineIndex::new(body);
    let mut ceiling = usize::MAX;
    if let Some(end) = &outline.end {
        match parse_candidate(outline.close_end(body, end), &lines) {
            Ok(value) => return Some(value),
            Err(limit) => ceiling = limit,
        }
    }
    for _ in 0..MAX_CANDIDATES {
        let cut = outline.last_cut_before(ceiling)?;
        match parse_candidate(outline.close_at(body, cut), &lines) {
            Ok(value) => return Some(value),
            Err(limit) => ceiling = limit.min(cut.offset),
        }
    }
    None
}

fn is_acceptable(value: &Value) -> bool {
    value.as_object().is_some_and(|object| !object.is_empty())
}

/// Parses a closed candidate.
///
/// On failure returns the exclusive upper bound for the next cut offset:
/// just past the parser's error position, or unbounded when the candidate
/// was unusable for any other reason.
fn parse_candidate(candidate: Option<String>, lines: &LineIndex) -> Result<Value, usize> {
    let Some(text) = candidate else {
        return Err(usize::MAX);
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(value) if is_acceptable(&value) => Ok(value),
        Ok(_) => Err(usize::MAX),
        Err(error) => Err(lines
            .offset(error.line(), error.column())
            .saturating_add(1)),
    }
}

/// A comma outside any string.
#[derive(Debug, Clone, Copy)]
struct Cut {
    offset: usize,
    /// Innermost open delimiter at the comma.
    open: Option<usize>,
}

/// State at the end of the scanned input.
#[derive(Debug)]
struct End {
    open: Option<usize>,
    in_string: bool,
    escaped: bool,
}

/// Single-pass summary of where `body` can be cut and how to close it.
///
/// Open delimiters form a parent-linked stack so each cut shares the
/// frames below it instead of copying them.
#[derive(Debug, Default)]
struct Outline {
    /// Closing character and enclosing frame of every delimiter opened.
    frames: Vec<(char, Option<usize>)>,
    cuts: Vec<Cut>,
    /// `None` when scanning stopped at a mismatched closer.
    end: Option<End>,
}

impl Outline {
    fn scan(body: &str) -> Self {
        let mut outline = Self::default();
        let mut open: Option<usize> = None;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, ch) in body.char_indices() {
            if in_string {
                match (escaped, ch) {
                    (true, _) => escaped = false,
                    (false, '\\') => escaped = true,
                    (false, '"') => in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                ',' => outline.cuts.push(Cut { offset, open }),
                '{' | '[' => {
                    let closer = if ch == '{' { '}' } else { ']' };
                    outline.frames.push((closer, open));
                    open = Some(outline.frames.len().saturating_sub(1));
                }
                '}' | ']' => match open.and_then(|frame| outline.frames.get(frame)) {
                    Some(&(closer, parent)) if closer == ch => open = parent,
                    _ => return outline,
                },
                _ => {}
            }
        }
        outline.end = Some(End {
            open,
            in_string,
            escaped,
        });
        outline
    }

    fn last_cut_before(&self, ceiling: usize) -> Option<Cut> {
        let count = self.cuts.partition_point(|cut| cut.offset < ceiling);
        count.checked_sub(1).and_then(|last| self.cuts.get(last)).copied()
    }

    fn close_at(&self, body: &str, cut: Cut) -> Option<String> {
        let prefix = trim_dangling(body.get(..cut.offset)?)?;
        Some(self.closed(prefix, cut.open))
    }

    fn close_end(&self, body: &str, end: &End) -> Option<String> {
        if !end.in_string {
            return Some(self.closed(trim_dangling(body)?, end.open));
        }
        let unescaped = if end.escaped {
            body.strip_suffix('\\')?
        } else {
            body
        };
        let mut text = unescaped.to_owned();
        text.push('"');
        text.extend(self.closers(end.open));
        Some(text)
    }

    fn closed(&self, prefix: &str, open: Option<usize>) -> String {
        let mut text = prefix.to_owned();
        text.extend(self.closers(open));
        text
    }

    /// Closing characters for `open` and every frame enclosing it.
    fn closers(&self, open: Option<usize>) -> impl Iterator<Item = char> + '_ {
        std::iter::successors(open.and_then(|frame| self.frames.get(frame)), |&&(_, parent)| {
            parent.and_then(|frame| self.frames.get(frame))
        })
        .map(|&(closer, _)| closer)
    }
}

/// Drops trailing whitespace and commas; `None` when a key is left dangling.
fn trim_dangling(prefix: &str) -> Option<&str> {
    let trimmed = prefix.trim_end().trim_end_matches(',').trim_end();
    if trimmed.ends_with(':') {
        None
    } else {
        Some(trimmed)
    }
}

/// Byte offsets of line starts, for turning parser positions into offsets.
#[derive(Debug)]
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(offset, _)| offset.saturating_add(1)))
            .collect();
        Self { starts }
    }

    /// Byte offset of a one-based line and column.
    fn offset(&self, line: usize, column: usize) -> usize {
        self.starts
            .get(line.saturating_sub(1))
            .map_or(usize::MAX, |start| start.saturating_add(column.saturating_sub(1)))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case::truncated_array(
        r#"{"project":"p","tasks":[{"id":"t1"},{"id":"t2""#,
        json!({"project": "p", "tasks": [{"id": "t1"}, {"id": "t2"}]})
    )]
    #[case::unterminated_string(r#"{"project":"ledg"#, json!({"project": "ledg"}))]
    #[case::trailing_garbage(r#"{"project":"p"} trailing bytes"#, json!({"project": "p"}))]
    #[case::leading_garbage(r#"\u0000\u0000{"project":"p"}"#, json!({"project": "p"}))]
    #[case::dangling_comma(r#"{"project":"p","tasks":[1,2,"#, json!({"project": "p", "tasks": [1, 2]}))]
    #[case::broken_member(r#"{"a":1,"b":tru"#, json!({"a": 1}))]
    #[case::dangling_key(r#"{"a":1,"b":"#, json!({"a": 1}))]
    fn salvages_longest_closable_prefix(#[case] raw: &str, #[case] expected: Value) {
        assert_eq!(repair(raw), Some(expected));
    }

    #[rstest]
    #[case::no_object("[1, 2, 3]")]
    #[case::nothing_salvageable("{ invalid json")]
    #[case::empty_object("{}")]
    #[case::mismatched("{\"a\": [1}")]
    fn gives_up_without_a_non_empty_object(#[case] raw: &str) {
        assert_eq!(repair(raw), None);
    }

    #[rstest]
    #[case::nested_break(r#"{"a":1,"b":[1,2,x],"c":3"#, json!({"a": 1, "b": [1, 2]}))]
    #[case::comma_in_string(r#"{"a":"x,y","b":"#, json!({"a": "x,y"}))]
    #[case::multiline("{\n  \"a\": 1,\n  \"b\": nope,\n  \"c\": 2\n", json!({"a": 1}))]
    fn cuts_at_the_last_comma_before_the_fault(#[case] raw: &str, #[case] expected: Value) {
        assert_eq!(repair(raw), Some(expected));
    }

    fn many_members(head: &str, count: usize) -> String {
        let mut raw = head.to_owned();
        for index in 0..count {
            raw.push_str(&format!(",\"k{index}\":{index}"));
        }
        raw
    }

    #[test]
    fn early_fault_in_a_large_document_is_found_quickly() {
        let raw = many_members(r#"{"a":1,"b":x"#, 20_000);
        let started = std::time::Instant::now();

        assert_eq!(repair(&raw), Some(json!({"a": 1})));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn large_document_without_a_usable_prefix_gives_up() {
        let raw = many_members(r#"{"a":x"#, 20_000);
        assert_eq!(repair(&raw), None);
    }

    #[test]
    fn long_truncated_document_keeps_every_member() {
        let raw = many_members(r#"{"a":1"#, 5_000);
        let repaired = repair(&raw).expect("repairable");
        assert_eq!(repaired.as_object().map(serde_json::Map::len), Some(5_001));
    }
}
