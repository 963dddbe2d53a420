//! Component B: turns a trimmed line plus a `LogMount` into zero or more
//! schema matches, each carrying its ordered column bindings.

use log::warn;

use crate::catalog::{Catalog, LogMount, Schema};

/// The whitespace class spec.md §4.B trims from both ends of a line before
/// matching: space and the usual ASCII control whitespace characters.
fn is_trim_char(c: char) -> bool {
    matches!(c, ' ' | '\x07' | '\x08' | '\x0c' | '\n' | '\r' | '\t' | '\x0b')
}

pub fn trim_line(line: &str) -> &str {
    line.trim_matches(is_trim_char)
}

/// An ordered `(column_name, captured_text)` pair produced by a single
/// successful schema match. Never outlives the write call that produced it.
pub type CaptureBinding = (String, String);

/// One schema that fully matched a line, with its extracted bindings.
pub struct MatchResult<'a> {
    pub schema: &'a Schema,
    pub bindings: Vec<CaptureBinding>,
}

/// Evaluates every schema named by `mount`, in declared order, against
/// `line`. `line` must already be trimmed (see `trim_line`).
///
/// A schema whose name isn't in the catalog is logged and skipped (spec.md
/// §3 mount invariant). A schema that matches but whose capture count
/// disagrees with its column count is skipped silently (spec.md §4.B) --
/// this should not occur in practice since `Schema::new` already enforces
/// the invariant at load time, but is checked again here defensively since
/// the capture count of a particular match can differ from the compiled
/// group count when some groups are optional and did not participate.
pub fn match_line<'a>(line: &str, mount: &LogMount, catalog: &'a Catalog) -> Vec<MatchResult<'a>> {
    let mut results = Vec::new();

    for schema_name in &mount.schemas {
        let Some(schema) = catalog.lookup_schema(schema_name) else {
            warn!(
                "mount `{}` references undefined schema `{}`; skipping",
                mount.path, schema_name
            );
            continue;
        };

        let Some(captures) = schema.regex.captures(line) else {
            continue;
        };

        let whole = captures.get(0).expect("capture group 0 always present");
        if whole.start() != 0 || whole.end() != line.len() {
            // Matched a substring, not the full line -- spec.md §4.B requires
            // an anchored full-string match.
            continue;
        }

        let capture_count = captures.len() - 1;
        if capture_count != schema.columns.len() {
            continue;
        }

        let bindings: Vec<CaptureBinding> = schema
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let text = captures
                    .get(i + 1)
                    .map(|m| m.as_str())
                    .unwrap_or("")
                    .to_string();
                (col.clone(), text)
            })
            .collect();

        results.push(MatchResult { schema, bindings });
    }

    results
}
