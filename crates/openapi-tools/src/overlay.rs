//! JSON overlay documents.
//!
//! An overlay is an ordered list of `{target, update}` actions. Each action
//! deep-merges `update` into every node of the base document matched by
//! `target`, a JSONPath-like expression: optional `$` root, `.`-separated
//! segments, `['key']` brackets, `*` wildcard over object keys and array
//! indices.
//!
//! Merge rules: scalars are replaced, arrays concatenated, objects merged by
//! key union with the overlay winning on conflict. Actions whose target
//! matches nothing are logged and skipped.

use serde::Deserialize;
use serde_json::Value;

/// One `{target, update}` overlay entry.
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayAction {
    pub target: String,
    pub update: Value,
}

/// An overlay document: either a bare action list or the
/// `{"actions": [...]}` wrapper form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OverlayDocument {
    Wrapped {
        actions: Vec<OverlayAction>,
    },
    Actions(Vec<OverlayAction>),
}

impl OverlayDocument {
    #[must_use]
    pub fn actions(&self) -> &[OverlayAction] {
        match self {
            OverlayDocument::Wrapped { actions } | OverlayDocument::Actions(actions) => actions,
        }
    }
}

/// Apply every action of an overlay to `doc`, in order.
pub fn apply_overlay(doc: &mut Value, overlay: &OverlayDocument) {
    for action in overlay.actions() {
        let segments = parse_target(&action.target);
        let matched = select_paths(doc, &segments);
        if matched.is_empty() {
            tracing::warn!(target_expr = %action.target, "overlay target matched nothing; skipping");
            continue;
        }
        for path in matched {
            if let Some(node) = node_at_mut(doc, &path) {
                deep_merge(node, &action.update);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Wildcard,
}

#[derive(Debug, Clone)]
enum Step {
    Key(String),
    Index(usize),
}

fn parse_target(target: &str) -> Vec<Segment> {
    let mut rest = target.strip_prefix('$').unwrap_or(target);
    rest = rest.strip_prefix('.').unwrap_or(rest);

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = rest.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                push_segment(&mut segments, &mut current);
            }
            '[' => {
                push_segment(&mut segments, &mut current);
                // Bracketed key: ['key'] or ["key"].
                let quote = chars.next();
                let mut key = String::new();
                match quote {
                    Some(q @ ('\'' | '"')) => {
                        for k in chars.by_ref() {
                            if k == q {
                                break;
                            }
                            key.push(k);
                        }
                        // Consume the closing bracket.
                        let _ = chars.next_if(|&c| c == ']');
                    }
                    Some(other) => {
                        // Unquoted bracket content (e.g. [*]).
                        if other != ']' {
                            key.push(other);
                            for k in chars.by_ref() {
                                if k == ']' {
                                    break;
                                }
                                key.push(k);
                            }
                        }
                    }
                    None => {}
                }
                if key == "*" {
                    segments.push(Segment::Wildcard);
                } else if !key.is_empty() {
                    segments.push(Segment::Key(key));
                }
            }
            _ => current.push(c),
        }
    }
    push_segment(&mut segments, &mut current);
    segments
}

fn push_segment(segments: &mut Vec<Segment>, current: &mut String) {
    if current.is_empty() {
        return;
    }
    let segment = std::mem::take(current);
    segments.push(if segment == "*" {
        Segment::Wildcard
    } else {
        Segment::Key(segment)
    });
}

fn select_paths(doc: &Value, segments: &[Segment]) -> Vec<Vec<Step>> {
    let mut out = Vec::new();
    walk(doc, segments, &mut Vec::new(), &mut out);
    out
}

fn walk(node: &Value, segments: &[Segment], prefix: &mut Vec<Step>, out: &mut Vec<Vec<Step>>) {
    let Some(segment) = segments.first() else {
        out.push(prefix.clone());
        return;
    };
    let rest = &segments[1..];

    match segment {
        Segment::Key(key) => match node {
            Value::Object(map) => {
                if let Some(child) = map.get(key) {
                    prefix.push(Step::Key(key.clone()));
                    walk(child, rest, prefix, out);
                    prefix.pop();
                }
            }
            Value::Array(items) => {
                if let Ok(idx) = key.parse::<usize>() {
                    if let Some(child) = items.get(idx) {
                        prefix.push(Step::Index(idx));
                        walk(child, rest, prefix, out);
                        prefix.pop();
                    }
                }
            }
            _ => {}
        },
        Segment::Wildcard => match node {
            Value::Object(map) => {
                for (key, child) in map {
                    prefix.push(Step::Key(key.clone()));
                    walk(child, rest, prefix, out);
                    prefix.pop();
                }
            }
            Value::Array(items) => {
                for (idx, child) in items.iter().enumerate() {
                    prefix.push(Step::Index(idx));
                    walk(child, rest, prefix, out);
                    prefix.pop();
                }
            }
            _ => {}
        },
    }
}

fn node_at_mut<'a>(doc: &'a mut Value, path: &[Step]) -> Option<&'a mut Value> {
    let mut node = doc;
    for step in path {
        node = match step {
            Step::Key(key) => node.as_object_mut()?.get_mut(key)?,
            Step::Index(idx) => node.as_array_mut()?.get_mut(*idx)?,
        };
    }
    Some(node)
}

/// Recursive merge: objects union (update wins per key), arrays concatenate,
/// everything else replaces.
pub fn deep_merge(base: &mut Value, update: &Value) {
    match (base, update) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            for (key, update_value) in update_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, update_value),
                    None => {
                        base_map.insert(key.clone(), update_value.clone());
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(update_items)) => {
            base_items.extend(update_items.iter().cloned());
        }
        (base, update) => *base = update.clone(),
    }
}
