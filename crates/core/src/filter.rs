//! Whitelist/blacklist operation filters.
//!
//! A pattern matches either an operation name (glob on `operationId` / root
//! field name), a method-qualified path (`METHOD:/path/glob`), or — for
//! sources that expose a flat parameter surface — a single parameter
//! (`toolName.paramName`).
//!
//! Glob semantics: `*` matches within one path segment, `**` matches across
//! segments, `?` matches a single character. Lists are evaluated
//! left-to-right and the first hit decides. A non-empty whitelist restricts
//! the retained set; the blacklist is consulted only when the whitelist is
//! empty.

/// One parsed filter pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Glob over `operationId` (OpenAPI) or root field name (GraphQL).
    Name(String),
    /// Method-qualified path: `GET:/pets/*`.
    MethodPath { method: String, path: String },
    /// Per-parameter entry: `users.tenantId`.
    Param { tool: String, param: String },
}

impl Pattern {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some((method, path)) = raw.split_once(':') {
            if path.starts_with('/') && !method.is_empty() && method.chars().all(char::is_alphabetic)
            {
                return Pattern::MethodPath {
                    method: method.to_ascii_uppercase(),
                    path: path.to_string(),
                };
            }
        }
        // `tool.param` entries never contain '/'; dotted operationIds are rare
        // enough that the param interpretation wins.
        if let Some((tool, param)) = raw.split_once('.') {
            if !tool.is_empty() && !param.is_empty() && !raw.contains('/') {
                return Pattern::Param {
                    tool: tool.to_string(),
                    param: param.to_string(),
                };
            }
        }
        Pattern::Name(raw.to_string())
    }

    fn matches_operation(&self, name: Option<&str>, method: &str, path: &str) -> bool {
        match self {
            Pattern::Name(glob) => name.is_some_and(|n| glob_match(glob, n)),
            Pattern::MethodPath {
                method: pm,
                path: pp,
            } => pm.eq_ignore_ascii_case(method) && glob_match(pp, path),
            Pattern::Param { .. } => false,
        }
    }

    fn matches_param(&self, tool: &str, param: &str) -> bool {
        match self {
            Pattern::Param { tool: pt, param: pp } => {
                glob_match(pt, tool) && glob_match(pp, param)
            }
            Pattern::Name(_) | Pattern::MethodPath { .. } => false,
        }
    }
}

/// Whitelist/blacklist pair applied to discovered operations.
#[derive(Debug, Clone, Default)]
pub struct OperationFilter {
    whitelist: Vec<Pattern>,
    blacklist: Vec<Pattern>,
}

impl OperationFilter {
    #[must_use]
    pub fn new(whitelist: &[String], blacklist: &[String]) -> Self {
        Self {
            whitelist: whitelist.iter().map(|p| Pattern::parse(p)).collect(),
            blacklist: blacklist.iter().map(|p| Pattern::parse(p)).collect(),
        }
    }

    /// Whether an operation survives filtering.
    ///
    /// `name` is the operationId (or root field name) when one exists;
    /// `method`/`path` feed method-qualified patterns. GraphQL callers pass
    /// the root field name for all three-ish slots they have (`method` =
    /// `"QUERY"`, `path` = `/{field}`).
    #[must_use]
    pub fn retains_operation(&self, name: Option<&str>, method: &str, path: &str) -> bool {
        let op_whitelist: Vec<&Pattern> = self
            .whitelist
            .iter()
            .filter(|p| !matches!(p, Pattern::Param { .. }))
            .collect();
        if !op_whitelist.is_empty() {
            return op_whitelist
                .iter()
                .any(|p| p.matches_operation(name, method, path));
        }
        !self
            .blacklist
            .iter()
            .any(|p| p.matches_operation(name, method, path))
    }

    /// Whether a flattened parameter survives filtering.
    ///
    /// Per-parameter whitelist entries for a tool, when present, restrict
    /// that tool's parameters; otherwise per-parameter blacklist entries
    /// remove matches.
    #[must_use]
    pub fn retains_param(&self, tool: &str, param: &str) -> bool {
        let scoped: Vec<&Pattern> = self
            .whitelist
            .iter()
            .filter(|p| match p {
                Pattern::Param { tool: pt, .. } => glob_match(pt, tool),
                _ => false,
            })
            .collect();
        if !scoped.is_empty() {
            return scoped.iter().any(|p| p.matches_param(tool, param));
        }
        !self.blacklist.iter().any(|p| p.matches_param(tool, param))
    }
}

/// Segment-aware glob match.
///
/// `*` stops at `/`, `**` does not, `?` is one character.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    glob_match_bytes(pattern.as_bytes(), text.as_bytes())
}

fn glob_match_bytes(p: &[u8], t: &[u8]) -> bool {
    if p.is_empty() {
        return t.is_empty();
    }

    if p.starts_with(b"**") {
        let rest = &p[2..];
        // `**` may consume any prefix of the text, separators included.
        return (0..=t.len()).any(|k| glob_match_bytes(rest, &t[k..]));
    }

    match p[0] {
        b'*' => {
            let rest = &p[1..];
            // Longest run not crossing a segment separator.
            let run = t.iter().position(|&b| b == b'/').unwrap_or(t.len());
            (0..=run).any(|k| glob_match_bytes(rest, &t[k..]))
        }
        b'?' => !t.is_empty() && t[0] != b'/' && glob_match_bytes(&p[1..], &t[1..]),
        b => !t.is_empty() && t[0] == b && glob_match_bytes(&p[1..], &t[1..]),
    }
}
