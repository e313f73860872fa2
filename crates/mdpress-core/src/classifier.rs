//! Static detection of source patterns the first-stage compiler cannot
//! safely process. Flagged files are routed to the permissive fallback
//! compiler for the rest of the build invocation.
//!
//! The classifier is deliberately conservative: a false positive costs a
//! slower compile, a false negative surfaces later as a recoverable
//! compile error.

use std::path::Path;

use tracing::debug;

/// Result of scanning one preprocessed source
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub has_problematic_patterns: bool,
    pub reason: Option<String>,
    pub disallowed_imports: Vec<String>,
    pub all_imports: Vec<String>,
}

/// Fenced-code-block state machine
///
/// Grammar: a line whose (left-trimmed) text starts with a run of three
/// or more backticks or tildes is a fence marker. A marker opens a fence
/// when none is open (any trailing info string allowed). While a fence
/// is open, only a marker of the *same* character, at least the *same*
/// length, and with *no* trailing text closes it; anything else is
/// fence content.
#[derive(Debug, Default)]
pub struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns true when the line is scannable content,
    /// i.e. outside any fence and not itself a fence marker.
    pub fn is_scannable(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        let marker = fence_marker(trimmed);

        match (self.open, marker) {
            (None, Some((ch, len, _))) => {
                self.open = Some((ch, len));
                false
            }
            (None, None) => true,
            (Some((open_ch, open_len)), Some((ch, len, rest))) => {
                if ch == open_ch && len >= open_len && rest.trim().is_empty() {
                    self.open = None;
                }
                false
            }
            (Some(_), None) => false,
        }
    }

    pub fn in_fence(&self) -> bool {
        self.open.is_some()
    }
}

/// Leading fence run of a left-trimmed line: (char, run length, rest)
fn fence_marker(trimmed: &str) -> Option<(char, usize, &str)> {
    let first = trimmed.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|&c| c == first).count();
    if len < 3 {
        return None;
    }
    Some((first, len, &trimmed[len..]))
}

/// Scan preprocessed source for patterns the first-stage compiler
/// rejects. Content inside fenced code blocks is never scanned.
pub fn detect(source: &str, allowed_imports: Option<&[String]>, path: &Path) -> Classification {
    let mut result = Classification::default();
    let mut reasons: Vec<String> = Vec::new();
    let mut fences = FenceTracker::new();

    for line in source.lines() {
        if !fences.is_scannable(line) {
            continue;
        }

        if let Some(import_source) = parse_import_source(line) {
            result.all_imports.push(import_source.to_string());
            if let Some(allowed) = allowed_imports {
                if !allowed.iter().any(|a| a == import_source) {
                    result.disallowed_imports.push(import_source.to_string());
                }
            }
        }

        if line.trim_start().starts_with("<!--") && !reasons.iter().any(|r| r.contains("HTML")) {
            reasons.push("contains an HTML comment".to_string());
        }

        if let Some(name) = parse_container_directive(line) {
            if !reasons.iter().any(|r| r.contains("directive")) {
                reasons.push(format!("container directive ':::{name}'"));
            }
        }
    }

    if !result.disallowed_imports.is_empty() {
        reasons.insert(
            0,
            format!(
                "disallowed import source(s): {}",
                result.disallowed_imports.join(", ")
            ),
        );
    }

    if !reasons.is_empty() {
        result.has_problematic_patterns = true;
        result.reason = Some(reasons.join("; "));
        debug!(
            "classified {} for fallback: {}",
            path.display(),
            result.reason.as_deref().unwrap_or("")
        );
    }

    result
}

/// Name of a container directive opener, if the line is one.
///
/// Grammar: a left-trimmed line starting with three or more colons
/// followed by a directive name (`:::note`). A bare `:::` run is a
/// block closer, not an opener. The first-stage compiler has no
/// directive support, so any opener routes the file to fallback.
fn parse_container_directive(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with(":::") {
        return None;
    }
    let name = trimmed.trim_start_matches(':');
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let end = name
        .find(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .unwrap_or(name.len());
    if end == 0 {
        return None;
    }
    Some(&name[..end])
}

/// Module source of an ESM import statement, if the line is one.
///
/// Grammar (one line): `import <clause> from "<source>"` or the
/// side-effect form `import "<source>"`, with either quote character.
/// This scans compiler-bound text, not arbitrary JS, so a line-based
/// scan is sufficient.
fn parse_import_source(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("import")?;
    if !rest.starts_with([' ', '\t', '"', '\'']) {
        return None;
    }

    let after = match rest.find(" from ") {
        Some(idx) => &rest[idx + " from ".len()..],
        None => rest,
    };

    let after = after.trim_start();
    let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = &after[1..];
    let end = inner.find(quote)?;
    Some(&inner[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(source: &str, allowed: Option<&[String]>) -> Classification {
        detect(source, allowed, Path::new("/docs/test.mdx"))
    }

    #[test]
    fn test_collects_imports_without_allowlist() {
        let source = "import Chart from \"@lib/chart\"\n\n# Title\n";
        let result = classify(source, None);
        assert_eq!(result.all_imports, vec!["@lib/chart"]);
        assert!(!result.has_problematic_patterns);
    }

    #[test]
    fn test_disallowed_import_flags() {
        let allowed = vec!["@components/callout".to_string()];
        let source = "import Chart from \"@lib/chart\"\nimport Callout from \"@components/callout\"\n";
        let result = classify(source, Some(&allowed));

        assert!(result.has_problematic_patterns);
        assert_eq!(result.disallowed_imports, vec!["@lib/chart"]);
        assert_eq!(result.all_imports.len(), 2);
        assert!(result.reason.unwrap().contains("@lib/chart"));
    }

    #[test]
    fn test_side_effect_import() {
        let allowed: Vec<String> = vec![];
        let result = classify("import \"./styles.css\"\n", Some(&allowed));
        assert_eq!(result.disallowed_imports, vec!["./styles.css"]);
    }

    #[test]
    fn test_import_inside_fence_ignored() {
        let allowed: Vec<String> = vec![];
        let source = "```js\nimport Chart from \"@lib/chart\"\n```\n";
        let result = classify(source, Some(&allowed));
        assert!(!result.has_problematic_patterns);
        assert!(result.all_imports.is_empty());
    }

    #[test]
    fn test_fence_aware_directive_case() {
        // A directive inside a proper fence is ignored; the same
        // directive outside must be flagged.
        let source = "```\n:::note\ncontent\n:::\n```\n:::note\nreal\n:::";
        let result = classify(source, None);
        assert!(result.has_problematic_patterns);
        assert!(result.reason.as_deref().unwrap().contains(":::note"));

        let fenced_only = "```\n:::note\ncontent\n:::\n```\n";
        assert!(!classify(fenced_only, None).has_problematic_patterns);
    }

    #[test]
    fn test_directive_closer_is_not_an_opener() {
        assert_eq!(parse_container_directive(":::note"), Some("note"));
        assert_eq!(parse_container_directive(":::"), None);
        assert_eq!(parse_container_directive("::: "), None);
        assert_eq!(parse_container_directive("::note"), None);
    }

    #[test]
    fn test_html_comment_flags() {
        let result = classify("# Title\n<!-- todo -->\n", None);
        assert!(result.has_problematic_patterns);
        assert_eq!(result.reason.as_deref(), Some("contains an HTML comment"));
    }

    #[test]
    fn test_fence_closer_must_match_char() {
        let mut fences = FenceTracker::new();
        assert!(!fences.is_scannable("```"));
        assert!(!fences.is_scannable("~~~")); // different char: content
        assert!(fences.in_fence());
        assert!(!fences.is_scannable("```"));
        assert!(!fences.in_fence());
    }

    #[test]
    fn test_fence_closer_must_be_long_enough() {
        let mut fences = FenceTracker::new();
        assert!(!fences.is_scannable("````"));
        assert!(!fences.is_scannable("```")); // too short: content
        assert!(fences.in_fence());
        assert!(!fences.is_scannable("`````")); // longer is fine
        assert!(!fences.in_fence());
    }

    #[test]
    fn test_fence_closer_rejects_info_string() {
        let mut fences = FenceTracker::new();
        assert!(!fences.is_scannable("```js"));
        assert!(!fences.is_scannable("```js")); // trailing text: not a closer
        assert!(fences.in_fence());
        assert!(!fences.is_scannable("``` "));
        assert!(!fences.in_fence()); // trailing whitespace only still closes
    }

    #[test]
    fn test_tilde_fences() {
        let allowed: Vec<String> = vec![];
        let source = "~~~\nimport X from \"x\"\n~~~\n";
        let result = classify(source, Some(&allowed));
        assert!(!result.has_problematic_patterns);
    }

    #[test]
    fn test_short_runs_are_not_fences() {
        let mut fences = FenceTracker::new();
        assert!(fences.is_scannable("``inline``"));
        assert!(!fences.in_fence());
    }
}
