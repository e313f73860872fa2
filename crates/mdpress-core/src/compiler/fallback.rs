//! Permissive fallback compiler
//!
//! Used for every file the classifier routes away from the first-stage
//! compiler, and for any file whose primary compile fails with a
//! recoverable error. Accepts anything CommonMark accepts; trades
//! fidelity (no MDX expressions, imports rendered inert) for never
//! rejecting input.

use std::path::Path;

use pulldown_cmark::{html, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{CompiledModule, Heading};
use crate::classifier::FenceTracker;
use crate::registry::ComponentRegistry;

pub struct FallbackCompiler {
    registry: ComponentRegistry,
}

impl FallbackCompiler {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self { registry }
    }

    /// Compile one source file. Infallible: malformed frontmatter or
    /// unknown directives degrade with a diagnostic instead of failing.
    pub fn compile(&self, source: &str, path: &Path) -> CompiledModule {
        debug!("fallback compiling {}", path.display());

        let mut diagnostics = Vec::new();
        let (frontmatter, body) = split_frontmatter(source);
        let frontmatter = match frontmatter {
            Some(yaml) => match serde_yaml::from_str::<serde_json::Value>(yaml) {
                Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string()),
                Err(e) => {
                    diagnostics.push(format!("invalid frontmatter: {e}"));
                    "{}".to_string()
                }
            },
            None => "{}".to_string(),
        };

        let rewritten = self.rewrite_directives(body, &mut diagnostics);
        let headings = collect_headings(&rewritten);

        let parser = Parser::new_ext(&rewritten, Options::empty());
        let mut rendered = String::with_capacity(rewritten.len() * 2);
        html::push_html(&mut rendered, parser);

        CompiledModule {
            code: jsxify(&rendered),
            frontmatter,
            headings,
            diagnostics,
        }
    }

    /// Replace container directive blocks with component tags before
    /// markdown rendering. Fence-aware; unmapped directives degrade to
    /// a plain section element.
    fn rewrite_directives(&self, body: &str, diagnostics: &mut Vec<String>) -> String {
        let mut out = String::with_capacity(body.len());
        let mut fences = FenceTracker::new();
        let mut stack: Vec<String> = Vec::new();

        for line in body.lines() {
            let scannable = fences.is_scannable(line);
            let trimmed = line.trim_start();

            if scannable && trimmed.starts_with(":::") {
                let name = trimmed.trim_start_matches(':').trim();
                if name.is_empty() {
                    // Block closer
                    match stack.pop() {
                        Some(tag) => {
                            out.push_str(&format!("\n</{tag}>\n"));
                        }
                        None => diagnostics
                            .push("unbalanced directive closer ':::'".to_string()),
                    }
                } else {
                    let name: String = name
                        .chars()
                        .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
                        .collect();
                    let tag = match self.registry.lookup_directive(&name) {
                        Some(component) => component.to_string(),
                        None => {
                            diagnostics.push(format!("unmapped directive ':::{name}'"));
                            "section".to_string()
                        }
                    };
                    if tag == "section" {
                        out.push_str(&format!("\n<section data-directive=\"{name}\">\n"));
                        stack.push("section".to_string());
                    } else {
                        out.push_str(&format!("\n<{tag}>\n"));
                        stack.push(tag);
                    }
                }
                continue;
            }

            out.push_str(line);
            out.push('\n');
        }

        while let Some(tag) = stack.pop() {
            diagnostics.push(format!("unclosed directive block <{tag}>"));
            out.push_str(&format!("\n</{tag}>\n"));
        }

        out
    }
}

/// Split a leading `---` fenced YAML frontmatter block off the body
fn split_frontmatter(source: &str) -> (Option<&str>, &str) {
    let rest = match source.strip_prefix("---\n").or_else(|| source.strip_prefix("---\r\n")) {
        Some(rest) => rest,
        None => return (None, source),
    };

    for terminator in ["\n---\n", "\n---\r\n"] {
        if let Some(end) = rest.find(terminator) {
            return (Some(&rest[..end]), &rest[end + terminator.len()..]);
        }
    }
    if let Some(yaml) = rest.strip_suffix("\n---") {
        return (Some(yaml), "");
    }

    (None, source)
}

/// Collect headings in document order, assigning GitHub-style slugs
/// with `-1`, `-2` suffixes on repeats
fn collect_headings(body: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut seen: FxHashMap<String, usize> = FxHashMap::default();

    let parser = Parser::new_ext(body, Options::empty());
    let mut current: Option<(u8, String)> = None;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some((heading_depth(level), String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, buf)) = current.as_mut() {
                    buf.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((depth, text)) = current.take() {
                    let base = slugify(&text);
                    let slug = match seen.get(&base).copied() {
                        None => base.clone(),
                        Some(n) => format!("{base}-{n}"),
                    };
                    *seen.entry(base).or_insert(0) += 1;
                    headings.push(Heading { depth, slug, text });
                }
            }
            _ => {}
        }
    }

    headings
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Minimal HTML-to-JSX attribute fixes on rendered output. The input is
/// renderer output, not arbitrary HTML, so a text substitution is
/// sufficient here.
fn jsxify(rendered: &str) -> String {
    rendered.replace("class=\"", "className=\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ComponentDefinition, ExportType, RegistryConfig};

    fn compiler_with_note_mapping() -> FallbackCompiler {
        let mut config = RegistryConfig::default();
        config
            .directives
            .insert("note".to_string(), "Callout".to_string());
        config.components.insert(
            "Callout".to_string(),
            ComponentDefinition {
                module_path: "@components/Callout".to_string(),
                export_type: ExportType::Default,
            },
        );
        FallbackCompiler::new(ComponentRegistry::new(config))
    }

    fn plain_compiler() -> FallbackCompiler {
        FallbackCompiler::new(ComponentRegistry::default())
    }

    #[test]
    fn test_compiles_basic_markdown() {
        let module = plain_compiler().compile("# Hello\n\nSome **bold** text.", Path::new("/a.md"));

        assert!(module.code.contains("<h1>Hello</h1>"));
        assert!(module.code.contains("<strong>bold</strong>"));
        assert_eq!(module.frontmatter, "{}");
        assert_eq!(module.headings.len(), 1);
        assert_eq!(module.headings[0].slug, "hello");
        assert!(module.diagnostics.is_empty());
    }

    #[test]
    fn test_frontmatter_extracted_as_json() {
        let source = "---\ntitle: Guide\norder: 2\n---\n# Body\n";
        let module = plain_compiler().compile(source, Path::new("/a.md"));

        let value: serde_json::Value = serde_json::from_str(&module.frontmatter).unwrap();
        assert_eq!(value["title"], "Guide");
        assert_eq!(value["order"], 2);
        assert!(!module.code.contains("title: Guide"));
    }

    #[test]
    fn test_invalid_frontmatter_degrades() {
        let source = "---\n: bad: [yaml\n---\n# Body\n";
        let module = plain_compiler().compile(source, Path::new("/a.md"));

        assert_eq!(module.frontmatter, "{}");
        assert_eq!(module.diagnostics.len(), 1);
        assert!(module.diagnostics[0].contains("frontmatter"));
        assert!(module.code.contains("<h1>Body</h1>"));
    }

    #[test]
    fn test_mapped_directive_becomes_component() {
        let source = ":::note\nBe careful.\n:::\n";
        let module = compiler_with_note_mapping().compile(source, Path::new("/a.md"));

        assert!(module.code.contains("<Callout>"));
        assert!(module.code.contains("</Callout>"));
        assert!(module.code.contains("Be careful."));
        assert!(module.diagnostics.is_empty());
    }

    #[test]
    fn test_unmapped_directive_degrades_to_section() {
        let source = ":::tip\nHello.\n:::\n";
        let module = plain_compiler().compile(source, Path::new("/a.md"));

        assert!(module.code.contains("<section data-directive=\"tip\">"));
        assert_eq!(module.diagnostics, vec!["unmapped directive ':::tip'"]);
    }

    #[test]
    fn test_directive_inside_fence_untouched() {
        let source = "```\n:::note\n```\n";
        let module = compiler_with_note_mapping().compile(source, Path::new("/a.md"));

        assert!(!module.code.contains("<Callout>"));
        assert!(module.code.contains(":::note"));
    }

    #[test]
    fn test_heading_slug_dedup() {
        let source = "# Setup\n\n## Setup\n\n### Other\n";
        let module = plain_compiler().compile(source, Path::new("/a.md"));

        let slugs: Vec<&str> = module.headings.iter().map(|h| h.slug.as_str()).collect();
        assert_eq!(slugs, vec!["setup", "setup-1", "other"]);
        let depths: Vec<u8> = module.headings.iter().map(|h| h.depth).collect();
        assert_eq!(depths, vec![1, 2, 3]);
    }

    #[test]
    fn test_code_block_language_class_is_jsx() {
        let source = "```js\nlet x = 1\n```\n";
        let module = plain_compiler().compile(source, Path::new("/a.md"));

        assert!(module.code.contains("className=\"language-js\""));
        assert!(!module.code.contains("class=\"language-js\""));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("What's New?"), "what-s-new");
        assert_eq!(slugify("  spaced  "), "spaced");
    }
}
