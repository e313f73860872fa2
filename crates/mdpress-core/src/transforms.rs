//! Built-in pipeline steps
//!
//! Two fixed steps run between the user hook phases: component
//! injection (adds imports for registry components referenced in the
//! compiled JSX) and rendering (wraps the JSX body into a content
//! component with frontmatter/headings exports).

use std::sync::Arc;

use crate::compiler::Heading;
use crate::config::EnvToggles;
use crate::pipeline::{Plugin, TransformContext, TransformHook, TransformPipeline};
use crate::registry::{ComponentRegistry, ExportType};

/// The standard pipeline: user plugins plus the built-in steps in
/// their fixed slots. The plain-directives toggle selects the
/// alternate pipeline without the injection step.
pub fn standard_pipeline(
    plugins: Vec<Plugin>,
    registry: Arc<ComponentRegistry>,
    toggles: &EnvToggles,
) -> TransformPipeline {
    let pipeline = TransformPipeline::new(plugins).with_rendering(render_step());
    if toggles.plain_directives {
        pipeline
    } else {
        pipeline.with_injection(injection_step(registry))
    }
}

/// Built-in injection step: prepend an import statement for every
/// registry component referenced in the code and not already imported
pub fn injection_step(registry: Arc<ComponentRegistry>) -> TransformHook {
    Arc::new(move |mut ctx: TransformContext| {
        let imports = component_imports(&ctx.code, &registry);
        if !imports.is_empty() {
            ctx.code = format!("{}\n{}", imports.join("\n"), ctx.code);
        }
        Ok(ctx)
    })
}

/// Import lines for referenced-but-unimported registry components
fn component_imports(code: &str, registry: &ComponentRegistry) -> Vec<String> {
    let mut imports = Vec::new();
    for (name, def) in registry.all_components() {
        let referenced = code.contains(&format!("<{name}"));
        let already_imported = code
            .lines()
            .any(|l| l.trim_start().starts_with("import") && l.contains(name));
        if referenced && !already_imported {
            let line = match def.export_type {
                ExportType::Default => {
                    format!("import {name} from \"{}\";", def.module_path)
                }
                ExportType::Named => {
                    format!("import {{ {name} }} from \"{}\";", def.module_path)
                }
            };
            imports.push(line);
        }
    }
    imports
}

/// Built-in rendering step: wrap the body into the content component
pub fn render_step() -> TransformHook {
    Arc::new(|mut ctx: TransformContext| {
        if !ctx.code.contains("function MDXContent") {
            ctx.code = wrap_module(&ctx.code, &ctx.frontmatter, &ctx.headings);
        }
        Ok(ctx)
    })
}

/// Wrap compiled JSX into a renderable content module: imports stay on
/// top, metadata exports follow, and the body becomes MDXContent.
/// Shared with the permissive path, which skips the pipeline.
pub fn wrap_module(code: &str, frontmatter: &str, headings: &[Heading]) -> String {
    let mut imports = Vec::new();
    let mut body = Vec::new();
    for line in code.lines() {
        if line.trim_start().starts_with("import ") || line.trim_start().starts_with("import\"") {
            imports.push(line);
        } else {
            body.push(line);
        }
    }

    let headings_json =
        serde_json::to_string(headings).unwrap_or_else(|_| "[]".to_string());
    let frontmatter = if frontmatter.is_empty() {
        "{}"
    } else {
        frontmatter
    };

    let mut out = String::with_capacity(code.len() + 256);
    for line in &imports {
        out.push_str(line);
        out.push('\n');
    }
    if !imports.is_empty() {
        out.push('\n');
    }
    out.push_str(&format!("export const frontmatter = {frontmatter};\n"));
    out.push_str(&format!("export const headings = {headings_json};\n\n"));
    out.push_str("function MDXContent() {\n  return (\n    <>\n");
    for line in &body {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str("      ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str("    </>\n  );\n}\n");
    out
}
