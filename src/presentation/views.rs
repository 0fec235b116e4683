//! HTML fragments that replace rendered code blocks.

use crate::application::render::{Artifact, RenderFailure};

/// Wrap a rendered SVG for inline display. The SVG is trusted toolchain
/// output and is inserted as-is.
pub fn rendered_svg_fragment(artifact: &Artifact) -> String {
    let mut html = String::with_capacity(artifact.svg.len() + 48);
    html.push_str("<div class=\"latex-rendered-svg\">");
    html.push_str(artifact.svg.trim());
    html.push_str("</div>");
    html
}

/// Error panel showing the diagnostic verbatim and, when available, the
/// original code in a collapsed section.
pub fn render_error_fragment(failure: &RenderFailure) -> String {
    error_fragment(
        &format!("LaTeX Compilation Error:\n{}", failure.diagnostics()),
        Some(failure.original_source.as_str()),
    )
}

pub fn error_fragment(message: &str, original_source: Option<&str>) -> String {
    let mut html = String::from("<div class=\"latex-render-error\">");
    html.push_str("<strong>LaTeX Rendering Failed</strong>");
    html.push_str("<pre>");
    html.push_str(&ammonia::clean_text(message));
    html.push_str("</pre>");

    if let Some(source) = original_source.filter(|source| !source.is_empty()) {
        html.push_str("<hr>");
        html.push_str("<details><summary>Show Original Code</summary><pre><code>");
        html.push_str(&ammonia::clean_text(source));
        html.push_str("</code></pre></details>");
    }

    html.push_str("</div>");
    html
}
