//! Markdown documents with embedded LaTeX code blocks.
//!
//! Blocks whose fence language is one of the configured tags are rendered
//! through a [`RenderRequestHandler`], at most [`MAX_CONCURRENT_BLOCKS`] at a
//! time, and replaced by HTML fragments; everything else goes through comrak
//! untouched.

use comrak::{
    Arena, Options, format_html,
    nodes::{AstNode, NodeHtmlBlock, NodeValue},
    parse_document,
};
use futures::{StreamExt, stream};
use thiserror::Error;
use tracing::info;

use crate::application::render::{BlockContext, RenderConfig, RenderRequestHandler};
use crate::presentation::{render_error_fragment, rendered_svg_fragment};

/// Upper bound on blocks handed to the toolchain at once for one document.
pub const MAX_CONCURRENT_BLOCKS: usize = 4;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("markdown formatting failed: {message}")]
    Markdown { message: String },
}

/// Rendered document plus per-block tallies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub html: String,
    pub rendered_blocks: usize,
    pub failed_blocks: usize,
}

pub async fn render_markdown<H>(
    handler: &H,
    config: &RenderConfig,
    markdown: &str,
    document: Option<&str>,
) -> Result<RenderedDocument, DocumentError>
where
    H: RenderRequestHandler + ?Sized,
{
    let sources = collect_blocks(markdown, config);
    let contexts: Vec<BlockContext> = (0..sources.len())
        .map(|index| BlockContext::new(document.map(str::to_string), index))
        .collect();

    let outcomes: Vec<_> = stream::iter(
        sources
            .iter()
            .zip(contexts.iter())
            .map(|(source, context)| handler.handle(config, source, context)),
    )
    .buffered(MAX_CONCURRENT_BLOCKS)
    .collect()
    .await;

    let mut rendered_blocks = 0;
    let mut failed_blocks = 0;
    let fragments: Vec<String> = outcomes
        .iter()
        .map(|outcome| match outcome {
            Ok(artifact) => {
                rendered_blocks += 1;
                rendered_svg_fragment(artifact)
            }
            Err(failure) => {
                failed_blocks += 1;
                render_error_fragment(failure)
            }
        })
        .collect();

    let html = splice_fragments(markdown, config, fragments)?;
    info!(
        target = "application::document",
        op = "document::render_markdown",
        document = document.unwrap_or("-"),
        rendered_blocks,
        failed_blocks,
        "Markdown document rendered"
    );

    Ok(RenderedDocument {
        html,
        rendered_blocks,
        failed_blocks,
    })
}

/// Source of every renderable block, in document order.
pub fn collect_blocks(markdown: &str, config: &RenderConfig) -> Vec<String> {
    let arena = Arena::new();
    let options = markdown_options();
    let root = parse_document(&arena, markdown, &options);

    root.descendants()
        .filter_map(|node| renderable_block(node, config))
        .collect()
}

fn splice_fragments(
    markdown: &str,
    config: &RenderConfig,
    fragments: Vec<String>,
) -> Result<String, DocumentError> {
    let arena = Arena::new();
    let options = markdown_options();
    let root = parse_document(&arena, markdown, &options);

    let targets: Vec<&AstNode<'_>> = root
        .descendants()
        .filter(|node| renderable_block(node, config).is_some())
        .collect();

    for (node, fragment) in targets.into_iter().zip(fragments) {
        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: format!("{fragment}\n"),
        });
    }

    let mut html = String::new();
    format_html(root, &options, &mut html).map_err(|err| DocumentError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}

fn renderable_block(node: &AstNode<'_>, config: &RenderConfig) -> Option<String> {
    let data = node.data.borrow();
    let NodeValue::CodeBlock(block) = &data.value else {
        return None;
    };
    let language = block.info.split_whitespace().next()?;
    config
        .matches_language(language)
        .then(|| block.literal.clone())
}

fn markdown_options() -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.tasklist = true;
    ext.footnotes = true;
    options.render.r#unsafe = true;
    options
}
