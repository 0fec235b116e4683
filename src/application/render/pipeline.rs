use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use metrics::counter;
use tracing::{info, warn};

use super::{
    runtime::FingerprintLocks,
    service::{
        cache::CacheStore,
        compiler::CompilerInvoker,
        fingerprint::Fingerprint,
        process::{ProcessLauncher, TokioProcessLauncher},
        workspace::Workspace,
    },
    types::{Artifact, ArtifactOrigin, RenderConfig, RenderError, RenderFailure, RenderRequest},
};

const METRIC_CACHE_HIT: &str = "texsvg_render_cache_hit_total";
const METRIC_CACHE_MISS: &str = "texsvg_render_cache_miss_total";
const METRIC_CACHE_ERROR: &str = "texsvg_render_cache_error_total";
const METRIC_RENDER_FAILURE: &str = "texsvg_render_failure_total";

/// Where a code block came from, for diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockContext {
    /// Document the block belongs to, when known.
    pub document: Option<String>,
    /// Zero-based position of the block within its document.
    pub index: usize,
}

impl BlockContext {
    pub fn new(document: Option<String>, index: usize) -> Self {
        Self { document, index }
    }
}

/// Entry point the host calls for every renderable code block.
#[async_trait]
pub trait RenderRequestHandler: Send + Sync {
    async fn handle(
        &self,
        config: &RenderConfig,
        source: &str,
        context: &BlockContext,
    ) -> Result<Artifact, RenderFailure>;
}

/// Cache-first LaTeX to SVG renderer.
///
/// Each call: fingerprint, cache lookup, and on a miss write the source,
/// typeset to DVI, convert to SVG, store, return. Failures are never cached.
#[derive(Clone)]
pub struct RenderPipeline {
    launcher: Arc<dyn ProcessLauncher>,
    locks: FingerprintLocks,
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new(Arc::new(TokioProcessLauncher))
    }
}

impl RenderPipeline {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            locks: FingerprintLocks::new(),
        }
    }

    pub async fn render(
        &self,
        config: &RenderConfig,
        request: &RenderRequest,
    ) -> Result<Artifact, RenderFailure> {
        let started_at = Instant::now();
        let fingerprint = request.fingerprint();
        let cache = CacheStore::new(&config.cache_dir);

        if let Some(artifact) = lookup_cached(&cache, &fingerprint, started_at).await {
            return Ok(artifact);
        }

        let _guard = self.locks.acquire(&fingerprint).await;
        // A job holding the same fingerprint may have filled the cache meanwhile.
        if let Some(artifact) = lookup_cached(&cache, &fingerprint, started_at).await {
            return Ok(artifact);
        }
        counter!(METRIC_CACHE_MISS).increment(1);

        let workspace = Workspace::new(&config.temp_dir, fingerprint.clone());
        match self.compile(config, request, &workspace).await {
            Ok(svg) => {
                if let Err(err) = cache.store(&fingerprint, &svg).await {
                    counter!(METRIC_CACHE_ERROR, "op" => "write").increment(1);
                    warn!(
                        target = "application::render::pipeline",
                        op = "pipeline::render",
                        result = "cache_write_error",
                        fingerprint = %fingerprint,
                        error = %err,
                        "Failed to store rendered SVG; serving it uncached"
                    );
                }
                if config.cleanup_enabled {
                    workspace.cleanup().await;
                }
                info!(
                    target = "application::render::pipeline",
                    op = "pipeline::render",
                    result = "cache_miss",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    fingerprint = %fingerprint,
                    svg_bytes = svg.len(),
                    "LaTeX block rendered via toolchain"
                );
                Ok(Artifact {
                    fingerprint,
                    svg,
                    origin: ArtifactOrigin::Fresh,
                })
            }
            Err(error) => {
                let stage = error.stage().map(|stage| stage.as_str()).unwrap_or("workspace");
                counter!(METRIC_RENDER_FAILURE, "stage" => stage).increment(1);
                warn!(
                    target = "application::render::pipeline",
                    op = "pipeline::render",
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    fingerprint = %fingerprint,
                    stage,
                    error = %error,
                    "LaTeX block failed to render"
                );
                if config.cleanup_on_failure {
                    workspace.cleanup().await;
                }
                Err(RenderFailure::new(error, request.body.clone()))
            }
        }
    }

    async fn compile(
        &self,
        config: &RenderConfig,
        request: &RenderRequest,
        workspace: &Workspace,
    ) -> Result<String, RenderError> {
        let compiler = CompilerInvoker::new(Arc::clone(&self.launcher), config);
        workspace
            .write_source(&request.preamble, &request.body)
            .await?;
        workspace.clear_outputs().await?;
        compiler.typeset(workspace, request.flags.shell_escape).await?;
        compiler.convert(workspace).await
    }
}

#[async_trait]
impl RenderRequestHandler for RenderPipeline {
    async fn handle(
        &self,
        config: &RenderConfig,
        source: &str,
        context: &BlockContext,
    ) -> Result<Artifact, RenderFailure> {
        let request = RenderRequest::from_config(config, source);
        let result = self.render(config, &request).await;
        if let Err(failure) = &result {
            warn!(
                target = "application::render::pipeline",
                op = "pipeline::handle",
                document = context.document.as_deref().unwrap_or("-"),
                block = context.index,
                error = %failure,
                "Code block rendering failed"
            );
        }
        result
    }
}

async fn lookup_cached(
    cache: &CacheStore,
    fingerprint: &Fingerprint,
    started_at: Instant,
) -> Option<Artifact> {
    match cache.lookup(fingerprint).await {
        Ok(Some(svg)) => {
            counter!(METRIC_CACHE_HIT).increment(1);
            info!(
                target = "application::render::pipeline",
                op = "pipeline::render",
                result = "cache_hit",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                fingerprint = %fingerprint,
                svg_bytes = svg.len(),
                "LaTeX block served from cache"
            );
            Some(Artifact {
                fingerprint: fingerprint.clone(),
                svg,
                origin: ArtifactOrigin::Cache,
            })
        }
        Ok(None) => None,
        Err(err) => {
            counter!(METRIC_CACHE_ERROR, "op" => "read").increment(1);
            warn!(
                target = "application::render::pipeline",
                op = "pipeline::render",
                result = "cache_read_error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                fingerprint = %fingerprint,
                error = %err,
                "Failed to read cached SVG; re-rendering"
            );
            None
        }
    }
}
