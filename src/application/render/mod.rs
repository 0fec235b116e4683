//! LaTeX rendering pipeline.
//!
//! A code block is fingerprinted, looked up in the SVG cache, and on a miss
//! compiled by two external tools (`pdflatex` to DVI, `dvisvgm` to SVG) in a
//! per-fingerprint workspace. Successful output is stored atomically; failures
//! come back as a [`RenderFailure`] and are never cached.

mod pipeline;
mod runtime;
mod service;
mod types;

pub use pipeline::{BlockContext, RenderPipeline, RenderRequestHandler};
pub use runtime::{FingerprintGuard, FingerprintLocks};
pub use service::{
    cache::CacheStore,
    compiler::CompilerInvoker,
    fingerprint::{Fingerprint, fingerprint},
    process::{LaunchError, LaunchSpec, ProcessLauncher, ProcessOutput, TokioProcessLauncher},
    workspace::Workspace,
};
pub use types::{
    Artifact, ArtifactOrigin, CacheError, RenderConfig, RenderError, RenderFailure, RenderFlags,
    RenderRequest, Stage,
};
