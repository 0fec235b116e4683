use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

use super::service::fingerprint::{Fingerprint, fingerprint};

/// Compilation switches that change what the typesetting engine produces.
///
/// Every field here must flow into the fingerprint, otherwise two requests
/// that compile differently would share one cache entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RenderFlags {
    /// Pass `-shell-escape` to the typesetting stage.
    pub shell_escape: bool,
}

impl RenderFlags {
    /// Stable byte encoding used when hashing the flags.
    pub(crate) fn serialized(&self) -> String {
        format!("shell_escape={}", self.shell_escape)
    }
}

/// Rendering request for a single code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Snippet captured from the code block.
    pub body: String,
    /// Document prologue, ending in `\begin{document}`.
    pub preamble: String,
    pub flags: RenderFlags,
}

impl RenderRequest {
    pub fn new(preamble: impl Into<String>, body: impl Into<String>, flags: RenderFlags) -> Self {
        Self {
            body: body.into(),
            preamble: preamble.into(),
            flags,
        }
    }

    /// Build a request using the preamble and flags of a configuration snapshot.
    pub fn from_config(config: &RenderConfig, body: impl Into<String>) -> Self {
        Self::new(config.preamble.clone(), body, config.flags())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.preamble, &self.body, &self.flags)
    }
}

/// Immutable snapshot of the render settings, handed to every pipeline call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    pub preamble: String,
    pub shell_escape: bool,
    pub typeset_path: PathBuf,
    pub convert_path: PathBuf,
    pub cache_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub typeset_timeout: Duration,
    pub convert_timeout: Duration,
    /// Remove workspace files after a successful render.
    pub cleanup_enabled: bool,
    /// Also remove workspace files after a failed render.
    pub cleanup_on_failure: bool,
    /// Fence languages recognised as renderable blocks.
    pub language_tags: Vec<String>,
}

impl RenderConfig {
    pub fn flags(&self) -> RenderFlags {
        RenderFlags {
            shell_escape: self.shell_escape,
        }
    }

    pub fn matches_language(&self, language: &str) -> bool {
        self.language_tags
            .iter()
            .any(|tag| tag.eq_ignore_ascii_case(language))
    }
}

impl From<&crate::config::RenderSettings> for RenderConfig {
    fn from(settings: &crate::config::RenderSettings) -> Self {
        Self {
            preamble: settings.preamble.clone(),
            shell_escape: settings.shell_escape,
            typeset_path: settings.typeset_path.clone(),
            convert_path: settings.convert_path.clone(),
            cache_dir: settings.cache_dir.clone(),
            temp_dir: settings.temp_dir.clone(),
            typeset_timeout: settings.typeset_timeout,
            convert_timeout: settings.convert_timeout,
            cleanup_enabled: settings.cleanup_enabled,
            cleanup_on_failure: settings.cleanup_on_failure,
            language_tags: settings.language_tags.clone(),
        }
    }
}

/// Where an artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOrigin {
    Cache,
    Fresh,
}

/// Rendered SVG returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub fingerprint: Fingerprint,
    pub svg: String,
    pub origin: ArtifactOrigin,
}

/// External compilation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// LaTeX source to DVI.
    Typeset,
    /// DVI to SVG.
    Convert,
}

impl Stage {
    pub fn number(self) -> u8 {
        match self {
            Stage::Typeset => 1,
            Stage::Convert => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Typeset => "typeset",
            Stage::Convert => "convert",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.as_str())
    }
}

/// Fatal job errors. None of these leave a cache entry behind.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("workspace unavailable at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} failed (exit {exit_code:?}):\n{diagnostics}")]
    CompileStageFailure {
        stage: Stage,
        exit_code: Option<i32>,
        diagnostics: String,
    },
    #[error("{stage} timed out after {}s", timeout.as_secs_f64())]
    CompileTimeout { stage: Stage, timeout: Duration },
    #[error("{stage} reported success but {} is missing or unreadable", path.display())]
    MissingIntermediateArtifact { stage: Stage, path: PathBuf },
    #[error("{stage} executable {} could not be started: {source}", program.display())]
    ToolUnavailable {
        stage: Stage,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    /// Stage the failure is attributed to; `None` for workspace problems.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RenderError::Workspace { .. } => None,
            RenderError::CompileStageFailure { stage, .. }
            | RenderError::CompileTimeout { stage, .. }
            | RenderError::MissingIntermediateArtifact { stage, .. }
            | RenderError::ToolUnavailable { stage, .. } => Some(*stage),
        }
    }
}

/// Structured failure surfaced to the host, echoing the offending source.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RenderFailure {
    #[source]
    pub error: RenderError,
    pub original_source: String,
}

impl RenderFailure {
    pub fn new(error: RenderError, original_source: impl Into<String>) -> Self {
        Self {
            error,
            original_source: original_source.into(),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        self.error.stage()
    }

    /// Human-readable diagnostic, shown verbatim next to the source.
    pub fn diagnostics(&self) -> String {
        self.error.to_string()
    }
}

/// Cache problems. Never fatal to a render.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache entry {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write cache entry {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
