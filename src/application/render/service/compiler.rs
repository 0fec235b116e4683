use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::histogram;
use tokio::fs;
use tracing::{info, warn};

use crate::application::render::types::{RenderConfig, RenderError, Stage};

use super::{
    process::{LaunchError, LaunchSpec, ProcessLauncher, ProcessOutput},
    workspace::Workspace,
};

const METRIC_STAGE_MS: &str = "texsvg_render_stage_ms";

/// Runs the two external stages of a render and verifies what they leave
/// behind. Stages are never retried.
#[derive(Clone)]
pub struct CompilerInvoker {
    launcher: Arc<dyn ProcessLauncher>,
    typeset_path: PathBuf,
    convert_path: PathBuf,
    typeset_timeout: Duration,
    convert_timeout: Duration,
}

impl CompilerInvoker {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, config: &RenderConfig) -> Self {
        Self {
            launcher,
            typeset_path: config.typeset_path.clone(),
            convert_path: config.convert_path.clone(),
            typeset_timeout: config.typeset_timeout,
            convert_timeout: config.convert_timeout,
        }
    }

    /// Stage 1 invocation: non-interactive, halting on the first error,
    /// writing DVI under the fingerprint job name.
    pub fn typeset_spec(&self, workspace: &Workspace, shell_escape: bool) -> LaunchSpec {
        let mut spec = LaunchSpec::new(&self.typeset_path, self.typeset_timeout)
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg("-output-format=dvi")
            .arg("-jobname")
            .arg(workspace.job_name());
        if shell_escape {
            spec = spec.arg("-shell-escape");
        }
        spec.arg(workspace.source_file_name())
            .current_dir(workspace.root())
    }

    /// Stage 2 invocation: DVI to SVG with glyphs as paths and a tight box.
    pub fn convert_spec(&self, workspace: &Workspace) -> LaunchSpec {
        LaunchSpec::new(&self.convert_path, self.convert_timeout)
            .arg("--no-fonts")
            .arg("--exact")
            .arg("-o")
            .arg(workspace.output_path())
            .arg(workspace.intermediate_path())
    }

    /// Run stage 1 and confirm the DVI file is readable.
    pub async fn typeset(
        &self,
        workspace: &Workspace,
        shell_escape: bool,
    ) -> Result<ProcessOutput, RenderError> {
        let spec = self.typeset_spec(workspace, shell_escape);
        let output = self.run_stage(Stage::Typeset, &spec).await?;
        verify_readable(Stage::Typeset, &workspace.intermediate_path()).await?;
        Ok(output)
    }

    /// Run stage 2 and read back the SVG it produced.
    pub async fn convert(&self, workspace: &Workspace) -> Result<String, RenderError> {
        let spec = self.convert_spec(workspace);
        self.run_stage(Stage::Convert, &spec).await?;
        let output_path = workspace.output_path();
        fs::read_to_string(&output_path)
            .await
            .map_err(|_| RenderError::MissingIntermediateArtifact {
                stage: Stage::Convert,
                path: output_path,
            })
    }

    async fn run_stage(&self, stage: Stage, spec: &LaunchSpec) -> Result<ProcessOutput, RenderError> {
        let started_at = Instant::now();
        let result = self.launcher.launch(spec).await;
        let elapsed = started_at.elapsed();
        histogram!(METRIC_STAGE_MS, "stage" => stage.as_str())
            .record(elapsed.as_secs_f64() * 1000.0);

        let output = result.map_err(|err| {
            let error = launch_failure(stage, spec, err);
            warn!(
                target = "application::render::compiler",
                op = "compiler::run_stage",
                stage = stage.as_str(),
                result = "error",
                elapsed_ms = elapsed.as_millis() as u64,
                program = %spec.program.display(),
                error = %error,
                "Render stage could not complete"
            );
            error
        })?;

        if !output.success {
            warn!(
                target = "application::render::compiler",
                op = "compiler::run_stage",
                stage = stage.as_str(),
                result = "error",
                elapsed_ms = elapsed.as_millis() as u64,
                exit_code = output.exit_code.map(i64::from).unwrap_or(-1),
                program = %spec.program.display(),
                "Render stage exited unsuccessfully"
            );
            return Err(RenderError::CompileStageFailure {
                stage,
                exit_code: output.exit_code,
                diagnostics: output.diagnostics(),
            });
        }

        info!(
            target = "application::render::compiler",
            op = "compiler::run_stage",
            stage = stage.as_str(),
            result = "ok",
            elapsed_ms = elapsed.as_millis() as u64,
            "Render stage finished"
        );
        Ok(output)
    }
}

fn launch_failure(stage: Stage, spec: &LaunchSpec, err: LaunchError) -> RenderError {
    match err {
        LaunchError::Timeout { timeout } => RenderError::CompileTimeout { stage, timeout },
        LaunchError::NotFound(source) | LaunchError::Spawn(source) => {
            RenderError::ToolUnavailable {
                stage,
                program: spec.program.clone(),
                source,
            }
        }
        LaunchError::Io(source) => RenderError::CompileStageFailure {
            stage,
            exit_code: None,
            diagnostics: format!("failed to collect process output: {source}"),
        },
    }
}

async fn verify_readable(stage: Stage, path: &Path) -> Result<(), RenderError> {
    match fs::File::open(path).await {
        Ok(_) => Ok(()),
        Err(_) => Err(RenderError::MissingIntermediateArtifact {
            stage,
            path: path.to_path_buf(),
        }),
    }
}
