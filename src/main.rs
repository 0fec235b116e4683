use std::{
    io::{self, Read, Write},
    path::Path,
    process,
};

use texsvg::{
    application::{
        document,
        error::AppError,
        render::{RenderConfig, RenderFailure, RenderPipeline, RenderRequest},
    },
    config,
    infra::{fs as render_fs, telemetry},
    presentation::{render_error_fragment, rendered_svg_fragment},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(source = report.source, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, chain = ?report.messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Render(config::RenderArgs::default()));

    telemetry::init(&settings.logging)?;
    render_fs::prepare_render_dirs(&settings.render)?;

    let render_config = RenderConfig::from(&settings.render);
    let pipeline = RenderPipeline::default();

    match command {
        config::Command::Render(args) => run_render(&pipeline, &render_config, args).await,
        config::Command::Document(args) => run_document(&pipeline, &render_config, args).await,
        config::Command::Fingerprint(args) => run_fingerprint(&render_config, args).await,
    }
}

async fn run_render(
    pipeline: &RenderPipeline,
    render_config: &RenderConfig,
    args: config::RenderArgs,
) -> Result<(), AppError> {
    let body = read_input(args.input.as_deref()).await?;
    if body.trim().is_empty() {
        return Err(AppError::validation("render input is empty"));
    }
    let request = RenderRequest::from_config(render_config, &body);

    match pipeline.render(render_config, &request).await {
        Ok(artifact) => {
            info!(
                target = "texsvg::render",
                fingerprint = %artifact.fingerprint,
                origin = ?artifact.origin,
                "Render completed"
            );
            let output = if args.html {
                rendered_svg_fragment(&artifact)
            } else {
                artifact.svg
            };
            write_output(args.output.as_deref(), &output).await
        }
        Err(failure) => {
            let fragment = render_error_fragment(&failure);
            if args.html {
                write_output(args.output.as_deref(), &fragment).await?;
            } else {
                eprintln!("{}", failure_report(&failure));
            }
            Err(AppError::from(failure))
        }
    }
}

/// Plain-text failure: the diagnostic followed by the source that caused it.
fn failure_report(failure: &RenderFailure) -> String {
    format!(
        "{}\n\n--- original source ---\n{}",
        failure.diagnostics(),
        failure.original_source.trim_end()
    )
}

async fn run_document(
    pipeline: &RenderPipeline,
    render_config: &RenderConfig,
    args: config::DocumentArgs,
) -> Result<(), AppError> {
    let markdown = tokio::fs::read_to_string(&args.input).await?;
    let name = args.input.display().to_string();

    let rendered =
        document::render_markdown(pipeline, render_config, &markdown, Some(&name)).await?;
    write_output(args.output.as_deref(), &rendered.html).await?;

    info!(
        target = "texsvg::document",
        document = %name,
        rendered = rendered.rendered_blocks,
        failed = rendered.failed_blocks,
        "Document completed"
    );
    Ok(())
}

async fn run_fingerprint(
    render_config: &RenderConfig,
    args: config::FingerprintArgs,
) -> Result<(), AppError> {
    let body = read_input(args.input.as_deref()).await?;
    let request = RenderRequest::from_config(render_config, &body);
    write_output(None, &format!("{}\n", request.fingerprint())).await
}

async fn read_input(path: Option<&Path>) -> Result<String, AppError> {
    match path {
        Some(path) => Ok(tokio::fs::read_to_string(path).await?),
        None => tokio::task::spawn_blocking(|| {
            let mut body = String::new();
            io::stdin().read_to_string(&mut body).map(|_| body)
        })
        .await
        .map_err(|err| AppError::unexpected(format!("stdin reader panicked: {err}")))?
        .map_err(AppError::from),
    }
}

async fn write_output(path: Option<&Path>, contents: &str) -> Result<(), AppError> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, contents).await?;
            info!(
                target = "texsvg::output",
                path = %path.display(),
                bytes = contents.len(),
                "Output written"
            );
            Ok(())
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(contents.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}
