//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "texsvg";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TYPESET_PATH: &str = "pdflatex";
const DEFAULT_CONVERT_PATH: &str = "dvisvgm";
const DEFAULT_CACHE_DIR: &str = "/tmp/texsvg/cache";
const DEFAULT_TEMP_DIR: &str = "/tmp/texsvg/temp";
const DEFAULT_TYPESET_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CONVERT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LANGUAGE_TAGS: [&str; 2] = ["latex", "tikz"];
pub(crate) const DEFAULT_PREAMBLE: &str = r"\documentclass[standalone, dvisvgm]{standalone}
\usepackage{tikz}
\usepackage{pgfplots}
\pgfplotsset{compat=1.18}
\usepackage{tikz-cd}
\usepackage{circuitikz}
\usepackage{chemfig}
\usetikzlibrary{arrows, automata, positioning, calc, shapes, decorations.pathmorphing, decorations.markings}
\begin{document}";

/// Command-line arguments for the texsvg binary.
#[derive(Debug, Parser)]
#[command(name = "texsvg", version, about = "Render LaTeX snippets to cached SVG")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TEXSVG_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RenderOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render one LaTeX body to SVG.
    Render(RenderArgs),
    /// Render every LaTeX code block in a Markdown document to HTML.
    Document(DocumentArgs),
    /// Print the cache fingerprint of a LaTeX body.
    Fingerprint(FingerprintArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderArgs {
    /// File holding the LaTeX body; reads stdin when omitted.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// Where to write the result; writes stdout when omitted.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Emit the HTML fragment instead of the bare SVG.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub html: bool,
}

#[derive(Debug, Args, Clone)]
pub struct DocumentArgs {
    /// Markdown document to render.
    #[arg(value_name = "INPUT", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Where to write the HTML; writes stdout when omitted.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FingerprintArgs {
    /// File holding the LaTeX body; reads stdin when omitted.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the typesetting executable (stage 1).
    #[arg(long = "typeset-path", value_name = "PATH", global = true)]
    pub typeset_path: Option<PathBuf>,

    /// Override the DVI to SVG converter executable (stage 2).
    #[arg(long = "convert-path", value_name = "PATH", global = true)]
    pub convert_path: Option<PathBuf>,

    /// Override the directory holding cached SVG files.
    #[arg(long = "cache-dir", value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Override the directory used for per-job compilation files.
    #[arg(long = "temp-dir", value_name = "PATH", global = true)]
    pub temp_dir: Option<PathBuf>,

    /// Override the preamble with the contents of a file.
    #[arg(long = "preamble-file", value_name = "PATH", global = true)]
    pub preamble_file: Option<PathBuf>,

    /// Toggle `-shell-escape` for the typesetting stage.
    #[arg(
        long = "shell-escape",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub shell_escape: Option<bool>,

    /// Toggle removal of workspace files after successful renders.
    #[arg(
        long = "cleanup",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cleanup: Option<bool>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub preamble: String,
    pub shell_escape: bool,
    pub typeset_path: PathBuf,
    pub convert_path: PathBuf,
    pub cache_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub typeset_timeout: Duration,
    pub convert_timeout: Duration,
    pub cleanup_enabled: bool,
    pub cleanup_on_failure: bool,
    pub language_tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("TEXSVG").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides)?;

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &RenderOverrides) -> Result<(), LoadError> {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.typeset_path.as_ref() {
            self.render.typeset_path = Some(path.clone());
        }
        if let Some(path) = overrides.convert_path.as_ref() {
            self.render.convert_path = Some(path.clone());
        }
        if let Some(dir) = overrides.cache_dir.as_ref() {
            self.render.cache_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.temp_dir.as_ref() {
            self.render.temp_dir = Some(dir.clone());
        }
        if let Some(enabled) = overrides.shell_escape {
            self.render.shell_escape = Some(enabled);
        }
        if let Some(enabled) = overrides.cleanup {
            self.render.cleanup_enabled = Some(enabled);
        }
        if let Some(path) = overrides.preamble_file.as_ref() {
            let preamble = std::fs::read_to_string(path).map_err(|err| {
                LoadError::invalid(
                    "render.preamble",
                    format!("failed to read {}: {err}", path.display()),
                )
            })?;
            self.render.preamble = Some(preamble);
        }
        Ok(())
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, render } = raw;

        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;

        Ok(Self { logging, render })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level_raw = logging.level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    let level = LevelFilter::from_str(&level_raw).map_err(|err| {
        LoadError::invalid("logging.level", format!("failed to parse: {err}"))
    })?;

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let typeset_path = non_empty_path(
        render.typeset_path,
        DEFAULT_TYPESET_PATH,
        "render.typeset_path",
    )?;
    let convert_path = non_empty_path(
        render.convert_path,
        DEFAULT_CONVERT_PATH,
        "render.convert_path",
    )?;
    let cache_dir = non_empty_path(render.cache_dir, DEFAULT_CACHE_DIR, "render.cache_dir")?;
    let temp_dir = non_empty_path(render.temp_dir, DEFAULT_TEMP_DIR, "render.temp_dir")?;
    if cache_dir == temp_dir {
        return Err(LoadError::invalid(
            "render.temp_dir",
            "must differ from render.cache_dir",
        ));
    }

    let preamble = match render.preamble {
        Some(preamble) if preamble.trim().is_empty() => DEFAULT_PREAMBLE.to_string(),
        Some(preamble) => preamble,
        None => DEFAULT_PREAMBLE.to_string(),
    };

    let language_tags: Vec<String> = match render.language_tags {
        Some(tags) => tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect(),
        None => DEFAULT_LANGUAGE_TAGS.iter().map(|tag| tag.to_string()).collect(),
    };
    if language_tags.is_empty() {
        return Err(LoadError::invalid(
            "render.language_tags",
            "at least one language tag is required",
        ));
    }

    Ok(RenderSettings {
        preamble,
        shell_escape: render.shell_escape.unwrap_or(false),
        typeset_path,
        convert_path,
        cache_dir,
        temp_dir,
        typeset_timeout: timeout_secs(
            render.typeset_timeout_secs,
            DEFAULT_TYPESET_TIMEOUT_SECS,
            "render.typeset_timeout_secs",
        )?,
        convert_timeout: timeout_secs(
            render.convert_timeout_secs,
            DEFAULT_CONVERT_TIMEOUT_SECS,
            "render.convert_timeout_secs",
        )?,
        cleanup_enabled: render.cleanup_enabled.unwrap_or(true),
        cleanup_on_failure: render.cleanup_on_failure.unwrap_or(false),
        language_tags,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    preamble: Option<String>,
    shell_escape: Option<bool>,
    typeset_path: Option<PathBuf>,
    convert_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    typeset_timeout_secs: Option<u64>,
    convert_timeout_secs: Option<u64>,
    cleanup_enabled: Option<bool>,
    cleanup_on_failure: Option<bool>,
    language_tags: Option<Vec<String>>,
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

fn timeout_secs(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    let secs = value.unwrap_or(default);
    if secs == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse CLI arguments and load settings for the binary.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[cfg(test)]
mod tests;
