use super::*;

#[test]
fn defaults_follow_the_reference_toolchain() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let render = &settings.render;

    assert_eq!(render.typeset_path, PathBuf::from("pdflatex"));
    assert_eq!(render.convert_path, PathBuf::from("dvisvgm"));
    assert_eq!(render.typeset_timeout, Duration::from_secs(15));
    assert_eq!(render.convert_timeout, Duration::from_secs(10));
    assert!(!render.shell_escape);
    assert!(render.cleanup_enabled);
    assert!(!render.cleanup_on_failure);
    assert!(render.preamble.ends_with("\\begin{document}"));
    assert_eq!(render.language_tags, vec!["latex", "tikz"]);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.render.typeset_path = Some(PathBuf::from("/usr/bin/latex"));
    raw.render.shell_escape = Some(false);
    raw.logging.level = Some("info".to_string());

    let overrides = RenderOverrides {
        typeset_path: Some(PathBuf::from("/opt/tex/bin/pdflatex")),
        shell_escape: Some(true),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides).expect("overrides");
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(
        settings.render.typeset_path,
        PathBuf::from("/opt/tex/bin/pdflatex")
    );
    assert!(settings.render.shell_escape);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = RenderOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides).expect("overrides");
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn preamble_file_override_replaces_preamble() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("preamble.tex");
    std::fs::write(&path, "\\documentclass{article}\n\\begin{document}").expect("write");

    let mut raw = RawSettings::default();
    let overrides = RenderOverrides {
        preamble_file: Some(path),
        ..Default::default()
    };
    raw.apply_overrides(&overrides).expect("overrides");
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(
        settings.render.preamble,
        "\\documentclass{article}\n\\begin{document}"
    );
}

#[test]
fn missing_preamble_file_is_invalid() {
    let mut raw = RawSettings::default();
    let overrides = RenderOverrides {
        preamble_file: Some(PathBuf::from("/nonexistent/preamble.tex")),
        ..Default::default()
    };

    let err = raw.apply_overrides(&overrides).expect_err("invalid");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.preamble",
            ..
        }
    ));
}

#[test]
fn blank_preamble_falls_back_to_default() {
    let mut raw = RawSettings::default();
    raw.render.preamble = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.render.preamble, DEFAULT_PREAMBLE);
}

#[test]
fn cache_and_temp_dirs_must_differ() {
    let mut raw = RawSettings::default();
    raw.render.cache_dir = Some(PathBuf::from("/var/texsvg"));
    raw.render.temp_dir = Some(PathBuf::from("/var/texsvg"));

    let err = Settings::from_raw(raw).expect_err("invalid");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.temp_dir",
            ..
        }
    ));
}

#[test]
fn zero_timeouts_are_rejected() {
    let mut raw = RawSettings::default();
    raw.render.convert_timeout_secs = Some(0);

    let err = Settings::from_raw(raw).expect_err("invalid");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.convert_timeout_secs",
            ..
        }
    ));
}

#[test]
fn empty_executable_path_is_rejected() {
    let mut raw = RawSettings::default();
    raw.render.convert_path = Some(PathBuf::new());

    let err = Settings::from_raw(raw).expect_err("invalid");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.convert_path",
            ..
        }
    ));
}

#[test]
fn blank_language_tags_are_rejected() {
    let mut raw = RawSettings::default();
    raw.render.language_tags = Some(vec![" ".to_string()]);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn default_command_is_absent() {
    let args = CliArgs::parse_from(["texsvg"]);
    assert!(args.command.is_none());
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "texsvg",
        "render",
        "--input",
        "/tmp/body.tex",
        "--html",
        "--shell-escape",
        "true",
    ]);

    assert_eq!(args.overrides.shell_escape, Some(true));
    match args.command.expect("render command") {
        Command::Render(render) => {
            assert_eq!(render.input, Some(PathBuf::from("/tmp/body.tex")));
            assert!(render.output.is_none());
            assert!(render.html);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_document_arguments() {
    let args = CliArgs::parse_from([
        "texsvg",
        "--cache-dir",
        "/var/cache/texsvg",
        "document",
        "notes.md",
        "--output",
        "notes.html",
    ]);

    assert_eq!(
        args.overrides.cache_dir,
        Some(PathBuf::from("/var/cache/texsvg"))
    );
    match args.command.expect("document command") {
        Command::Document(document) => {
            assert_eq!(document.input, PathBuf::from("notes.md"));
            assert_eq!(document.output, Some(PathBuf::from("notes.html")));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}
