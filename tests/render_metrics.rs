use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tempfile::TempDir;
use texsvg::application::render::{
    ArtifactOrigin, CacheStore, LaunchError, LaunchSpec, ProcessLauncher, ProcessOutput,
    RenderConfig, RenderPipeline, RenderRequest,
};

/// Succeeds for bodies without `fail`, writing the files each stage expects.
struct ScriptedToolchain;

#[async_trait]
impl ProcessLauncher for ScriptedToolchain {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessOutput, LaunchError> {
        let args = spec.args_lossy();
        if spec.program == Path::new("typeset") {
            let cwd = spec.cwd.clone().expect("workspace cwd");
            let source_name = args.last().expect("source argument");
            let source = tokio::fs::read_to_string(cwd.join(source_name))
                .await
                .expect("source");
            if source.contains("fail") {
                return Ok(ProcessOutput {
                    exit_code: Some(1),
                    success: false,
                    stdout: "! Emergency stop.".to_string(),
                    stderr: String::new(),
                });
            }
            let dvi = cwd.join(source_name.replace(".tex", ".dvi"));
            tokio::fs::write(dvi, "dvi").await.expect("dvi");
        } else {
            tokio::fs::write(&args[3], "<svg/>").await.expect("svg");
        }
        Ok(ProcessOutput {
            exit_code: Some(0),
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

fn config(root: &Path) -> RenderConfig {
    let cache_dir = root.join("cache");
    let temp_dir = root.join("temp");
    std::fs::create_dir_all(&cache_dir).expect("cache dir");
    std::fs::create_dir_all(&temp_dir).expect("temp dir");
    RenderConfig {
        preamble: "\\begin{document}".to_string(),
        shell_escape: false,
        typeset_path: PathBuf::from("typeset"),
        convert_path: PathBuf::from("convert"),
        cache_dir,
        temp_dir,
        typeset_timeout: Duration::from_secs(15),
        convert_timeout: Duration::from_secs(10),
        cleanup_enabled: true,
        cleanup_on_failure: false,
        language_tags: vec!["latex".to_string()],
    }
}

#[tokio::test]
async fn render_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let root = TempDir::new().expect("temp root");
    let config = config(root.path());
    let pipeline = RenderPipeline::new(Arc::new(ScriptedToolchain));

    let ok = RenderRequest::from_config(&config, "x");
    pipeline.render(&config, &ok).await.expect("miss");
    pipeline.render(&config, &ok).await.expect("hit");

    let broken = RenderRequest::from_config(&config, "fail");
    pipeline.render(&config, &broken).await.expect_err("failure");

    let unreadable = RenderRequest::from_config(&config, "y");
    let entry = CacheStore::new(&config.cache_dir).entry_path(&unreadable.fingerprint());
    std::fs::create_dir(&entry).expect("directory in place of the entry");
    let artifact = pipeline
        .render(&config, &unreadable)
        .await
        .expect("read error degrades to a miss");
    assert_eq!(artifact.origin, ArtifactOrigin::Fresh);

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for metric in [
        "texsvg_render_cache_hit_total",
        "texsvg_render_cache_miss_total",
        "texsvg_render_failure_total",
        "texsvg_render_cache_error_total",
        "texsvg_render_stage_ms",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let counter = |name: &str| -> u64 {
        snapshot
            .iter()
            .filter(|(composite_key, _, _, _)| composite_key.key().name() == name)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(count) => *count,
                other => panic!("{name} is not a counter: {other:?}"),
            })
            .sum()
    };
    assert_eq!(counter("texsvg_render_cache_hit_total"), 1);
    assert_eq!(counter("texsvg_render_cache_miss_total"), 3);
    assert_eq!(counter("texsvg_render_failure_total"), 1);

    let cache_errors = |op: &str| -> u64 {
        snapshot
            .iter()
            .filter(|(composite_key, _, _, _)| {
                composite_key.key().name() == "texsvg_render_cache_error_total"
                    && composite_key
                        .key()
                        .labels()
                        .any(|label| label.key() == "op" && label.value() == op)
            })
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(count) => *count,
                other => panic!("cache error metric is not a counter: {other:?}"),
            })
            .sum()
    };
    // Checked before and after taking the fingerprint lock.
    assert_eq!(cache_errors("read"), 2);
    assert_eq!(cache_errors("write"), 1);

    let failure_stage = snapshot
        .iter()
        .find(|(composite_key, _, _, _)| {
            composite_key.key().name() == "texsvg_render_failure_total"
        })
        .and_then(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .find(|label| label.key() == "stage")
                .map(|label| label.value().to_string())
        });
    assert_eq!(failure_stage.as_deref(), Some("typeset"));
}
