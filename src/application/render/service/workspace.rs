use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{debug, warn};

use crate::application::render::types::RenderError;

use super::fingerprint::Fingerprint;

const END_DOCUMENT: &str = "\n\\end{document}";
const SOURCE_EXTENSION: &str = "tex";
const INTERMEDIATE_EXTENSION: &str = "dvi";
const OUTPUT_EXTENSION: &str = "svg";
/// Files the engine writes next to the job output.
const SIDE_EXTENSIONS: [&str; 2] = ["log", "aux"];

/// Job-scoped file set inside the shared temp directory.
///
/// Only derives paths and touches the files it names; the directory itself
/// is created once by the binary.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    fingerprint: Fingerprint,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, fingerprint: Fingerprint) -> Self {
        Self {
            root: root.into(),
            fingerprint,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Job name handed to the typesetting engine.
    pub fn job_name(&self) -> &str {
        self.fingerprint.as_str()
    }

    /// Source file name relative to [`Workspace::root`].
    pub fn source_file_name(&self) -> String {
        format!("{}.{SOURCE_EXTENSION}", self.fingerprint)
    }

    pub fn source_path(&self) -> PathBuf {
        self.root.join(self.source_file_name())
    }

    pub fn intermediate_path(&self) -> PathBuf {
        self.path_with(INTERMEDIATE_EXTENSION)
    }

    pub fn output_path(&self) -> PathBuf {
        self.path_with(OUTPUT_EXTENSION)
    }

    fn path_with(&self, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{extension}", self.fingerprint))
    }

    fn job_files(&self) -> Vec<PathBuf> {
        let mut files = vec![
            self.source_path(),
            self.intermediate_path(),
            self.output_path(),
        ];
        files.extend(SIDE_EXTENSIONS.iter().map(|ext| self.path_with(ext)));
        files
    }

    /// Write the full LaTeX document for `body`.
    pub async fn write_source(&self, preamble: &str, body: &str) -> Result<PathBuf, RenderError> {
        let path = self.source_path();
        let document = compose_document(preamble, body);
        fs::write(&path, document)
            .await
            .map_err(|source| RenderError::Workspace {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Remove the DVI and SVG left by an earlier run so each stage is
    /// verified against its own output. Missing files are fine.
    pub async fn clear_outputs(&self) -> Result<(), RenderError> {
        for path in [self.intermediate_path(), self.output_path()] {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(
                        target = "application::render::workspace",
                        op = "workspace::clear_outputs",
                        path = %path.display(),
                        "Removed stale stage output"
                    );
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(RenderError::Workspace { path, source }),
            }
        }
        Ok(())
    }

    /// Remove every file this job may have produced. Returns how many were
    /// removed; failures are logged and skipped.
    pub async fn cleanup(&self) -> usize {
        let mut removed = 0;
        for path in self.job_files() {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        target = "application::render::workspace",
                        op = "workspace::cleanup",
                        result = "error",
                        path = %path.display(),
                        error = %err,
                        "Failed to remove workspace file"
                    );
                }
            }
        }
        debug!(
            target = "application::render::workspace",
            op = "workspace::cleanup",
            fingerprint = %self.fingerprint,
            removed,
            "Workspace cleaned"
        );
        removed
    }
}

pub(crate) fn compose_document(preamble: &str, body: &str) -> String {
    let mut document = String::with_capacity(preamble.len() + body.len() + END_DOCUMENT.len() + 1);
    document.push_str(preamble);
    document.push('\n');
    document.push_str(body);
    document.push_str(END_DOCUMENT);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::{service::fingerprint::fingerprint, types::RenderFlags};
    use tempfile::TempDir;

    fn workspace(root: &Path) -> Workspace {
        let key = fingerprint("\\begin{document}", "x", &RenderFlags::default());
        Workspace::new(root, key)
    }

    #[test]
    fn paths_share_the_fingerprint_stem() {
        let ws = workspace(Path::new("/tmp/texsvg"));
        let stem = ws.fingerprint().to_string();

        assert_eq!(ws.source_file_name(), format!("{stem}.tex"));
        assert_eq!(ws.source_path(), Path::new("/tmp/texsvg").join(format!("{stem}.tex")));
        assert_eq!(
            ws.intermediate_path(),
            Path::new("/tmp/texsvg").join(format!("{stem}.dvi"))
        );
        assert_eq!(
            ws.output_path(),
            Path::new("/tmp/texsvg").join(format!("{stem}.svg"))
        );
        assert_eq!(ws.job_name(), stem);
    }

    #[test]
    fn document_wraps_body_between_preamble_and_end() {
        let document = compose_document("\\begin{document}", "\\[ x^2 \\]");
        assert_eq!(document, "\\begin{document}\n\\[ x^2 \\]\n\\end{document}");
    }

    #[tokio::test]
    async fn write_source_materialises_document() {
        let dir = TempDir::new().expect("temp dir");
        let ws = workspace(dir.path());

        let path = ws
            .write_source("\\begin{document}", "hello")
            .await
            .expect("write source");
        let written = std::fs::read_to_string(path).expect("read");
        assert_eq!(written, "\\begin{document}\nhello\n\\end{document}");
    }

    #[tokio::test]
    async fn write_source_into_missing_root_is_a_workspace_error() {
        let dir = TempDir::new().expect("temp dir");
        let ws = workspace(&dir.path().join("missing"));

        let err = ws
            .write_source("\\begin{document}", "hello")
            .await
            .expect_err("workspace error");
        assert!(matches!(err, RenderError::Workspace { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn clear_outputs_removes_stale_stage_files_only() {
        let dir = TempDir::new().expect("temp dir");
        let ws = workspace(dir.path());
        ws.write_source("\\begin{document}", "x")
            .await
            .expect("write source");
        std::fs::write(ws.intermediate_path(), "old dvi").expect("stale dvi");
        std::fs::write(ws.output_path(), "<svg partial").expect("stale svg");

        ws.clear_outputs().await.expect("clear");

        assert!(ws.source_path().exists());
        assert!(!ws.intermediate_path().exists());
        assert!(!ws.output_path().exists());
        ws.clear_outputs().await.expect("clearing twice is fine");
    }

    #[tokio::test]
    async fn clear_outputs_reports_unremovable_paths() {
        let dir = TempDir::new().expect("temp dir");
        let ws = workspace(dir.path());
        std::fs::create_dir(ws.output_path()).expect("directory in place of svg");

        let err = ws.clear_outputs().await.expect_err("workspace error");
        assert!(
            matches!(&err, RenderError::Workspace { path, .. } if *path == ws.output_path()),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn cleanup_removes_present_files_and_ignores_missing() {
        let dir = TempDir::new().expect("temp dir");
        let ws = workspace(dir.path());
        ws.write_source("\\begin{document}", "x")
            .await
            .expect("write source");
        std::fs::write(ws.intermediate_path(), b"dvi").expect("dvi");

        assert_eq!(ws.cleanup().await, 2);
        assert!(!ws.source_path().exists());
        assert!(!ws.intermediate_path().exists());
        assert_eq!(ws.cleanup().await, 0);
    }
}
