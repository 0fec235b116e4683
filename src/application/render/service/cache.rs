use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tempfile::Builder as TempFileBuilder;
use tokio::{fs, task};

use crate::application::render::types::CacheError;

use super::fingerprint::Fingerprint;

pub(crate) const ARTIFACT_EXTENSION: &str = "svg";

/// Flat, content-addressed SVG store: one `<fingerprint>.svg` file per entry.
///
/// The directory must already exist. Entries are only ever added.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.{ARTIFACT_EXTENSION}"))
    }

    /// Read the entry for `fingerprint`. A missing file is a miss, not an error.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<String>, CacheError> {
        let path = self.entry_path(fingerprint);
        match fs::read_to_string(&path).await {
            Ok(svg) => Ok(Some(svg)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Read { path, source }),
        }
    }

    /// Persist `svg` under `fingerprint`.
    ///
    /// The payload goes to a hidden temporary file in the cache directory
    /// first and is renamed into place, so readers never see a partial entry.
    pub async fn store(&self, fingerprint: &Fingerprint, svg: &str) -> Result<PathBuf, CacheError> {
        let dir = self.dir.clone();
        let path = self.entry_path(fingerprint);
        let payload = svg.as_bytes().to_vec();

        let target = path.clone();
        let outcome = task::spawn_blocking(move || persist_atomically(&dir, &target, &payload))
            .await
            .map_err(std::io::Error::other)
            .and_then(|result| result);

        match outcome {
            Ok(()) => Ok(path),
            Err(source) => Err(CacheError::Write { path, source }),
        }
    }
}

fn persist_atomically(dir: &Path, target: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut staged = TempFileBuilder::new()
        .prefix(".")
        .suffix(".svg.partial")
        .tempfile_in(dir)?;
    staged.write_all(payload)?;
    staged.as_file().sync_all()?;

    match staged.persist(target) {
        Ok(_) => Ok(()),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            // Same fingerprint, same bytes: another job got there first.
            Ok(())
        }
        Err(err) => Err(err.error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::{service::fingerprint::fingerprint, types::RenderFlags};
    use tempfile::TempDir;

    fn key(body: &str) -> Fingerprint {
        fingerprint("\\begin{document}", body, &RenderFlags::default())
    }

    #[tokio::test]
    async fn lookup_on_empty_directory_is_a_miss() {
        let dir = TempDir::new().expect("temp dir");
        let cache = CacheStore::new(dir.path());

        let found = cache.lookup(&key("a")).await.expect("lookup");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn stored_entry_is_returned_verbatim() {
        let dir = TempDir::new().expect("temp dir");
        let cache = CacheStore::new(dir.path());
        let fingerprint = key("b");

        let path = cache
            .store(&fingerprint, "<svg>b</svg>")
            .await
            .expect("store");
        assert_eq!(path, dir.path().join(format!("{fingerprint}.svg")));

        let found = cache.lookup(&fingerprint).await.expect("lookup");
        assert_eq!(found.as_deref(), Some("<svg>b</svg>"));
    }

    #[tokio::test]
    async fn store_leaves_only_the_final_entry() {
        let dir = TempDir::new().expect("temp dir");
        let cache = CacheStore::new(dir.path());
        let fingerprint = key("c");

        cache.store(&fingerprint, "<svg/>").await.expect("first");
        cache.store(&fingerprint, "<svg/>").await.expect("overwrite");

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{fingerprint}.svg")]);
    }

    #[tokio::test]
    async fn unreadable_entry_is_reported_as_read_error() {
        let dir = TempDir::new().expect("temp dir");
        let cache = CacheStore::new(dir.path());
        let fingerprint = key("d");
        // A directory where the file should be makes the read fail with
        // something other than NotFound.
        std::fs::create_dir(cache.entry_path(&fingerprint)).expect("mkdir");

        let err = cache.lookup(&fingerprint).await.expect_err("read error");
        assert!(matches!(err, CacheError::Read { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn store_into_missing_directory_fails_with_write_error() {
        let dir = TempDir::new().expect("temp dir");
        let cache = CacheStore::new(dir.path().join("absent"));

        let err = cache
            .store(&key("e"), "<svg/>")
            .await
            .expect_err("write error");
        assert!(matches!(err, CacheError::Write { .. }), "{err:?}");
    }
}
