use std::fmt;

use sha2::{Digest, Sha256};

use crate::application::render::types::RenderFlags;

/// Hex-encoded SHA-256 digest identifying one compiled document.
///
/// Used as the cache key and as the base name of every workspace file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn fingerprint(preamble: &str, body: &str, flags: &RenderFlags) -> Fingerprint {
    let mut hasher = Sha256::new();
    for field in [preamble, body, flags.serialized().as_str()] {
        // Length prefix keeps `("ab", "c")` and `("a", "bc")` apart.
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    Fingerprint(hex::encode(hasher.finalize()))
}
