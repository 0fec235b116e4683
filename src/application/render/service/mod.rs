pub mod cache;
pub mod compiler;
pub mod fingerprint;
pub mod process;
pub mod workspace;
