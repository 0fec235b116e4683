//! Application services layer.

pub mod document;
pub mod error;
pub mod render;
