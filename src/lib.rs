//! Cache-first LaTeX to SVG rendering.
//!
//! Code blocks are compiled through a two-stage toolchain (typesetting to DVI,
//! then DVI to SVG) and the resulting SVG is stored under a content-derived
//! fingerprint so identical inputs never hit the toolchain twice.

pub mod application;
pub mod config;
pub mod infra;
pub mod presentation;
