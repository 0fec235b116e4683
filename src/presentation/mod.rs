//! Host-facing presentation of render outcomes.

pub mod views;

pub use views::{error_fragment, render_error_fragment, rendered_svg_fragment};
