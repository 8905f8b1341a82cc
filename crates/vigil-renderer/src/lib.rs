#![allow(clippy::needless_range_loop, clippy::too_many_arguments, clippy::float_cmp)]

pub mod r_light;
pub mod r_model;
pub mod r_surf;
pub mod refresh;

pub use refresh::{Refresh, RenderConfig};
