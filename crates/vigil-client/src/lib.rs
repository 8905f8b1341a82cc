#![allow(clippy::needless_range_loop, clippy::too_many_arguments, clippy::float_cmp)]

pub mod cl_fx;
pub mod cl_frame;
pub mod cl_lerp;
pub mod cl_part;
pub mod client;

pub use cl_frame::FrameDriver;
