//! Slicing module - per-layer rasters and the NN sampling engine.
//!
//! This module contains the output-side core:
//! - [`SliceImage`] - Mutable RGBA raster with flood-fill and pixel
//!   primitives
//! - [`Rasterizer`] - Samples every voxel of one layer against the spatial
//!   index and paints pixels through a shell policy

mod image;
mod rasterizer;

pub use image::SliceImage;
pub use rasterizer::{Rasterizer, RasterizerConfig, SearchRadius, ShellPolicy, LIGHT_GRAY};
