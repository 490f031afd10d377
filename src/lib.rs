//! # Cloudslicer
//!
//! A voxelizing slicer for colored 3D point clouds.
//!
//! This library converts a point cloud into a stack of 2D raster slices for
//! layered manufacturing (multi-material inkjet 3D printing):
//! - PLY point cloud loading (ASCII and binary little-endian)
//! - Balanced k-d tree nearest-neighbor index with masked axes and
//!   anisotropic distance caps
//! - Physical coordinate model bridging inches, DPI and nanometer layer
//!   heights
//! - Per-layer rasterization with configurable shell policies and interior
//!   flood fill
//! - Deterministic PNG output (one image per Z layer)
//! - Edge/corner chamfer post-processing over an emitted slice stack
//!
//! ## Example
//!
//! ```rust,ignore
//! use cloudslicer::{load_ply, JobConfig, SlicePipeline};
//!
//! let cloud = load_ply("cloud.ply")?;
//! let config = JobConfig::default();
//! let pipeline = SlicePipeline::new(config, "slices".into());
//! let stats = pipeline.process(&cloud)?;
//! println!("{} layers written", stats.layers);
//! ```

pub mod chamfer;
pub mod cloud;
pub mod config;
pub mod grid;
pub mod kdtree;
pub mod pipeline;
pub mod png;
pub mod slice;

// Re-export commonly used types
pub use chamfer::{chamfer_stack, ChamferParams, ChamferStats};
pub use cloud::{load_ply, write_ply_ascii, Aabb, PlyError, Point, PointCloud, Rgba};
pub use config::{InteriorFill, JobConfig, ShellPolicyConfig};
pub use grid::{BuildVolume, VoxelGrid};
pub use kdtree::{Axes, KdTree, Nearest, NearestOptions};
pub use pipeline::{SlicePipeline, SliceStats};
pub use png::write_rgba_png;
pub use slice::{Rasterizer, RasterizerConfig, ShellPolicy, SliceImage};

use std::path::PathBuf;

/// Nanometers per inch. X/Y resolution is specified in dots per inch while
/// the Z axis is specified as a layer height in nanometers.
pub const NANOMETERS_PER_INCH: f64 = 25_400_000.0;

/// Result type used throughout the slicer.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for slicer operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PLY error: {0}")]
    Ply(#[from] PlyError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no PNG inputs found in {0}")]
    NoPngInputs(PathBuf),

    #[error("slice dimension mismatch: {path} is {found_w}x{found_h}, expected {want_w}x{want_h}")]
    DimensionMismatch {
        path: PathBuf,
        found_w: u32,
        found_h: u32,
        want_w: u32,
        want_h: u32,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
