//! Pipeline module - orchestrates a complete slicing job.
//!
//! cloud → spatial index → per-layer rasterization → PNG stack, with an
//! optional chamfer post-pass over the emitted directory.
//!
//! Layers are independent given the shared read-only index, so the stack
//! fans out across the rayon pool; each worker reuses one slice buffer and
//! writes to its own `out_{z}.png`, leaving nothing to synchronize beyond
//! the progress counter.
//!
//! # Example
//!
//! ```rust,ignore
//! use cloudslicer::{load_ply, JobConfig, SlicePipeline};
//!
//! let cloud = load_ply("cloud.ply")?;
//! let pipeline = SlicePipeline::new(JobConfig::default(), "slices".into());
//! let stats = pipeline.process(&cloud)?;
//! println!("{} layers, {} filled pixels", stats.layers, stats.filled_pixels);
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::chamfer::{chamfer_stack, ChamferParams};
use crate::cloud::PointCloud;
use crate::config::JobConfig;
use crate::grid::VoxelGrid;
use crate::kdtree::KdTree;
use crate::png::write_rgba_png;
use crate::slice::{Rasterizer, SliceImage};
use crate::Result;

/// Summary of an emitted slice stack.
#[derive(Clone, Copy, Debug)]
pub struct SliceStats {
    pub width: usize,
    pub height: usize,
    pub layers: usize,
    /// Total non-transparent pixels across the stack.
    pub filled_pixels: u64,
}

/// Drives a slicing job from point cloud to PNG stack.
pub struct SlicePipeline {
    config: JobConfig,
    output_dir: PathBuf,
}

impl SlicePipeline {
    pub fn new(config: JobConfig, output_dir: PathBuf) -> Self {
        SlicePipeline { config, output_dir }
    }

    /// Run the job without progress reporting.
    pub fn process(&self, cloud: &PointCloud) -> Result<SliceStats> {
        self.process_with_callback(cloud, |_, _, _| {})
    }

    /// Run the job, reporting `(stage, done, total)` after each unit of
    /// work. Stages are `"slicing"` (per layer) and `"chamfer"`.
    pub fn process_with_callback<F>(&self, cloud: &PointCloud, callback: F) -> Result<SliceStats>
    where
        F: Fn(&str, usize, usize) + Sync,
    {
        self.config.validate()?;
        std::fs::create_dir_all(&self.output_dir)?;

        let padded = cloud.aabb().inflated(self.config.padding_ratio);
        let grid = VoxelGrid::new(&self.config.volume, padded);
        let tree = KdTree::build(cloud);
        let rasterizer = Rasterizer::new(&tree, &grid, self.config.rasterizer_config(&grid));

        let completed = AtomicUsize::new(0);
        let filled_pixels = (0..grid.depth)
            .into_par_iter()
            .map_init(
                || SliceImage::new(grid.width, grid.height),
                |image, layer| -> Result<u64> {
                    image.clear();
                    rasterizer.rasterize_layer(layer, image);
                    let path = self.output_dir.join(format!("out_{layer}.png"));
                    write_rgba_png(&path, grid.width as u32, grid.height as u32, image.pixels())?;
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    callback("slicing", done, grid.depth);
                    Ok(image.count_filled() as u64)
                },
            )
            .try_reduce(|| 0, |a, b| Ok(a + b))?;

        if self.config.chamfer_radius_in > 0.0 {
            callback("chamfer", 0, 1);
            let params = ChamferParams {
                radius_in: self.config.chamfer_radius_in,
                dpi: self.config.volume.dpi,
                layer_height_nm: self.config.volume.layer_height_nm,
                debug: self.config.chamfer_debug,
            };
            chamfer_stack(&self.output_dir, &self.output_dir, &params)?;
            callback("chamfer", 1, 1);
        }

        Ok(SliceStats {
            width: grid.width,
            height: grid.height,
            layers: grid.depth,
            filled_pixels,
        })
    }
}
