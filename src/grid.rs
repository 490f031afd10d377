//! Physical coordinate model.
//!
//! Bridges the three unit systems the slicer lives in:
//! - **model units** - whatever the input cloud is expressed in
//! - **inches** - the target build volume (X/Y resolution in dots per
//!   inch, Z resolution as a layer height in nanometers)
//! - **voxel indices** - integer `(col, row, layer)` raster coordinates
//!
//! [`BuildVolume`] holds the physical parameters and derives the raster
//! dimensions; [`VoxelGrid`] binds those dimensions to a model-space box
//! and provides the voxel-to-world affine map with half-voxel centering.

use serde::{Deserialize, Serialize};

use crate::cloud::Aabb;
use crate::{Error, Result, NANOMETERS_PER_INCH};

/// Minimum model-space span of a grid axis.
///
/// A degenerate cloud (a single point, or all points coplanar) would
/// otherwise collapse the voxel-to-world map onto a single coordinate.
pub const MIN_AXIS_EXTENT: f64 = 1e-6;

/// Physical build parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BuildVolume {
    /// X/Y resolution (dots per inch).
    pub dpi: u32,
    /// Z layer thickness (nanometers).
    pub layer_height_nm: u32,
    /// Build size along X (inches).
    pub x_in: f64,
    /// Build size along Y (inches).
    pub y_in: f64,
    /// Build size along Z (inches).
    pub z_in: f64,
}

impl BuildVolume {
    /// Raster dimensions `(W, H, D)`; each at least 1.
    pub fn dims(&self) -> (usize, usize, usize) {
        let w = (self.x_in * self.dpi as f64).round() as usize;
        let h = (self.y_in * self.dpi as f64).round() as usize;
        let d = (self.z_in * NANOMETERS_PER_INCH / self.layer_height_nm as f64).round() as usize;
        (w.max(1), h.max(1), d.max(1))
    }

    /// Number of layers per inch of Z travel.
    #[inline]
    pub fn layers_per_inch(&self) -> f64 {
        NANOMETERS_PER_INCH / self.layer_height_nm as f64
    }

    /// Reject unusable parameters: zero resolutions, non-positive or
    /// non-finite build sizes.
    pub fn validate(&self) -> Result<()> {
        if self.dpi == 0 {
            return Err(Error::InvalidParameter("dpi must be at least 1".into()));
        }
        if self.layer_height_nm == 0 {
            return Err(Error::InvalidParameter(
                "layer height must be at least 1 nm".into(),
            ));
        }
        for (name, value) in [("x_in", self.x_in), ("y_in", self.y_in), ("z_in", self.z_in)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for BuildVolume {
    fn default() -> Self {
        BuildVolume {
            dpi: 300,
            layer_height_nm: 27_000,
            x_in: 1.0,
            y_in: 1.0,
            z_in: 1.0,
        }
    }
}

/// A raster grid bound to a model-space box.
#[derive(Clone, Copy, Debug)]
pub struct VoxelGrid {
    /// Model-space box the raster spans (already padded by the caller).
    pub aabb: Aabb,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl VoxelGrid {
    /// Bind the volume's raster dimensions to a model-space box. The box
    /// should already carry any presentation padding; degenerate axes are
    /// widened to [`MIN_AXIS_EXTENT`].
    pub fn new(volume: &BuildVolume, aabb: Aabb) -> VoxelGrid {
        let (width, height, depth) = volume.dims();
        VoxelGrid {
            aabb: aabb.with_min_extent(MIN_AXIS_EXTENT),
            width,
            height,
            depth,
        }
    }

    /// Model-space position of the voxel center at `(col, row, layer)`.
    #[inline]
    pub fn world_of(&self, col: usize, row: usize, layer: usize) -> [f64; 3] {
        debug_assert!(col < self.width && row < self.height && layer < self.depth);
        let at = |idx: usize, size: usize, axis: usize| {
            self.aabb.min[axis] + (idx as f64 + 0.5) / size as f64 * self.aabb.span(axis)
        };
        [
            at(col, self.width, 0),
            at(row, self.height, 1),
            at(layer, self.depth, 2),
        ]
    }

    /// Model units per physical inch, averaged over the three axes; used
    /// to convert inch radii into model-space radii.
    pub fn model_units_per_inch(&self, volume: &BuildVolume) -> f64 {
        (self.aabb.span(0) / volume.x_in
            + self.aabb.span(1) / volume.y_in
            + self.aabb.span(2) / volume.z_in)
            / 3.0
    }
}
