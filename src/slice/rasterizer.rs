//! Per-layer NN sampling and pixel painting.
//!
//! For every `(col, row)` voxel center of a layer the rasterizer queries
//! the spatial index and maps the hit (or miss) to a pixel through the
//! configured [`ShellPolicy`]. An optional interior flood fill runs before
//! or after sampling (see [`InteriorFill`]).

use crate::cloud::Rgba;
use crate::config::InteriorFill;
use crate::grid::VoxelGrid;
use crate::kdtree::{KdTree, NearestOptions};
use crate::slice::SliceImage;

/// Semi-transparent light gray used for the outer shell band and the
/// interior flood fill.
pub const LIGHT_GRAY: Rgba = Rgba::new(247, 247, 247, 128);

/// NN search volume around each voxel center, in model units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SearchRadius {
    /// One Euclidean cap.
    Isotropic(f64),
    /// Per-axis coordinate caps; allows a flatter Z search.
    Anisotropic { x: f64, y: f64, z: f64 },
}

impl SearchRadius {
    fn options(&self) -> NearestOptions {
        match *self {
            SearchRadius::Isotropic(r) => NearestOptions::within(r),
            SearchRadius::Anisotropic { x, y, z } => NearestOptions {
                max_distance_x: Some(x),
                max_distance_y: Some(y),
                max_distance_z: Some(z),
                ..Default::default()
            },
        }
    }
}

/// Rule mapping NN distance to pixel color.
///
/// Distances are in model units; both band radii are inclusive upper
/// bounds, consistent with the NN caps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShellPolicy {
    /// Paint the sample's own color, fully opaque. Default for dot
    /// rendering; colorless samples paint opaque white.
    ColorBySample,
    /// Two-level shell for surface rendering: sample color within `inner`,
    /// [`LIGHT_GRAY`] between `inner` and `outer`, transparent beyond.
    TwoBand { inner: f64, outer: f64 },
}

/// Rasterizer configuration in model units.
#[derive(Clone, Copy, Debug)]
pub struct RasterizerConfig {
    pub radius: SearchRadius,
    pub shell: ShellPolicy,
    pub interior_fill: InteriorFill,
}

/// Samples layers of a voxel grid against a spatial index.
///
/// The rasterizer is a pure function of `(layer, index, config)`; layers
/// can be rasterized from any number of threads with per-thread images.
pub struct Rasterizer<'a> {
    index: &'a KdTree<'a>,
    grid: &'a VoxelGrid,
    config: RasterizerConfig,
    options: NearestOptions,
}

impl<'a> Rasterizer<'a> {
    pub fn new(index: &'a KdTree<'a>, grid: &'a VoxelGrid, config: RasterizerConfig) -> Self {
        let options = config.radius.options();
        Rasterizer {
            index,
            grid,
            config,
            options,
        }
    }

    /// Paint one layer into `image`, which must match the grid's width and
    /// height and start transparent (callers reuse images via `clear`).
    pub fn rasterize_layer(&self, layer: usize, image: &mut SliceImage) {
        debug_assert!(layer < self.grid.depth);
        debug_assert_eq!(image.width(), self.grid.width);
        debug_assert_eq!(image.height(), self.grid.height);

        if self.config.interior_fill == InteriorFill::BeforeSampling {
            self.fill_interior(image);
        }

        for row in 0..self.grid.height {
            for col in 0..self.grid.width {
                let world = self.grid.world_of(col, row, layer);
                let Some(hit) = self.index.nearest(world, &self.options) else {
                    continue;
                };
                let sample = self.index_color(hit.index);
                match self.config.shell {
                    ShellPolicy::ColorBySample => {
                        image.set_pixel(col, row, sample);
                    }
                    ShellPolicy::TwoBand { inner, outer } => {
                        if hit.distance > outer {
                            continue;
                        }
                        if hit.distance > inner {
                            image.set_pixel(col, row, LIGHT_GRAY);
                        } else {
                            image.set_pixel(col, row, sample);
                        }
                    }
                }
            }
        }

        if let InteriorFill::AfterSamplingIfFilled { threshold } = self.config.interior_fill {
            if image.count_filled() > threshold {
                self.fill_interior(image);
            }
        }
    }

    fn fill_interior(&self, image: &mut SliceImage) {
        image.flood_fill_from(self.grid.width / 2, self.grid.height / 2, LIGHT_GRAY);
    }

    fn index_color(&self, index: usize) -> Rgba {
        let sample = self.index.cloud().points()[index]
            .color
            .unwrap_or(Rgba::WHITE);
        Rgba::new(sample.r, sample.g, sample.b, 255)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{Aabb, Point, PointCloud};
    use crate::grid::{BuildVolume, VoxelGrid};

    /// 5x5x5 cubic voxels over [-1, 1]^3 (voxel centers at -0.8, -0.4,
    /// 0.0, 0.4, 0.8 on each axis).
    fn test_grid() -> (BuildVolume, VoxelGrid) {
        let volume = BuildVolume {
            dpi: 100,
            layer_height_nm: 254_000,
            x_in: 0.05,
            y_in: 0.05,
            z_in: 0.05,
        };
        let grid = VoxelGrid::new(&volume, Aabb::new([-1.0; 3], [1.0; 3]));
        assert_eq!((grid.width, grid.height, grid.depth), (5, 5, 5));
        (volume, grid)
    }

    fn raster(
        cloud: &PointCloud,
        grid: &VoxelGrid,
        config: RasterizerConfig,
        layer: usize,
    ) -> SliceImage {
        let tree = KdTree::build(cloud);
        let rasterizer = Rasterizer::new(&tree, grid, config);
        let mut image = SliceImage::new(grid.width, grid.height);
        rasterizer.rasterize_layer(layer, &mut image);
        image
    }

    fn config(radius: f64) -> RasterizerConfig {
        RasterizerConfig {
            radius: SearchRadius::Isotropic(radius),
            shell: ShellPolicy::ColorBySample,
            interior_fill: InteriorFill::Off,
        }
    }

    #[test]
    fn test_single_point_paints_center_voxel_only() {
        let (_, grid) = test_grid();
        let cloud = PointCloud::new(vec![Point::with_color(
            0.0,
            0.0,
            0.0,
            Rgba::new(200, 100, 50, 255),
        )]);
        let image = raster(&cloud, &grid, config(0.3), 2);
        assert_eq!(image.get_pixel(2, 2), Rgba::new(200, 100, 50, 255));
        assert_eq!(image.count_filled(), 1);

        // The neighboring layer's centers are 0.4 away in Z alone.
        let above = raster(&cloud, &grid, config(0.3), 3);
        assert_eq!(above.count_filled(), 0);
    }

    #[test]
    fn test_radius_cap_is_inclusive() {
        let (_, grid) = test_grid();
        let cloud = PointCloud::new(vec![Point::new(0.0, 0.0, 0.0)]);
        let image = raster(&cloud, &grid, config(0.4), 2);
        // Exactly-at-radius voxels (the four cardinal neighbors) paint too.
        assert_eq!(image.count_filled(), 5);
        // Colorless samples paint opaque white.
        assert_eq!(image.get_pixel(1, 2), Rgba::WHITE);
    }

    #[test]
    fn test_two_band_shell() {
        let (_, grid) = test_grid();
        let cloud = PointCloud::new(vec![Point::with_color(
            0.0,
            0.0,
            0.0,
            Rgba::new(10, 20, 30, 255),
        )]);
        let config = RasterizerConfig {
            radius: SearchRadius::Isotropic(0.5),
            shell: ShellPolicy::TwoBand {
                inner: 0.3,
                outer: 0.5,
            },
            interior_fill: InteriorFill::Off,
        };
        let image = raster(&cloud, &grid, config, 2);
        // Center within the inner band, cardinal neighbors (0.4) in the
        // gray band, diagonals (0.4 * sqrt(2)) beyond the outer band.
        assert_eq!(image.get_pixel(2, 2), Rgba::new(10, 20, 30, 255));
        assert_eq!(image.get_pixel(3, 2), LIGHT_GRAY);
        assert_eq!(image.get_pixel(3, 3), Rgba::TRANSPARENT);
        assert_eq!(image.count_filled(), 5);
    }

    #[test]
    fn test_interior_fill_before_sampling() {
        let (_, grid) = test_grid();
        let cloud = PointCloud::new(vec![Point::new(0.0, 0.0, 0.0)]);
        let config = RasterizerConfig {
            radius: SearchRadius::Isotropic(0.3),
            shell: ShellPolicy::ColorBySample,
            interior_fill: InteriorFill::BeforeSampling,
        };
        let image = raster(&cloud, &grid, config, 2);
        // Background filled first, sampled pixel painted over it.
        assert_eq!(image.get_pixel(0, 0), LIGHT_GRAY);
        assert_eq!(image.get_pixel(2, 2), Rgba::WHITE);
        assert_eq!(image.count_filled(), 25);
    }

    #[test]
    fn test_interior_fill_after_sampling_respects_threshold() {
        let (_, grid) = test_grid();
        let cloud = PointCloud::new(vec![Point::new(0.8, 0.8, 0.0)]);

        // One painted pixel is not enough material for a floor...
        let sparse = RasterizerConfig {
            radius: SearchRadius::Isotropic(0.3),
            shell: ShellPolicy::ColorBySample,
            interior_fill: InteriorFill::AfterSamplingIfFilled { threshold: 5 },
        };
        let image = raster(&cloud, &grid, sparse, 2);
        assert_eq!(image.count_filled(), 1);

        // ...but over the threshold the transparent interior fills.
        let eager = RasterizerConfig {
            interior_fill: InteriorFill::AfterSamplingIfFilled { threshold: 0 },
            ..sparse
        };
        let image = raster(&cloud, &grid, eager, 2);
        assert_eq!(image.get_pixel(2, 2), LIGHT_GRAY);
        assert_eq!(image.get_pixel(4, 2), Rgba::WHITE);
        assert_eq!(image.count_filled(), 25);
    }

    #[test]
    fn test_anisotropic_radius_flattens_z_search() {
        let (_, grid) = test_grid();
        let cloud = PointCloud::new(vec![Point::new(0.0, 0.0, 0.4)]);

        let flat = RasterizerConfig {
            radius: SearchRadius::Anisotropic {
                x: 0.5,
                y: 0.5,
                z: 0.1,
            },
            shell: ShellPolicy::ColorBySample,
            interior_fill: InteriorFill::Off,
        };
        // Layer 2 centers sit at z = 0.0; the point is 0.4 away in Z.
        let image = raster(&cloud, &grid, flat, 2);
        assert_eq!(image.count_filled(), 0);

        // Layer 3 centers sit at z = 0.4, inside the Z cap.
        let image = raster(&cloud, &grid, flat, 3);
        assert!(image.count_filled() > 0);
        assert_eq!(image.get_pixel(2, 2), Rgba::WHITE);
    }
}
