//! Edge and corner chamfer over an emitted slice stack.
//!
//! A second pass over a directory of slice PNGs that bevels the material
//! cuboid: every voxel within the bevel radius of one of the twelve cuboid
//! edges or eight corners is carved (alpha set to 0).
//!
//! The operator runs in two passes:
//! 1. Read every slice (natural filename order) and compute the global
//!    material box - the bounds of all pixels with non-zero alpha, plus
//!    the layer range containing any such pixel.
//! 2. Evaluate the chamfer predicate against per-axis inch distances from
//!    the box faces and carve. Predicate bitmaps are precomputed for all
//!    layers in parallel; the layers then stream serially because the
//!    debug overlay compares each layer's carve mask against the previous
//!    layer's.
//!
//! Distances are physical: X/Y in pixels over DPI, Z in layers over
//! layers-per-inch, so the bevel is geometrically round even when voxels
//! are strongly anisotropic.

mod natsort;

pub use natsort::natural_cmp;

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::cloud::Rgba;
use crate::png::write_rgba_png;
use crate::slice::SliceImage;
use crate::{Error, Result, NANOMETERS_PER_INCH};

/// Chamfer pass parameters.
#[derive(Clone, Copy, Debug)]
pub struct ChamferParams {
    /// Bevel radius in inches.
    pub radius_in: f64,
    /// X/Y resolution of the slices (dots per inch).
    pub dpi: u32,
    /// Z layer thickness (nanometers).
    pub layer_height_nm: u32,
    /// Paint black markers on the material side of each new transition.
    pub debug: bool,
}

/// Summary of a chamfer pass.
#[derive(Clone, Copy, Debug)]
pub struct ChamferStats {
    pub layers: usize,
    pub width: usize,
    pub height: usize,
    /// Voxels carved across the whole stack.
    pub carved: u64,
}

/// Material bounds in voxel coordinates, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MaterialBox {
    x0: usize,
    x1: usize,
    y0: usize,
    y1: usize,
    z0: usize,
    z1: usize,
}

/// Per-axis inch distances from the material box faces.
///
/// The twelve edge conditions pair one horizontal with one vertical
/// distance and the eight corner conditions sum all three; with
/// non-negative distances both reduce to sums over the per-axis minima.
struct ChamferPredicate {
    material: MaterialBox,
    radius_in: f64,
    dx: Vec<f64>,
    dy: Vec<f64>,
    layers_per_inch: f64,
}

impl ChamferPredicate {
    fn new(material: MaterialBox, params: &ChamferParams, width: usize, height: usize) -> Self {
        let dpi = params.dpi as f64;
        let dx = (0..width)
            .map(|x| {
                let left = (x as f64 - material.x0 as f64) / dpi;
                let right = (material.x1 as f64 - x as f64) / dpi;
                left.min(right)
            })
            .collect();
        let dy = (0..height)
            .map(|y| {
                let top = (y as f64 - material.y0 as f64) / dpi;
                let bottom = (material.y1 as f64 - y as f64) / dpi;
                top.min(bottom)
            })
            .collect();
        ChamferPredicate {
            material,
            radius_in: params.radius_in,
            dx,
            dy,
            layers_per_inch: NANOMETERS_PER_INCH / params.layer_height_nm as f64,
        }
    }

    /// Whether the voxel at `(x, y, z)` lies within the bevel radius of an
    /// edge or corner of the material box.
    fn is_carved(&self, x: usize, y: usize, z: usize) -> bool {
        let m = self.material;
        if x < m.x0 || x > m.x1 || y < m.y0 || y > m.y1 || z < m.z0 || z > m.z1 {
            return false;
        }
        let dx = self.dx[x];
        let dy = self.dy[y];
        let dz = ((z - m.z0) as f64).min((m.z1 - z) as f64) / self.layers_per_inch;
        let r = self.radius_in;
        // Edge cylinders along X, Y and Z, then the corner octants.
        dy + dz < r || dx + dz < r || dx + dy < r || dx + dy + dz < r
    }

    /// Predicate bitmap for one layer.
    fn layer_mask(&self, z: usize, width: usize, height: usize) -> Vec<bool> {
        let mut mask = vec![false; width * height];
        if z < self.material.z0 || z > self.material.z1 {
            return mask;
        }
        for y in self.material.y0..=self.material.y1 {
            for x in self.material.x0..=self.material.x1 {
                mask[y * width + x] = self.is_carved(x, y, z);
            }
        }
        mask
    }
}

/// Chamfer every PNG slice in `input_dir` into `output_dir` (same file
/// names). Non-PNG files are ignored; input and output may be the same
/// directory. When the stack holds no material at all the inputs are
/// copied through unchanged.
pub fn chamfer_stack(
    input_dir: &Path,
    output_dir: &Path,
    params: &ChamferParams,
) -> Result<ChamferStats> {
    if params.radius_in.is_nan() || params.radius_in < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "chamfer radius must be non-negative, got {}",
            params.radius_in
        )));
    }
    if params.dpi == 0 || params.layer_height_nm == 0 {
        return Err(Error::InvalidParameter(
            "chamfer needs non-zero dpi and layer height".into(),
        ));
    }

    let paths = collect_png_inputs(input_dir)?;
    let (width, height, mut slices) = load_slices(&paths)?;
    fs::create_dir_all(output_dir)?;

    let Some(material) = material_box(&slices, width, height) else {
        // Nothing to carve anywhere; pass the inputs through untouched.
        for path in &paths {
            let target = output_dir.join(path.file_name().unwrap_or_default());
            if target != *path {
                fs::copy(path, &target)?;
            }
        }
        return Ok(ChamferStats {
            layers: slices.len(),
            width,
            height,
            carved: 0,
        });
    };

    let predicate = ChamferPredicate::new(material, params, width, height);

    // Pass 2a: predicate bitmaps are a pure function of (x, y, z), so all
    // layers evaluate in parallel.
    let masks: Vec<Vec<bool>> = (0..slices.len())
        .into_par_iter()
        .map(|z| predicate.layer_mask(z, width, height))
        .collect();

    // Pass 2b: stream layers serially; the overlay needs the previous
    // layer's carve mask.
    let mut carved_total = 0u64;
    let mut prev_carved = vec![false; width * height];
    for (z, slice) in slices.iter_mut().enumerate() {
        let mut carved = masks[z].clone();
        for (index, flag) in carved.iter_mut().enumerate() {
            *flag &= slice.pixels()[index * 4 + 3] != 0;
        }

        if params.debug {
            draw_debug_overlay(slice, &carved, &prev_carved, &material, width, height);
        }

        for y in material.y0..=material.y1 {
            for x in material.x0..=material.x1 {
                if carved[y * width + x] {
                    let pixel = slice.get_pixel(x, y);
                    slice.set_pixel(x, y, Rgba::new(pixel.r, pixel.g, pixel.b, 0));
                    carved_total += 1;
                }
            }
        }

        let name = paths[z].file_name().unwrap_or_default();
        write_rgba_png(
            output_dir.join(name),
            width as u32,
            height as u32,
            slice.pixels(),
        )?;
        prev_carved = carved;
    }

    Ok(ChamferStats {
        layers: slices.len(),
        width,
        height,
        carved: carved_total,
    })
}

/// PNG files of the input directory in natural filename order.
fn collect_png_inputs(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("png"));
        if path.is_file() && is_png {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(Error::NoPngInputs(input_dir.to_path_buf()));
    }
    paths.sort_by(|a, b| {
        natural_cmp(
            &a.file_name().unwrap_or_default().to_string_lossy(),
            &b.file_name().unwrap_or_default().to_string_lossy(),
        )
    });
    Ok(paths)
}

fn load_slices(paths: &[PathBuf]) -> Result<(usize, usize, Vec<SliceImage>)> {
    let mut slices = Vec::with_capacity(paths.len());
    let mut dims = None;
    for path in paths {
        let decoded = image::open(path)?.to_rgba8();
        let (w, h) = decoded.dimensions();
        let (want_w, want_h) = *dims.get_or_insert((w, h));
        if (w, h) != (want_w, want_h) {
            return Err(Error::DimensionMismatch {
                path: path.clone(),
                found_w: w,
                found_h: h,
                want_w,
                want_h,
            });
        }
        let slice = SliceImage::from_raw(w as usize, h as usize, decoded.into_raw())
            .expect("decoded RGBA buffer matches its dimensions");
        slices.push(slice);
    }
    let (w, h) = dims.unwrap_or((0, 0));
    Ok((w as usize, h as usize, slices))
}

/// Bounds of all material (alpha > 0) across the stack, or `None` when the
/// stack is empty of material.
fn material_box(slices: &[SliceImage], width: usize, _height: usize) -> Option<MaterialBox> {
    let mut found: Option<MaterialBox> = None;
    for (z, slice) in slices.iter().enumerate() {
        for (index, pixel) in slice.pixels().chunks_exact(4).enumerate() {
            if pixel[3] == 0 {
                continue;
            }
            let x = index % width;
            let y = index / width;
            match &mut found {
                None => {
                    found = Some(MaterialBox {
                        x0: x,
                        x1: x,
                        y0: y,
                        y1: y,
                        z0: z,
                        z1: z,
                    });
                }
                Some(b) => {
                    b.x0 = b.x0.min(x);
                    b.x1 = b.x1.max(x);
                    b.y0 = b.y0.min(y);
                    b.y1 = b.y1.max(y);
                    b.z1 = z;
                }
            }
        }
    }
    found
}

/// Mark the material side of every new chamfer transition.
///
/// For each carved voxel: a horizontal transition is any in-image
/// 4-neighbor with a different carve state; a vertical transition is a
/// voxel carved on this layer but not at the same `(x, y)` on the previous
/// one (trivially true on the first layer). Either paints one neighboring
/// material pixel opaque black, preferring the cardinal directions toward
/// the box center, horizontal before vertical. The overlay runs before
/// carving so the mark lands on surviving material.
fn draw_debug_overlay(
    slice: &mut SliceImage,
    carved: &[bool],
    prev_carved: &[bool],
    material: &MaterialBox,
    width: usize,
    height: usize,
) {
    let center_x = (material.x0 + material.x1) / 2;
    let center_y = (material.y0 + material.y1) / 2;
    for y in material.y0..=material.y1 {
        for x in material.x0..=material.x1 {
            let index = y * width + x;
            if !carved[index] {
                continue;
            }

            let neighbors = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            let horizontal = neighbors.iter().any(|&(nx, ny)| {
                nx < width && ny < height && !carved[ny * width + nx]
            });
            let vertical = !prev_carved[index];
            if !horizontal && !vertical {
                continue;
            }

            let step_x = if x <= center_x { 1isize } else { -1 };
            let step_y = if y <= center_y { 1isize } else { -1 };
            let candidates = [
                (x as isize + step_x, y as isize),
                (x as isize, y as isize + step_y),
                (x as isize - step_x, y as isize),
                (x as isize, y as isize - step_y),
            ];
            for (nx, ny) in candidates {
                if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if carved[ny * width + nx] || !slice.get_pixel(nx, ny).is_material() {
                    continue;
                }
                slice.set_pixel(nx, ny, Rgba::new(0, 0, 0, 255));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 inch per 10 pixels and per 10 layers; cubic 0.1 in voxels.
    fn params(radius_in: f64) -> ChamferParams {
        ChamferParams {
            radius_in,
            dpi: 10,
            layer_height_nm: 2_540_000,
            debug: false,
        }
    }

    fn solid_slice(width: usize, height: usize) -> SliceImage {
        let mut slice = SliceImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                slice.set_pixel(x, y, Rgba::new(255, 255, 255, 255));
            }
        }
        slice
    }

    fn write_stack(dir: &Path, slices: &[SliceImage]) {
        for (z, slice) in slices.iter().enumerate() {
            write_rgba_png(
                dir.join(format!("out_{z}.png")),
                slice.width() as u32,
                slice.height() as u32,
                slice.pixels(),
            )
            .unwrap();
        }
    }

    fn read_alpha(path: &Path) -> Vec<u8> {
        image::open(path)
            .unwrap()
            .to_rgba8()
            .into_raw()
            .chunks_exact(4)
            .map(|p| p[3])
            .collect()
    }

    #[test]
    fn test_solid_cube_carves_corners_keeps_center() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        // A 1x1x1 inch solid cuboid: 10x10 px, 10 layers.
        let slices: Vec<SliceImage> = (0..10).map(|_| solid_slice(10, 10)).collect();
        write_stack(input.path(), &slices);

        let stats = chamfer_stack(input.path(), output.path(), &params(0.15)).unwrap();
        assert_eq!((stats.layers, stats.width, stats.height), (10, 10, 10));
        assert!(stats.carved > 0);

        let bottom = read_alpha(&output.path().join("out_0.png"));
        // The corner voxel has distance sum 0 from three faces.
        assert_eq!(bottom[0], 0);
        // On the bottom layer dz = 0, so anything within 0.15 in of a side
        // face carves; x = 2 is 0.2 in from the left face and survives.
        assert_eq!(bottom[5 * 10 + 1], 0);
        assert_ne!(bottom[5 * 10 + 2], 0);

        let middle = read_alpha(&output.path().join("out_5.png"));
        assert_ne!(middle[5 * 10 + 5], 0, "center voxel must never carve");
        // Mid-stack the bevel only affects the vertical edges.
        assert_eq!(middle[0], 0);
        assert_ne!(middle[10 + 1], 0);
    }

    #[test]
    fn test_carve_pattern_is_mirror_symmetric() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let slices: Vec<SliceImage> = (0..10).map(|_| solid_slice(10, 10)).collect();
        write_stack(input.path(), &slices);
        chamfer_stack(input.path(), output.path(), &params(0.25)).unwrap();

        for z in 0..10 {
            let alpha = read_alpha(&output.path().join(format!("out_{z}.png")));
            let mirrored = read_alpha(&output.path().join(format!("out_{}.png", 9 - z)));
            for y in 0..10 {
                for x in 0..10 {
                    let here = alpha[y * 10 + x];
                    assert_eq!(here, alpha[y * 10 + (9 - x)], "x mirror at {x},{y},{z}");
                    assert_eq!(here, alpha[(9 - y) * 10 + x], "y mirror at {x},{y},{z}");
                    assert_eq!(here, mirrored[y * 10 + x], "z mirror at {x},{y},{z}");
                }
            }
        }
    }

    #[test]
    fn test_zero_radius_reproduces_inputs_byte_for_byte() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let slices: Vec<SliceImage> = (0..4).map(|_| solid_slice(6, 6)).collect();
        write_stack(input.path(), &slices);

        let stats = chamfer_stack(input.path(), output.path(), &params(0.0)).unwrap();
        assert_eq!(stats.carved, 0);
        for z in 0..4 {
            let name = format!("out_{z}.png");
            let a = fs::read(input.path().join(&name)).unwrap();
            let b = fs::read(output.path().join(&name)).unwrap();
            assert_eq!(a, b, "layer {z}");
        }
    }

    #[test]
    fn test_oversized_radius_carves_everything() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let slices: Vec<SliceImage> = (0..10).map(|_| solid_slice(10, 10)).collect();
        write_stack(input.path(), &slices);

        // Well past the half-diagonal of a 1 inch cube.
        let stats = chamfer_stack(input.path(), output.path(), &params(2.0)).unwrap();
        assert_eq!(stats.carved, 10 * 10 * 10);
        for z in 0..10 {
            let alpha = read_alpha(&output.path().join(format!("out_{z}.png")));
            assert!(alpha.iter().all(|&a| a == 0));
        }
    }

    #[test]
    fn test_no_material_copies_inputs_verbatim() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let slices: Vec<SliceImage> = (0..3).map(|_| SliceImage::new(4, 4)).collect();
        write_stack(input.path(), &slices);

        let stats = chamfer_stack(input.path(), output.path(), &params(0.5)).unwrap();
        assert_eq!(stats.carved, 0);
        for z in 0..3 {
            let name = format!("out_{z}.png");
            let a = fs::read(input.path().join(&name)).unwrap();
            let b = fs::read(output.path().join(&name)).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_stack(input.path(), &[solid_slice(6, 6)]);
        write_rgba_png(
            input.path().join("out_1.png"),
            4,
            4,
            solid_slice(4, 4).pixels(),
        )
        .unwrap();

        let err = chamfer_stack(input.path(), output.path(), &params(0.1)).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_empty_directory_is_rejected_and_non_png_ignored() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let err = chamfer_stack(input.path(), output.path(), &params(0.1)).unwrap_err();
        assert!(matches!(err, Error::NoPngInputs(_)));

        // A stray non-PNG file neither counts as input nor breaks the pass.
        fs::write(input.path().join("notes.txt"), b"scratch").unwrap();
        let err = chamfer_stack(input.path(), output.path(), &params(0.1)).unwrap_err();
        assert!(matches!(err, Error::NoPngInputs(_)));

        write_stack(input.path(), &[solid_slice(6, 6)]);
        let stats = chamfer_stack(input.path(), output.path(), &params(0.1)).unwrap();
        assert_eq!(stats.layers, 1);
        assert!(!output.path().join("notes.txt").exists());
    }

    #[test]
    fn test_invalid_radius_is_rejected() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for radius in [-0.1, f64::NAN] {
            let err = chamfer_stack(input.path(), output.path(), &params(radius)).unwrap_err();
            assert!(matches!(err, Error::InvalidParameter(_)));
        }
    }

    #[test]
    fn test_debug_overlay_marks_material_side_of_new_transitions() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let slices: Vec<SliceImage> = (0..3).map(|_| solid_slice(10, 10)).collect();
        write_stack(input.path(), &slices);

        let mut debug_params = params(0.15);
        debug_params.debug = true;
        chamfer_stack(input.path(), output.path(), &debug_params).unwrap();

        let bottom = image::open(output.path().join("out_0.png"))
            .unwrap()
            .to_rgba8();
        // (1, 5) carves on the bottom layer (dz = 0, dx = 0.1 < 0.15); its
        // inward neighbor (2, 5) survives and carries the marker.
        assert_eq!(bottom.get_pixel(1, 5).0[3], 0);
        assert_eq!(bottom.get_pixel(2, 5).0, [0, 0, 0, 255]);

        // Without debug the surviving neighbor keeps its own color.
        let plain = tempfile::tempdir().unwrap();
        chamfer_stack(input.path(), plain.path(), &params(0.15)).unwrap();
        let bottom = image::open(plain.path().join("out_0.png"))
            .unwrap()
            .to_rgba8();
        assert_eq!(bottom.get_pixel(2, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_material_box_tracks_partial_slices() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        // Material only in a 2x2 patch on the middle layer.
        let mut middle = SliceImage::new(8, 8);
        for y in 3..5 {
            for x in 3..5 {
                middle.set_pixel(x, y, Rgba::new(9, 9, 9, 255));
            }
        }
        let slices = vec![SliceImage::new(8, 8), middle, SliceImage::new(8, 8)];
        write_stack(input.path(), &slices);

        // A tiny patch is entirely inside any sensible bevel radius.
        let stats = chamfer_stack(input.path(), output.path(), &params(0.15)).unwrap();
        assert_eq!(stats.carved, 4);
        let alpha = read_alpha(&output.path().join("out_1.png"));
        assert!(alpha.iter().all(|&a| a == 0));
    }
}
