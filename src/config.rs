//! Job configuration types.
//!
//! A [`JobConfig`] captures every knob of a slicing job and can be loaded
//! from a JSON file; the CLI overrides individual fields from flags.
//! Physical quantities are in inches at this level and converted to model
//! units when the rasterizer is built.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::grid::{BuildVolume, VoxelGrid};
use crate::slice::{RasterizerConfig, SearchRadius, ShellPolicy};
use crate::{Error, Result};

/// Default interior-fill pixel threshold.
const DEFAULT_FILL_THRESHOLD: usize = 500;

fn default_fill_threshold() -> usize {
    DEFAULT_FILL_THRESHOLD
}

fn default_voxel_radius_in() -> f64 {
    0.01
}

/// Shell policy selection, band radii in inches.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ShellPolicyConfig {
    /// Paint each hit with its sample's color (dot rendering).
    ColorBySample,
    /// Inner band in sample color, outer band semi-transparent gray
    /// (surface rendering). Requires `r_inner_in < r_outer_in`.
    TwoBand { r_inner_in: f64, r_outer_in: f64 },
}

impl Default for ShellPolicyConfig {
    fn default() -> Self {
        ShellPolicyConfig::ColorBySample
    }
}

/// Interior flood-fill behavior for each layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum InteriorFill {
    /// No fill.
    Off,
    /// Fill first so sampled pixels overwrite the background.
    BeforeSampling,
    /// Fill after sampling, but only when more than `threshold` pixels were
    /// painted; keeps empty layers from growing a spurious floor.
    AfterSamplingIfFilled {
        #[serde(default = "default_fill_threshold")]
        threshold: usize,
    },
}

impl Default for InteriorFill {
    fn default() -> Self {
        InteriorFill::Off
    }
}

/// Complete configuration for a slicing job.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    // === Physical build volume ===
    /// Resolutions and per-axis build size in inches.
    pub volume: BuildVolume,

    // === Model placement ===
    /// Per-axis AABB inflation ratio applied before the voxel mapping.
    pub padding_ratio: f64,

    // === Sampling ===
    /// NN radius (inches), converted through the model-units-per-inch
    /// scale of the padded box.
    pub voxel_radius_in: f64,
    /// Optional per-axis radii (inches) replacing the isotropic radius
    /// with a flatter search volume.
    pub anisotropic_radii_in: Option<[f64; 3]>,
    /// Distance-to-color rule.
    pub shell_policy: ShellPolicyConfig,
    /// Interior flood-fill behavior.
    pub interior_fill: InteriorFill,

    // === Chamfer post-pass ===
    /// Bevel radius (inches) applied to the emitted stack; 0 disables the
    /// pass.
    pub chamfer_radius_in: f64,
    /// Draw black transition markers next to carved voxels.
    pub chamfer_debug: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            volume: BuildVolume::default(),
            padding_ratio: 0.0,
            voxel_radius_in: default_voxel_radius_in(),
            anisotropic_radii_in: None,
            shell_policy: ShellPolicyConfig::default(),
            interior_fill: InteriorFill::default(),
            chamfer_radius_in: 0.0,
            chamfer_debug: false,
        }
    }
}

impl JobConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::InvalidParameter(format!("config file: {e}")))
    }

    /// Reject configurations that cannot produce a meaningful stack.
    pub fn validate(&self) -> Result<()> {
        self.volume.validate()?;
        if !self.padding_ratio.is_finite() || self.padding_ratio < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "padding_ratio must be non-negative, got {}",
                self.padding_ratio
            )));
        }
        if !self.voxel_radius_in.is_finite() || self.voxel_radius_in <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "voxel_radius_in must be positive, got {}",
                self.voxel_radius_in
            )));
        }
        if let Some(radii) = self.anisotropic_radii_in {
            if radii.iter().any(|r| !r.is_finite() || *r < 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "anisotropic radii must be non-negative, got {radii:?}"
                )));
            }
        }
        if let ShellPolicyConfig::TwoBand {
            r_inner_in,
            r_outer_in,
        } = self.shell_policy
        {
            if !(r_inner_in.is_finite() && r_outer_in.is_finite())
                || r_inner_in < 0.0
                || r_inner_in >= r_outer_in
            {
                return Err(Error::InvalidParameter(format!(
                    "two-band shell needs 0 <= r_inner_in < r_outer_in, got {r_inner_in} and {r_outer_in}"
                )));
            }
        }
        if self.chamfer_radius_in.is_nan() || self.chamfer_radius_in < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "chamfer_radius_in must be non-negative, got {}",
                self.chamfer_radius_in
            )));
        }
        Ok(())
    }

    /// Convert the inch-level sampling parameters into a model-unit
    /// [`RasterizerConfig`] for the given grid.
    pub fn rasterizer_config(&self, grid: &VoxelGrid) -> RasterizerConfig {
        let scale = grid.model_units_per_inch(&self.volume);
        let shell = match self.shell_policy {
            ShellPolicyConfig::ColorBySample => ShellPolicy::ColorBySample,
            ShellPolicyConfig::TwoBand {
                r_inner_in,
                r_outer_in,
            } => ShellPolicy::TwoBand {
                inner: r_inner_in * scale,
                outer: r_outer_in * scale,
            },
        };
        let radius = match self.anisotropic_radii_in {
            Some([x, y, z]) => SearchRadius::Anisotropic {
                x: x * scale,
                y: y * scale,
                z: z * scale,
            },
            None => {
                // The two-band policy needs hits out to the outer band.
                let cap_in = match self.shell_policy {
                    ShellPolicyConfig::TwoBand { r_outer_in, .. } => r_outer_in,
                    ShellPolicyConfig::ColorBySample => self.voxel_radius_in,
                };
                SearchRadius::Isotropic(cap_in * scale)
            }
        };
        RasterizerConfig {
            radius,
            shell,
            interior_fill: self.interior_fill,
        }
    }
}
