//! Cloudslicer CLI - Command-line interface for the cloudslicer library
//!
//! Usage:
//!   cloudslicer slice <input.ply> --out-dir slices --x-in 2.0 --y-in 2.0 --z-in 1.0
//!   cloudslicer slice <input.ply> --config job.json
//!   cloudslicer chamfer <slice_dir> --out-dir beveled --radius 0.1
//!   cloudslicer info <input.ply>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudslicer::{
    chamfer_stack, load_ply, ChamferParams, InteriorFill, JobConfig, ShellPolicyConfig,
    SlicePipeline,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn, LevelFilter};
use std::path::PathBuf;

/// A voxelizing slicer: colored point clouds in, PNG layer stacks out
#[derive(Parser, Debug)]
#[command(name = "cloudslicer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Slice a PLY point cloud into a stack of PNG layers
    Slice {
        /// Input PLY file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output directory for out_{z}.png slices
        #[arg(short, long, value_name = "DIR", default_value = "slices")]
        out_dir: PathBuf,

        /// Job configuration file (JSON format); flags override its values
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Build size along X in inches
        #[arg(long, required_unless_present = "config")]
        x_in: Option<f64>,

        /// Build size along Y in inches
        #[arg(long, required_unless_present = "config")]
        y_in: Option<f64>,

        /// Build size along Z in inches
        #[arg(long, required_unless_present = "config")]
        z_in: Option<f64>,

        /// X/Y resolution in dots per inch
        #[arg(long)]
        dpi: Option<u32>,

        /// Z layer height in nanometers
        #[arg(long)]
        layer_height_nm: Option<u32>,

        /// Per-axis AABB inflation ratio before voxel mapping
        #[arg(long)]
        padding: Option<f64>,

        /// Nearest-neighbor radius in inches
        #[arg(long)]
        radius: Option<f64>,

        /// Anisotropic NN radii in inches (replaces --radius)
        #[arg(long, value_name = "RX,RY,RZ", num_args = 3, value_delimiter = ',')]
        anisotropic: Option<Vec<f64>>,

        /// Shell policy (color-by-sample, two-band)
        #[arg(long, default_value = "color-by-sample")]
        shell: String,

        /// Inner band radius in inches (two-band shell)
        #[arg(long, default_value = "0.005")]
        r_inner: f64,

        /// Outer band radius in inches (two-band shell)
        #[arg(long, default_value = "0.01")]
        r_outer: f64,

        /// Interior fill (off, before, after)
        #[arg(long, default_value = "off")]
        fill: String,

        /// Painted-pixel threshold for the 'after' fill mode
        #[arg(long, default_value = "500")]
        fill_threshold: usize,

        /// Chamfer the emitted stack with this bevel radius in inches
        #[arg(long, default_value = "0")]
        chamfer: f64,

        /// Paint black transition markers during the chamfer pass
        #[arg(long)]
        chamfer_debug: bool,

        /// Number of threads to use (0 = auto)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,
    },

    /// Chamfer the edges and corners of an existing slice stack
    Chamfer {
        /// Directory of slice PNGs
        #[arg(value_name = "INPUT_DIR")]
        input_dir: PathBuf,

        /// Output directory (may equal the input directory)
        #[arg(short, long, value_name = "DIR")]
        out_dir: PathBuf,

        /// Bevel radius in inches
        #[arg(long)]
        radius: f64,

        /// X/Y resolution of the slices in dots per inch
        #[arg(long, default_value = "300")]
        dpi: u32,

        /// Z layer height of the slices in nanometers
        #[arg(long, default_value = "27000")]
        layer_height_nm: u32,

        /// Paint black transition markers on the surviving material
        #[arg(long)]
        debug_overlay: bool,
    },

    /// Display information about a PLY point cloud
    Info {
        /// Input PLY file
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Slice {
            input,
            out_dir,
            config,
            x_in,
            y_in,
            z_in,
            dpi,
            layer_height_nm,
            padding,
            radius,
            anisotropic,
            shell,
            r_inner,
            r_outer,
            fill,
            fill_threshold,
            chamfer,
            chamfer_debug,
            threads,
        } => cmd_slice(SliceArgs {
            input,
            out_dir,
            config,
            x_in,
            y_in,
            z_in,
            dpi,
            layer_height_nm,
            padding,
            radius,
            anisotropic,
            shell,
            r_inner,
            r_outer,
            fill,
            fill_threshold,
            chamfer,
            chamfer_debug,
            threads,
        }),
        Commands::Chamfer {
            input_dir,
            out_dir,
            radius,
            dpi,
            layer_height_nm,
            debug_overlay,
        } => cmd_chamfer(input_dir, out_dir, radius, dpi, layer_height_nm, debug_overlay),
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

/// 1 for input/parameter/IO problems, 2 for anything unexpected.
fn exit_code(err: &anyhow::Error) -> i32 {
    let expected = err.chain().any(|cause| {
        cause.downcast_ref::<cloudslicer::Error>().is_some()
            || cause.downcast_ref::<cloudslicer::PlyError>().is_some()
            || cause.downcast_ref::<std::io::Error>().is_some()
    });
    if expected {
        1
    } else {
        2
    }
}

struct SliceArgs {
    input: PathBuf,
    out_dir: PathBuf,
    config: Option<PathBuf>,
    x_in: Option<f64>,
    y_in: Option<f64>,
    z_in: Option<f64>,
    dpi: Option<u32>,
    layer_height_nm: Option<u32>,
    padding: Option<f64>,
    radius: Option<f64>,
    anisotropic: Option<Vec<f64>>,
    shell: String,
    r_inner: f64,
    r_outer: f64,
    fill: String,
    fill_threshold: usize,
    chamfer: f64,
    chamfer_debug: bool,
    threads: usize,
}

fn cmd_slice(args: SliceArgs) -> Result<()> {
    // Set thread count if specified
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("Failed to initialize thread pool")?;
    }

    // Build the job config from the file (if any), then apply CLI overrides
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading job config from: {}", path.display());
            JobConfig::from_file(path).context("Failed to load job config file")?
        }
        None => JobConfig::default(),
    };

    if let Some(x_in) = args.x_in {
        config.volume.x_in = x_in;
    }
    if let Some(y_in) = args.y_in {
        config.volume.y_in = y_in;
    }
    if let Some(z_in) = args.z_in {
        config.volume.z_in = z_in;
    }
    if let Some(dpi) = args.dpi {
        config.volume.dpi = dpi;
    }
    if let Some(layer_height_nm) = args.layer_height_nm {
        config.volume.layer_height_nm = layer_height_nm;
    }
    if let Some(padding) = args.padding {
        config.padding_ratio = padding;
    }
    if let Some(radius) = args.radius {
        config.voxel_radius_in = radius;
    }
    if let Some(radii) = &args.anisotropic {
        config.anisotropic_radii_in = Some([radii[0], radii[1], radii[2]]);
    }
    config.shell_policy = match args.shell.to_lowercase().as_str() {
        "color-by-sample" | "color" => ShellPolicyConfig::ColorBySample,
        "two-band" | "shell" => ShellPolicyConfig::TwoBand {
            r_inner_in: args.r_inner,
            r_outer_in: args.r_outer,
        },
        other => {
            warn!("Unknown shell policy '{}', using color-by-sample", other);
            ShellPolicyConfig::ColorBySample
        }
    };
    config.interior_fill = match args.fill.to_lowercase().as_str() {
        "off" | "none" => InteriorFill::Off,
        "before" | "before-sampling" => InteriorFill::BeforeSampling,
        "after" | "after-sampling" => InteriorFill::AfterSamplingIfFilled {
            threshold: args.fill_threshold,
        },
        other => {
            warn!("Unknown interior fill '{}', using off", other);
            InteriorFill::Off
        }
    };
    if args.chamfer > 0.0 {
        config.chamfer_radius_in = args.chamfer;
        config.chamfer_debug = args.chamfer_debug;
    }

    info!("Loading PLY file: {}", args.input.display());
    let cloud = load_ply(&args.input).context("Failed to load PLY file")?;

    let aabb = cloud.aabb();
    info!("Cloud loaded:");
    info!("  Points: {}", cloud.len());
    info!(
        "  Bounding box: ({:.3}, {:.3}, {:.3}) - ({:.3}, {:.3}, {:.3})",
        aabb.min[0], aabb.min[1], aabb.min[2], aabb.max[0], aabb.max[1], aabb.max[2]
    );

    let (width, height, depth) = config.volume.dims();
    info!("Configuration:");
    info!(
        "  Build volume: {} x {} x {} in",
        config.volume.x_in, config.volume.y_in, config.volume.z_in
    );
    info!(
        "  Resolution: {} dpi, {} nm layers",
        config.volume.dpi, config.volume.layer_height_nm
    );
    info!("  Raster: {} x {} px, {} layers", width, height, depth);

    // Create progress bar
    let progress = ProgressBar::new(depth as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.set_message("Slicing layers...");

    let pipeline = SlicePipeline::new(config, args.out_dir.clone());
    let stats = pipeline.process_with_callback(&cloud, |stage, done, _total| match stage {
        "slicing" => progress.set_position(done as u64),
        "chamfer" if done == 0 => progress.set_message("Chamfering..."),
        _ => {}
    })?;

    progress.finish_with_message("Done!");

    println!();
    println!("Slicing complete!");
    println!("  Output: {}", args.out_dir.display());
    println!(
        "  Slices: {} ({} x {} px)",
        stats.layers, stats.width, stats.height
    );
    println!("  Filled pixels: {}", stats.filled_pixels);

    Ok(())
}

fn cmd_chamfer(
    input_dir: PathBuf,
    out_dir: PathBuf,
    radius: f64,
    dpi: u32,
    layer_height_nm: u32,
    debug_overlay: bool,
) -> Result<()> {
    info!("Chamfering slice stack");
    info!("  Input: {}", input_dir.display());
    info!("  Radius: {} in", radius);

    let params = ChamferParams {
        radius_in: radius,
        dpi,
        layer_height_nm,
        debug: debug_overlay,
    };
    let stats =
        chamfer_stack(&input_dir, &out_dir, &params).context("Failed to chamfer slice stack")?;

    println!("Chamfer complete!");
    println!("  Output: {}", out_dir.display());
    println!(
        "  Slices: {} ({} x {} px)",
        stats.layers, stats.width, stats.height
    );
    println!("  Carved voxels: {}", stats.carved);

    Ok(())
}

fn cmd_info(input: PathBuf) -> Result<()> {
    info!("Loading PLY file: {}", input.display());

    let cloud = load_ply(&input).context("Failed to load PLY file")?;

    let aabb = cloud.aabb();
    let colored = cloud.points().iter().filter(|p| p.color.is_some()).count();

    println!("Point Cloud Information:");
    println!("  File: {}", input.display());
    println!("  Points: {} ({} colored)", cloud.len(), colored);
    println!("  Bounding box:");
    println!(
        "    Min: ({:.4}, {:.4}, {:.4})",
        aabb.min[0], aabb.min[1], aabb.min[2]
    );
    println!(
        "    Max: ({:.4}, {:.4}, {:.4})",
        aabb.max[0], aabb.max[1], aabb.max[2]
    );
    println!(
        "    Size: {:.4} x {:.4} x {:.4}",
        aabb.span(0),
        aabb.span(1),
        aabb.span(2)
    );

    // Raster sizes for a one-inch-per-model-unit build at common DPIs
    println!("  Raster estimates (1 in per model unit):");
    for dpi in [150u32, 300, 600] {
        let volume = cloudslicer::BuildVolume {
            dpi,
            x_in: aabb.span(0).max(f64::EPSILON),
            y_in: aabb.span(1).max(f64::EPSILON),
            z_in: aabb.span(2).max(f64::EPSILON),
            ..Default::default()
        };
        let (w, h, d) = volume.dims();
        println!("    At {} dpi: {} x {} px, {} layers", dpi, w, h, d);
    }

    Ok(())
}
