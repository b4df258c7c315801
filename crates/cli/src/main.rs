//! geozonal CLI - zone statistics over rasters and point observations

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geozonal_algorithms::sampling::{attach_samples, extract_at_points, SampledValue};
use geozonal_algorithms::zonal::{Predicate, ResultTable, Statistic, TieBreak, ZonalParams, ZonalPipeline};
use geozonal_core::io::{
    load_with_timeout, read_geometry_store, read_geotiff, read_point_set, write_geometry_store,
    write_point_set, RasterReadOptions, VectorReadOptions,
};
use geozonal_core::{Field, GeometryStore, PointSet, Raster, CRS};
use geozonal_parallel::ProcessingMode;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geozonal")]
#[command(author, version, about = "Aggregate raster and point values by vector zones", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Abort any single load after this many seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster (GeoTIFF) or vector (GeoJSON) file
    Info {
        /// Input file
        input: PathBuf,
    },
    /// List the zones of a GeoJSON file
    Zones {
        /// Input GeoJSON file
        input: PathBuf,
        #[command(flatten)]
        vector: VectorArgs,
    },
    /// Compute statistics of a field within each zone
    Zonal {
        /// Zones (GeoJSON polygons, lines or points)
        zones: PathBuf,
        /// Field: a GeoTIFF raster or a GeoJSON file of points
        field: PathBuf,
        /// Write the zones with statistics attached (GeoJSON); prints CSV otherwise
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON file with zonal parameters; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Statistics to compute (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        stats: Vec<Statistic>,
        /// Membership rule
        #[arg(short, long, value_enum)]
        predicate: Option<PredicateArg>,
        /// Search distance for `--predicate within-distance`, in CRS units
        #[arg(short, long)]
        distance: Option<f64>,
        /// Which zone keeps a sample matched by several zones
        #[arg(long, value_enum)]
        tie_break: Option<TieBreakArg>,
        /// Attribute holding values when the field is a point file
        #[arg(short = 'a', long)]
        value_attribute: Option<String>,
        /// Reproject zones into the field CRS instead of failing on mismatch
        #[arg(long)]
        reproject: bool,
        /// Number of worker threads (1 runs sequentially)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
        #[command(flatten)]
        vector: VectorArgs,
        #[command(flatten)]
        raster: RasterArgs,
        #[command(flatten)]
        points: PointFieldArgs,
    },
    /// Sample a raster at point locations
    Extract {
        /// Input raster (GeoTIFF)
        raster: PathBuf,
        /// Points (GeoJSON)
        points: PathBuf,
        /// Write points with the sampled attribute (GeoJSON); prints CSV otherwise
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Attribute name for the sampled value
        #[arg(short, long, default_value = "value")]
        name: String,
        #[command(flatten)]
        vector: VectorArgs,
        #[command(flatten)]
        raster_args: RasterArgs,
    },
    /// Reproject a GeoJSON file
    Reproject {
        /// Input GeoJSON file
        input: PathBuf,
        /// Output GeoJSON file
        output: PathBuf,
        /// Target CRS (e.g. EPSG:32630)
        #[arg(short, long)]
        to: CRS,
        #[command(flatten)]
        vector: VectorArgs,
    },
}

#[derive(clap::Args)]
struct VectorArgs {
    /// CRS of the vector input, overriding the file
    #[arg(long)]
    vector_crs: Option<CRS>,
    /// Property used as feature identity when features have no `id`
    #[arg(long)]
    id_field: Option<String>,
}

impl VectorArgs {
    fn options(&self) -> VectorReadOptions {
        VectorReadOptions {
            crs: self.vector_crs.clone(),
            id_field: self.id_field.clone(),
        }
    }
}

#[derive(clap::Args)]
struct PointFieldArgs {
    /// CRS of a point field, overriding the file
    #[arg(long)]
    points_crs: Option<CRS>,
    /// Property used as observation identity in a point field
    #[arg(long)]
    points_id_field: Option<String>,
}

impl PointFieldArgs {
    fn options(&self) -> VectorReadOptions {
        VectorReadOptions {
            crs: self.points_crs.clone(),
            id_field: self.points_id_field.clone(),
        }
    }
}

#[derive(clap::Args)]
struct RasterArgs {
    /// CRS of the raster, overriding the file
    #[arg(long)]
    raster_crs: Option<CRS>,
    /// NoData value of the raster, overriding the file
    #[arg(long)]
    nodata: Option<f64>,
    /// Band to read (1-based)
    #[arg(long)]
    band: Option<usize>,
}

impl RasterArgs {
    fn options(&self) -> RasterReadOptions {
        RasterReadOptions {
            band: self.band,
            crs: self.raster_crs.clone(),
            nodata: self.nodata,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PredicateArg {
    CenterInside,
    AnyOverlap,
    WithinDistance,
}

#[derive(Clone, Copy, ValueEnum)]
enum TieBreakArg {
    LowestId,
    FirstInOrder,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn is_raster(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("tif" | "tiff")
    )
}

fn read_raster(path: &Path, options: RasterReadOptions, timeout: Option<Duration>) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let owned = path.to_path_buf();
    let raster: Raster<f64> = load_with_timeout(timeout, move || read_geotiff(&owned, &options))
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Raster: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_zones(path: &Path, options: VectorReadOptions, timeout: Option<Duration>) -> Result<GeometryStore> {
    let pb = spinner("Reading zones...");
    let owned = path.to_path_buf();
    let store = load_with_timeout(timeout, move || read_geometry_store(&owned, &options))
        .with_context(|| format!("Failed to read zones {}", path.display()))?;
    pb.finish_and_clear();
    info!("Zones: {} features ({})", store.len(), store.crs());
    Ok(store)
}

fn read_points(path: &Path, options: VectorReadOptions, timeout: Option<Duration>) -> Result<PointSet> {
    let pb = spinner("Reading points...");
    let owned = path.to_path_buf();
    let points = load_with_timeout(timeout, move || read_point_set(&owned, &options))
        .with_context(|| format!("Failed to read points {}", path.display()))?;
    pb.finish_and_clear();
    info!("Points: {} observations ({})", points.len(), points.crs());
    Ok(points)
}

fn done(name: &str, path: &Path, elapsed: Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

/// CSV field, quoted when it holds a delimiter, quote or line break
fn csv_field(text: &str) -> Cow<'_, str> {
    if text.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", text.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(text)
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn print_table(table: &ResultTable) {
    let header: Vec<&str> = table.statistics().iter().map(Statistic::name).collect();
    println!("zone_id,{},n_samples,n_nodata", header.join(","));
    for row in table.rows() {
        let values: Vec<String> = row.values.iter().copied().map(format_value).collect();
        let id = row.zone_id.to_string();
        println!("{},{},{},{}", csv_field(&id), values.join(","), row.count, row.nodata_count);
    }
}

/// Parameters from `--config`, then command-line overrides
#[allow(clippy::too_many_arguments)]
fn zonal_params(
    config: Option<&Path>,
    stats: Vec<Statistic>,
    predicate: Option<PredicateArg>,
    distance: Option<f64>,
    tie_break: Option<TieBreakArg>,
    value_attribute: Option<String>,
    reproject: bool,
    threads: Option<usize>,
) -> Result<ZonalParams> {
    let mut params = match config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => ZonalParams::default(),
    };

    if !stats.is_empty() {
        params.statistics = stats;
    }
    match (predicate, distance) {
        (Some(PredicateArg::CenterInside), _) => params.predicate = Predicate::CenterInside,
        (Some(PredicateArg::AnyOverlap), _) => params.predicate = Predicate::AnyOverlap,
        (Some(PredicateArg::WithinDistance), Some(d)) | (None, Some(d)) => {
            params.predicate = Predicate::WithinDistance(d)
        }
        (Some(PredicateArg::WithinDistance), None) => {
            if !matches!(params.predicate, Predicate::WithinDistance(_)) {
                bail!("--predicate within-distance needs --distance");
            }
        }
        (None, None) => {}
    }
    match tie_break {
        Some(TieBreakArg::LowestId) => params.tie_break = TieBreak::LowestId,
        Some(TieBreakArg::FirstInOrder) => params.tie_break = TieBreak::FirstInOrder,
        None => {}
    }
    if value_attribute.is_some() {
        params.value_attribute = value_attribute;
    }
    params.reproject_zones |= reproject;
    match threads {
        Some(0) => bail!("--threads must be at least 1"),
        Some(1) => params.mode = ProcessingMode::Sequential,
        Some(n) => params.mode = ProcessingMode::ParallelWith(n),
        None => {}
    }
    Ok(params)
}

fn info_raster(input: &Path, timeout: Option<Duration>) -> Result<()> {
    let raster = read_raster(input, RasterReadOptions::default(), timeout)?;
    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    match raster.crs() {
        Some(crs) => println!("CRS: {}", crs),
        None => println!("CRS: (not set)"),
    }
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

fn info_vector(input: &Path, options: VectorReadOptions, timeout: Option<Duration>) -> Result<()> {
    let store = read_zones(input, options, timeout)?;
    println!("File: {}", input.display());
    println!("Features: {}", store.len());
    if let Some(kind) = store.kind() {
        println!("Geometry: {:?}", kind);
    }
    println!("CRS: {}", store.crs());
    if let Some(b) = store.bounds() {
        println!(
            "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
            b.min().x, b.min().y, b.max().x, b.max().y
        );
    }
    let mut attributes: Vec<&String> = store.iter().flat_map(|f| f.properties.keys()).collect();
    attributes.sort();
    attributes.dedup();
    if !attributes.is_empty() {
        let names: Vec<&str> = attributes.iter().map(|s| s.as_str()).collect();
        println!("Attributes: {}", names.join(", "));
    }
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let timeout = cli.timeout.map(Duration::from_secs);

    match cli.command {
        Commands::Info { input } => {
            if is_raster(&input) {
                info_raster(&input, timeout)?;
            } else {
                info_vector(&input, VectorReadOptions::default(), timeout)?;
            }
        }

        Commands::Zones { input, vector } => {
            let store = read_zones(&input, vector.options(), timeout)?;
            println!("id,kind,attributes");
            for feature in &store {
                let kind = feature.kind().map(|k| format!("{:?}", k)).unwrap_or_default();
                let id = feature.id().to_string();
                println!("{},{},{}", csv_field(&id), kind, feature.properties.len());
            }
        }

        Commands::Zonal {
            zones,
            field,
            output,
            config,
            stats,
            predicate,
            distance,
            tie_break,
            value_attribute,
            reproject,
            threads,
            vector,
            raster,
            points,
        } => {
            let params = zonal_params(
                config.as_deref(),
                stats,
                predicate,
                distance,
                tie_break,
                value_attribute,
                reproject,
                threads,
            )?;
            let store = read_zones(&zones, vector.options(), timeout)?;
            let field = if is_raster(&field) {
                Field::Grid(read_raster(&field, raster.options(), timeout)?)
            } else {
                Field::Points(read_points(&field, points.options(), timeout)?)
            };

            let start = Instant::now();
            let pb = spinner("Computing zone statistics...");
            let bar = pb.clone();
            let table = ZonalPipeline::new(params)
                .with_progress(move |done, total| {
                    bar.set_message(format!("Computing zone statistics... {}/{}", done, total))
                })
                .run(&store, &field)
                .context("Zonal statistics failed")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            match output {
                Some(path) => {
                    let joined = table.into_geometry_store(&store)?;
                    write_geometry_store(&joined, &path).context("Failed to write output")?;
                    done("Zonal statistics", &path, elapsed);
                }
                None => print_table(&table),
            }
        }

        Commands::Extract {
            raster,
            points,
            output,
            name,
            vector,
            raster_args,
        } => {
            let grid = read_raster(&raster, raster_args.options(), timeout)?;
            let points = read_points(&points, vector.options(), timeout)?;

            let start = Instant::now();
            let samples = extract_at_points(&grid, &points).context("Sampling failed")?;
            let elapsed = start.elapsed();

            match output {
                Some(path) => {
                    let sampled = attach_samples(&points, &samples, &name)?;
                    write_point_set(&sampled, &path).context("Failed to write output")?;
                    done("Samples", &path, elapsed);
                }
                None => {
                    println!("id,x,y,{}", csv_field(&name));
                    for s in &samples {
                        let value = match s.value {
                            SampledValue::Value(v) => v.to_string(),
                            SampledValue::Nodata => String::new(),
                            SampledValue::OutOfBounds => "out_of_bounds".into(),
                        };
                        let id = s.id.to_string();
                        println!("{},{},{},{}", csv_field(&id), s.x, s.y, value);
                    }
                }
            }
        }

        Commands::Reproject { input, output, to, vector } => {
            let store = read_zones(&input, vector.options(), timeout)?;
            let start = Instant::now();
            let reprojected = store
                .reproject(&to)
                .with_context(|| format!("Failed to reproject to {}", to))?;
            write_geometry_store(&reprojected, &output).context("Failed to write output")?;
            done("Reprojected zones", &output, start.elapsed());
        }
    }

    Ok(())
}
