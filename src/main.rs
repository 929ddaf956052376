use clap::{Parser, Subcommand};
use ortho_gal::aggregate;
use ortho_gal::codec::{self, Quality};
use ortho_gal::config::{self, FailurePolicy, OrthoConfig};
use ortho_gal::convert::{self, ConvertOptions};
use ortho_gal::deck::{self, DeckPaths};
use ortho_gal::gallery::{self, GalleryError, GalleryText};
use ortho_gal::output;
use ortho_gal::project::{Category, FileMarker, MarkerStore, ProjectContext, ProjectId};
use ortho_gal::sync::{self, ImportRequest, SyncPolicy};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ortho-gal")]
#[command(version)]
#[command(about = "Orthomosaic ingestion and gallery assembly")]
#[command(long_about = "\
Orthomosaic ingestion and gallery assembly

Imports rasters exported by the photogrammetry tool into per-project trees,
then builds a slide deck for one project or a zoomable gallery across many.

Project tree:

  data/
  └── 2025_annual/
      ├── originals/               # import-originals: one file per export dir
      │   ├── BWR_T1_full.tif
      │   └── BWR_T2_full.tif
      └── edited/                  # import-edited: hand-edited rasters
          └── BWR_T1_full.tif

Source batch for import-originals:

  exports/
  ├── TCRMP20251010_3D_BWR_T1_Proxy/
  │   └── TCRMP20251010_3D_BWR_T1_Proxy_full.tif
  └── TCRMP20251010_3D_BWR_T2_Proxy/
      └── TCRMP20251010_3D_BWR_T2_Proxy_full.tif

Imports skip files that already exist (use --force to replace older ones),
so an interrupted import is resumed by running it again. The last imported
project is remembered in .current_project and used when --project is omitted.

Run 'ortho-gal gen-config' to generate a documented ortho-gal.toml.")]
struct Cli {
    /// Configuration file (optional; stock defaults apply when missing)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Flags shared by both import commands.
#[derive(clap::Args, Clone)]
struct ImportArgs {
    /// Destination directory instead of the project's category directory
    #[arg(short = 'd', long = "dest")]
    dest: Option<PathBuf>,

    /// Replace existing files when the source is strictly newer
    #[arg(short, long)]
    force: bool,
}

/// Flags shared by the conversion commands.
#[derive(clap::Args, Clone)]
struct ConvertArgs {
    /// Skip images that fail to convert instead of aborting
    #[arg(long)]
    keep_going: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Copy one *_full file per export directory into <project>/originals
    ImportOriginals {
        /// Directory holding the photogrammetry export directories
        source: PathBuf,
        /// Project id, e.g. 2025_annual
        project: String,
        #[command(flatten)]
        args: ImportArgs,
    },
    /// Copy SITE_TRANSECT_full files into <project>/edited
    ImportEdited {
        /// Directory holding the edited rasters
        source: PathBuf,
        /// Project id (defaults to the current project)
        project: Option<String>,
        #[command(flatten)]
        args: ImportArgs,
    },
    /// Build the slide deck for one project's edited rasters
    Deck {
        /// Deck HTML path (default: <deck_dir>/<title_prefix>_<project>.html)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Project id (defaults to the current project)
        #[arg(long)]
        project: Option<String>,
        #[command(flatten)]
        convert: ConvertArgs,
    },
    /// Build the gallery across all configured datasets
    Gallery {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Dataset list (JSON)
        #[arg(long)]
        datasets: Option<PathBuf>,
        #[command(flatten)]
        convert: ConvertArgs,
    },
    /// Show the current project and what has been imported
    Status {
        #[arg(long)]
        project: Option<String>,
    },
    /// Print a stock ortho-gal.toml with all options documented
    GenConfig,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ortho_gal=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ortho_gal=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.config)?;
    let marker = FileMarker::new(&config.paths.marker);
    let data_root = PathBuf::from(&config.paths.data_dir);

    match cli.command {
        Command::ImportOriginals {
            source,
            project,
            args,
        } => {
            let ctx = ProjectContext::new(&data_root, ProjectId::new(&project)?);
            import(&config, &ctx, Category::Originals, &source, &args, Some(&marker))
        }
        Command::ImportEdited {
            source,
            project,
            args,
        } => {
            let ctx = ProjectContext::resolve(&data_root, project.as_deref(), &marker)?;
            import(&config, &ctx, Category::Edited, &source, &args, None)
        }
        Command::Deck {
            output,
            project,
            convert,
        } => {
            let ctx = ProjectContext::resolve(&data_root, project.as_deref(), &marker)?;
            build_deck(&config, &ctx, output, &convert)
        }
        Command::Gallery {
            data_dir,
            output_dir,
            datasets,
            convert,
        } => {
            let data_root = data_dir.unwrap_or(data_root);
            let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&config.paths.output_dir));
            let datasets = datasets.unwrap_or_else(|| PathBuf::from(&config.paths.datasets));
            build_gallery(&config, &data_root, &output_dir, &datasets, &convert)
        }
        Command::Status { project } => {
            let ctx = ProjectContext::resolve(&data_root, project.as_deref(), &marker)?;
            let categories = aggregate::project_status(&ctx, &config.naming.extension)?;
            output::print_status(&ctx.project, &categories);
            Ok(())
        }
        Command::GenConfig => Ok(()),
    }
}

fn import(
    config: &OrthoConfig,
    ctx: &ProjectContext,
    category: Category,
    source: &Path,
    args: &ImportArgs,
    marker: Option<&dyn MarkerStore>,
) -> Result<(), Box<dyn Error>> {
    let request = ImportRequest {
        category,
        source,
        dest_override: args.dest.as_deref(),
        policy: SyncPolicy { force: args.force },
        extension: &config.naming.extension,
    };
    init_thread_pool(&config.processing);

    let (tx, printer) = spawn_printer(output::format_sync_event);
    let result = sync::import_batch(ctx, &request, marker, Some(&tx));
    finish_printer(tx, printer);

    let report = result?;
    output::print_import_summary(&ctx.project, category, &report);
    report.ensure_complete()?;
    Ok(())
}

fn build_deck(
    config: &OrthoConfig,
    ctx: &ProjectContext,
    output: Option<PathBuf>,
    args: &ConvertArgs,
) -> Result<(), Box<dyn Error>> {
    let edited = ctx.existing_category_dir(Category::Edited)?;
    let sites = aggregate::plan_sites(&edited, &config.naming.extension)?;
    if sites.is_empty() {
        return Err(format!(
            "No {{SITE}}_{{TRANSECT}}_full.{} files in {}",
            config.naming.extension,
            edited.display()
        )
        .into());
    }
    output::print_site_listing(&sites, &edited);

    let html = output.unwrap_or_else(|| {
        deck::default_deck_path(
            Path::new(&config.paths.deck_dir),
            &config.deck.title_prefix,
            ctx.project.as_str(),
        )
    });
    let paths = DeckPaths::for_deck(&html)?;
    let options = ConvertOptions {
        output_dir: paths.prepare_images()?.to_path_buf(),
        derivative_ext: config.deck.derivative_ext.clone(),
        quality: Quality::new(config.deck.quality),
        policy: failure_policy(config, args),
    };

    init_thread_pool(&config.processing);
    let codec = codec::from_config(&config.codec);
    let (tx, printer) = spawn_printer(output::format_convert_event);
    let result = convert::convert_deck(
        codec.as_ref(),
        ctx.project.as_str(),
        &sites,
        &options,
        Some(&tx),
    );
    finish_printer(tx, printer);
    let conversion = result?;
    output::print_conversion_report(&conversion.report);
    if conversion.sites.is_empty() {
        return Err("No images could be converted; deck not written".into());
    }

    let title = format!("{} {}", config.deck.title_prefix, ctx.project);
    let layout = deck::layout(&title, &paths.images_href, &conversion.sites);
    deck::write_deck(&paths, &layout)?;
    info!(slides = layout.slides.len(), "deck written");
    output::print_deck_output(&layout, &paths);
    Ok(())
}

fn build_gallery(
    config: &OrthoConfig,
    data_root: &Path,
    output_dir: &Path,
    datasets_path: &Path,
    args: &ConvertArgs,
) -> Result<(), Box<dyn Error>> {
    let datasets = aggregate::load_datasets(datasets_path)?;
    let plan = aggregate::aggregate(&datasets, data_root, &config.naming.extension)?;
    output::print_gallery_plan(&plan);
    if plan.datasets.is_empty() {
        return Err(GalleryError::NothingToRender.into());
    }

    let images_dir = gallery::prepare_output(output_dir)?;
    let options = ConvertOptions {
        output_dir: images_dir,
        derivative_ext: config.gallery.derivative_ext.clone(),
        quality: Quality::new(config.gallery.quality),
        policy: failure_policy(config, args),
    };

    init_thread_pool(&config.processing);
    let codec = codec::from_config(&config.codec);
    let (tx, printer) = spawn_printer(output::format_convert_event);
    let result = convert::convert_gallery(codec.as_ref(), &plan, &options, Some(&tx));
    finish_printer(tx, printer);
    let conversion = result?;
    output::print_conversion_report(&conversion.report);

    let text = GalleryText::from(&config.gallery);
    let index = gallery::write_gallery(output_dir, &conversion.datasets, &text)?;
    output::print_gallery_output(&conversion.datasets, &index);
    Ok(())
}

fn failure_policy(config: &OrthoConfig, args: &ConvertArgs) -> FailurePolicy {
    if args.keep_going {
        FailurePolicy::Skip
    } else {
        config.processing.on_failure
    }
}

/// Print progress events on a dedicated thread so workers never block on
/// stdout.
fn spawn_printer<E: Send + 'static>(
    format: fn(&E) -> Vec<String>,
) -> (Sender<E>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<E>();
    let printer = thread::spawn(move || {
        for event in rx {
            for line in format(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

fn finish_printer<E>(tx: Sender<E>, printer: JoinHandle<()>) {
    drop(tx);
    // A panicking printer only loses progress lines.
    let _ = printer.join();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
