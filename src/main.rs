//! paper-ocr - questionnaire digitization from the command line
//!
//! Manage region templates, preview their overlay and run per-region OCR
//! on filled-in forms.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use paper_ocr::config::{self, AppConfig, StorageBackend};
use paper_ocr::editor::{label_text, RegionEditor};
use paper_ocr::export::{copy_results, format_results, CommandClipboard, OutputFormat};
use paper_ocr::recognition::RecognitionOrchestrator;
use paper_ocr::region::{self, Region, RegionCoordinates};
use paper_ocr::storage::{self, KeyValueStore, NewTemplate, Template, TemplateRepository, TemplateUpdate};
use paper_ocr::vision::{ImageSource, OcrEngine, TesseractEngine};

type Repository = TemplateRepository<Box<dyn KeyValueStore>>;

/// paper-ocr - template-based OCR for paper questionnaires
#[derive(Parser, Debug)]
#[command(name = "paper-ocr")]
#[command(about = "Mark regions on a form template once, then OCR every filled-in copy")]
struct Args {
    /// Template storage backend (overrides the config file)
    #[arg(long, global = true, value_enum)]
    store: Option<StorageBackend>,

    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage saved templates
    #[command(subcommand)]
    Templates(TemplateCommand),

    /// Run OCR over an image, one result per template region
    Recognize {
        /// Template id or name (whole image when omitted)
        #[arg(short, long)]
        template: Option<String>,

        /// Image of the filled-in form
        image: PathBuf,

        /// Output format (defaults to the config file)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Also copy the results to the clipboard
        #[arg(long)]
        copy: bool,

        /// Skip grayscale/contrast preprocessing
        #[arg(long)]
        no_preprocess: bool,
    },

    /// Render a template's regions over its base image
    Preview {
        /// Template id or name
        #[arg(short, long)]
        template: String,

        /// PNG file to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Inspect or create the config file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// List saved templates
    List,
    /// Show one template and its regions
    Show { template: String },
    /// Delete a template
    Delete { template: String },
    /// Rename a template
    Rename { template: String, name: String },
    /// Create a template from a base image
    Create {
        #[arg(short, long)]
        name: String,

        /// Base image of the blank form
        #[arg(short, long)]
        image: PathBuf,

        /// Region as "name:x,y,w,h" in 0-1 image coordinates; repeat for each region (at least one)
        #[arg(short, long = "region", required = true)]
        regions: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
    /// Write the default configuration if no file exists
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let (mut config, loaded) = load_or_create_config(&config_path);

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if loaded {
        info!("Loaded configuration from {:?}", config_path);
    } else {
        info!("Using default configuration");
    }

    if let Some(backend) = args.store {
        config.storage.backend = backend;
    }
    if let Some(dir) = args.data_dir {
        config.general.data_dir = Some(dir);
    }

    match args.command {
        Command::Templates(command) => run_templates(&config, command),
        Command::Recognize {
            template,
            image,
            format,
            copy,
            no_preprocess,
        } => run_recognize(&config, template.as_deref(), &image, format, copy, no_preprocess).await,
        Command::Preview { template, output } => run_preview(&config, &template, &output),
        Command::Config(command) => run_config(&config, &config_path, command),
    }
}

/// Load configuration from file or fall back to defaults
fn load_or_create_config(path: &Path) -> (AppConfig, bool) {
    if path.exists() {
        match config::load_config(path) {
            Ok(config) => return (config, true),
            Err(e) => eprintln!("Ignoring unreadable config {:?}: {}", path, e),
        }
    }
    (AppConfig::default(), false)
}

fn open_repository(config: &AppConfig) -> Result<Repository> {
    let data_dir = match &config.general.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;
            dir.clone()
        }
        None => storage::get_data_dir()?,
    };
    let store = storage::open_store(&config.storage, &data_dir)
        .with_context(|| format!("opening {:?} store in {:?}", config.storage.backend, data_dir))?;
    let repo = TemplateRepository::new(store, &config.storage);
    if let Some(e) = repo.last_error() {
        warn!("{}", e);
    }
    Ok(repo)
}

fn find_template<'a>(repo: &'a Repository, id_or_name: &str) -> Result<&'a Template> {
    repo.resolve(id_or_name)
        .with_context(|| format!("No template named or with id '{}'", id_or_name))
}

fn run_templates(config: &AppConfig, command: TemplateCommand) -> Result<()> {
    let mut repo = open_repository(config)?;

    match command {
        TemplateCommand::List => {
            if repo.list().is_empty() {
                println!("No templates saved");
            }
            for t in repo.list() {
                println!(
                    "{}  {}  ({} regions, updated {})",
                    t.id,
                    t.name,
                    t.regions.len(),
                    t.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        TemplateCommand::Show { template } => {
            let t = find_template(&repo, &template)?;
            println!("{} ({})", t.name, t.id);
            println!("Created {}  Updated {}", t.created_at.to_rfc3339(), t.updated_at.to_rfc3339());
            for r in &t.regions {
                let c = r.coordinates;
                println!(
                    "  {:<34} x={:.3} y={:.3} w={:.3} h={:.3}",
                    label_text(r),
                    c.x,
                    c.y,
                    c.width,
                    c.height
                );
            }
        }
        TemplateCommand::Delete { template } => {
            let id = find_template(&repo, &template)?.id.clone();
            repo.delete(&id).context("deleting template")?;
            println!("Deleted {}", template);
        }
        TemplateCommand::Rename { template, name } => {
            let id = find_template(&repo, &template)?.id.clone();
            if let Some(existing) = repo.find_by_name(&name) {
                if existing.id != id {
                    bail!("A template named '{}' already exists", name.trim());
                }
            }
            repo.update(
                &id,
                TemplateUpdate {
                    name: Some(name.trim().to_string()),
                    ..Default::default()
                },
            )
            .context("renaming template")?;
            println!("Renamed to {}", name.trim());
        }
        TemplateCommand::Create { name, image, regions } => {
            if repo.find_by_name(&name).is_some() {
                bail!("A template named '{}' already exists", name.trim());
            }
            if regions.len() > config.editor.max_regions {
                bail!("A template can have at most {} regions", config.editor.max_regions);
            }

            let mut parsed = regions
                .iter()
                .enumerate()
                .map(|(idx, arg)| parse_region_arg(arg, idx + 1))
                .collect::<Result<Vec<_>>>()?;
            region::renumber(&mut parsed);

            let source = ImageSource::from_path(&image).with_context(|| format!("reading {:?}", image))?;
            // Decode once so a broken image is rejected before it is stored
            paper_ocr::vision::decode(&source).with_context(|| format!("decoding {:?}", image))?;

            let template = repo
                .create(NewTemplate {
                    name: name.trim().to_string(),
                    base_image_data: source.to_data_url()?,
                    regions: parsed,
                })
                .context("saving template")?;
            println!("Created {} ({} regions)", template.id, template.regions.len());
        }
    }
    Ok(())
}

/// Parse `"name:x,y,w,h"`; the last colon separates the name
fn parse_region_arg(arg: &str, order: usize) -> Result<Region> {
    let (name, coords) = arg
        .rsplit_once(':')
        .with_context(|| format!("Region '{}' is not in name:x,y,w,h form", arg))?;

    let values = coords
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Region '{}' has non-numeric coordinates", arg))?;
    let [x, y, width, height] = values[..] else {
        bail!("Region '{}' needs exactly four coordinates", arg);
    };

    let name = match name.trim() {
        "" => region::default_region_name(order),
        n => n.to_string(),
    };
    Ok(Region::new(name, RegionCoordinates::new(x, y, width, height), order))
}

async fn run_recognize(
    config: &AppConfig,
    template: Option<&str>,
    image: &Path,
    format: Option<OutputFormat>,
    copy: bool,
    no_preprocess: bool,
) -> Result<()> {
    let regions = match template {
        Some(id_or_name) => {
            let repo = open_repository(config)?;
            let t = find_template(&repo, id_or_name)?;
            info!("Using template '{}' with {} regions", t.name, t.regions.len());
            Some(t.regions.clone())
        }
        None => None,
    };

    let engine = TesseractEngine::from_config(&config.ocr);
    info!("OCR engine: {} ({})", engine.name(), engine.language());

    let preprocessing = if no_preprocess {
        None
    } else {
        config.preprocessing.options()
    };
    let orchestrator = Arc::new(RecognitionOrchestrator::new(Arc::new(engine), preprocessing));

    let mut status = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let s = status.borrow_and_update().clone();
            info!("[{:>3.0}%] {}", s.progress * 100.0, s.message);
        }
    });

    let canceller = orchestrator.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            canceller.cancel();
        }
    });

    let source = ImageSource::from_path(image).with_context(|| format!("reading {:?}", image))?;
    let outcome = orchestrator.process(&source, regions.as_deref()).await;
    ctrl_c.abort();
    let _ = ctrl_c.await;
    // Dropping the last handle closes the status channel and ends the progress task
    drop(orchestrator);
    let _ = progress.await;

    let results = outcome.context("recognition failed")?;
    let format = format.unwrap_or(config.export.format);
    println!("{}", format_results(&results, format));

    if copy {
        let mut clipboard = CommandClipboard::new(config.export.clipboard_command.clone());
        if let Err(e) = copy_results(&mut clipboard, &results) {
            warn!("Could not copy to clipboard: {}", e);
        }
    }
    Ok(())
}

fn run_preview(config: &AppConfig, template: &str, output: &Path) -> Result<()> {
    let repo = open_repository(config)?;
    let t = find_template(&repo, template)?;

    let source = ImageSource::DataUrl(t.base_image_data.clone());
    let editor = RegionEditor::new(config.editor.clone(), &source, t.regions.clone()).read_only(true);
    let canvas = editor.render().context("rendering preview")?;
    canvas
        .save(output)
        .with_context(|| format!("writing {:?}", output))?;

    for r in editor.regions() {
        println!("{}", label_text(r));
    }
    println!("Wrote {}x{} preview to {:?}", canvas.width(), canvas.height(), output);
    Ok(())
}

fn run_config(config: &AppConfig, path: &Path, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Path => println!("{}", path.display()),
        ConfigCommand::Show => print!("{}", toml::to_string_pretty(config)?),
        ConfigCommand::Init => {
            if path.exists() {
                println!("Config already exists at {}", path.display());
            } else {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                config::save_config(&AppConfig::default(), path)?;
                println!("Wrote default config to {}", path.display());
            }
        }
    }
    Ok(())
}
