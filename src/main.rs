use std::path::PathBuf;

use clap::{Parser, Subcommand};

use vision_dom::config::{self, AppConfig};
use vision_dom::query::predicate::{name_is, text_contains, PredicateExt};
use vision_dom::{InspectOptions, InspectionPipeline, VisionDomResult};

#[derive(Parser)]
#[command(name = "vision-dom")]
#[command(about = "Detect UI elements in screenshots and read their text")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect elements in a screenshot and print them as JSON
    Inspect {
        /// Path to the screenshot (PNG, JPEG, ...)
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Config file to use instead of the usual search locations
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Recognition language, e.g. "ch" or "en"
        #[arg(long)]
        lang: Option<String>,

        /// Skip text extraction (detection only)
        #[arg(long)]
        no_text: bool,

        /// Keep only elements with this detector label
        #[arg(long)]
        name: Option<String>,

        /// Keep only elements whose text contains this string
        #[arg(long)]
        text_contains: Option<String>,

        /// Enrichment worker count (0 = half the cores)
        #[arg(long)]
        workers: Option<usize>,

        /// Write an annotated copy of the screenshot here
        #[arg(long, value_name = "OUT")]
        annotate: Option<PathBuf>,
    },
}

fn load(path: Option<&PathBuf>) -> VisionDomResult<AppConfig> {
    match path {
        Some(p) => config::load_config_from(p),
        None => match config::load_config() {
            Ok(cfg) => Ok(cfg),
            Err(e) => {
                tracing::warn!(error = %e, "no usable config file; using defaults");
                Ok(AppConfig::default())
            }
        },
    }
}

#[tokio::main]
async fn main() -> VisionDomResult<()> {
    let _ = dotenvy::dotenv();
    vision_dom::init_tracing("info");

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect {
            image_path,
            config,
            lang,
            no_text,
            name,
            text_contains: needle,
            workers,
            annotate,
        } => {
            let mut cfg = load(config.as_ref())?;
            if let Some(lang) = lang {
                cfg.ocr.language = lang;
            }
            if no_text {
                cfg.pipeline.enable_text_enrichment = false;
            }
            if let Some(n) = workers {
                cfg.pipeline.workers = n;
            }

            let pipeline = InspectionPipeline::from_config(&cfg)?;
            let bytes = std::fs::read(&image_path)?;

            let mut options = InspectOptions::from_config(&cfg);
            match (name, needle) {
                (Some(n), Some(t)) => options = options.search(name_is(n).and(text_contains(t))),
                (Some(n), None) => options = options.search(name_is(n)),
                (None, Some(t)) => options = options.search(text_contains(t)),
                (None, None) => {}
            }

            let set = pipeline.inspect(&bytes, options).await?;
            tracing::info!(elements = set.len(), image = %image_path.display(), "inspection finished");

            if let Some(out) = annotate {
                std::fs::write(&out, set.annotate(&bytes)?)?;
                tracing::info!(path = %out.display(), "annotated screenshot written");
            }

            let records = set.records();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}
