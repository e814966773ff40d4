use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing::info;

use delver_sync::logging::SYNC_RECONCILE;
use delver_sync::{
    AnchorSpan, ContentVersion, Direction, DocumentSession, SourceText, SpatialDocument, SyncConfig,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    TextToSpatial,
    SpatialToText,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::TextToSpatial => Direction::TextToSpatial,
            DirectionArg::SpatialToText => Direction::SpatialToText,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = "Reconcile an annotation anchor between a document's text and its pages.",
    arg_required_else_help = true
)]
pub struct Args {
    /// Spatial document (pages and elements) as JSON
    pub document: PathBuf,

    /// Reflowed source text of the same document version
    pub source: PathBuf,

    /// Anchor text to reconcile
    #[clap(short, long, conflicts_with = "anchor")]
    pub text: Option<String>,

    /// Full anchor as JSON (an `AnchorSpan`)
    #[clap(short, long)]
    pub anchor: Option<String>,

    /// Approximate byte offset of the anchor in the source text
    #[clap(long)]
    pub offset: Option<usize>,

    #[clap(short, long, value_enum, default_value_t = DirectionArg::TextToSpatial)]
    pub direction: DirectionArg,

    /// Tuning overrides as JSON
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Optional output file path. If omitted, writes to stdout.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Optional pretty print output.
    #[clap(short, long)]
    pub pretty: bool,

    /// Log pipeline stages at debug level
    #[clap(long)]
    pub debug: bool,

    /// Directory for debug logs
    #[clap(long)]
    pub log_dir: Option<PathBuf>,
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive until exit so buffered logs are flushed
    let _guard = match &args.log_dir {
        Some(dir) => delver_sync::logging::init_logging_with_dir(args.debug, expand(dir))
            .context("creating log directory")?,
        None => delver_sync::logging::init_logging(args.debug),
    };

    let config = match &args.config {
        Some(path) => SyncConfig::from_json_file(expand(path)).context("reading config")?,
        None => SyncConfig::default(),
    };

    let document = SpatialDocument::from_json_file(expand(&args.document))
        .with_context(|| format!("reading document {}", args.document.display()))?;
    let text = fs::read_to_string(expand(&args.source))
        .with_context(|| format!("reading source text {}", args.source.display()))?;
    let version: ContentVersion = document.version.clone();
    let source = SourceText::new(text, version.clone());

    let anchor = match (&args.anchor, &args.text) {
        (Some(json), _) => serde_json::from_str::<AnchorSpan>(json).context("parsing anchor")?,
        (None, Some(text)) => {
            let length = text.len();
            AnchorSpan::from_text(text.as_str(), args.offset.map(|o| (o, length)))
        }
        (None, None) => bail!("either --text or --anchor is required"),
    };

    let session = DocumentSession::open(Arc::new(document), Arc::new(source), config)?;
    let result = session.reconcile(args.direction.into(), &anchor, &version)?;
    info!(
        target: SYNC_RECONCILE,
        degraded = result.degraded,
        confidence = result.confidence,
        "done"
    );

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };

    match args.output {
        Some(path) => fs::write(expand(&path), json)?,
        None => println!("{}", json),
    }

    Ok(())
}
