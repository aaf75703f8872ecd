use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bubble_contracts::events::EventWriter;
use bubble_contracts::logs::{GameLog, GameOutcome, RECENT_GAMES_LIMIT};
use bubble_contracts::messages::InlineImage;
use bubble_contracts::models::{ModelSelector, CAPABILITY_STREAM, CAPABILITY_VISION};
use bubble_contracts::words::{SurfaceIndex, SynonymTable, Target};
use bubble_engine::{build_provider, Recognizer, ReqwestTransport, StreamEnd};
use clap::{Parser, Subcommand};
use image::{GenericImageView, ImageFormat};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_PATH: &str = "bubble-events.jsonl";
const IMAGE_MAX_BYTES: usize = 1024 * 1024;
const IMAGE_MAX_SIDE: u32 = 512;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Parser)]
#[command(name = "bubble-rs", version, about = "Drawing recognition gateway CLI")]
struct Cli {
    /// tracing filter directive, e.g. `info` or `bubble_engine=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
    /// JSONL event log for network and game records.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Synonym table JSON replacing the built-in word list.
    #[arg(long)]
    words: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Look(LookArgs),
    Bingo(BingoArgs),
    Hint(HintArgs),
    Words(WordsArgs),
    Games(GamesArgs),
}

#[derive(Debug, Parser)]
struct LookArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    target: String,
    #[arg(long)]
    prior: Vec<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    stream: bool,
}

#[derive(Debug, Parser)]
struct BingoArgs {
    #[arg(long)]
    target: String,
    #[arg(long)]
    guess: String,
}

#[derive(Debug, Parser)]
struct HintArgs {
    #[arg(long)]
    target: String,
    #[arg(long)]
    prior: Vec<String>,
}

#[derive(Debug, Parser)]
struct WordsArgs {
    #[arg(long)]
    lang: Option<String>,
}

#[derive(Debug, Parser)]
struct GamesArgs {
    #[arg(long)]
    successful: bool,
    #[arg(long, default_value_t = RECENT_GAMES_LIMIT)]
    limit: usize,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("bubble-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let events = EventWriter::new(
        cli.log
            .clone()
            .or_else(|| non_empty_env("BUBBLE_LOG_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
        uuid::Uuid::new_v4().to_string(),
    );
    let words_path = cli
        .words
        .clone()
        .or_else(|| non_empty_env("BUBBLE_WORDS_PATH").map(PathBuf::from));

    match cli.command {
        Command::Look(args) => {
            let index = load_index(words_path.as_deref())?;
            run_look(args, index, events)
        }
        Command::Bingo(args) => {
            let index = load_index(words_path.as_deref())?;
            let target = resolve_target(&index, &args.target)?;
            println!("{}", index.is_bingo(&target, &args.guess));
            Ok(0)
        }
        Command::Hint(args) => {
            let index = load_index(words_path.as_deref())?;
            let target = resolve_target(&index, &args.target)?;
            println!("{}", index.build_hint(&target.concept, &args.prior));
            Ok(0)
        }
        Command::Words(args) => {
            let index = load_index(words_path.as_deref())?;
            print_words(&index, args.lang.as_deref())?;
            Ok(0)
        }
        Command::Games(args) => {
            let games = GameLog::new(events);
            let records = if args.successful {
                games.recent_successful_games(args.limit)?
            } else {
                games.recent_games(args.limit)?
            };
            for record in records {
                println!("{}", serde_json::to_string(&record)?);
            }
            Ok(0)
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn load_index(path: Option<&Path>) -> Result<Arc<SurfaceIndex>> {
    let table = match path {
        Some(path) => SynonymTable::load(path)?,
        None => SynonymTable::builtin(),
    };
    Ok(Arc::new(SurfaceIndex::build(table)?))
}

fn resolve_target(index: &SurfaceIndex, word: &str) -> Result<Target> {
    index
        .resolve(word.trim())
        .cloned()
        .with_context(|| "target must be one of the curated words (see `bubble-rs words`)")
}

fn run_look(args: LookArgs, index: Arc<SurfaceIndex>, events: EventWriter) -> Result<i32> {
    let target = resolve_target(&index, &args.target)?;
    let image = read_drawing(&args.image)?;

    let capability = if args.stream {
        CAPABILITY_STREAM
    } else {
        CAPABILITY_VISION
    };
    let requested = args.model.clone().or_else(|| non_empty_env("BUBBLE_MODEL"));
    let selection = ModelSelector::new(None)
        .select(requested.as_deref(), capability)
        .map_err(anyhow::Error::msg)?;
    if let Some(reason) = selection.fallback_reason.as_deref() {
        tracing::info!(model = %selection.model.name, "{reason}");
    }

    let timeout = (!args.stream).then_some(REQUEST_TIMEOUT);
    let transport = Arc::new(ReqwestTransport::new(timeout)?);
    let provider = build_provider(&selection.model, transport, Arc::new(events.clone()));
    let recognizer = Recognizer::new(provider, index.clone());

    if args.stream {
        return stream_answer(&recognizer, &image, &target, &args.prior);
    }

    let guess = recognizer.recognize(&image, &target, &args.prior)?;
    let bingo = index.is_bingo(&target, &guess);
    let hints = index.build_hint(&target.concept, &args.prior);
    let record = GameLog::new(events).record(
        &GameOutcome {
            target: args.target.trim().to_string(),
            language: target.language.clone(),
            hints: hints.clone(),
            recognized: guess.clone(),
            bingo,
        },
        &image.bytes,
    )?;
    println!(
        "{}",
        serde_json::to_string(&json!({
            "target": record.target,
            "concept": target.concept,
            "language": target.language,
            "model": selection.model.name,
            "hints": hints,
            "guess": guess,
            "bingo": bingo,
        }))?
    );
    Ok(0)
}

fn stream_answer(
    recognizer: &Recognizer,
    image: &InlineImage,
    target: &Target,
    prior: &[String],
) -> Result<i32> {
    let mut fragments = recognizer.recognize_stream(image, target, prior)?;
    let mut stdout = io::stdout().lock();
    for fragment in fragments.by_ref() {
        stdout.write_all(fragment.as_bytes())?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    match fragments.end() {
        Some(StreamEnd::Failed(reason)) => {
            eprintln!("stream ended early: {reason}");
            Ok(2)
        }
        _ => Ok(0),
    }
}

/// Read a drawing and enforce the size limits the game accepts.
fn read_drawing(path: &Path) -> Result<InlineImage> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.len() > IMAGE_MAX_BYTES {
        bail!(
            "Image too big: {} bytes exceeds {IMAGE_MAX_BYTES}",
            bytes.len()
        );
    }
    let format = image::guess_format(&bytes)
        .with_context(|| format!("unrecognized image format: {}", path.display()))?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let (width, height) = decoded.dimensions();
    if width > IMAGE_MAX_SIDE || height > IMAGE_MAX_SIDE {
        bail!("Image too big: {width}x{height} exceeds {IMAGE_MAX_SIDE}x{IMAGE_MAX_SIDE}");
    }
    Ok(InlineImage::new(mime_for(format), bytes))
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn print_words(index: &SurfaceIndex, lang: Option<&str>) -> Result<()> {
    let table = index.table();
    if let Some(code) = lang {
        if table.language(code).is_none() {
            bail!("unknown language '{code}'");
        }
    }
    let mut stdout = io::stdout().lock();
    for concept in &table.concepts {
        for (code, synonyms) in &concept.words {
            if lang.is_some_and(|wanted| wanted != code.as_str()) {
                continue;
            }
            writeln!(
                stdout,
                "{}\t{}\t{}\t{}",
                concept.id,
                code,
                synonyms.join("/"),
                concept.hint
            )?;
        }
    }
    Ok(())
}
