use std::{
    env, fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};

use rayon::prelude::*;
use seqdex::{
    config::Settings,
    entity::{DocumentId, DocumentMeta},
    error::{ConfigError, Error, Result},
    index::{Concordance, Indexer, Window},
    store::{MemoryStore, Store},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct Args {
    docs: PathBuf,
    config: Option<PathBuf>,
    max_gram: Option<usize>,
    window: Option<usize>,
    limit: Option<usize>,
    query: Option<String>,
    save: Option<PathBuf>,
}

fn print_usage() {
    eprintln!("Usage: seqdex [--docs DIR] [--max-gram N] [--window N] [--config FILE] [--limit N] [--save FILE] [--query \"TEXT\"]");
    eprintln!("Without --query an interactive prompt is started. `:top N` lists frequent sequences, `:quit` exits.");
}

fn number(flag: &'static str, value: Option<String>) -> Result<usize> {
    value
        .as_deref()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::Config(ConfigError::Invalid { name: flag, reason: "needs a positive integer".into() }))
}

fn path(flag: &'static str, value: Option<String>) -> Result<PathBuf> {
    value
        .map(PathBuf::from)
        .ok_or_else(|| Error::Config(ConfigError::Invalid { name: flag, reason: "requires a path".into() }))
}

/// `None` when help was requested
fn parse_args() -> Result<Option<Args>> {
    let mut args = env::args().skip(1);
    let mut parsed = Args {
        docs: PathBuf::from("data/docs"),
        config: None,
        max_gram: None,
        window: None,
        limit: None,
        query: None,
        save: None,
    };
    while let Some(a) = args.next() {
        match a.as_str() {
            "--docs" => parsed.docs = path("--docs", args.next())?,
            "--config" => parsed.config = Some(path("--config", args.next())?),
            "--save" => parsed.save = Some(path("--save", args.next())?),
            "--max-gram" => parsed.max_gram = Some(number("--max-gram", args.next())?),
            "--window" => parsed.window = Some(number("--window", args.next())?),
            "--limit" => parsed.limit = Some(number("--limit", args.next())?),
            "--query" => {
                let query = args.next().ok_or_else(|| {
                    Error::Config(ConfigError::Invalid { name: "--query", reason: "requires a string".into() })
                })?;
                parsed.query = Some(query);
            }
            "-h" | "--help" => return Ok(None),
            other => {
                // first positional argument is the query
                if parsed.query.is_none() {
                    parsed.query = Some(other.to_string());
                } else {
                    warn!(arg = other, "extra argument ignored");
                }
            }
        }
    }
    Ok(Some(parsed))
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(file) => serde_json::from_reader(io::BufReader::new(fs::File::open(file)?))?,
        None => Settings::default(),
    };
    if let Some(n) = args.max_gram {
        settings.indexer.max_gram_length = n;
    }
    if args.window.is_some() {
        settings.window = args.window;
    }
    settings.indexer.validate()?;
    Ok(settings)
}

/// Read every `*.txt` directly under `dir` in parallel and store them as documents.
fn load_documents(store: &MemoryStore, dir: &Path, limit: Option<usize>) -> Result<Vec<DocumentId>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    info!(files = files.len(), threads = rayon::current_num_threads(), dir = %dir.display(), "reading documents");

    let texts: Vec<(String, String)> = files
        .par_iter()
        .filter_map(|p| match fs::read_to_string(p) {
            Ok(text) if !text.trim().is_empty() => {
                let title = p.file_name().and_then(|s| s.to_str()).unwrap_or("unknown").to_string();
                Some((title, text))
            }
            Ok(_) => None,
            Err(err) => {
                warn!(file = %p.display(), error = %err, "skipping unreadable file");
                None
            }
        })
        .collect();

    let ids = store.transaction(|tx| {
        texts
            .into_iter()
            .map(|(title, text)| tx.add_document(text, DocumentMeta::titled(title)))
            .collect::<std::result::Result<Vec<_>, _>>()
    })?;
    Ok(ids)
}

fn title(store: &MemoryStore, id: DocumentId) -> String {
    store
        .read(|r| r.document(id))
        .and_then(|d| d.meta.title)
        .unwrap_or_else(|| id.to_string())
}

fn run_query(store: &MemoryStore, concordance: &Concordance<'_, MemoryStore>, window: Window, query: &str) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        warn!("empty query");
        return Ok(());
    }
    let t0 = Instant::now();
    let Some(seq) = concordance.lookup(query) else {
        println!("no match for {query:?}");
        return Ok(());
    };
    let lines = concordance.concordance(seq.id, window)?;
    for line in &lines {
        println!("{}\t{}", title(store, line.document), line);
    }
    let rank = concordance.rank_documents(seq.id);
    println!("-- {} {} in {} documents", seq.seq, seq.count, rank.len());
    for score in rank.top(10) {
        println!("{:.6}\t{}", score.value, title(store, score.key));
    }
    info!(elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0, hits = lines.len(), "query done");
    Ok(())
}

fn run_interactive(store: &MemoryStore, concordance: &Concordance<'_, MemoryStore>, window: Window) -> Result<()> {
    let stdin = io::stdin();
    let mut out = io::stdout();
    loop {
        print!("> ");
        out.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            (":quit" | ":q", _) => break,
            (":top", n) => {
                let n = n.trim().parse().unwrap_or(20);
                for record in concordance.frequencies(n) {
                    println!("{}\t{}", record.count, record.seq);
                }
            }
            _ => run_query(store, concordance, window, line)?,
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let program_start = Instant::now();
    let settings = load_settings(&args)?;
    let store = MemoryStore::new();
    let indexer = Indexer::new(&store, settings.indexer.clone())?;

    let load_start = Instant::now();
    let ids = load_documents(&store, &args.docs, args.limit)?;
    if ids.is_empty() {
        warn!(dir = %args.docs.display(), "no documents loaded");
        return Ok(());
    }
    let reports = indexer.add_many(&ids)?;
    let stats = store.stats();
    info!(
        documents = reports.len(),
        seqs = stats.seqs,
        indexes = stats.indexes,
        elapsed_ms = load_start.elapsed().as_secs_f64() * 1000.0,
        "index built"
    );

    if let Some(file) = &args.save {
        fs::write(file, store.to_bytes()?)?;
        info!(file = %file.display(), "store saved");
    }

    let concordance = Concordance::with_parser(&store, indexer.parser().clone());
    let window = settings.window.map_or_else(Window::default, |n| Window::new(n, n));
    match &args.query {
        Some(query) => run_query(&store, &concordance, window, query)?,
        None => run_interactive(&store, &concordance, window)?,
    }
    info!(elapsed_ms = program_start.elapsed().as_secs_f64() * 1000.0, "done");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("[error] {err}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "seqdex failed");
            ExitCode::FAILURE
        }
    }
}
