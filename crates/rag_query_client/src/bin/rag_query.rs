//! rag-query: terminal front end for the RAG API.
//! Resolves config, reads the question from the argument or stdin, prints the
//! answer (live when streaming, typed out otherwise) followed by its sources.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use rag_query_client::config::{self, ConfigError, EndOfStreamPolicy, QueryConfig};
use rag_query_client::{QueryDispatcher, QuerySession, Revealer, SearchResult, ViewState, HINT};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rag-query", about = "Ask a question to a RAG API")]
struct Args {
    /// Question to ask. Read from the first line of stdin when omitted.
    question: Option<String>,

    /// YAML config overlay. Defaults to ~/.rag-query/config.yaml when present.
    #[arg(long, env = "RAG_QUERY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    api_url: Option<String>,

    /// Number of source documents to retrieve (1-20).
    #[arg(long)]
    limit: Option<u32>,

    /// Sampling temperature (0.0-2.0).
    #[arg(long)]
    temperature: Option<f64>,

    /// Maximum answer length in tokens (100-8192).
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Use the atomic endpoint instead of streaming.
    #[arg(long)]
    no_stream: bool,

    /// Fail when the stream ends without a completion event.
    #[arg(long)]
    require_terminal: bool,

    /// Per-character delay of the typing reveal for atomic answers.
    /// Ignored when stdout is not a terminal.
    #[arg(long, default_value_t = 5)]
    typing_delay_ms: u64,
}

fn resolve_config(args: &Args) -> Result<QueryConfig, ConfigError> {
    let mut cfg = QueryConfig::default();

    // 1. --config <path> flag or RAG_QUERY_CONFIG env var (must load)
    // 2. ~/.rag-query/config.yaml when it exists
    if let Some(path) = &args.config {
        cfg.apply(&config::load(path)?);
    } else if let Some(path) = config::default_config_path().filter(|p| p.exists()) {
        cfg.apply(&config::load(&path)?);
    }

    if let Some(url) = &args.api_url {
        cfg.api_url = url.clone();
    }
    if let Some(limit) = args.limit {
        cfg.limit = limit;
    }
    if let Some(temperature) = args.temperature {
        cfg.temperature = temperature;
    }
    if let Some(max_tokens) = args.max_tokens {
        cfg.max_tokens = max_tokens;
    }
    if args.no_stream {
        cfg.use_streaming = false;
    }
    if args.require_terminal {
        cfg.end_of_stream = EndOfStreamPolicy::RequireTerminal;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn read_question(args: &Args) -> String {
    if let Some(q) = &args.question {
        return q.trim().to_string();
    }
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).unwrap_or(0);
    line.trim().to_string()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rag_query_client=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let cfg = match resolve_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let question = read_question(&args);
    if question.is_empty() {
        eprintln!("Error: no question provided (pass it as an argument or on stdin)");
        process::exit(1);
    }

    let typing_delay = if io::stdout().is_terminal() {
        Duration::from_millis(args.typing_delay_ms)
    } else {
        Duration::ZERO
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    let code = rt.block_on(run(cfg, question, typing_delay));
    process::exit(code);
}

async fn run(cfg: QueryConfig, question: String, typing_delay: Duration) -> i32 {
    let mut session = QuerySession::new(QueryDispatcher::new(), cfg);
    let mut view = session.subscribe();
    let Some(task) = session.submit(&question) else {
        return 0;
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    // Print streamed text as it grows; the text only ever gets longer.
    let mut printed = 0;
    let last: ViewState = loop {
        if view.changed().await.is_err() {
            break view.borrow().clone();
        }
        let state = view.borrow_and_update().clone();
        if state.streaming_text.len() > printed {
            let _ = write!(out, "{}", &state.streaming_text[printed..]);
            let _ = out.flush();
            printed = state.streaming_text.len();
        }
        if !state.in_flight {
            break state;
        }
    };
    let _ = task.await;

    if let Some(error) = last.error {
        if printed > 0 {
            let _ = writeln!(out);
            let _ = out.flush();
            eprintln!("(partial answer above discarded)");
        }
        eprintln!("Error: {}", error);
        eprintln!("{}", HINT);
        return 1;
    }

    let Some(result) = last.result else {
        return 0;
    };
    if printed == 0 {
        type_out(&mut out, last.generation, &result.answer, typing_delay).await;
    } else if printed < result.answer.len() && result.answer.is_char_boundary(printed) {
        let _ = write!(out, "{}", &result.answer[printed..]);
    }
    let _ = writeln!(out);
    print_sources(&mut out, &result);
    let _ = out.flush();
    0
}

async fn type_out(out: &mut impl Write, id: u64, answer: &str, delay: Duration) {
    let mut revealer = Revealer::new(delay);
    let mut frames = revealer.subscribe();
    revealer.start(id, answer);

    let mut shown = 0;
    loop {
        let frame = frames.borrow_and_update().clone();
        let text = frame.shown();
        if text.len() > shown {
            let _ = write!(out, "{}", &text[shown..]);
            let _ = out.flush();
            shown = text.len();
        }
        if frame.done || frames.changed().await.is_err() {
            break;
        }
    }
}

fn print_sources(out: &mut impl Write, result: &SearchResult) {
    if result.source_documents.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nSources:");
    for (i, doc) in result.source_documents.iter().enumerate() {
        let _ = writeln!(out, "  [{}] {}", i + 1, doc.page_content);
        for (key, value) in doc.metadata.iter().flatten() {
            match value.as_str() {
                Some(s) => {
                    let _ = writeln!(out, "      {}: {}", key, s);
                }
                None => {
                    let _ = writeln!(out, "      {}: {}", key, value);
                }
            }
        }
    }
}
