use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use chat_playback::config::PlaybackConfig;
use chat_playback::playback::{
    HistoryStore, LogEvent, MessageKind, MessageLog, MessageRecord, PlaybackEngine, RunOutcome,
    Sequence, spawn_history_sync,
};
use chat_playback::store::{LibSqlSessionStore, MemorySessionStore, SessionStore};

/// Bundled demo script, used when no sequence file is given.
const DEMO_SEQUENCE: &str = include_str!("../sequences/demo.json");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let restart = args.iter().any(|a| a == "--restart");
    let sequence = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => Sequence::from_path(Path::new(path))
            .with_context(|| format!("Failed to load sequence from {path}"))?,
        None => Sequence::from_json(DEMO_SEQUENCE).context("Bundled demo sequence is invalid")?,
    };

    let config = PlaybackConfig::from_env()?;
    let db_path =
        std::env::var("PLAYBACK_DB_PATH").unwrap_or_else(|_| "./data/playback.db".to_string());

    eprintln!("▶ Chat Playback v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Steps: {}", sequence.len());
    eprintln!("   Session: {} ({})", config.session_id, db_path);

    // Playback still works if the durable store cannot be opened.
    let store: Arc<dyn SessionStore> =
        match LibSqlSessionStore::new_local(Path::new(&db_path), &config.session_id).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "Session store unavailable; state will not persist");
                Arc::new(MemorySessionStore::new())
            }
        };

    let history = Arc::new(HistoryStore::new(Arc::clone(&store), &config.history_key));
    let restored = if restart {
        if let Err(e) = history.clear().await {
            tracing::warn!(error = %e, "Failed to clear saved history");
        }
        Vec::new()
    } else {
        history.load().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load saved history");
            Vec::new()
        })
    };
    for record in &restored {
        print_record(record);
    }

    let log = MessageLog::with_records(restored);
    let printer = tokio::spawn(render(log.subscribe()));
    let history_sync = spawn_history_sync(&log, history);

    let engine = PlaybackEngine::new(sequence, Arc::clone(&log), store, config).await;
    let handle = if restart {
        Some(engine.reset().await)
    } else {
        engine.start_if_needed().await
    };

    let Some(handle) = handle else {
        eprintln!("\n   {}", skipped_message(engine.is_completed()));
        drop(engine);
        drop(log);
        let _ = tokio::join!(printer, history_sync);
        return Ok(());
    };

    let outcome = tokio::select! {
        outcome = handle.join() => outcome,
        _ = tokio::signal::ctrl_c() => {
            engine.stop();
            RunOutcome::Cancelled
        }
    };

    // Both tasks end once the last handle to the log is gone, after draining
    // what is still buffered.
    drop(engine);
    drop(log);
    let _ = tokio::join!(printer, history_sync);

    match outcome {
        RunOutcome::Completed => eprintln!("\n   Playback complete."),
        RunOutcome::Cancelled => eprintln!("\n   Playback stopped."),
    }
    Ok(())
}

/// Why `start_if_needed` declined to play.
fn skipped_message(completed: bool) -> &'static str {
    if completed {
        "Playback already completed. Run with --restart to replay it."
    } else {
        "Interrupted playback restored. Run with --restart to replay it."
    }
}

/// Print log changes as they happen. Streamed text is printed as deltas.
async fn render(mut rx: broadcast::Receiver<LogEvent>) {
    let mut printed = 0usize;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "Renderer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            LogEvent::Appended { record, .. } => {
                printed = 0;
                if record.kind == MessageKind::Text {
                    print!("\n{:?}: ", record.role);
                    printed = print_delta(record.text(), printed);
                } else {
                    print_record(&record);
                }
            }
            LogEvent::ReplacedLast { record, .. } if record.kind == MessageKind::Text => {
                printed = print_delta(record.text(), printed);
            }
            LogEvent::ReplacedLast { record, .. } => print_record(&record),
            LogEvent::RemovedLast { .. } | LogEvent::Cleared => {}
        }
        let _ = std::io::stdout().flush();
    }
}

fn print_delta(text: &str, printed: usize) -> usize {
    if let Some(delta) = text.get(printed..) {
        print!("{delta}");
    }
    text.len()
}

fn print_record(record: &MessageRecord) {
    match &record.kind {
        MessageKind::Text => println!("\n{:?}: {}", record.role, record.text()),
        MessageKind::Thinking => println!("\n{:?}: …", record.role),
        MessageKind::Skeleton => println!("\n[loading {}]", metadata_hint(record)),
        kind => {
            let marker = if record.revealed { " (revealed)" } else { "" };
            println!("\n[{kind}{marker}] {}", record.content);
        }
    }
}

fn metadata_hint(record: &MessageRecord) -> String {
    record
        .metadata
        .get("variant")
        .and_then(|v| v.as_str())
        .unwrap_or("content")
        .to_string()
}
