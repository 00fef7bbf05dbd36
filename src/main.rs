//! Session Replay - Command Line Entry Point
//!
//! Inspects, replays and annotates recordings kept in the file-backed store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use session_replay::{
    config::ReplayConfig,
    store::RecordingSummary,
    Actor, AnnotationCategory, Author, Clock, FileKv, Interaction, ManualClock, Millis,
    NewAnnotation, RecordingStore, SessionEvent, SessionPlayer, SessionRecorder, SharedClock,
    StoreWorker, SystemClock,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "session-replay", version, about = "Record, inspect and replay interaction sessions")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Store directory, overriding the configuration
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Also write daily-rotated logs into this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored recordings
    List,
    /// Show a recording's details and markers
    Show { id: String },
    /// Play a recording back, printing events as they are crossed
    Replay {
        id: String,
        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Start position in milliseconds
        #[arg(long, default_value_t = 0)]
        from: Millis,
        /// Wait in real time instead of fast-forwarding
        #[arg(long)]
        realtime: bool,
    },
    /// Delete a recording and its markers
    Delete { id: String },
    /// Add an annotation to a recording
    Annotate {
        id: String,
        /// Position in milliseconds from the recording start
        #[arg(long)]
        at: Millis,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// important, question, issue, highlight or note
        #[arg(long, default_value = "note")]
        category: String,
        #[arg(long, default_value = "cli")]
        author: String,
        #[arg(long, default_value = "#6b7280")]
        author_color: String,
    },
    /// Add a bookmark to a recording
    Bookmark {
        id: String,
        #[arg(long)]
        at: Millis,
        #[arg(long)]
        label: String,
        #[arg(long, default_value = "#f59e0b")]
        color: String,
        #[arg(long, default_value = "cli")]
        author: String,
    },
    /// Write a recording to a JSON file
    Export { id: String, path: PathBuf },
    /// Merge a recording from a JSON file into the store
    Import { path: PathBuf },
    /// Record a short synthetic session
    Demo {
        #[arg(long, default_value = "Demo session")]
        title: String,
    },
}

fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,session_replay=debug"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "session-replay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<ReplayConfig> {
    let mut config = match &cli.config {
        Some(path) => ReplayConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ReplayConfig::load_or_default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.store.data_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &ReplayConfig) -> Result<RecordingStore<FileKv>> {
    let dir = config.store.resolve_data_dir()?;
    tracing::debug!("Opening store at {}", dir.display());
    Ok(RecordingStore::new(FileKv::open(dir)?))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref());
    let config = load_config(&cli)?;
    let mut store = open_store(&config)?;

    match cli.command {
        Command::List => list(&store),
        Command::Show { id } => show(&store, &id),
        Command::Replay {
            id,
            speed,
            from,
            realtime,
        } => replay(store, &config, &id, speed, from, realtime),
        Command::Delete { id } => {
            store.delete(&id)?;
            println!("Deleted {}", id);
            Ok(())
        }
        Command::Annotate {
            id,
            at,
            title,
            description,
            category,
            author,
            author_color,
        } => {
            let category: AnnotationCategory = category.parse()?;
            let mut draft = NewAnnotation::new(at, title, Author::new(author, author_color))
                .with_category(category);
            if let Some(description) = description {
                draft = draft.with_description(description);
            }
            let annotation = store.add_annotation(&id, draft, SystemClock.now_ms())?;
            println!("Added annotation {} at {} ms", annotation.id, annotation.timestamp);
            Ok(())
        }
        Command::Bookmark {
            id,
            at,
            label,
            color,
            author,
        } => {
            let bookmark =
                store.add_bookmark(&id, at, &label, &color, Author::new(author, color.clone()))?;
            println!("Added bookmark {} at {} ms", bookmark.id, bookmark.timestamp);
            Ok(())
        }
        Command::Export { id, path } => {
            store.export_to_file(&id, &path)?;
            println!("Exported {} to {}", id, path.display());
            Ok(())
        }
        Command::Import { path } => {
            let recording = store.import_from_file(&path)?;
            println!(
                "Imported {} ({} events)",
                recording.id,
                recording.events.len()
            );
            Ok(())
        }
        Command::Demo { title } => demo(store, &config, &title),
    }
}

fn list(store: &RecordingStore<FileKv>) -> Result<()> {
    let summaries = store.list_summaries()?;
    if summaries.is_empty() {
        println!("No recordings");
        return Ok(());
    }
    for RecordingSummary {
        id,
        title,
        duration,
        event_count,
        participant_count,
        finalized,
        ..
    } in summaries
    {
        let status = if finalized { "" } else { " (in progress)" };
        println!(
            "{}  {:<32} {:>8} ms  {:>5} events  {} participants{}",
            id, title, duration, event_count, participant_count, status
        );
    }
    Ok(())
}

fn show(store: &RecordingStore<FileKv>, id: &str) -> Result<()> {
    let recording = store.get(id)?;
    let markers = store.markers(id)?;

    println!("Recording: {}", recording.id);
    println!("Title: {}", recording.metadata.title);
    if !recording.metadata.tags.is_empty() {
        println!("Tags: {}", recording.metadata.tags.join(", "));
    }
    println!("Duration: {} ms", recording.duration);
    println!("Views: {}", recording.metadata.views.join(" -> "));

    println!("\nEvents ({}):", recording.events.len());
    for (event_type, count) in recording.event_counts() {
        println!("  {:<12} {}", event_type, count);
    }

    println!("\nParticipants:");
    for participant in &recording.participants {
        let left = participant
            .left_at
            .map(|t| format!("left at {}", t.saturating_sub(recording.start_time)))
            .unwrap_or_else(|| "active".to_string());
        println!(
            "  {} ({}) joined at {}, {}",
            participant.user_name,
            participant.user_id,
            participant.joined_at.saturating_sub(recording.start_time),
            left
        );
    }

    if !markers.is_empty() {
        println!("\nAnnotations:");
        for annotation in markers.annotations() {
            let resolved = if annotation.resolved { " [resolved]" } else { "" };
            println!(
                "  {:>8} ms  [{}] {}{} ({} replies)",
                annotation.timestamp,
                annotation.category.display_name(),
                annotation.title,
                resolved,
                annotation.replies.len()
            );
        }
        println!("Bookmarks:");
        for bookmark in markers.bookmarks() {
            println!("  {:>8} ms  {}", bookmark.timestamp, bookmark.label);
        }
    }
    Ok(())
}

fn replay(
    store: RecordingStore<FileKv>,
    config: &ReplayConfig,
    id: &str,
    speed: f64,
    from: Millis,
    realtime: bool,
) -> Result<()> {
    let manual = ManualClock::new(SystemClock.now_ms());
    let clock: SharedClock = if realtime {
        Arc::new(SystemClock)
    } else {
        Arc::new(manual.clone())
    };

    let (mut worker, client) = StoreWorker::new(store);
    let mut player = SessionPlayer::new(config.player.clone(), clock);
    player.set_loop_playback(false);
    player.request_load(&client, id)?;
    worker.process_pending();
    player.poll()?;

    let Some(start_time) = player.recording().map(|r| r.start_time) else {
        bail!("Recording {} could not be loaded", id);
    };
    player.set_consumer(move |event: &SessionEvent| {
        println!(
            "{:>8} ms  {:<12} {:<16} {}",
            event.relative_to(start_time),
            event.event_type.display_name(),
            event.actor.user_name,
            event.payload
        );
    });

    player.set_speed(speed)?;
    player.seek(from as f64);
    player.play()?;

    let tick = Duration::from_millis(config.player.tick_interval_ms);
    while player.is_playing() {
        if realtime {
            std::thread::sleep(tick);
        } else {
            manual.advance(config.player.tick_interval_ms);
        }
        player.poll()?;
    }

    tracing::info!("Replay of {} finished", id);
    Ok(())
}

fn demo(store: RecordingStore<FileKv>, config: &ReplayConfig, title: &str) -> Result<()> {
    let clock = ManualClock::new(SystemClock.now_ms());
    let (mut worker, client) = StoreWorker::new(store);
    let mut recorder =
        SessionRecorder::new(config.recorder.clone(), Arc::new(clock.clone()), client);

    let id = recorder.start(title, Actor::new("demo", "Demo User", "#4f46e5"))?;
    recorder.capture(&Interaction::view_change("overview"));

    for step in 0..120u32 {
        clock.advance(50);
        let t = f64::from(step);
        recorder.capture(&Interaction::pointer_move(100.0 + t * 4.0, 200.0 + (t / 8.0).sin() * 40.0));
        if step % 30 == 29 {
            recorder.capture(&Interaction::click(100.0 + t * 4.0, 200.0, Some("button.refresh")));
        }
        if step % 45 == 0 {
            recorder.capture(&Interaction::scroll(0.0, t * 10.0));
        }
        if step == 60 {
            recorder.capture(&Interaction::view_change("details"));
        }
        recorder.poll();
        worker.process_pending();
    }

    let recording = recorder.stop()?;
    for _ in 0..4 {
        worker.process_pending();
        recorder.poll();
        if recorder.is_settled() {
            break;
        }
    }
    if !recorder.is_settled() {
        bail!("Recording {} was not fully persisted", id);
    }

    let stats = recorder.stats();
    println!(
        "Recorded {} ({} events over {} ms, {} discarded by sampling, {} flushes)",
        id,
        recording.events.len(),
        recording.duration,
        stats.events_discarded,
        stats.flushes_acknowledged
    );
    Ok(())
}
