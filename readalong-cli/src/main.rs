use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal;
use directories::ProjectDirs;
use readalong_core::{
    new_document_id, Command, Config, DocumentId, DocumentPages, DocumentProvider, Manifest,
    ManifestOptions, PageSource, PlaybackTransport, ScrollBehavior, Sentence, Session,
    SessionEvent,
};
use readalong_render::PdfRenderFactory;
use readalong_tty::{EventMapper, KittyRenderer, UiEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod playback;
mod view;

use playback::ReadingClock;
use view::{document_status, CellMetrics, Viewer};

const IDLE_POLL: Duration = Duration::from_millis(50);
const ANIMATION_POLL: Duration = Duration::from_millis(16);
const MAX_SETTLE_PASSES: usize = 4;

#[derive(Debug, Parser)]
#[command(
    name = "readalong",
    version,
    about = "Sentence-synchronised PDF read-along for kitty terminals"
)]
struct Args {
    /// Sentence manifests to load; Tab cycles through them
    #[arg(required = true)]
    manifests: Vec<PathBuf>,

    /// PDF to render instead of the document named by the manifest
    #[arg(long)]
    pdf: Option<PathBuf>,

    /// Config file to use instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mirror logs to stderr in addition to the log file
    #[arg(long)]
    log_stderr: bool,

    /// Start with auto-scroll disabled
    #[arg(long)]
    no_auto_scroll: bool,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

struct LoadOutcome {
    document: DocumentId,
    result: Result<Arc<dyn PageSource>>,
}

/// Owns the manifest list and hands page-source loads to the blocking pool.
struct Loader {
    manifests: Vec<PathBuf>,
    current: usize,
    pdf_override: Option<PathBuf>,
    options: ManifestOptions,
    provider: Arc<PdfRenderFactory>,
    completions: mpsc::UnboundedSender<LoadOutcome>,
}

impl Loader {
    /// Replaces the session's document with manifest `index`. The page source
    /// opens in the background; its outcome arrives tagged with the new id.
    fn load(&mut self, index: usize, session: &mut Session) -> Result<Vec<Sentence>> {
        let manifest_path = &self.manifests[index];
        let manifest = Manifest::load(manifest_path, self.options)
            .with_context(|| format!("failed to load manifest {:?}", manifest_path))?;
        let pdf = self
            .pdf_override
            .clone()
            .or(manifest.document)
            .ok_or_else(|| {
                anyhow!("manifest {:?} names no document; pass --pdf", manifest_path)
            })?;

        let document = new_document_id();
        let sentences = manifest.sentences;
        session.replace_document(document, &pdf, sentences.clone());
        self.current = index;
        self.spawn_open(document, pdf);
        Ok(sentences)
    }

    fn spawn_open(&self, document: DocumentId, path: PathBuf) {
        let provider = Arc::clone(&self.provider);
        let completions = self.completions.clone();
        let runtime = tokio::runtime::Handle::current();
        tokio::task::spawn_blocking(move || {
            let result = runtime.block_on(provider.open(&path));
            if completions.send(LoadOutcome { document, result }).is_err() {
                debug!(%document, "viewer gone before document finished loading");
            }
        });
    }

    fn next_index(&self) -> usize {
        (self.current + 1) % self.manifests.len()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("failed to load config")?;
    let project_dirs = ProjectDirs::from("net", "readalong", "readalong")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs, config.log_filter.as_deref(), args.log_stderr)?;

    let auto_scroll = config.auto_scroll && !args.no_auto_scroll;
    let behavior = if config.smooth_scroll {
        ScrollBehavior::Smooth
    } else {
        ScrollBehavior::Instant
    };
    let mut session = Session::new(auto_scroll).with_scroll_behavior(behavior);

    let (completions, mut completed) = mpsc::unbounded_channel();
    let mut loader = Loader {
        manifests: args.manifests.clone(),
        current: 0,
        pdf_override: args.pdf.clone(),
        options: ManifestOptions {
            merge_adjacent_regions: config.merge_adjacent_regions,
        },
        provider: Arc::new(PdfRenderFactory::new()?),
        completions,
    };
    let sentences = loader.load(0, &mut session)?;
    let mut clock = ReadingClock::new(&sentences, config.words_per_minute, config.min_sentence);

    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    renderer.clear_all()?;
    let mut mapper = EventMapper::new(config.double_activation);
    let mut viewer = Viewer::new(&config, CellMetrics::query()?);
    let mut dirty = true;

    loop {
        let now = Instant::now();

        while let Ok(outcome) = completed.try_recv() {
            dirty |= complete_load(outcome, &mut session, &mut viewer, &mut clock, &config, now);
        }
        dirty |= viewer.poll_layout();
        dirty |= settle(&mut session, &mut viewer, &mut clock, now);
        dirty |= viewer.tick(now);

        // Active-sentence changes are on screen before the next input is read.
        if dirty {
            let status = with_pending(
                document_status(&session, &viewer, clock.is_playing()),
                mapper.pending_input().as_deref(),
            );
            viewer.redraw(&mut renderer, &session, &status)?;
            dirty = false;
        }

        let timeout = if viewer.is_animating() {
            ANIMATION_POLL
        } else {
            IDLE_POLL
        };
        if !event::poll(timeout)? {
            continue;
        }

        viewer.status = None;
        dirty = true;
        match mapper.map_event(event::read()?) {
            UiEvent::Quit => break,
            UiEvent::Command(command) => session.apply(command),
            UiEvent::TogglePlayback => clock.toggle(Instant::now()),
            UiEvent::Scroll { rows } => viewer.scroll_rows(rows),
            UiEvent::Pointer { column, row, kind } => {
                viewer.pointer(&mut session, column, row, kind)
            }
            UiEvent::Resized { .. } => viewer.resized(CellMetrics::query()?),
            UiEvent::NextDocument => {
                let index = loader.next_index();
                match loader.load(index, &mut session) {
                    Ok(sentences) => {
                        viewer.detach();
                        clock = ReadingClock::new(
                            &sentences,
                            config.words_per_minute,
                            config.min_sentence,
                        );
                    }
                    Err(err) => {
                        warn!(?err, "failed to switch document");
                        viewer.status = Some(format!("{err:#}"));
                    }
                }
            }
            UiEvent::None => {}
        }
    }

    renderer.clear_all()?;
    Ok(())
}

fn complete_load(
    outcome: LoadOutcome,
    session: &mut Session,
    viewer: &mut Viewer,
    clock: &mut ReadingClock,
    config: &Config,
    now: Instant,
) -> bool {
    let LoadOutcome { document, result } = outcome;
    if session.document().map(|doc| doc.id) != Some(document) {
        debug!(%document, "dropping load result for a replaced document");
        return false;
    }
    match result {
        Ok(source) => {
            let total = source.info().page_count();
            info!(%document, pages = total, "document ready");
            viewer.attach(DocumentPages::new(
                document,
                source,
                config.render_cache_pages,
            ));
            session.apply(Command::PagesLoaded { document, total });
            clock.play(now);
        }
        Err(err) => {
            session.apply(Command::LoadFailed {
                document,
                reason: format!("{err:#}"),
            });
        }
    }
    true
}

/// Runs playback sync, the anchor mount pass and session event handling
/// until the session has nothing more to say.
fn settle(
    session: &mut Session,
    viewer: &mut Viewer,
    clock: &mut ReadingClock,
    now: Instant,
) -> bool {
    let mut dirty = false;
    for _ in 0..MAX_SETTLE_PASSES {
        session.sync_playback(clock, now);
        viewer.mount_anchor(session);
        session.after_mount();

        let events = session.drain_events();
        if events.is_empty() {
            break;
        }
        dirty = true;
        for event in events {
            match event {
                SessionEvent::JumpRequested { jump, .. } => clock.jump_to(jump.sentence),
                SessionEvent::ScrollIntoView(request) => viewer.scroll_into_view(&request, now),
                SessionEvent::LoadFailed { reason, .. } => {
                    viewer.status = Some(format!("load failed: {reason}"));
                }
                SessionEvent::DocumentReplaced(_)
                | SessionEvent::PagesLoaded { .. }
                | SessionEvent::RedrawNeeded(_) => {}
            }
        }
    }
    dirty
}

fn with_pending(mut status: String, pending_input: Option<&str>) -> String {
    if let Some(pending) = pending_input.filter(|s| !s.is_empty()) {
        status.push_str(" | ");
        status.push_str(pending);
    }
    status
}

fn init_logging(
    project_dirs: &ProjectDirs,
    log_filter: Option<&str>,
    log_stderr: bool,
) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "readalong.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // The terminal is in raw mode, so stderr output is opt-in.
    let stderr_layer =
        log_stderr.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
