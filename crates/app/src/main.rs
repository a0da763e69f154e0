#![forbid(unsafe_code)]

mod ops;
mod prompt;

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fj_core::{
    AutoAnswer, ChannelDecisionMaker, DecisionMaker, DecisionOutcome, DecisionPrompt, FileJob,
    FileRef, FileSet, JobConfig, JobListener, JobOperation, JobSettings, JobState, LocalFile,
    Panel, PanelView, RefreshRequest, load_job_settings, settings_path,
};
use tracing_subscriber::EnvFilter;

use crate::ops::{CopyOperation, DeleteOperation};

#[derive(Debug, Parser)]
#[command(version, about = "Run copy and delete jobs on a background worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Settings file; defaults to ~/.config/fj/settings.ini.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Skip every failure without asking.
    #[arg(long, global = true)]
    skip_errors: bool,
    /// Leave processed files marked.
    #[arg(long, global = true)]
    keep_marks: bool,
    /// Answer prompts unattended with the first offered outcome in this list.
    #[arg(long, global = true, value_parser = parse_outcome)]
    answer: Vec<DecisionOutcome>,
    #[arg(long, global = true, default_value_t = 200)]
    tick_rate_ms: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copy files and folders into a destination folder.
    Copy {
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        #[arg(long)]
        to: PathBuf,
    },
    /// Delete files and folders recursively.
    Delete {
        #[arg(required = true)]
        targets: Vec<PathBuf>,
    },
}

fn parse_outcome(value: &str) -> Result<DecisionOutcome, String> {
    DecisionOutcome::parse(value).ok_or_else(|| format!("unknown outcome '{value}'"))
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let cwd = env::current_dir().context("failed to resolve current directory")?;

    let (title, files, operation, inactive) = match &cli.command {
        Command::Copy { sources, to } => {
            if !to.is_dir() {
                bail!("destination is not a directory: {}", to.display());
            }
            let operation: Arc<dyn JobOperation> = Arc::new(CopyOperation::new(to));
            ("Copy", file_set(sources), operation, Some(LocalFile::shared(to)))
        }
        Command::Delete { targets } => {
            let operation: Arc<dyn JobOperation> =
                Arc::new(DeleteOperation::new(targets.iter().map(PathBuf::as_path)));
            ("Delete", file_set(targets), operation, None)
        }
    };

    let (prompt_tx, prompt_rx) = mpsc::channel();
    let decisions: Arc<dyn DecisionMaker>;
    let prompts;
    if cli.answer.is_empty() {
        decisions = Arc::new(ChannelDecisionMaker::with_poll_interval(
            prompt_tx,
            settings.decision_poll_interval(),
        ));
        prompts = Some(prompt_rx);
    } else {
        decisions = Arc::new(AutoAnswer::new(cli.answer.clone()));
        prompts = None;
    }

    let config = JobConfig {
        title: String::from(title),
        decisions,
        view: Arc::new(ConsoleView {
            active: LocalFile::shared(cwd),
            inactive,
        }),
        ..JobConfig::from_settings(&settings)
    };
    let job = FileJob::new(files, operation, config);
    let reporter = Arc::new(TransitionReporter);
    job.add_listener(&reporter);

    run_job(&job, prompts, Duration::from_millis(cli.tick_rate_ms.max(1)))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fj=info,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .try_init();
}

fn load_settings(cli: &Cli) -> Result<JobSettings> {
    let path = cli.settings.clone().or_else(settings_path);
    let mut settings = match &path {
        Some(path) => load_job_settings(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?,
        None => JobSettings::default(),
    };
    if cli.skip_errors {
        settings.auto_skip_errors = true;
    }
    if cli.keep_marks {
        settings.auto_unmark = false;
    }
    Ok(settings)
}

fn file_set(paths: &[PathBuf]) -> FileSet {
    let base_folder = paths
        .first()
        .and_then(|path| path.parent())
        .map(Path::to_path_buf);
    FileSet::from_paths(base_folder, paths.iter().cloned())
}

fn run_job(
    job: &FileJob,
    prompts: Option<Receiver<DecisionPrompt>>,
    tick_rate: Duration,
) -> Result<()> {
    job.start().context("failed to start job")?;

    let mut last_tick = Instant::now();
    let mut last_line = String::new();
    while !job.state().is_terminal() {
        match &prompts {
            Some(prompts) => match prompts.recv_timeout(tick_rate) {
                Ok(prompt) => answer_prompt(prompt)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => thread::sleep(tick_rate),
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
            let progress = job.progress();
            let line = format!(
                "[{:>3}%] {} ({}/{})",
                progress.percent(),
                progress.status_line(),
                progress.current_index,
                progress.total
            );
            if line != last_line {
                eprintln!("{line}");
                last_line = line;
            }
        }
    }

    job.wait().context("job worker failed")?;
    let progress = job.progress();
    match job.state() {
        JobState::Finished => {
            eprintln!(
                "{}: done in {:.1}s ({:.1}s paused)",
                job.title(),
                progress.effective_run_time.as_secs_f64(),
                progress.paused_time.as_secs_f64()
            );
            Ok(())
        }
        state => bail!("job #{} ended {state}", job.id()),
    }
}

fn answer_prompt(prompt: DecisionPrompt) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stderr();
    let outcome = prompt::ask(&prompt.request, &mut input, &mut output)
        .context("failed to read answer")?;
    match outcome {
        Some(outcome) => {
            if !prompt.answer(outcome) {
                tracing::debug!(outcome = outcome.label(), "job stopped waiting for the answer");
            }
        }
        None => prompt.dismiss(),
    }
    Ok(())
}

/// Prints state changes for the user.
struct TransitionReporter;

impl JobListener for TransitionReporter {
    fn job_state_changed(&self, job: &FileJob, previous: JobState, next: JobState) {
        if previous == JobState::NotStarted {
            eprintln!("{} #{}: {} files", job.title(), job.id(), job.total_count());
        } else if next == JobState::Paused {
            eprintln!("{} #{}: paused", job.title(), job.id());
        } else if next == JobState::Interrupted {
            eprintln!("{} #{}: cancelled", job.title(), job.id());
        }
    }
}

/// The working directory stands in for the active panel; the copy destination
/// for the inactive one.
struct ConsoleView {
    active: FileRef,
    inactive: Option<FileRef>,
}

impl PanelView for ConsoleView {
    fn current_folder(&self, panel: Panel) -> Option<FileRef> {
        match panel {
            Panel::Active => Some(Arc::clone(&self.active)),
            Panel::Inactive => self.inactive.clone(),
        }
    }

    fn unmark(&self, file: &FileRef) {
        tracing::debug!(file = %file.path().display(), "unmarked");
    }

    fn refresh(&self, request: &RefreshRequest) {
        if request.is_empty() {
            return;
        }
        let select = request
            .select
            .as_ref()
            .map(|file| file.name())
            .unwrap_or_default();
        tracing::info!(
            active_changed = request.active_changed,
            inactive_changed = request.inactive_changed,
            select = %select,
            "folders changed"
        );
    }
}
