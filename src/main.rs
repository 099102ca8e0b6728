use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use indicatif::MultiProgress;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error};

use testsplice::client::{
    GenerationRequest, GenerationResult, HttpGenerationService, JobClient, PollOptions,
};
use testsplice::context::{Selector, SourceContext};
use testsplice::error::JobError;
use testsplice::logging::{init_logging, LogLevel, LoggingConfig};
use testsplice::merge::ConflictInfo;
use testsplice::pipeline::{
    ConflictDecision, DecisionHandler, FixedDecisions, MergeStatus, Pipeline, PipelineRequest,
    Preview, PreviewDecision,
};
use testsplice::settings::Settings;
use testsplice::ui::{JobSpinner, Report};
use testsplice::validate::validate;

/// What to do when generated names already exist in the target file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OnConflict {
    /// Prompt on the terminal
    #[default]
    Ask,
    /// Replace the existing test group
    Replace,
    /// Append anyway
    Append,
    /// Leave the file untouched
    Cancel,
}

impl OnConflict {
    fn fixed(self) -> Option<ConflictDecision> {
        match self {
            OnConflict::Ask => None,
            OnConflict::Replace => Some(ConflictDecision::Replace),
            OnConflict::Append => Some(ConflictDecision::AppendAnyway),
            OnConflict::Cancel => Some(ConflictDecision::Cancel),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "testsplice")]
#[command(version)]
#[command(about = "Generate pytest tests with a remote service and splice them into your suite")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress logs and spinners
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Disable colors (also respects NO_COLOR)
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file (defaults to testsplice.toml in the project root)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Project root
    #[arg(long, short = 'd', global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Which part of the source file to target.
#[derive(clap::Args, Debug, Clone, Default)]
struct TargetArgs {
    /// Target a function or method by name
    #[arg(long, short = 'f', conflicts_with = "line")]
    function: Option<String>,

    /// Target the function enclosing this 1-based line
    #[arg(long, short = 'l')]
    line: Option<usize>,
}

impl TargetArgs {
    fn selector(&self) -> Selector {
        match (&self.function, self.line) {
            (Some(name), _) => Selector::Function(name.clone()),
            (None, Some(line)) => Selector::Line(line),
            (None, None) => Selector::File,
        }
    }
}

/// How merge decisions are made.
#[derive(clap::Args, Debug, Clone)]
struct DecisionArgs {
    /// Conflict policy
    #[arg(long, value_enum, default_value = "ask")]
    on_conflict: OnConflict,

    /// Skip the preview and insert directly
    #[arg(long, short = 'y')]
    yes: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate tests for one or more source files and merge them
    Generate {
        /// Python source files
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        #[command(flatten)]
        target: TargetArgs,

        /// Extra instructions for the generator
        #[arg(long)]
        description: Option<String>,

        /// Do not send the existing test file to the generator
        #[arg(long)]
        no_existing: bool,

        #[command(flatten)]
        decisions: DecisionArgs,
    },
    /// Merge an already generated response into the test file for SOURCE
    Merge {
        source: PathBuf,

        /// File holding the raw generation response
        #[arg(long, short = 'r')]
        response: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        decisions: DecisionArgs,
    },
    /// Show where the tests for SOURCE live
    Locate { source: PathBuf },
    /// Run heuristic checks over a test file
    Check {
        file: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

mod exit_codes {
    use std::process::ExitCode;

    /// Input or configuration could not be used
    pub fn usage() -> ExitCode {
        ExitCode::from(2)
    }

    /// At least one job or merge failed
    pub fn failed() -> ExitCode {
        ExitCode::from(1)
    }
}

/// Terminal prompts, with fixed answers where flags gave them.
struct PromptDecisions<'a> {
    report: &'a Report,
    on_conflict: OnConflict,
    skip_preview: bool,
}

impl PromptDecisions<'_> {
    fn ask(&self, question: &str) -> String {
        eprint!("{} ", question);
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return String::new();
        }
        answer.trim().to_lowercase()
    }
}

impl DecisionHandler for PromptDecisions<'_> {
    fn on_conflict(&mut self, conflict: &ConflictInfo) -> ConflictDecision {
        eprintln!("{}", self.report.conflict(conflict));
        if let Some(decision) = self.on_conflict.fixed() {
            return decision;
        }
        match self.ask("[r]eplace, [a]ppend anyway, or [c]ancel?").as_str() {
            "r" | "replace" => ConflictDecision::Replace,
            "a" | "append" => ConflictDecision::AppendAnyway,
            _ => ConflictDecision::Cancel,
        }
    }

    fn on_preview(&mut self, preview: &Preview) -> PreviewDecision {
        if self.skip_preview {
            return PreviewDecision::Insert;
        }
        eprint!("{}", self.report.preview(preview));
        match self.ask("[i]nsert or [c]ancel?").as_str() {
            "i" | "insert" | "y" | "yes" => PreviewDecision::Insert,
            _ => PreviewDecision::Cancel,
        }
    }
}

fn decision_handler<'a>(
    report: &'a Report,
    args: &DecisionArgs,
) -> Box<dyn DecisionHandler + 'a> {
    let interactive = io::stdin().is_terminal();
    if args.yes || !interactive {
        let on_conflict = args.on_conflict.fixed().unwrap_or(ConflictDecision::Cancel);
        if !interactive && args.on_conflict == OnConflict::Ask {
            debug!("stdin is not a terminal, conflicts will cancel");
        }
        return Box::new(FixedDecisions { on_conflict });
    }
    Box::new(PromptDecisions {
        report,
        on_conflict: args.on_conflict,
        skip_preview: false,
    })
}

fn resolve_root(dir: Option<&Path>) -> io::Result<PathBuf> {
    match dir {
        Some(dir) => dir.canonicalize(),
        None => std::env::current_dir(),
    }
}

fn absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn load_settings(cli: &Cli, root: &Path) -> Result<Settings, String> {
    let loaded = match &cli.config {
        Some(path) => Settings::load(absolute(root, path)),
        None => Settings::discover(root),
    };
    loaded.map_err(|e| e.to_string())
}

fn describe_job_error(err: &JobError) -> String {
    let classified = err.classify();
    let hint = if classified.should_retry() {
        " (retry later)"
    } else {
        ""
    };
    format!("{}{}", err, hint)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = if cli.quiet {
        LoggingConfig::new().with_level(LogLevel::Off)
    } else {
        LoggingConfig::from_verbosity(cli.verbose)
    };
    init_logging(logging);

    let color = !cli.no_color && std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

    let root = match resolve_root(cli.dir.as_deref()) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("error: cannot use project root: {}", e);
            return exit_codes::usage();
        }
    };
    let settings = match load_settings(&cli, &root) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {}", e);
            return exit_codes::usage();
        }
    };
    let report = Report::new(&root, color);

    match &cli.command {
        Commands::Generate {
            sources,
            target,
            description,
            no_existing,
            decisions,
        } => {
            run_generate(
                &cli,
                &root,
                &settings,
                &report,
                sources,
                target,
                description.as_deref(),
                !no_existing,
                decisions,
            )
            .await
        }
        Commands::Merge {
            source,
            response,
            target,
            decisions,
        } => run_merge(&root, &settings, &report, source, response, target, decisions),
        Commands::Locate { source } => {
            let pipeline = Pipeline::new(&root, &settings);
            match pipeline.locator().resolve(&absolute(&root, source)) {
                Ok(info) => {
                    println!("{}", report.location(&info));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    exit_codes::failed()
                }
            }
        }
        Commands::Check { file, json } => run_check(&root, &report, file, *json),
    }
}

/// A source file prepared for submission.
struct Prepared {
    label: String,
    source_path: PathBuf,
    context: SourceContext,
    request: GenerationRequest,
}

fn prepare(
    root: &Path,
    pipeline: &Pipeline,
    source: &Path,
    target: &TargetArgs,
    description: Option<&str>,
    send_existing: bool,
) -> Result<Prepared, String> {
    let source_path = absolute(root, source);
    let code = fs::read_to_string(&source_path)
        .map_err(|e| format!("cannot read {}: {}", source_path.display(), e))?;
    let context = SourceContext::analyze(root, &source_path, &code, &target.selector())
        .map_err(|e| format!("{}: {}", source.display(), e))?;

    let existing_test_code = if send_existing {
        pipeline
            .locator()
            .resolve(&source_path)
            .ok()
            .and_then(|info| info.content().map(str::to_string))
    } else {
        None
    };

    let request = GenerationRequest {
        source_code: context.source_for_request(&code).to_string(),
        user_description: description.map(str::to_string),
        existing_test_code,
        context: context.request_context(),
    };

    Ok(Prepared {
        label: context.relative_path.display().to_string(),
        source_path,
        context,
        request,
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_generate(
    cli: &Cli,
    root: &Path,
    settings: &Settings,
    report: &Report,
    sources: &[PathBuf],
    target: &TargetArgs,
    description: Option<&str>,
    send_existing: bool,
    decision_args: &DecisionArgs,
) -> ExitCode {
    let pipeline = Pipeline::new(root, settings);
    let mut failed = false;

    let mut prepared = Vec::new();
    for source in sources {
        match prepare(root, &pipeline, source, target, description, send_existing) {
            Ok(p) => prepared.push(p),
            Err(e) => {
                eprintln!("{} {}", report.palette().error("error:"), e);
                failed = true;
            }
        }
    }
    if prepared.is_empty() {
        return exit_codes::usage();
    }

    let service = match HttpGenerationService::new(&settings.service) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("{} {}", report.palette().error("error:"), e);
            return exit_codes::usage();
        }
    };
    let client = JobClient::new(service);
    let options = PollOptions::from(&settings.polling);

    let multi = MultiProgress::new();
    let show_spinners = !cli.quiet && io::stderr().is_terminal();

    // Jobs run concurrently; each owns its spinner and poll loop.
    let jobs = prepared.iter().map(|p| {
        let spinner = if show_spinners {
            JobSpinner::new(Some(&multi), p.label.clone())
        } else {
            JobSpinner::hidden(p.label.clone())
        };
        let client = &client;
        let options = &options;
        async move {
            let result = client
                .generate(&p.request, |progress| spinner.update(progress), options)
                .await;
            match &result {
                Ok(_) => spinner.finish_with_success("generated"),
                Err(e) => spinner.finish_with_error(e.to_string()),
            }
            result
        }
    });
    let results: Vec<Result<GenerationResult, JobError>> = join_all(jobs).await;

    // Merges are serialized: two sources may share a target file.
    for (p, result) in prepared.into_iter().zip(results) {
        let generated = match result {
            Ok(generated) => generated,
            Err(e) => {
                error!(source = %p.label, error = %e, "Generation failed");
                eprintln!(
                    "{} {}: {}",
                    report.palette().error("✗"),
                    p.label,
                    describe_job_error(&e)
                );
                failed = true;
                continue;
            }
        };
        if let Some(explanation) = generated.explanation.as_deref() {
            debug!(source = %p.label, explanation, "Generator explanation");
        }

        let request = PipelineRequest {
            source_path: p.source_path,
            context: p.context,
            response: generated.generated_code,
        };
        let mut decisions = decision_handler(report, decision_args);
        failed |= !merge_one(&pipeline, report, &request, decisions.as_mut());
    }

    if failed {
        exit_codes::failed()
    } else {
        ExitCode::SUCCESS
    }
}

/// Runs one merge and prints its outcome. Returns false on failure.
fn merge_one(
    pipeline: &Pipeline,
    report: &Report,
    request: &PipelineRequest,
    decisions: &mut dyn DecisionHandler,
) -> bool {
    match pipeline.run(request, decisions) {
        Ok(outcome) => {
            println!("{}", report.outcome(&outcome));
            match &outcome.status {
                MergeStatus::Inserted(result) => result.success,
                MergeStatus::Cancelled(_) => true,
            }
        }
        Err(e) => {
            eprintln!("{} {}", report.palette().error("error:"), e);
            false
        }
    }
}

fn run_merge(
    root: &Path,
    settings: &Settings,
    report: &Report,
    source: &Path,
    response: &Path,
    target: &TargetArgs,
    decision_args: &DecisionArgs,
) -> ExitCode {
    let pipeline = Pipeline::new(root, settings);
    let source_path = absolute(root, source);

    let inputs = fs::read_to_string(&source_path)
        .map_err(|e| format!("cannot read {}: {}", source_path.display(), e))
        .and_then(|code| {
            SourceContext::analyze(root, &source_path, &code, &target.selector())
                .map_err(|e| format!("{}: {}", source.display(), e))
        })
        .and_then(|context| {
            let response_path = absolute(root, response);
            fs::read_to_string(&response_path)
                .map(|text| (context, text))
                .map_err(|e| format!("cannot read {}: {}", response_path.display(), e))
        });

    let (context, response) = match inputs {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("{} {}", report.palette().error("error:"), e);
            return exit_codes::usage();
        }
    };

    let request = PipelineRequest {
        source_path,
        context,
        response,
    };
    let mut decisions = decision_handler(report, decision_args);
    if merge_one(&pipeline, report, &request, decisions.as_mut()) {
        ExitCode::SUCCESS
    } else {
        exit_codes::failed()
    }
}

fn run_check(root: &Path, report: &Report, file: &Path, json: bool) -> ExitCode {
    let path = absolute(root, file);
    let code = match fs::read_to_string(&path) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: cannot read {}: {}", path.display(), e);
            return exit_codes::usage();
        }
    };

    let result = validate(&code);
    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: {}", e);
                return exit_codes::failed();
            }
        }
    } else {
        println!("{}", report.validation(&file.display().to_string(), &result));
    }

    if result.is_valid {
        ExitCode::SUCCESS
    } else {
        exit_codes::failed()
    }
}
