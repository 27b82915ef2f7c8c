use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use logtrace::callers::code_window;
use logtrace::resolve::Resolution;
use logtrace::{CallerNode, Level, RecordId, Session, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "logtrace")]
#[command(about = "Trace log lines back to their source and callers", long_about = None)]
struct Cli {
    /// Debug logging on stderr (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a log file and print its records as JSON.
    Parse {
        #[arg(long)]
        log: PathBuf,

        /// Drop records below this level.
        #[arg(long)]
        min_level: Option<Level>,

        /// Print span/target groups instead of records.
        #[arg(long)]
        group: bool,
    },
    /// List records that look like errors.
    Errors {
        #[arg(long)]
        log: PathBuf,
    },
    /// Find the source line that emitted a record.
    Locate {
        #[command(flatten)]
        target: Target,

        /// Print the code around the location.
        #[arg(long)]
        show: bool,
    },
    /// Print the probable callers of a record's source line.
    Callers {
        #[command(flatten)]
        target: Target,

        /// Levels of callers to expand.
        #[arg(long, default_value_t = 2)]
        depth: usize,

        /// Log lines of context sent to the ranking oracle.
        #[arg(long)]
        context_cap: Option<usize>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct Target {
    #[arg(long)]
    log: PathBuf,

    #[arg(long)]
    repo: PathBuf,

    /// 1-based position of the record in the parsed batch.
    #[arg(long)]
    record: usize,

    /// Settings file (default: <repo>/logtrace.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override search.max_files.
    #[arg(long)]
    max_files: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Commands::Parse {
            log,
            min_level,
            group,
        } => {
            let mut store = logtrace::RecordStore::new();
            store.load(&logtrace::LogParser::new(), &read(&log)?)?;
            if group {
                println!("{}", serde_json::to_string_pretty(&store.groups())?);
            } else {
                let ids = store.at_least(min_level.unwrap_or(Level::Trace));
                let records = ids
                    .into_iter()
                    .map(|id| store.get(id))
                    .collect::<logtrace::Result<Vec<_>>>()?;
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
        }
        Commands::Errors { log } => {
            let mut store = logtrace::RecordStore::new();
            store.load(&logtrace::LogParser::new(), &read(&log)?)?;
            for id in store.error_records() {
                let r = store.get(id)?;
                println!("{:>5}  {:<5}  {}", id.0 + 1, r.level, r.message);
            }
        }
        Commands::Locate { target, show } => {
            let (mut session, id) = open(&target, None)?;
            match locate(&mut session, id)? {
                Resolution::Found(loc) => {
                    let note = if loc.is_low_confidence() { " (low confidence)" } else { "" };
                    println!(
                        "{}:{}  [{:?}]{}",
                        display_path(session.resolver().root(), &loc.file),
                        loc.line + 1,
                        loc.stage,
                        note
                    );
                    if show {
                        for (n, text) in code_window(&loc.file, loc.line, 3)? {
                            let mark = if n == loc.line { ">" } else { " " };
                            println!("{} {:>5} | {}", mark, n + 1, text);
                        }
                    }
                }
                Resolution::NotFound => println!("location unknown"),
                Resolution::Cancelled => bail!("resolution was cancelled"),
            }
        }
        Commands::Callers {
            target,
            depth,
            context_cap,
            json,
        } => {
            let (mut session, id) = open(&target, context_cap)?;
            if let Resolution::NotFound = locate(&mut session, id)? {
                bail!("record {} has no known source location", target.record);
            }
            session.callers(id)?;
            expand_to_depth(&mut session, id, depth)?;

            let root = session
                .store()
                .get(id)?
                .caller_cache
                .as_ref()
                .context("caller tree missing after expansion")?;
            if json {
                println!("{}", serde_json::to_string_pretty(root)?);
            } else {
                print_tree(session.resolver().root(), root);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("logtrace=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read log file {}", path.display()))
}

fn open(target: &Target, context_cap: Option<usize>) -> Result<(Session, RecordId)> {
    let mut settings = Settings::load(target.config.as_deref(), Some(target.repo.as_path()))
        .with_context(|| "load settings")?;
    if let Some(max_files) = target.max_files {
        settings.search.max_files = max_files;
    }
    if let Some(cap) = context_cap {
        settings.context.cap = cap;
    }

    let mut session = Session::offline(&target.repo, settings);
    session
        .load_file(&target.log)
        .with_context(|| format!("load log file {}", target.log.display()))?;

    if target.record == 0 || target.record > session.store().len() {
        bail!(
            "record {} out of range (batch has {} records)",
            target.record,
            session.store().len()
        );
    }
    Ok((session, RecordId(target.record - 1)))
}

fn locate(session: &mut Session, id: RecordId) -> Result<Resolution> {
    session.analyze(id)?;
    Ok(session.locate(id)?)
}

/// Breadth-first expansion below the already expanded root.
fn expand_to_depth(session: &mut Session, id: RecordId, depth: usize) -> Result<()> {
    let mut frontier: Vec<Vec<usize>> = vec![Vec::new()];
    for _ in 1..depth {
        let mut next = Vec::new();
        for path in frontier {
            let count = session
                .store()
                .get(id)?
                .caller_cache
                .as_ref()
                .and_then(|root| root.descendant(&path))
                .and_then(|n| n.children.as_ref())
                .map_or(0, Vec::len);
            for i in 0..count {
                let mut child = path.clone();
                child.push(i);
                session.expand(id, &child)?;
                next.push(child);
            }
        }
        frontier = next;
    }
    Ok(())
}

fn print_tree(root_dir: &Path, root: &CallerNode) {
    println!("{}:{}", display_path(root_dir, &root.file_path), root.line_number + 1);
    let mut stack: Vec<(usize, &CallerNode)> = root
        .children
        .iter()
        .flatten()
        .rev()
        .map(|c| (1, c))
        .collect();
    if root.children.as_ref().is_some_and(Vec::is_empty) {
        println!("  (no callers found)");
    }

    while let Some((depth, node)) = stack.pop() {
        let name = if node.function_name.is_empty() { "<top level>" } else { node.function_name.as_str() };
        println!(
            "{}{} {}:{}  {:.2}  {}",
            "  ".repeat(depth),
            name,
            display_path(root_dir, &node.file_path),
            node.line_number + 1,
            node.confidence,
            node.explanation
        );
        if let Some(children) = &node.children {
            stack.extend(children.iter().rev().map(|c| (depth + 1, c)));
        }
    }
}

fn display_path(root: &Path, file: &Path) -> String {
    file.strip_prefix(root).unwrap_or(file).display().to_string()
}
