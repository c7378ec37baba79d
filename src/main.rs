use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use csmap_core::{CsmapError, RepomapConfig};
use csmap_repomap::output::{format_metadata, Metadata, ReportContext};
use csmap_repomap::Reports;

const REPOMAP_DIR: &str = ".repomap";
const CONFIG_FILE: &str = "config.toml";
const UPDATE_LOG: &str = "update.log";
const UPDATE_LOG_KEEP: usize = 50;
const STATUS_LOG_LINES: usize = 5;
const STATUS_TOP_MODULES: usize = 5;

#[derive(Parser)]
#[command(
    name = "csmap",
    version,
    about = "Ranked, token-budgeted maps of C# projects",
    long_about = "csmap parses a C# code base, ranks its types with PageRank over the\n\
                   inheritance graph, and writes three Markdown maps of increasing detail\n\
                   sized for LLM context windows, plus a JSON metadata record.\n\n\
                   Examples:\n  \
                     csmap init                      Create .repomap/config.toml\n  \
                     csmap generate                  Write the maps to .repomap/output\n  \
                     csmap generate --path Scripts   Map a different source directory\n  \
                     csmap status                    Show the last generation"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Project root holding the .repomap directory (default: current directory)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Path to configuration file (default: <root>/.repomap/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Create .repomap/ with a default configuration
    #[command(long_about = "Create .repomap/ with a default configuration.\n\n\
        Writes .repomap/config.toml (project name taken from the directory) and a\n\
        .repomap/.gitignore that keeps generated output out of version control.\n\
        Fails if .repomap already exists unless --force is given.")]
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Generate the repo map
    #[command(long_about = "Generate the repo map.\n\n\
        Walks the source root, extracts type declarations and public members,\n\
        ranks types with PageRank, and writes the L1/L2/L3 Markdown tiers and\n\
        repomap-meta.json to the configured output directory.\n\n\
        Examples:\n  csmap generate\n  csmap generate --path Assets/Scripts")]
    Generate {
        /// Source directory, overriding [source] root_path
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the last generation and recent update log entries
    Status,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");
    if use_color {
        println!("\x1b[1mcsmap\x1b[0m v{version}: ranked maps of C# projects\n");
        println!("Quick start:");
        println!("  \x1b[36mcsmap init\x1b[0m        Create .repomap/config.toml");
        println!("  \x1b[36mcsmap generate\x1b[0m    Write the L1/L2/L3 maps");
        println!("  \x1b[36mcsmap status\x1b[0m      Show the last generation\n");
    } else {
        println!("csmap v{version}: ranked maps of C# projects\n");
        println!("Quick start:");
        println!("  csmap init        Create .repomap/config.toml");
        println!("  csmap generate    Write the L1/L2/L3 maps");
        println!("  csmap status      Show the last generation\n");
    }
    println!("Run 'csmap <command> --help' for details.");
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Full HEAD commit id and branch name, or empty strings outside a repository.
fn git_metadata(root: &Path) -> (String, String) {
    match read_head(root) {
        Ok(head) => head,
        Err(e) => {
            tracing::debug!("no git metadata: {e}");
            (String::new(), String::new())
        }
    }
}

fn read_head(root: &Path) -> std::result::Result<(String, String), CsmapError> {
    let git = |e: git2::Error| CsmapError::Git(e.message().to_string());
    let repo = git2::Repository::discover(root).map_err(git)?;
    let head = repo.head().map_err(git)?;
    let commit = head.peel_to_commit().map_err(git)?.id().to_string();
    let branch = head.shorthand().unwrap_or_default().to_string();
    Ok((commit, branch))
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| cli.root.join(REPOMAP_DIR).join(CONFIG_FILE))
}

fn run_init(root: &Path, force: bool) -> Result<()> {
    let dir = root.join(REPOMAP_DIR);
    if dir.exists() && !force {
        miette::bail!(
            help = "pass --force to overwrite the configuration",
            "{} already exists",
            dir.display()
        );
    }
    std::fs::create_dir_all(&dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("creating {}", dir.display()))?;

    let project_name = root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| RepomapConfig::default().project_name);
    let config = RepomapConfig {
        project_name,
        ..RepomapConfig::default()
    };

    std::fs::write(dir.join(CONFIG_FILE), config.to_toml()?).into_diagnostic()?;
    std::fs::write(dir.join(".gitignore"), "output/\n").into_diagnostic()?;
    println!(
        "Created {} for project {:?}",
        dir.join(CONFIG_FILE).display(),
        config.project_name
    );
    Ok(())
}

fn run_generate(root: &Path, config_path: &Path, source_override: Option<PathBuf>) -> Result<()> {
    if !config_path.exists() {
        miette::bail!(
            help = "run `csmap init` to create one",
            "no configuration at {}",
            config_path.display()
        );
    }
    let mut config = RepomapConfig::from_file(config_path)?;
    config.validate()?;
    if let Some(path) = source_override {
        config.source.root_path = path;
    }

    let source_root = root.join(&config.source.root_path);
    let (commit, branch) = git_metadata(root);
    let now = Local::now();
    let ctx = ReportContext {
        project_name: config.project_name.clone(),
        commit,
        branch,
        generated_on: now.format("%Y-%m-%d").to_string(),
        generated_at: now.to_rfc3339(),
        source_path: config.source.root_path.display().to_string(),
    };
    tracing::debug!(source = %source_root.display(), commit = ctx.short_commit(), "generating");

    let spinner = if std::io::stderr().is_terminal() {
        let pb = indicatif::ProgressBar::new_spinner();
        if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
            pb.set_style(style);
        }
        pb.set_message("Mapping source tree...");
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let started = Instant::now();
    let reports = csmap_repomap::generate_map(&source_root, &config, &ctx).inspect_err(|_e| {
        if let Some(pb) = &spinner {
            pb.finish_with_message("Failed");
        }
    })?;
    let elapsed = started.elapsed().as_secs_f64();
    if let Some(pb) = spinner {
        pb.finish_with_message("Done");
    }

    let output_dir = root.join(&config.output.directory);
    write_reports(&output_dir, &config, &reports)?;

    let entry = format_log_entry(&now, &ctx, reports.scanned_files, elapsed);
    append_update_log(&root.join(REPOMAP_DIR).join(UPDATE_LOG), &entry)?;

    println!(
        "Mapped {} files ({} types, {} references) in {elapsed:.1}s",
        reports.scanned_files, reports.meta.stats.class_count, reports.meta.stats.reference_count
    );
    for report in reports.tiers() {
        println!("  {}: {} tokens", report.tier.label(), report.tokens);
    }
    println!("Output: {}", output_dir.display());
    Ok(())
}

fn write_reports(output_dir: &Path, config: &RepomapConfig, reports: &Reports) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("creating {}", output_dir.display()))?;

    let files = &config.output.files;
    let names = [&files.skeleton, &files.signatures, &files.relations];
    for (report, name) in reports.tiers().into_iter().zip(names) {
        let path = output_dir.join(name);
        std::fs::write(&path, &report.text)
            .into_diagnostic()
            .wrap_err_with(|| format!("writing {}", path.display()))?;
    }
    std::fs::write(output_dir.join(&files.meta), format_metadata(&reports.meta)?)
        .into_diagnostic()?;
    Ok(())
}

/// `[timestamp] branch | commit | N files | T.Ts`
fn format_log_entry(now: &DateTime<Local>, ctx: &ReportContext, files: usize, secs: f64) -> String {
    let branch = if ctx.branch.is_empty() {
        "unknown"
    } else {
        ctx.branch.as_str()
    };
    format!(
        "[{}] {branch:20} | {} | {files} files | {secs:.1}s",
        now.format("%Y-%m-%d %H:%M:%S"),
        ctx.short_commit()
    )
}

/// Append `entry`, keeping only the newest entries.
fn append_update_log(path: &Path, entry: &str) -> Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).into_diagnostic(),
    };
    let mut lines: Vec<&str> = existing.lines().filter(|l| !l.trim().is_empty()).collect();
    lines.push(entry);
    let start = lines.len().saturating_sub(UPDATE_LOG_KEEP);

    let mut content = lines[start..].join("\n");
    content.push('\n');
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).into_diagnostic()?;
    }
    std::fs::write(path, content).into_diagnostic()
}

fn run_status(root: &Path, config_path: &Path) -> Result<()> {
    let dir = root.join(REPOMAP_DIR);
    if !dir.exists() {
        println!("Not initialized. Run `csmap init` to get started.");
        return Ok(());
    }

    let config = if config_path.exists() {
        RepomapConfig::from_file(config_path)?
    } else {
        RepomapConfig::default()
    };
    let meta_path = root
        .join(&config.output.directory)
        .join(&config.output.files.meta);
    if !meta_path.exists() {
        println!("No map generated yet. Run `csmap generate`.");
        return Ok(());
    }

    let content = std::fs::read_to_string(&meta_path).into_diagnostic()?;
    let meta: Metadata = serde_json::from_str(&content)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", meta_path.display()))?;

    let or_unknown = |s: &str| if s.is_empty() { "unknown".to_string() } else { s.to_string() };
    let commit: String = meta.git_commit.chars().take(8).collect();
    println!("Project:        {}", meta.project_name);
    println!("Last generated: {}", meta.generated_at);
    println!("Commit:         {}", or_unknown(&commit));
    println!("Branch:         {}", or_unknown(&meta.git_branch));
    println!(
        "Stats:          {} files, {} types, {} methods, {} references, {} modules",
        meta.stats.file_count,
        meta.stats.class_count,
        meta.stats.method_count,
        meta.stats.reference_count,
        meta.stats.module_count
    );
    println!(
        "Ranking:        {} ({} nodes, {} edges)",
        meta.ranker_stats.strategy, meta.ranker_stats.nodes, meta.ranker_stats.edges
    );

    if !meta.top_modules.is_empty() {
        println!("\nTop modules:");
        for module in meta.top_modules.iter().take(STATUS_TOP_MODULES) {
            println!("  {:<20} {} classes", module.name, module.classes);
        }
    }

    if let Ok(log) = std::fs::read_to_string(dir.join(UPDATE_LOG)) {
        let lines: Vec<&str> = log.lines().collect();
        let start = lines.len().saturating_sub(STATUS_LOG_LINES);
        println!("\nRecent updates:");
        for line in &lines[start..] {
            println!("  {line}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };
    let config_path = config_path(&cli);

    match cli.command {
        None => print_welcome(use_color),
        Some(Command::Init { force }) => run_init(&cli.root, force)?,
        Some(Command::Generate { path }) => run_generate(&cli.root, &config_path, path)?,
        Some(Command::Status) => run_status(&cli.root, &config_path)?,
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "csmap", &mut std::io::stdout());
        }
    }

    Ok(())
}
