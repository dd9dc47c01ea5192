use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use surgical_edit::approval::{
    ApprovalDecision, ApprovalError, ApprovalGate, ApprovalRequest, AutoApprove,
};
use surgical_edit::config::{self, ApplyOptions, LogFormat, Settings};
use surgical_edit::transaction::{self, ChangeKind, CommitOutcome, PlannedChange};
use surgical_edit::{
    index, telemetry, validate, Diagnostic, Language, MutationEngine, OperationRequest, Pipeline,
    SourceUnit, WorkspaceGuard,
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "surgical-edit")]
#[command(about = "Structure-aware source edits with atomic multi-file commits", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (defaults to ./surgical-edit.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format: compact or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List functions, methods, classes and imports
    Index {
        /// File or directory to index
        path: PathBuf,

        /// Language override (otherwise detected from the extension)
        #[arg(short, long)]
        language: Option<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Apply one structural edit to a file
    Edit {
        file: PathBuf,

        /// add_function, remove_function, modify_function, add_import or remove_import
        operation: String,

        /// Target function (e.g. `Class.method`) for remove/modify
        #[arg(long)]
        name: Option<String>,

        /// Function source for add/modify
        #[arg(long, conflicts_with = "code_file")]
        code: Option<String>,

        /// Read the function source from a file
        #[arg(long)]
        code_file: Option<PathBuf>,

        /// Import statement for add_import
        #[arg(long)]
        statement: Option<String>,

        /// Module for remove_import
        #[arg(long)]
        module: Option<String>,

        /// Add the function as a method of this class
        #[arg(long)]
        class: Option<String>,

        #[arg(short, long)]
        language: Option<String>,

        /// Validate and show the result without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Approve without prompting
        #[arg(short, long)]
        yes: bool,

        /// Print the pipeline report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply an edit plan as one transaction
    Apply {
        /// Edit plan TOML
        #[arg(short, long)]
        plan: PathBuf,

        /// Workspace root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[arg(short = 'n', long)]
        dry_run: bool,

        #[arg(short, long)]
        diff: bool,

        #[arg(short, long)]
        yes: bool,
    },

    /// Check that a file parses
    Validate {
        file: PathBuf,

        #[arg(short, long)]
        language: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = env::current_dir().context("cannot determine current directory")?;
    let mut settings = config::load_settings(cli.config.as_deref(), &cwd)?;
    if let Some(format) = cli.log_format {
        settings.logging.format = format;
    }
    telemetry::initialise(&settings.logging)?;

    match cli.command {
        Commands::Index {
            path,
            language,
            json,
        } => cmd_index(&path, language.as_deref(), json),

        Commands::Edit {
            file,
            operation,
            name,
            code,
            code_file,
            statement,
            module,
            class,
            language,
            dry_run,
            diff,
            yes,
            json,
        } => {
            let code = match code_file {
                Some(path) => Some(
                    fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                ),
                None => code,
            };
            let request = OperationRequest {
                path: file,
                language,
                operation_kind: operation,
                target_name: name.or(module),
                payload: code.or(statement),
                class,
            };
            let flags = Flags {
                dry_run,
                diff,
                yes: yes || settings.approval.auto_approve,
            };
            cmd_edit(&request, &settings, &flags, json)
        }

        Commands::Apply {
            plan,
            workspace,
            dry_run,
            diff,
            yes,
        } => {
            let flags = Flags {
                dry_run,
                diff,
                yes: yes || settings.approval.auto_approve,
            };
            cmd_apply(&plan, workspace.unwrap_or(cwd), &settings, &flags)
        }

        Commands::Validate { file, language } => cmd_validate(&file, language.as_deref()),
    }
}

struct Flags {
    dry_run: bool,
    diff: bool,
    yes: bool,
}

fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (edited)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn display_change(change: &PlannedChange) {
    display_diff(&change.path, &change.before_text(), &change.after_text());
}

fn report_diagnostic(diagnostic: &Diagnostic) {
    eprintln!(
        "{} {}: {}",
        "✗".red(),
        diagnostic.code.to_string().red().bold(),
        diagnostic.message
    );
    if let Some(context) = &diagnostic.context {
        for line in context.lines() {
            eprintln!("    {}", line.dimmed());
        }
    }
    if let Some(nearest) = &diagnostic.nearest_match {
        eprintln!("  Nearest match: {}", nearest.yellow());
    }
    eprintln!("  {}", diagnostic.suggestion);
}

/// Prompts on stderr and reads the answer from stdin.
struct PromptGate {
    show_diff: bool,
}

impl ApprovalGate for PromptGate {
    fn request_approval(
        &mut self,
        request: &ApprovalRequest,
    ) -> Result<ApprovalDecision, ApprovalError> {
        if self.show_diff {
            display_diff(&request.path, &request.before, &request.after);
        }
        eprint!(
            "\nApply to {} ({}, {})? [y/N] ",
            request.path.display(),
            format!("+{}", request.stats.lines_added).green(),
            format!("-{}", request.stats.lines_removed).red()
        );
        io::stderr()
            .flush()
            .map_err(|err| ApprovalError::Gate(err.to_string()))?;

        let mut answer = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|err| ApprovalError::Gate(err.to_string()))?;
        if read == 0 {
            return Err(ApprovalError::Cancelled);
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(ApprovalDecision::approve()),
            _ => Ok(ApprovalDecision::reject()),
        }
    }
}

fn gate(flags: &Flags) -> Box<dyn ApprovalGate> {
    if flags.yes {
        Box::new(AutoApprove)
    } else {
        // The prompt shows the diff itself.
        Box::new(PromptGate { show_diff: true })
    }
}

fn cmd_index(path: &Path, language: Option<&str>, json: bool) -> Result<()> {
    let files: Vec<PathBuf> = if path.is_dir() {
        WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                entry.depth() == 0 || !(name.starts_with('.') || name == "target" || name == "node_modules")
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|file| language.is_some() || Language::from_path(file).is_some())
            .collect()
    } else {
        vec![path.to_path_buf()]
    };

    let mut listing = serde_json::Map::new();
    let mut failed = 0;
    for file in files {
        let text = fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let unit = match language {
            Some(language) => SourceUnit::new(text, language).at_path(&file),
            None => SourceUnit::for_path(&file, text),
        };

        let structure = match index(&unit) {
            Ok(structure) => structure,
            Err(err) => {
                report_diagnostic(&err.to_diagnostic());
                failed += 1;
                continue;
            }
        };

        if json {
            listing.insert(
                file.display().to_string(),
                serde_json::to_value(structure.entities.as_slice())?,
            );
            continue;
        }

        println!("{}", file.display().to_string().bold());
        for entity in structure.iter() {
            println!(
                "  {:>5}-{:<5} {:<15} {}",
                entity.line_start,
                entity.line_end,
                entity.kind.as_str().cyan(),
                entity.qualified_name()
            );
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    }
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_edit(request: &OperationRequest, settings: &Settings, flags: &Flags, json: bool) -> Result<()> {
    let cwd = env::current_dir()?;
    let pipeline = Pipeline::on_disk()
        .with_engine(MutationEngine::new(settings.layout_options()))
        .with_guard(WorkspaceGuard::new(&cwd)?)
        .dry_run(flags.dry_run);

    let mut gate = gate(flags);
    let report = pipeline.run(request, gate.as_mut());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if let Some(change) = &report.change {
            if flags.dry_run || (flags.diff && flags.yes) {
                display_change(change);
            }
        }
        match &report.diagnostic {
            Some(diagnostic) => report_diagnostic(diagnostic),
            None => println!(
                "{} {}: {}",
                if report.succeeded() { "✓".green() } else { "⊘".yellow() },
                request.path.display(),
                report
                    .state()
                    .map_or_else(|| "no change".to_string(), |state| state.to_string())
            ),
        }
    }

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_apply(plan_path: &Path, workspace: PathBuf, settings: &Settings, flags: &Flags) -> Result<()> {
    let plan = config::load_plan(plan_path)?;
    let plan_dir = plan_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    println!("Workspace: {}", workspace.display());
    if let Some(description) = &plan.meta.description {
        println!("Plan: {}", description);
    }
    if flags.dry_run {
        println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
    }
    println!();

    let options = ApplyOptions {
        engine: MutationEngine::new(settings.layout_options()),
        dry_run: flags.dry_run,
    };
    let mut gate = gate(flags);
    let outcome = config::apply_plan(&plan, &workspace, &plan_dir, &options, gate.as_mut());

    match outcome {
        Ok(CommitOutcome::Committed(report)) => {
            for change in &report.changes {
                let verb = match (change.kind(), report.applied) {
                    (ChangeKind::Create, true) => "Created",
                    (ChangeKind::Modify, true) => "Modified",
                    (ChangeKind::Delete, true) => "Deleted",
                    (ChangeKind::Unchanged, _) => "Unchanged",
                    (_, false) => "Would change",
                };
                println!("{} {}: {}", "✓".green(), verb, change.path.display());
                if flags.dry_run || (flags.diff && flags.yes) {
                    display_change(change);
                }
            }
            println!();
            println!("{}", "Summary:".bold());
            println!(
                "  {} file(s) {}",
                format!("{}", report.changes.len()).green(),
                if report.applied { "committed" } else { "checked" }
            );
            let counts = transaction::summarize(&report.changes);
            for (kind, label) in [
                (ChangeKind::Create, "created"),
                (ChangeKind::Modify, "modified"),
                (ChangeKind::Delete, "deleted"),
                (ChangeKind::Unchanged, "unchanged"),
            ] {
                if let Some(count) = counts.get(&kind) {
                    println!("  {count} {label}");
                }
            }
            Ok(())
        }
        Ok(CommitOutcome::Rejected { path }) => {
            eprintln!(
                "{} Rejected change to {}; nothing was written",
                "⊘".yellow(),
                path.display()
            );
            std::process::exit(1);
        }
        Err(err) => {
            report_diagnostic(&err.to_diagnostic());
            eprintln!("  {}", "All files were left as they were.".dimmed());
            std::process::exit(1);
        }
    }
}

fn cmd_validate(file: &Path, language: Option<&str>) -> Result<()> {
    let text =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let unit = match language {
        Some(language) => SourceUnit::new(text, language).at_path(file),
        None => SourceUnit::for_path(file, text),
    };

    match validate::validate_unit(&unit) {
        Ok(()) => {
            println!("{} {}: valid", "✓".green(), file.display());
            Ok(())
        }
        Err(diagnostic) => {
            report_diagnostic(&diagnostic);
            std::process::exit(1);
        }
    }
}
