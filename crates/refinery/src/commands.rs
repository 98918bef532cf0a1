use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use refinery_analysis::{
    Analysis, GeneratedPrompts, IdeKind, ListField, Priority, PromptInput, RequirementForm,
};
use refinery_core::{Iteration, IterationEngine};
use refinery_diff::{AnalysisComparison, ChangeType, DiffKind};

use crate::app::App;
use crate::config::ProjectConfig;
use crate::serve::handle_serve_command;
use crate::validation::{validate_analysis_input, validate_improve_input};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a requirement and start a new iteration history
    Analyze {
        /// Requirement text (or use --file)
        requirement: Option<String>,

        /// Read the requirement from a file
        #[arg(short, long, conflicts_with = "requirement")]
        file: Option<PathBuf>,

        /// File with supporting context
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// JSON file with structured requirement details
        #[arg(long)]
        form: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Refine the current iteration into a new one
    Iterate {
        /// What to change in the next iteration
        #[arg(short, long)]
        feedback: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Make an earlier iteration current (1-based)
    Select { number: usize },

    /// Mark the current iteration as satisfactory
    Satisfy,

    /// Show an iteration's analysis
    Show {
        /// Iteration number (default: current)
        number: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace the current iteration's analysis with an edited JSON file
    Edit { file: PathBuf },

    /// Compare two iterations (1-based)
    Compare {
        from: usize,
        to: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the iteration history and counters
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show aggregate metrics over the history
    Metrics {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the full history as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate, inspect and refine coding-assistant prompts
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },

    /// Discard the iteration history and stored requirement
    Reset,

    /// Start the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PromptsAction {
    /// Generate one prompt per assistant from the current iteration
    Generate {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show stored prompts; edits take the place of generated ones
    Show {
        /// cursor, copilot, warp or windsurf (default: all)
        ide: Option<IdeKind>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace one assistant's prompt with the contents of a file
    Edit { ide: IdeKind, file: PathBuf },

    /// Rewrite one assistant's prompt following instructions
    Improve {
        ide: IdeKind,

        /// What to change about the prompt
        #[arg(short, long)]
        instructions: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(
    command: Command,
    app: &App,
    config: &ProjectConfig,
    working_dir: &Path,
) -> Result<()> {
    let engine = app.engine.as_ref();

    match command {
        Command::Analyze {
            requirement,
            file,
            context,
            form,
            json,
        } => {
            let requirement = match (requirement, file) {
                (Some(text), _) => text,
                (None, Some(path)) => read_file(working_dir, &path)?,
                (None, None) => anyhow::bail!("No requirement provided. Pass it as text or use --file"),
            };
            let context = context
                .map(|path| read_file(working_dir, &path))
                .transpose()?;
            let form: Option<RequirementForm> = form
                .map(|path| {
                    let content = read_file(working_dir, &path)?;
                    serde_json::from_str(&content)
                        .with_context(|| format!("Invalid form data in {}", path.display()))
                })
                .transpose()?;

            let problems = validate_analysis_input(&requirement, context.as_deref());
            if !problems.is_empty() {
                anyhow::bail!("Invalid request data:\n  {}", problems.join("\n  "));
            }
            if !engine.iterations().is_empty() {
                anyhow::bail!(
                    "An iteration history already exists. Run `refinery reset` to start over."
                );
            }

            let service = app.service()?;
            let analysis = service
                .analyze_requirement(&requirement, context.as_deref().unwrap_or(""), form.as_ref())
                .await
                .context("Failed to analyze requirement")?;

            if !engine.seed_with_requirement(requirement, form, context, analysis.clone()) {
                anyhow::bail!(
                    "An iteration history was created while analyzing. Run `refinery reset` to start over."
                );
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print_analysis(&analysis);
            }
        }
        Command::Iterate { feedback, json } => {
            let index = engine.try_create_iteration(feedback.as_deref()).await?;
            let iterations = engine.iterations();
            let iteration = &iterations[index];

            if json {
                println!("{}", serde_json::to_string_pretty(iteration)?);
            } else {
                print_iteration(iteration, true);
            }
        }
        Command::Select { number } => {
            let index = to_index(engine, number)?;
            if !engine.select_iteration(index) {
                println!("{}", format!("Already viewing iteration {}.", number).dimmed());
            }
        }
        Command::Satisfy => {
            if !engine.mark_satisfied() {
                anyhow::bail!("No current iteration. Run `refinery analyze` first.");
            }
        }
        Command::Show { number, json } => {
            let index = match number {
                Some(n) => to_index(engine, n)?,
                None => engine
                    .current_index()
                    .context("No iterations yet. Run `refinery analyze` first.")?,
            };
            let iterations = engine.iterations();
            let iteration = &iterations[index];

            if json {
                println!("{}", serde_json::to_string_pretty(iteration)?);
            } else {
                print_iteration(iteration, engine.current_index() == Some(index));
            }
        }
        Command::Edit { file } => {
            let content = read_file(working_dir, &file)?;
            let analysis: Analysis = serde_json::from_str(&content)
                .with_context(|| format!("Invalid analysis JSON in {}", file.display()))?;

            if !engine.save_current_iteration(analysis)? {
                anyhow::bail!("No current iteration. Run `refinery analyze` first.");
            }
        }
        Command::Compare { from, to, json } => {
            let comparison = engine
                .compare(to_index(engine, from)?, to_index(engine, to)?)
                .context("Iteration out of range")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
            } else {
                print_comparison(from, to, &comparison);
            }
        }
        Command::Stats { json } => {
            let stats = engine.get_iteration_stats();

            if json {
                let value = serde_json::json!({
                    "stats": stats,
                    "state": engine.state(),
                    "canIterate": engine.can_iterate(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else if stats.total == 0 {
                println!("{}", "No iterations yet.".dimmed());
            } else {
                print_history(engine);
                println!();
                println!(
                    "{} of {} | {} satisfied | {}",
                    format!("Viewing {}", stats.current).bold(),
                    stats.total,
                    stats.satisfied,
                    if engine.can_iterate() {
                        "can iterate".green()
                    } else {
                        "iteration blocked".yellow()
                    }
                );
            }
        }
        Command::Metrics { json } => {
            let metrics = engine.metrics();

            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                println!("{}", "Iteration Metrics".bold());
                println!("  Total iterations:     {}", metrics.total_iterations);
                println!("  Satisfied iterations: {}", metrics.satisfied_iterations);
                println!(
                    "  Avg items/iteration:  {:.1}",
                    metrics.average_items_per_iteration
                );
                println!("  Trend:                {}", metrics.trend);
            }
        }
        Command::Export { output } => {
            let json = engine.export().to_json_pretty()?;

            match output {
                Some(path) => {
                    let path = working_dir.join(path);
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Exported to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Command::Prompts { action } => {
            handle_prompts_command(action, app, working_dir).await?;
        }
        Command::Reset => {
            let removed = engine.reset();
            println!("Removed {} iteration(s).", removed);
        }
        Command::Serve { port } => {
            handle_serve_command(app, config, port.unwrap_or_else(|| config.port())).await?;
        }
    }

    Ok(())
}

async fn handle_prompts_command(
    action: PromptsAction,
    app: &App,
    working_dir: &Path,
) -> Result<()> {
    let engine = app.engine.as_ref();

    match action {
        PromptsAction::Generate { json } => {
            let session = engine.session();
            let analysis = engine
                .get_current_analysis()
                .context("No iterations yet. Run `refinery analyze` first.")?;

            let input = PromptInput::from_analysis(session.requirement, analysis)
                .with_form(session.form.as_ref());
            let prompts = app
                .prompt_service()?
                .generate_ide_prompts(&input)
                .await
                .context("Failed to generate prompts")?;
            engine.set_generated_prompts(prompts.clone());

            if json {
                println!("{}", serde_json::to_string_pretty(&prompts)?);
            } else {
                print_prompts(&prompts, &IdeKind::ALL);
            }
        }
        PromptsAction::Show { ide, json } => {
            let prompts = engine
                .prompts()
                .effective()
                .context("No prompts yet. Run `refinery prompts generate` first.")?;

            let selected = match ide {
                Some(kind) => vec![kind],
                None => IdeKind::ALL.to_vec(),
            };
            if json {
                let value: serde_json::Map<String, serde_json::Value> = selected
                    .iter()
                    .map(|&kind| (kind.to_string(), prompts.get(kind).into()))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_prompts(&prompts, &selected);
            }
        }
        PromptsAction::Edit { ide, file } => {
            let prompt = read_file(working_dir, &file)?;
            engine.set_edited_prompt(ide, prompt.trim());
        }
        PromptsAction::Improve {
            ide,
            instructions,
            json,
        } => {
            let original = engine.prompt_for(ide).with_context(|| {
                format!("No {} prompt yet. Run `refinery prompts generate` first.", ide)
            })?;
            let problems = validate_improve_input(&original, &instructions);
            if !problems.is_empty() {
                anyhow::bail!("Invalid request data:\n  {}", problems.join("\n  "));
            }

            let session = engine.session();
            let analysis = engine.get_current_analysis();
            let context = analysis
                .as_ref()
                .filter(|_| !session.requirement.is_empty())
                .map(|analysis| (session.requirement.as_str(), analysis));
            let improved = app
                .prompt_service()?
                .improve_prompt(&original, ide, &instructions, context)
                .await
                .context("Failed to improve prompt")?;
            engine.set_edited_prompt(ide, improved.clone());

            if json {
                let value = serde_json::json!({
                    "improvedPrompt": improved,
                    "originalPrompt": original,
                    "ideType": ide,
                    "improvementInstructions": instructions,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", improved);
            }
        }
    }

    Ok(())
}

fn print_prompts(prompts: &GeneratedPrompts, selected: &[IdeKind]) {
    for (i, &ide) in selected.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", ide.display_name().bold());
        println!("{}", prompts.get(ide));
    }
}

/// 1-based iteration number to history index
fn to_index(engine: &IterationEngine, number: usize) -> Result<usize> {
    let total = engine.iterations().len();
    if number == 0 || number > total {
        anyhow::bail!("No iteration {} (history has {})", number, total);
    }
    Ok(number - 1)
}

fn read_file(working_dir: &Path, path: &Path) -> Result<String> {
    let path = working_dir.join(path);
    std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_iteration(iteration: &Iteration, current: bool) {
    let mut header = format!("Iteration {}", iteration.iteration_number)
        .bold()
        .to_string();
    if current {
        header.push_str(&format!(" {}", "(current)".dimmed()));
    }
    if iteration.is_user_satisfied {
        header.push_str(&format!(" {}", "✓ satisfied".green()));
    }
    println!("{}", header);
    println!(
        "{}",
        iteration
            .timestamp
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string()
            .dimmed()
    );
    if let Some(ref feedback) = iteration.user_feedback {
        println!("{} {}", "Feedback:".dimmed(), feedback);
    }
    if iteration.has_edits() {
        println!("{}", "Includes manual edits".dimmed());
    }
    println!();
    print_analysis(&iteration.analysis);
}

fn print_analysis(analysis: &Analysis) {
    for field in ListField::ALL {
        let items = analysis.list(field);
        if items.is_empty() {
            continue;
        }
        println!("{}", field.label().bold());
        for item in items {
            println!("  • {}", item);
        }
        println!();
    }

    if !analysis.questions.is_empty() {
        println!("{}", "Questions".bold());
        for q in &analysis.questions {
            let priority = match q.priority {
                Priority::Critical => q.priority.to_string().red(),
                Priority::Important => q.priority.to_string().yellow(),
                Priority::NiceToHave => q.priority.to_string().dimmed(),
            };
            println!("  [{}] {}", priority, q.text);
            if let Some(ref answer) = q.answer {
                println!("      {} {}", "→".dimmed(), answer);
            }
        }
        println!();
    }

    if !analysis.assumptions.is_empty() {
        println!("{}", "Assumptions".bold());
        for a in &analysis.assumptions {
            let mark = if a.accepted { "✓".green() } else { "✗".red() };
            println!("  {} {} {}", mark, a.text, format!("({:.0}%)", a.confidence * 100.0).dimmed());
        }
        println!();
    }

    println!("{}", analysis.summary().dimmed());
}

fn print_history(engine: &IterationEngine) {
    let current = engine.current_index();
    println!(
        "{:<4} {:<20} {:<6} {:<10} {}",
        "#".dimmed(),
        "TIMESTAMP".dimmed(),
        "ITEMS".dimmed(),
        "STATUS".dimmed(),
        "FEEDBACK".dimmed()
    );
    for (index, iteration) in engine.iterations().iter().enumerate() {
        let marker = if current == Some(index) { "▸" } else { " " };
        let status = if iteration.is_user_satisfied {
            "satisfied".green()
        } else {
            "draft".normal()
        };
        let feedback = iteration
            .user_feedback
            .as_deref()
            .map(|f| truncate(f, 50))
            .unwrap_or_default();
        println!(
            "{}{:<3} {:<20} {:<6} {:<10} {}",
            marker,
            iteration.iteration_number,
            iteration.timestamp.format("%Y-%m-%d %H:%M"),
            iteration.analysis.item_count(),
            status,
            feedback
        );
    }
}

fn print_comparison(from: usize, to: usize, comparison: &AnalysisComparison) {
    println!("{}", format!("Iteration {} → {}", from, to).bold());
    if !comparison.has_changes() {
        println!("{}", "No changes.".dimmed());
        return;
    }

    for diff in &comparison.fields {
        if diff.change_type == ChangeType::Unchanged {
            continue;
        }
        println!();
        println!(
            "{} {}",
            diff.field.label().bold(),
            format!("(+{} -{})", diff.added(), diff.removed()).dimmed()
        );
        for item in &diff.items {
            match item.kind {
                DiffKind::Added => println!("  {}", format!("+ {}", item.text).green()),
                DiffKind::Removed => println!("  {}", format!("- {}", item.text).red()),
                DiffKind::Unchanged => println!("    {}", item.text.dimmed()),
            }
        }
    }

    println!();
    println!(
        "Questions: +{} -{} ({} total)",
        comparison.questions.added, comparison.questions.removed, comparison.questions.total
    );
    println!(
        "Assumptions: +{} -{} ({} total)",
        comparison.assumptions.added,
        comparison.assumptions.removed,
        comparison.assumptions.total
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}
