use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use remind::config::Settings;
use remind::markdown::{MarkdownDocument, Todo, TodoEdit, TriggerLine};
use remind::plain::PlainReminderFormat;
use remind::reminder::{Reminder, ReminderEdit, ReminderFormat};
use remind::time::DateTime;

#[derive(Debug, Parser)]
#[command(
    name = "remind",
    about = "Inspect and edit todos and (@...) reminders in Markdown notes",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    /// JSON settings file (trigger marker and reminder format parameters).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List todos and reminders found in Markdown files.
    Scan(ScanArgs),

    /// Check (or uncheck) the todo or reminder on a row.
    Check(CheckArgs),

    /// Move the reminder on a row to a new date/time.
    Reschedule(RescheduleArgs),

    /// Print the line a new reminder would be inserted as.
    Append(AppendArgs),

    /// Re-serialize Markdown files through the document model.
    Format(FormatArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Markdown files or directories containing Markdown files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Emit JSON instead of a human-readable list.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    file: PathBuf,
    /// Zero-based row number.
    #[arg(long)]
    row: usize,
    /// Uncheck instead of check.
    #[arg(long)]
    undo: bool,
    /// Overwrite the file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct RescheduleArgs {
    file: PathBuf,
    /// Zero-based row number.
    #[arg(long)]
    row: usize,
    /// New time, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM`.
    #[arg(long)]
    time: DateTime,
    /// Overwrite the file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct AppendArgs {
    /// Defaults to the current minute.
    #[arg(long)]
    time: Option<DateTime>,
    /// Caret offset reported for the inserted line.
    #[arg(long)]
    at: Option<usize>,
    /// Text of the line the reminder is appended to.
    #[arg(long, default_value = "")]
    line: String,
}

#[derive(Debug, Args)]
struct FormatArgs {
    /// Markdown files or directories to format.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Overwrite the file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    match cli.command {
        Commands::Scan(args) => handle_scan(args, &settings),
        Commands::Check(args) => handle_check(args, &settings),
        Commands::Reschedule(args) => handle_reschedule(args, &settings),
        Commands::Append(args) => handle_append(args, &settings),
        Commands::Format(args) => handle_format(args, &settings),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn load_document(path: &Path, settings: &Settings) -> Result<MarkdownDocument> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    Ok(MarkdownDocument::new(
        path.display().to_string(),
        &text,
        settings.trigger.clone(),
    ))
}

fn emit_document(path: &Path, doc: &mut MarkdownDocument, in_place: bool) -> Result<()> {
    let text = doc.to_markdown();
    if in_place {
        fs::write(path, text.as_bytes()).with_context(|| format!("writing {:?}", path))?;
        log::info!("updated {:?}", path);
    } else {
        print!("{text}");
        if !text.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn find_reminder(
    format: &PlainReminderFormat,
    doc: &MarkdownDocument,
    row: usize,
) -> Option<Reminder> {
    format.parse(doc).into_iter().find(|r| r.row_number == row)
}

fn handle_scan(args: ScanArgs, settings: &Settings) -> Result<()> {
    let ScanArgs { inputs, json } = args;
    let expanded = expand_inputs(&inputs)?;
    if expanded.is_empty() {
        anyhow::bail!("no Markdown files found in the provided inputs");
    }

    let format = PlainReminderFormat::new(settings.format.clone());
    let mut scanned = Vec::new();
    for path in expanded {
        log::debug!("scanning {:?}", path);
        let doc = load_document(&path, settings)?;
        let reminders = format.parse(&doc);
        scanned.push((path, doc, reminders));
    }

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            path: String,
            todos: &'a [Todo],
            trigger_lines: &'a [TriggerLine],
            reminders: &'a [Reminder],
        }

        let payload: Vec<JsonOutput<'_>> = scanned
            .iter()
            .map(|(path, doc, reminders)| JsonOutput {
                path: path.display().to_string(),
                todos: doc.todos(),
                trigger_lines: doc.trigger_lines(),
                reminders,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for (path, doc, reminders) in &scanned {
        if doc.todos().is_empty() && reminders.is_empty() {
            continue;
        }
        println!("== {} ==", path.display());
        for todo in doc.todos() {
            println!("{:>5} [{}] {}", todo.line_index, todo.check, todo.body);
        }
        for reminder in reminders {
            println!(
                "{:>5} @{} {}",
                reminder.row_number, reminder.time, reminder.title
            );
        }
    }
    Ok(())
}

fn handle_check(args: CheckArgs, settings: &Settings) -> Result<()> {
    let CheckArgs {
        file,
        row,
        undo,
        in_place,
    } = args;
    let mut doc = load_document(&file, settings)?;
    let checked = !undo;

    if doc.get_todo(row).is_some() {
        doc.modify_todo(
            row,
            &TodoEdit {
                checked: Some(checked),
                body: None,
            },
        );
    } else {
        let format = PlainReminderFormat::new(settings.format.clone());
        let reminder = find_reminder(&format, &doc, row)
            .with_context(|| format!("row {row} of {:?} holds no todo or reminder", file))?;
        let edit = ReminderEdit {
            checked: Some(checked),
            ..Default::default()
        };
        if !format.modify(&mut doc, &reminder, &edit) {
            anyhow::bail!("could not update reminder on row {row} of {:?}", file);
        }
    }

    emit_document(&file, &mut doc, in_place)
}

fn handle_reschedule(args: RescheduleArgs, settings: &Settings) -> Result<()> {
    let RescheduleArgs {
        file,
        row,
        time,
        in_place,
    } = args;
    let mut doc = load_document(&file, settings)?;
    let format = PlainReminderFormat::new(settings.format.clone());
    let reminder = find_reminder(&format, &doc, row)
        .with_context(|| format!("row {row} of {:?} holds no reminder", file))?;
    log::debug!("rescheduling {:?} from {} to {}", reminder.title, reminder.time, time);

    let edit = ReminderEdit {
        time: Some(time),
        ..Default::default()
    };
    if !format.modify(&mut doc, &reminder, &edit) {
        anyhow::bail!("could not reschedule reminder on row {row} of {:?}", file);
    }
    emit_document(&file, &mut doc, in_place)
}

fn handle_append(args: AppendArgs, settings: &Settings) -> Result<()> {
    let AppendArgs { time, at, line } = args;
    let time = time.unwrap_or_else(|| DateTime::from_naive(Local::now().naive_local()));
    let format = PlainReminderFormat::new(settings.format.clone());
    let insertion = format
        .append_reminder(&line, &time, at)
        .context("reminder format cannot append reminders")?;
    println!("{}", insertion.inserted_line);
    log::debug!("caret position {}", insertion.caret_position);
    Ok(())
}

fn handle_format(args: FormatArgs, settings: &Settings) -> Result<()> {
    let FormatArgs { inputs, in_place } = args;
    let expanded = expand_inputs(&inputs)?;
    if expanded.is_empty() {
        anyhow::bail!("no Markdown files found in the provided inputs");
    }

    for (idx, path) in expanded.iter().enumerate() {
        log::debug!("formatting {:?}", path);
        let mut doc = load_document(path, settings)?;
        if !in_place && expanded.len() > 1 {
            if idx > 0 {
                println!();
            }
            println!("== {} ==", path.display());
        }
        emit_document(path, &mut doc, in_place)?;
    }
    Ok(())
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == "md" || ext == "markdown")
        .unwrap_or(false)
}

fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = BTreeSet::new();
    for path in paths {
        let canonical =
            fs::canonicalize(path).with_context(|| format!("resolving path {:?}", path))?;
        let meta = fs::metadata(&canonical)
            .with_context(|| format!("reading metadata for {:?}", canonical))?;
        if meta.is_dir() {
            log::debug!("scanning directory {:?}", canonical);
            for file in collect_markdown_files(&canonical)? {
                if visited.insert(file.clone()) {
                    out.push(file);
                }
            }
        } else if meta.is_file() {
            if !is_markdown(&canonical) {
                anyhow::bail!("{:?} is not a Markdown file", canonical);
            }
            if visited.insert(canonical.clone()) {
                out.push(canonical);
            }
        }
    }
    Ok(out)
}

fn collect_markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    visit_dir(dir, &mut out, &mut visited)?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn visit_dir(path: &Path, out: &mut Vec<PathBuf>, visited: &mut HashSet<PathBuf>) -> Result<()> {
    let canonical = fs::canonicalize(path)?;
    if !visited.insert(canonical.clone()) {
        return Ok(());
    }

    let metadata = fs::metadata(&canonical)?;
    if metadata.is_dir() {
        for entry in fs::read_dir(&canonical)? {
            let entry = entry?;
            if entry.file_type()?.is_symlink() {
                continue;
            }
            visit_dir(&entry.path(), out, visited)?;
        }
    } else if metadata.is_file() && is_markdown(&canonical) {
        out.push(canonical);
    }
    Ok(())
}
