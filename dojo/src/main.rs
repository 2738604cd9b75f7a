mod output;
mod settings;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use clap::{Parser, Subcommand};
use dojo_core::{ContentStore, IncomingFile, NodeKind, StoreOptions};
use output::{
    DoneOutput, InitOutput, OutputWriter, PathOutput, ShowData, ShowOutput, StreamHeadOutput,
    TreeOutput, UploadOutput, UploadedFile,
};
use settings::Settings;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Dojo - A filesystem-backed store for training content
#[derive(Parser)]
#[command(name = "dojo")]
#[command(about = "Sections, exercises and their media stored as plain directories", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root directory (overrides DOJO_ROOT and the config file)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Settings file (defaults to ./dojo.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store root, seeding demo content into an empty one
    Init {
        /// Leave the store empty
        #[arg(long)]
        no_demo: bool,
    },

    /// Print the section/exercise tree
    Tree,

    /// Show a section or exercise
    Show {
        /// Logical path
        path: String,
    },

    /// Manage sections
    #[command(subcommand)]
    Section(SectionCommands),

    /// Manage exercises
    #[command(subcommand)]
    Exercise(ExerciseCommands),

    /// Manage exercise attachments
    #[command(subcommand)]
    File(FileCommands),
}

#[derive(Subcommand)]
enum SectionCommands {
    /// Create a section
    Add {
        /// Parent section (the store root if omitted)
        #[arg(long)]
        parent: Option<String>,

        /// Section title
        title: String,
    },

    /// Rename a section
    Rename {
        /// Logical path
        path: String,

        /// New title
        title: String,
    },

    /// Delete a section and everything below it
    Rm {
        /// Logical path
        path: String,
    },
}

#[derive(Subcommand)]
enum ExerciseCommands {
    /// Create an exercise in a section
    Add {
        /// Section logical path
        section: String,

        /// Exercise title
        title: String,
    },

    /// Rename an exercise
    Rename {
        /// Logical path
        path: String,

        /// New title
        title: String,
    },

    /// Delete an exercise
    Rm {
        /// Logical path
        path: String,
    },

    /// Replace the exercise text
    Text {
        /// Logical path
        path: String,

        /// New text
        text: String,
    },

    /// Replace the exercise notes
    Notes {
        /// Logical path
        path: String,

        /// New notes
        notes: String,
    },
}

#[derive(Subcommand)]
enum FileCommands {
    /// Copy local files into an exercise
    Upload {
        /// Exercise logical path
        exercise: String,

        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete an attachment
    Rm {
        /// Exercise logical path
        exercise: String,

        /// File name
        name: String,
    },

    /// Set an attachment's description
    Describe {
        /// Exercise logical path
        exercise: String,

        /// File name
        name: String,

        /// Description text
        description: String,
    },

    /// Write an attachment to stdout, headers to stderr
    Stream {
        /// Exercise logical path
        exercise: String,

        /// File name
        name: String,

        /// HTTP Range header value, e.g. "bytes=0-1023"
        #[arg(long)]
        range: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = OutputWriter::new(cli.json);

    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = output::result_code(&err);
            output.write_error(&err, code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    init_logging(&settings.log_level)?;

    // Determine store root: CLI arg > DOJO_ROOT / config file > ./dojo-data default
    let root = cli.root.unwrap_or_else(|| settings.root.clone());
    let options = StoreOptions::default().with_cache_ttl(TimeDelta::seconds(settings.cache_ttl_secs));
    debug!(root = %root.display(), ttl = settings.cache_ttl_secs, "resolved settings");

    if let Commands::Init { no_demo } = cli.command {
        return cmd_init(&root, options, no_demo, output);
    }

    let store = ContentStore::open(&root, options)
        .with_context(|| format!("Failed to open store at {}", root.display()))?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Tree => cmd_tree(&store, output),
        Commands::Show { path } => cmd_show(&store, &path, output),
        Commands::Section(section_cmd) => match section_cmd {
            SectionCommands::Add { parent, title } => {
                let path = store
                    .create_section(parent.as_deref(), &title)
                    .with_context(|| format!("Failed to create section: {}", title))?;
                write_path(output, path, "Created section")
            }
            SectionCommands::Rename { path, title } => {
                let new_path = store
                    .rename_section(&path, &title)
                    .with_context(|| format!("Failed to rename section: {}", path))?;
                write_path(output, new_path, "Renamed section to")
            }
            SectionCommands::Rm { path } => {
                store
                    .delete_section(&path)
                    .with_context(|| format!("Failed to delete section: {}", path))?;
                write_done(output, format!("Deleted section: {}\n", path))
            }
        },
        Commands::Exercise(exercise_cmd) => match exercise_cmd {
            ExerciseCommands::Add { section, title } => {
                let path = store
                    .create_exercise(&section, &title)
                    .with_context(|| format!("Failed to create exercise: {}", title))?;
                write_path(output, path, "Created exercise")
            }
            ExerciseCommands::Rename { path, title } => {
                let new_path = store
                    .rename_exercise(&path, &title)
                    .with_context(|| format!("Failed to rename exercise: {}", path))?;
                write_path(output, new_path, "Renamed exercise to")
            }
            ExerciseCommands::Rm { path } => {
                store
                    .delete_exercise(&path)
                    .with_context(|| format!("Failed to delete exercise: {}", path))?;
                write_done(output, format!("Deleted exercise: {}\n", path))
            }
            ExerciseCommands::Text { path, text } => {
                store
                    .update_text(&path, &text)
                    .with_context(|| format!("Failed to update text of {}", path))?;
                write_done(output, format!("Updated text of {}\n", path))
            }
            ExerciseCommands::Notes { path, notes } => {
                store
                    .update_notes(&path, &notes)
                    .with_context(|| format!("Failed to update notes of {}", path))?;
                write_done(output, format!("Updated notes of {}\n", path))
            }
        },
        Commands::File(file_cmd) => match file_cmd {
            FileCommands::Upload { exercise, files } => cmd_upload(&store, &exercise, files, output),
            FileCommands::Rm { exercise, name } => {
                store
                    .delete_file(&exercise, &name)
                    .with_context(|| format!("Failed to delete {} from {}", name, exercise))?;
                write_done(output, format!("Deleted {} from {}\n", name, exercise))
            }
            FileCommands::Describe {
                exercise,
                name,
                description,
            } => {
                store
                    .update_file_description(&exercise, &name, &description)
                    .with_context(|| format!("Failed to describe {} in {}", name, exercise))?;
                write_done(output, format!("Updated description of {}\n", name))
            }
            FileCommands::Stream {
                exercise,
                name,
                range,
            } => cmd_stream(&store, &exercise, &name, range.as_deref(), output),
        },
    }
}

/// Structured logs go to stderr so stdout stays clean for command output.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_writer(io::stderr),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

fn write_path(output: &OutputWriter, path: String, verb: &str) -> Result<()> {
    let data = PathOutput {
        success: true,
        result_code: 0,
        path,
    };
    output.write(&data, || format!("{}: {}\n", verb, data.path))
}

fn write_done(output: &OutputWriter, text: String) -> Result<()> {
    let data = DoneOutput {
        success: true,
        result_code: 0,
    };
    output.write(&data, || text)
}

fn cmd_init(root: &Path, options: StoreOptions, no_demo: bool, output: &OutputWriter) -> Result<()> {
    let store = ContentStore::init(root, options)
        .with_context(|| format!("Failed to initialize store at {}", root.display()))?;

    let seeded = if no_demo {
        false
    } else {
        store.seed_demo().context("Failed to seed demo content")?
    };

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: store.root().display().to_string(),
        seeded,
    };

    output.write(&data, || {
        let mut text = format!("Initialized dojo store at {}\n", data.root);
        if data.seeded {
            text.push_str("Seeded demo content\n");
        }
        text
    })
}

fn cmd_tree(store: &ContentStore, output: &OutputWriter) -> Result<()> {
    let nodes = store.build_tree().context("Failed to build tree")?;

    let data = TreeOutput {
        success: true,
        result_code: 0,
        nodes,
    };

    output.write(&data, || {
        if data.nodes.is_empty() {
            "Store is empty (use 'dojo section add' to create a section)\n".to_string()
        } else {
            output::format_tree(&data.nodes)
        }
    })
}

fn cmd_show(store: &ContentStore, path: &str, output: &OutputWriter) -> Result<()> {
    let kind = store
        .classify(path)
        .with_context(|| format!("Failed to look up {}", path))?;

    let data = match kind {
        NodeKind::Section => ShowData::Section {
            path: path.to_string(),
            section: store
                .get_section(path)
                .with_context(|| format!("Failed to read section {}", path))?,
        },
        NodeKind::Exercise => ShowData::Exercise(
            store
                .get_exercise(path)
                .with_context(|| format!("Failed to read exercise {}", path))?,
        ),
    };

    let data = ShowOutput {
        success: true,
        result_code: 0,
        data,
    };

    output.write(&data, || match &data.data {
        ShowData::Section { path, section } => format!(
            "Section: {}\nPath: {}\nCreated: {}\nUpdated: {}\n",
            section.title, path, section.created_at, section.updated_at
        ),
        ShowData::Exercise(view) => {
            let mut text = format!(
                "Exercise: {}\nPath: {}\nCreated: {}\nUpdated: {}\n",
                view.title, view.path, view.created_at, view.updated_at
            );
            text.push_str(&format!("\nText:\n{}\n", view.text));
            text.push_str(&format!("\nNotes:\n{}\n", view.notes));
            if view.files.is_empty() {
                text.push_str("\nNo files\n");
            } else {
                text.push_str("\nFiles:\n");
                for file in &view.files {
                    text.push_str(&format!(
                        "  {} ({} bytes, {})",
                        file.file_name, file.size, file.content_type
                    ));
                    if !file.description.is_empty() {
                        text.push_str(&format!(" - {}", file.description));
                    }
                    text.push('\n');
                }
            }
            text
        }
    })
}

fn cmd_upload(
    store: &ContentStore,
    exercise: &str,
    paths: Vec<PathBuf>,
    output: &OutputWriter,
) -> Result<()> {
    let mut incoming = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        incoming.push(IncomingFile::new(name, file));
    }

    let stored = store
        .upload_files(exercise, incoming)
        .with_context(|| format!("Failed to upload into {}", exercise))?;

    let data = UploadOutput {
        success: true,
        result_code: 0,
        exercise: exercise.to_string(),
        files: paths
            .iter()
            .zip(stored)
            .map(|(source, stored_as)| UploadedFile {
                source: source.display().to_string(),
                stored_as,
            })
            .collect(),
    };

    output.write(&data, || {
        data.files
            .iter()
            .map(|f| format!("{} -> {}/{}\n", f.source, data.exercise, f.stored_as))
            .collect()
    })
}

fn cmd_stream(
    store: &ContentStore,
    exercise: &str,
    name: &str,
    range: Option<&str>,
    output: &OutputWriter,
) -> Result<()> {
    let response = store
        .serve(exercise, name, range)
        .with_context(|| format!("Failed to open {} in {}", name, exercise))?;

    let head = StreamHeadOutput {
        success: true,
        result_code: 0,
        status: response.status,
        headers: response
            .headers
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
    };

    // Headers go to stderr; stdout carries the raw body
    let mut stderr = io::stderr().lock();
    if output.is_json() {
        writeln!(stderr, "{}", serde_json::to_string_pretty(&head)?)?;
    } else {
        writeln!(stderr, "HTTP {}", head.status)?;
        for (key, value) in &head.headers {
            writeln!(stderr, "{}: {}", key, value)?;
        }
    }
    drop(stderr);

    if let Some(mut body) = response.body {
        let mut stdout = io::stdout().lock();
        io::copy(&mut body, &mut stdout).context("Failed to write file body")?;
        stdout.flush()?;
    }

    Ok(())
}
