//! The command line interface for the program.
use crate::config::{AnalysisConfig, Strictness};
use crate::instance::{InstanceDescriptor, InstanceFiles};
use crate::log;
use crate::model::SolutionModel;
use crate::output::metadata::write_metadata;
use crate::output::{DataWriter, create_output_directory, get_output_dir};
use crate::settings::Settings;
use crate::validation::{RequiredSchema, ValidationReport, validate_instance};
use crate::view::ViewRegistry;
use ::log::{info, warn};
use anyhow::{Context, Result, ensure};
use clap::{Args, CommandFactory, Parser, Subcommand};
use itertools::Itertools;
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the program.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the analyse command
#[derive(Args)]
pub struct AnalyseOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Check that an instance has the files and columns needed for analysis.
    Validate {
        /// The path to the instance directory.
        instance_dir: PathBuf,
        /// A TOML file listing the required files and columns
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Analyse the solution of an instance and write the results to CSV files.
    Analyse {
        /// The path to the instance directory.
        instance_dir: PathBuf,
        /// Other analyse options
        #[command(flatten)]
        opts: AnalyseOpts,
    },
    /// Print the chart data of a view as JSON.
    View {
        /// The path to the instance directory.
        #[arg(required_unless_present = "list")]
        instance_dir: Option<PathBuf>,
        /// The name of the view
        #[arg(required_unless_present = "list")]
        view_name: Option<String>,
        /// List the available views instead
        #[arg(long)]
        list: bool,
    },
    /// Manage program settings.
    Settings {
        /// The available subcommands for managing settings.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Validate {
                instance_dir,
                schema,
            } => handle_validate_command(&instance_dir, schema.as_deref(), None),
            Self::Analyse { instance_dir, opts } => {
                handle_analyse_command(&instance_dir, &opts, None)
            }
            Self::View {
                instance_dir,
                view_name,
                list,
            } => match (instance_dir, view_name) {
                (Some(instance_dir), Some(view_name)) if !list => {
                    handle_view_command(&instance_dir, &view_name, None)
                }
                _ => {
                    handle_list_views_command();
                    Ok(())
                }
            },
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and run the requested command
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ optiport --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        // Output program help
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Initialise the program logger, unless this has already been done
fn init_logging(log_level: &str, log_file_path: Option<&Path>) -> Result<()> {
    if log::is_logger_initialised() {
        return Ok(());
    }

    log::init(Some(log_level), log_file_path).context("Failed to initialise logging.")
}

/// Load the analysis configuration for an instance, applying program settings
fn load_config(instance_dir: &Path, settings: &Settings) -> Result<AnalysisConfig> {
    let mut config =
        AnalysisConfig::from_path(instance_dir).context("Failed to load analysis config.")?;
    if settings.strict {
        config.strictness = Strictness::Strict;
    }

    Ok(config)
}

/// Log the contents of a validation report
fn log_report(report: &ValidationReport) {
    for kind in &report.missing_files {
        warn!("Missing required file: {kind}");
    }
    for (kind, columns) in &report.missing_columns {
        warn!("{kind} is missing columns: {}", columns.iter().join(", "));
    }
    for (kind, reason) in &report.unreadable {
        warn!("Could not parse {kind}: {reason}");
    }
    if report.has_solution {
        info!("Solution file found");
    } else {
        info!("No solution file found");
    }
}

/// Handle the `validate` command.
pub fn handle_validate_command(
    instance_path: &Path,
    schema_path: Option<&Path>,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;

    // Initialise program logger (we won't save log files when running the validate command)
    init_logging(&settings.log_level, None)?;

    let schema = match schema_path {
        Some(path) => RequiredSchema::from_path(path).context("Failed to load schema.")?,
        None => RequiredSchema::default(),
    };
    let files = InstanceFiles::resolve(instance_path).context("Failed to find instance.")?;
    let descriptor = InstanceDescriptor::load(&files).context("Failed to load instance.")?;

    let report = validate_instance(&descriptor, &schema);
    log_report(&report);
    ensure!(report.is_valid(), "Instance validation failed.");
    info!("Instance validation successful!");

    Ok(())
}

/// Handle the `analyse` command.
pub fn handle_analyse_command(
    instance_path: &Path,
    opts: &AnalyseOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(instance_path)?;
        &pathbuf
    };

    let overwrite = create_output_directory(output_path, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    init_logging(&settings.log_level, Some(output_path))?;

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    let config = load_config(instance_path, &settings)?;
    let files = InstanceFiles::resolve(instance_path).context("Failed to find instance.")?;
    let descriptor = InstanceDescriptor::load(&files).context("Failed to load instance.")?;
    info!("Loaded instance from {}", instance_path.display());
    info!("Output folder: {}", output_path.display());

    let report = validate_instance(&descriptor, &RequiredSchema::default());
    if !report.is_valid() {
        log_report(&report);
        warn!("Instance is incomplete; continuing with the data available");
    }
    if descriptor.solution_path.is_none() {
        warn!("No solution found for instance {}", descriptor.name);
    }

    let model = SolutionModel::from_solution_file(&descriptor, &config)
        .context("Failed to read solution.")?;
    DataWriter::create(output_path)?
        .write_all(&model, &config.categories)
        .context("Failed to write output files.")?;
    write_metadata(output_path, &descriptor).context("Failed to write metadata.")?;
    info!("Analysis complete!");

    Ok(())
}

/// Handle the `view` command.
pub fn handle_view_command(
    instance_path: &Path,
    view_name: &str,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;

    // Chart data goes to stdout, so only show warnings and errors
    init_logging(::log::Level::Warn.as_str(), None)?;

    let config = load_config(instance_path, &settings)?;
    let files = InstanceFiles::resolve(instance_path).context("Failed to find instance.")?;
    let descriptor = InstanceDescriptor::load(&files).context("Failed to load instance.")?;
    let model = SolutionModel::from_solution_file(&descriptor, &config)
        .context("Failed to read solution.")?;
    let chart = ViewRegistry::default().produce(view_name, &model, &config)?;
    println!("{}", chart.to_json()?);

    Ok(())
}

/// Handle the `view --list` command.
pub fn handle_list_views_command() {
    for view in ViewRegistry::default().iter() {
        println!("{}: {}", view.name(), view.title());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_view_list() {
        let cli = Cli::try_parse_from(["optiport", "view", "--list"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::View { list: true, .. })));
    }

    #[test]
    fn test_parse_view_requires_name() {
        assert!(Cli::try_parse_from(["optiport", "view", "some_dir"]).is_err());
    }

    #[test]
    fn test_parse_analyse() {
        let cli =
            Cli::try_parse_from(["optiport", "analyse", "inst", "-o", "out", "--overwrite"])
                .unwrap();
        let Some(Commands::Analyse { instance_dir, opts }) = cli.command else {
            panic!("Expected analyse command");
        };
        assert_eq!(instance_dir, Path::new("inst"));
        assert_eq!(opts.output_dir.as_deref(), Some(Path::new("out")));
        assert!(opts.overwrite);
    }
}
