use card_gen::batch::{self, BatchError, BatchOptions, RunMode};
use card_gen::config::{self, GeneratorConfig};
use card_gen::output;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Inputs shared by `generate` and `check`.
#[derive(clap::Args, Clone)]
struct BatchArgs {
    /// JSON template with {{placeholders}}
    #[arg(long)]
    template: PathBuf,

    /// Defaults merged under every config (JSON, YAML or TOML)
    #[arg(long)]
    defaults: Option<PathBuf>,

    /// Directory of per-record configs
    #[arg(long)]
    configs_dir: PathBuf,

    /// Write one <id>.json per record into this directory
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Write all records as one JSON array to this file
    #[arg(long = "out")]
    out_file: Option<PathBuf>,

    /// Variable holding the record identifier (dotted paths allowed)
    #[arg(long)]
    id_key: Option<String>,

    /// Variables every record must define
    #[arg(long, num_args = 1..)]
    require_keys: Vec<String>,

    /// Fail on placeholders with no value instead of leaving them as-is
    #[arg(long)]
    strict: bool,

    /// Picture directory [default: <configs-dir>/../pictures]
    #[arg(long)]
    pictures_dir: Option<PathBuf>,

    /// Generator settings file [default: ./card-gen.toml if present]
    #[arg(long = "config")]
    settings: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "card-gen")]
#[command(about = "Batch JSON card generator")]
#[command(long_about = "\
Batch JSON card generator

Renders one JSON card per config file from a shared template. Config values
are merged over the defaults, each card gets its picture embedded as a data
URI, and crop/caption choices are kept stable in a sidecar next to the picture.

Project structure:

  project/
  ├── card-gen.toml            # Generator settings (optional)
  ├── template.json            # {\"name\": \"{{name}}\", \"images\": [{\"src\": \"\"}]}
  ├── defaults.yml             # Values shared by every record
  ├── defaults.png             # Default picture (named after the defaults file)
  ├── defaults.png.crop.json   # Its sidecar, shared by records without a picture
  ├── configs/
  │   ├── 001.yml              # One record per file, processed in name order
  │   └── 002.json
  └── pictures/
      ├── bulbasaur.jpg        # Picture for the record with id 'bulbasaur'
      └── bulbasaur.jpg.crop.json

Exit codes:
  1  usage, configuration or output error
  2  template error (rendered record is not valid JSON)
  3  no picture for a record
  4  missing, empty or duplicate identifier

Run 'card-gen gen-config' to generate a documented card-gen.toml.")]
#[command(version)]
struct Cli {
    /// Log debug details to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render every config into JSON cards
    Generate(BatchArgs),
    /// Validate every config without writing anything
    Check(BatchArgs),
    /// Print a stock card-gen.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage errors share exit code 1 with configuration errors.
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Generate(args) => run_batch(args, RunMode::Generate),
        Command::Check(args) => run_batch(args, RunMode::Check),
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_batch(args: BatchArgs, mode: RunMode) -> Result<(), BatchError> {
    let mut settings = config::load_settings(args.settings.as_deref())?;
    apply_overrides(&mut settings, &args);
    settings.validate()?;

    let options = BatchOptions {
        template: args.template,
        defaults: args.defaults,
        configs_dir: args.configs_dir,
        out_dir: args.out_dir,
        out_file: args.out_file,
        settings,
        mode,
    };
    let report = batch::run(&options)?;

    let base = std::env::current_dir().unwrap_or_default();
    match mode {
        RunMode::Generate => output::print_generate_output(&report, &base),
        RunMode::Check => output::print_check_output(&report, &base),
    }
    Ok(())
}

/// CLI flags win over the settings file.
fn apply_overrides(settings: &mut GeneratorConfig, args: &BatchArgs) {
    if let Some(id_key) = &args.id_key {
        settings.id_key = id_key.clone();
    }
    if !args.require_keys.is_empty() {
        settings.require_keys = args.require_keys.clone();
    }
    if args.strict {
        settings.strict = true;
    }
    if let Some(dir) = &args.pictures_dir {
        settings.pictures_dir = Some(dir.clone());
    }
}
