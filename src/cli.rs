use crate::config::{CliOverrides, Config};
use crate::error::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "anypack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pack heterogeneous media content into deduplicated ZIP archives and back")]
#[command(
    long_about = "AnyPack collects images, videos, audio, text, and raw files into a single \
                       deflate-compressed ZIP archive with collision-free member names and \
                       content deduplication, and extracts such archives back into typed content."
)]
#[command(after_help = "EXAMPLES:\n  \
    anypack pack ./renders --prefix batch\n  \
    anypack pack a.png b.png --names '{\"images\": [\"hero.png\", \"alt.png\"]}'\n  \
    anypack pack ./run --session nightly --output-dir /srv/archives\n  \
    anypack unpack output/batch_00001_.zip\n  \
    anypack generate-config")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pack files and directories into an archive
    Pack {
        /// Files or directories to pack
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Naming manifest as JSON, keyed by category or extension
        #[arg(
            long,
            help = "Member names as JSON, e.g. '{\"images\": [\"a.png\"]}' or '{\"png\": [\"a.png\"]}'"
        )]
        names: Option<String>,

        /// Prefix for the archive filename and synthesized member names
        #[arg(short, long)]
        prefix: Option<String>,

        /// Directory to write the archive into
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Base directory for relative file references
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Session label; repeated invocations with the same label append
        /// to the same archive
        #[arg(short, long)]
        session: Option<String>,

        /// Provenance text embedded into PNG members and video sidecars
        #[arg(long)]
        provenance: Option<String>,

        /// Disable provenance embedding
        #[arg(long)]
        no_metadata: bool,

        /// Seconds of inactivity before a session resets
        #[arg(long)]
        idle_timeout: Option<i64>,
    },

    /// Extract an archive back into typed content
    Unpack {
        /// Archive path (relative paths resolve against the input directory)
        archive: PathBuf,

        /// List members and the recovered manifest without extracting content
        #[arg(short, long)]
        list: bool,

        /// Directory to write extracted members into
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Generate a sample configuration file
    GenerateConfig {
        /// Where to write the sample configuration
        #[arg(default_value = "anypack.toml")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        match &self.command {
            Commands::Pack {
                prefix,
                output_dir,
                input_dir,
                no_metadata,
                idle_timeout,
                ..
            } => CliOverrides::new()
                .with_prefix(prefix.clone())
                .with_output_dir(output_dir.clone())
                .with_input_dir(input_dir.clone())
                .with_embed_metadata(if *no_metadata { Some(false) } else { None })
                .with_idle_timeout_secs(*idle_timeout),
            Commands::Unpack { .. } | Commands::GenerateConfig { .. } => CliOverrides::new(),
        }
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
