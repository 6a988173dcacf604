use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gridplan", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    /// Configuration file (TOML); built-in defaults otherwise
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Worker threads for parallel power flows ("auto" = all cores)
    #[arg(long, default_value = "auto", global = true)]
    pub threads: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a power flow analysis
    Analyze {
        #[command(flatten)]
        input: GridInput,
        /// mv, mvlv, lv_<id> or full
        #[arg(long, default_value = "full")]
        mode: String,
        /// Retry non-converging time steps with stepwise increased load
        #[arg(long)]
        troubleshooting: bool,
        /// Directory for the result tables
        #[arg(short, long, value_hint = ValueHint::DirPath)]
        out: Option<PathBuf>,
    },
    /// Reinforce the grid until all overloads and voltage issues are solved
    Reinforce {
        #[command(flatten)]
        input: GridInput,
        /// mv, mvlv or lv; whole grid if not given
        #[arg(long)]
        mode: Option<String>,
        #[arg(long, value_enum, default_value_t = TimestepArg::All)]
        timesteps: TimestepArg,
        /// Iterations allowed per issue type
        #[arg(long, default_value_t = 20)]
        max_iterations: usize,
        /// Check MV and LV voltages against one combined band
        #[arg(long)]
        combined_analysis: bool,
        /// Record remaining issues instead of failing
        #[arg(long)]
        skip_unresolved: bool,
        /// Save the reinforced grid and results to this directory
        #[arg(short, long, value_hint = ValueHint::DirPath)]
        out: Option<PathBuf>,
    },
    /// Check the integrity of a grid and its time series
    Check {
        #[command(flatten)]
        input: GridInput,
    },
    /// Graph utilities
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },
    /// Electromobility
    Emob {
        #[command(subcommand)]
        command: EmobCommands,
    },
    /// Time series utilities
    Ts {
        #[command(subcommand)]
        command: TsCommands,
    },
    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

/// Grid directory with optional time series.
#[derive(clap::Args, Debug, Clone)]
pub struct GridInput {
    /// Directory with the grid's CSV tables
    #[arg(value_hint = ValueHint::DirPath)]
    pub grid: PathBuf,
    /// Directory with time series written by gridplan; worst cases otherwise
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub timeseries: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// Print graph statistics
    Stats {
        #[arg(value_hint = ValueHint::DirPath)]
        grid: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum EmobCommands {
    /// Allocate mobility simulation output to charging parks and connect them
    Integrate {
        #[command(flatten)]
        input: GridInput,
        /// Directory with the SimBEV charging processes
        #[arg(long, value_hint = ValueHint::DirPath)]
        simbev: PathBuf,
        /// Directory with the TracBEV potential charging parks
        #[arg(long, value_hint = ValueHint::DirPath)]
        tracbev: PathBuf,
        /// user_friendly or grid_friendly
        #[arg(long, default_value = "user_friendly")]
        mode: String,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// dumb, reduced or residual
        #[arg(long, default_value = "dumb")]
        strategy: String,
        /// Study output directory
        #[arg(short, long, value_hint = ValueHint::DirPath)]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum TsCommands {
    /// Resample time series to a new frequency
    Resample {
        /// Directory with time series written by gridplan
        #[arg(value_hint = ValueHint::DirPath)]
        input: PathBuf,
        /// Target frequency, e.g. 15min or 1h
        #[arg(long)]
        freq: String,
        /// ffill or interpolate (up-sampling only)
        #[arg(long, default_value = "ffill")]
        method: String,
        #[arg(short, long, value_hint = ValueHint::DirPath)]
        out: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestepArg {
    All,
    Snapshot,
    Reduced,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
