//! CLI argument definitions and shared statics.

use brew_core::{Phase, Position, StateType};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "brewctl", version, about = "Brewing process controller")]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Normal,
    Request,
    Cancel,
    Intern,
}

impl From<KindArg> for StateType {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Normal => Self::Normal,
            KindArg::Request => Self::Request,
            KindArg::Cancel => Self::Cancel,
            KindArg::Intern => Self::Intern,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PhaseArg {
    NotStarted,
    Mashing,
    Lautering,
    HopCooking,
    Whirlpool,
    Finished,
}

impl From<PhaseArg> for Phase {
    fn from(p: PhaseArg) -> Self {
        match p {
            PhaseArg::NotStarted => Self::NotStarted,
            PhaseArg::Mashing => Self::Mashing,
            PhaseArg::Lautering => Self::Lautering,
            PhaseArg::HopCooking => Self::HopCooking,
            PhaseArg::Whirlpool => Self::Whirlpool,
            PhaseArg::Finished => Self::Finished,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PositionArg {
    Start,
    Ongoing,
    End,
    Iodine,
    Adding,
}

impl From<PositionArg> for Position {
    fn from(p: PositionArg) -> Self {
        match p {
            PositionArg::Start => Self::Start,
            PositionArg::Ongoing => Self::Ongoing,
            PositionArg::End => Self::End,
            PositionArg::Iodine => Self::Iodine,
            PositionArg::Adding => Self::Adding,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a recipe file without brewing
    Validate {
        #[arg(long, value_name = "FILE")]
        recipe: PathBuf,
    },
    /// Explain a three-digit state code
    Decode { code: u16 },
    /// Compute the state code of a type/phase/position triple
    Encode {
        #[arg(value_enum)]
        kind: KindArg,
        #[arg(value_enum)]
        phase: PhaseArg,
        #[arg(value_enum)]
        position: PositionArg,
    },
    /// Run a recipe; confirmations come from stdin unless --auto-confirm is set
    Brew {
        #[arg(long, value_name = "FILE")]
        recipe: PathBuf,
        /// Confirm every request immediately (iodine tests pass)
        #[arg(long, action = ArgAction::SetTrue)]
        auto_confirm: bool,
        /// Divide recipe times and controller periods by this factor
        #[arg(long, value_name = "FACTOR", default_value_t = 1.0)]
        time_scale: f64,
        /// Directory receiving the finished audit log as JSON
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,
    },
}
