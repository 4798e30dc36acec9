//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Effective limits used for the current run (for JSON details).
pub static LAST_LIMITS: OnceLock<CliLimits> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct CliLimits {
    pub lost_timeout_ms: u64,
    pub max_ticks: Option<u64>,
    pub max_search_failures: u32,
}

#[derive(Parser, Debug)]
#[command(name = "racer", version, about = "Line racer CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/racer.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); config [logging] is
    /// used when absent
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow the guide line until stopped or out of ticks
    Run {
        /// Stop after this many control ticks (0 = unbounded)
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
        /// Consecutive exhausted pan sweeps tolerated before giving up
        /// (overrides config; 0 = unlimited)
        #[arg(long, value_name = "N")]
        max_search_failures: Option<u32>,
        /// Which center-line detection steers: 0 = first reported,
        /// 1 = second when present (overrides config)
        #[arg(long, value_name = "N")]
        lookahead: Option<usize>,
        /// Run the full control loop with the wheels held stopped
        #[arg(long, action = ArgAction::SetTrue)]
        no_move: bool,
        /// Enable speech notifications for this run
        #[arg(long, action = ArgAction::SetTrue)]
        chatty: bool,
        /// Probe sensor brightness before the run
        #[arg(long, action = ArgAction::SetTrue)]
        bright: bool,
        /// Perform the finale routine after a kill-switch stop
        #[arg(long, action = ArgAction::SetTrue)]
        finale: bool,
        /// Print run statistics on completion
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
        /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority, pins to one CPU, and locks memory to reduce page faults and tick jitter. May require elevated privileges or raised ulimits (e.g. memlock). Use with care on shared systems."
        )]
        rt: bool,
        /// Real-time priority for SCHED_FIFO (1..=max)
        #[arg(
            long,
            value_name = "PRIO",
            long_help = "SCHED_FIFO priority when --rt is enabled (Linux only). Higher values run before lower ones; the platform range is usually 1..=99. Very high priorities can impact system stability."
        )]
        rt_prio: Option<i32>,
        /// Select memory locking mode for --rt: none, current, or all
        #[arg(
            long,
            value_enum,
            value_name = "MODE",
            long_help = "Memory locking mode when --rt is enabled.\n- none: do not lock memory.\n- current: lock currently resident pages.\n- all: lock current and future pages.\nDefault: current on Linux, none elsewhere."
        )]
        rt_lock: Option<RtLock>,
        /// CPU index to pin the process to (Linux only; defaults to 0)
        #[arg(
            long,
            value_name = "CPU",
            long_help = "CPU index to pin the process to when --rt is enabled (Linux only). Must be allowed by the current affinity mask; otherwise affinity is left unchanged and a warning is logged."
        )]
        rt_cpu: Option<usize>,
    },
    /// Quick health check (collaborators assemble, one frame flows)
    SelfCheck,
}
