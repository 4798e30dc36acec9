mod cli;
mod error_fmt;
mod rt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);

    if let Err(e) = color_eyre::install() {
        eprintln!("Warning: error report hooks not installed: {e}");
    }

    let cfg = match load_config(&args.config) {
        Ok(c) => c,
        Err(err) => fail(&err),
    };
    init_logging(&args, &cfg.logging);

    let result = match args.cmd {
        Commands::Run {
            max_ticks,
            max_search_failures,
            lookahead,
            no_move,
            chatty,
            bright,
            finale,
            stats,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => {
            let flags = run::RunFlags {
                max_ticks,
                max_search_failures,
                lookahead,
                no_move,
                chatty,
                bright,
                finale,
                stats,
                rt,
                rt_prio,
                rt_lock,
                rt_cpu,
            };
            run_cmd(&cfg, &flags, args.json)
        }
        Commands::SelfCheck => self_check(&cfg),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => fail(&err),
    }
}

/// Print the error on stdout, where summaries also go, and exit.
fn fail(err: &eyre::Report) -> ! {
    if JSON_MODE.get().copied().unwrap_or(false) {
        println!("{}", error_fmt::format_error_json(err));
    } else {
        println!("{}", error_fmt::humanize(err));
    }
    std::process::exit(error_fmt::exit_code_for_error(err));
}

/// Missing file falls back to defaults with a warning; a present file
/// must parse and validate.
fn load_config(path: &Path) -> eyre::Result<racer_config::Config> {
    if !path.exists() {
        eprintln!(
            "Warning: config file {} not found; using defaults",
            path.display()
        );
        return Ok(racer_config::Config::default());
    }
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config file {}", path.display()))?;
    let cfg = racer_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parsing config file {}: {e}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn init_logging(args: &Cli, log_cfg: &racer_config::Logging) {
    let level = args
        .log_level
        .clone()
        .or_else(|| log_cfg.level.clone())
        .unwrap_or_else(|| "info".to_string());
    // RUST_LOG wins when set, like any other tracing binary.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if args.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let file = log_cfg.file.as_deref().map(|path| {
        let p = Path::new(path);
        let dir = p
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = p
            .file_name()
            .map_or_else(|| std::ffi::OsString::from("racer.log"), |n| n.to_os_string());
        let appender = match log_cfg.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt::layer().json().with_writer(writer).boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}

fn run_cmd(cfg: &racer_config::Config, flags: &run::RunFlags, json: bool) -> eyre::Result<i32> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .wrap_err("installing Ctrl-C handler")?;
    }

    #[cfg(feature = "hardware")]
    let summary = {
        let (vision, drive) = open_hardware(cfg)?;
        let switch = racer_hardware::pixy::UartKillSwitch::open(
            &cfg.hardware.kill_device,
            cfg.hardware.kill_baud,
        )
        .wrap_err("opening kill switch uart")?;
        run::run_race(cfg, flags, (vision, drive), Some(switch), &shutdown)?
    };

    #[cfg(not(feature = "hardware"))]
    let summary = run::run_race(
        cfg,
        flags,
        (run::sim_vision(), racer_hardware::SimulatedDrive::new()),
        Some(run::sim_kill_switch()),
        &shutdown,
    )?;

    if json {
        println!("{}", summary_json(&summary));
    } else {
        println!("Run finished: {}", summary.outcome.halt);
    }
    Ok(error_fmt::exit_code_for_halt(summary.outcome.halt))
}

#[cfg(feature = "hardware")]
fn open_hardware(
    cfg: &racer_config::Config,
) -> eyre::Result<(racer_hardware::pixy::UartVision, racer_hardware::PwmDrive)> {
    use racer_hardware::WheelPins;

    let vision = racer_hardware::pixy::UartVision::open(
        &cfg.hardware.vision_device,
        cfg.hardware.vision_baud,
    )
    .wrap_err("opening vision uart")?;
    let drive = racer_hardware::PwmDrive::open(
        WheelPins {
            phase: cfg.hardware.left_dir_pin,
            pwm: cfg.hardware.left_pwm_pin,
        },
        WheelPins {
            phase: cfg.hardware.right_dir_pin,
            pwm: cfg.hardware.right_pwm_pin,
        },
        i16::try_from(cfg.drive.max_speed).unwrap_or(i16::MAX),
    )
    .wrap_err("opening motor board")?;
    Ok((vision, drive))
}

fn summary_json(summary: &run::RaceSummary) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    let s = &summary.outcome.stats;
    serde_json::json!({
        "timestamp": timestamp,
        "halt": run::halt_reason_name(summary.outcome.halt),
        "ticks": s.ticks,
        "frames_seen": s.frames_seen,
        "recoveries": s.recoveries,
        "sweep_failures": s.sweep_failures,
        "duration_ms": summary.duration_ms,
        "error": serde_json::Value::Null,
    })
    .to_string()
}

/// Assemble every collaborator and push one frame through the stack.
fn self_check(cfg: &racer_config::Config) -> eyre::Result<i32> {
    use racer_traits::{Drive, Vision};

    #[cfg(feature = "hardware")]
    let (mut vision, mut drive) = open_hardware(cfg)?;
    #[cfg(not(feature = "hardware"))]
    let (mut vision, mut drive) = (
        racer_hardware::SimulatedVision::new(),
        racer_hardware::SimulatedDrive::new(),
    );

    let fresh = vision
        .wait_frame(Duration::from_millis(cfg.hardware.frame_timeout_ms))
        .map_err(|e| eyre::eyre!("vision check failed: {e}"))?;
    let seen = vision
        .detections(cfg.camera.max_detections)
        .map_err(|e| eyre::eyre!("vision check failed: {e}"))?
        .len();
    drive
        .set_speeds(0, 0)
        .map_err(|e| eyre::eyre!("drive check failed: {e}"))?;

    println!("self-check ok (fresh frame: {fresh}, {seen} detections)");
    Ok(0)
}
