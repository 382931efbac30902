//! `trackable-cli` – command line front end for the trackable fetchers
//!
//! ```text
//! trackable analog  <device> <host> <port>   one-shot [x y z]
//! trackable tracker <device> <host> <port>   one-shot [x y z qi qj qk qr]
//! trackable sim <device> [port]              serve a moving device until Ctrl-C
//! trackable                                  interactive shell
//! ```
//!
//! One-shot commands print the sample and exit `0`, or print
//! `identifier: message` to stderr and exit `1`.

mod commands;
mod config;
mod output;
mod repl;
mod telemetry;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use trackable_types::DEFAULT_VRPN_PORT;

use crate::config::Config;
use crate::output::{DeviceKind, render_error};

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); TRACKABLE_LOG_FORMAT=json switches
    // to JSON lines; OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    let _telemetry = telemetry::init_tracing("trackable");

    let args: Vec<String> = std::env::args().skip(1).collect();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let cfg = match config::load_or_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            eprintln!("  Using default configuration.");
            Config::default()
        }
    };

    match args.first().map(String::as_str) {
        None => interactive(shutdown),
        Some("analog") => one_shot(DeviceKind::Analog, &args[1..], &cfg),
        Some("tracker") => one_shot(DeviceKind::Tracker, &args[1..], &cfg),
        Some("sim") => run_sim(&args[1..], shutdown),
        Some("help" | "-h" | "--help") => {
            print_usage();
            ExitCode::SUCCESS
        }
        Some(other) => {
            eprintln!("{} '{}'", "Unknown command:".red(), other.yellow());
            print_usage();
            ExitCode::from(2)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Modes
// ─────────────────────────────────────────────────────────────────────────────

fn one_shot(kind: DeviceKind, args: &[String], cfg: &Config) -> ExitCode {
    match commands::fetch(kind, args, cfg) {
        Ok(sample) => {
            println!("{}", sample.render(cfg.output));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", render_error(&e, cfg.output));
            ExitCode::FAILURE
        }
    }
}

fn run_sim(args: &[String], shutdown: Arc<AtomicBool>) -> ExitCode {
    let (device, port) = match args {
        [device] => (device, Ok(DEFAULT_VRPN_PORT)),
        [device, port] => (device, port.parse::<u16>()),
        _ => {
            print_usage();
            return ExitCode::from(2);
        }
    };
    let Ok(port) = port else {
        eprintln!("{} '{}' is not a valid port number", "Error:".red(), args[1]);
        return ExitCode::from(2);
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let served = runtime.block_on(async {
        let sim = commands::start_sim(device, port).await?;
        println!(
            "  {} simulating {} on port {}.  Press Ctrl-C to stop.",
            "✓".green().bold(),
            device.bold(),
            sim.local_addr().port().to_string().yellow()
        );
        commands::animate(&sim, shutdown).await;
        Ok::<(), trackable_types::TrackableError>(())
    });

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", render_error(&e, config::OutputFormat::Text));
            ExitCode::FAILURE
        }
    }
}

fn interactive(shutdown: Arc<AtomicBool>) -> ExitCode {
    print_banner();

    match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(_)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }

    // Simulators started from the shell run here; fetches build their own.
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
    repl::run(shutdown, &runtime);
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      Trackable First-Run Wizard      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Where is your VRPN server?\n");

    let mut cfg = Config::default();

    cfg.default_host = prompt_line(
        &format!("  Default host [{}]: ", cfg.default_host),
        &cfg.default_host,
    );

    let port_str = prompt_line(
        &format!("  Default port [{}]: ", cfg.default_port),
        &cfg.default_port.to_string(),
    );
    if let Ok(p) = port_str.trim().parse::<u16>() {
        cfg.default_port = p;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  __                  __          __   __   "#.bold().cyan());
    println!("{}", r#" / /________ _ _____/ /__ ___ _ / /  / /__ "#.bold().cyan());
    println!("{}", r#"/ __/ __/ _ `// __/  '_// _ `// _ \/ / -_)"#.bold().cyan());
    println!("{}", r#"\__/_/  \_,_/ \__/_/\_\ \_,_//_.__/_/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Trackable".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  VRPN analog and tracker sampler");
    println!();
}

fn print_usage() {
    println!("{}", "Usage".bold().underline());
    println!("  trackable analog  <device> <host> <port>");
    println!("  trackable tracker <device> <host> <port>");
    println!("  trackable sim <device> [port]");
    println!("  trackable            (interactive shell)");
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
