//! REPL – the interactive `trackable` shell.
//!
//! Supported slash-commands:
//!   /help                              – show this list
//!   /analog  <device> [host] [port]    – fetch `[x, y, z]`
//!            <device@host[:port]>
//!   /tracker <device> [host] [port]    – fetch position + quaternion
//!   /sim [<device> [port] | stop <port>] – list, start or stop simulators
//!   /settings                          – edit `~/.trackable/config.toml`
//!   /quit | /exit                      – leave the shell

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use trackable_types::{ConnectionDescriptor, DEFAULT_VRPN_PORT, TrackableError};

use crate::commands;
use crate::config::{self, Config, OutputFormat};
use crate::output::{DeviceKind, render_error};

/// A simulator started from the shell.
struct RunningSim {
    device: String,
    port: u16,
    task: JoinHandle<()>,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
/// Simulators started here live on `runtime` and stop when the shell exits.
pub fn run(shutdown: Arc<AtomicBool>, runtime: &Runtime) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut sims: Vec<RunningSim> = Vec::new();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "trackable>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            continue;
        };
        let args: Vec<String> = words.map(str::to_string).collect();

        match cmd {
            "/help" => cmd_help(),
            "/analog" => cmd_fetch(DeviceKind::Analog, &args),
            "/tracker" => cmd_fetch(DeviceKind::Tracker, &args),
            "/sim" => cmd_sim(&args, runtime, &shutdown, &mut sims),
            "/settings" => cmd_settings(),
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }

    for sim in sims {
        sim.task.abort();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Trackable Commands".bold().underline());
    println!("  {} <device> [host] [port]  – fetch [x y z]", "/analog".bold().cyan());
    println!("  {} <device> [host] [port] – fetch [x y z qi qj qk qr]", "/tracker".bold().cyan());
    println!("  {} [<device> [port]]          – list or start simulators", "/sim".bold().cyan());
    println!("  {} stop <port>                – stop a simulator", "/sim".bold().cyan());
    println!("  {}                       – edit ~/.trackable/config.toml", "/settings".bold().cyan());
    println!("  {}                   – exit the shell", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_fetch(kind: DeviceKind, args: &[String]) {
    let cfg = load_config_or_default();
    let argv = match complete_address(args, &cfg) {
        Ok(Some(argv)) => argv,
        Ok(None) => {
            println!("  Usage: /{} <device> [host] [port]", kind);
            return;
        }
        Err(e) => {
            println!("  {}", render_error(&e, cfg.output).red());
            return;
        }
    };
    match commands::fetch(kind, &argv, &cfg) {
        Ok(sample) => {
            println!("  {} {}", "✓".green().bold(), sample.address.bold());
            for line in sample.render(cfg.output).lines() {
                println!("  {line}");
            }
        }
        Err(e) => println!("  {}", render_error(&e, cfg.output).red()),
    }
}

fn cmd_sim(args: &[String], runtime: &Runtime, shutdown: &Arc<AtomicBool>, sims: &mut Vec<RunningSim>) {
    sims.retain(|s| !s.task.is_finished());

    match args {
        [] => {
            if sims.is_empty() {
                println!("  No simulators running.");
            }
            for sim in sims.iter() {
                println!("  {} {} on port {}", "🟢".green(), sim.device.bold(), sim.port.to_string().yellow());
            }
        }
        [stop, port] if stop == "stop" => match port.parse::<u16>() {
            Ok(port) => {
                let before = sims.len();
                sims.retain(|s| {
                    let keep = s.port != port;
                    if !keep {
                        s.task.abort();
                    }
                    keep
                });
                if sims.len() == before {
                    println!("  {} no simulator on port {}", "Warning:".yellow(), port);
                } else {
                    println!("  {} simulator on port {} stopped", "✓".green(), port);
                }
            }
            Err(_) => println!("  {} '{}' is not a valid port number", "Warning:".yellow(), port),
        },
        [device] | [device, _] => {
            let port = match args.get(1).map(|p| p.parse::<u16>()) {
                None => DEFAULT_VRPN_PORT,
                Some(Ok(p)) => p,
                Some(Err(_)) => {
                    println!("  {} '{}' is not a valid port number", "Warning:".yellow(), args[1]);
                    return;
                }
            };
            match runtime.block_on(commands::start_sim(device, port)) {
                Ok(sim) => {
                    let port = sim.local_addr().port();
                    println!(
                        "  {} simulating {} on port {}",
                        "✓".green().bold(),
                        device.bold(),
                        port.to_string().yellow()
                    );
                    let shutdown = Arc::clone(shutdown);
                    let task = runtime.spawn(async move {
                        commands::animate(&sim, shutdown).await;
                    });
                    sims.push(RunningSim {
                        device: device.clone(),
                        port,
                        task,
                    });
                }
                Err(e) => println!("  {}", render_error(&e, OutputFormat::Text).red()),
            }
        }
        _ => println!("  Usage: /sim [<device> [port] | stop <port>]"),
    }
}

fn cmd_settings() {
    let mut cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    cfg.default_host = prompt_str(&format!("  Default host        [{}]: ", cfg.default_host), &cfg.default_host);
    cfg.default_port = prompt_u16(&format!("  Default port        [{}]: ", cfg.default_port), cfg.default_port);
    cfg.deadline_ms = prompt_u64(&format!("  Deadline (ms)       [{}]: ", cfg.deadline_ms), cfg.deadline_ms);
    cfg.connect_timeout_ms = prompt_u64(
        &format!("  Connect timeout (ms) [{}]: ", cfg.connect_timeout_ms),
        cfg.connect_timeout_ms,
    );
    let output = prompt_str(&format!("  Output (text / json) [{}]: ", cfg.output), &cfg.output.to_string());
    match output.parse::<OutputFormat>() {
        Ok(format) => cfg.output = format,
        Err(e) => println!("  {} {}, keeping {}", "Warning:".yellow(), e, cfg.output),
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Fill a missing host and port from the config.  A single
/// `device@host[:port]` token is split into its parts.  `None` when no
/// device was given.  More than three words are passed through so the arity
/// check reports them.
///
/// # Errors
///
/// The parse error of a malformed `device@host[:port]` token.
fn complete_address(
    args: &[String],
    cfg: &Config,
) -> Result<Option<Vec<String>>, TrackableError> {
    let mut argv = args.to_vec();
    match argv.len() {
        0 => return Ok(None),
        1 if argv[0].contains('@') => {
            let desc = argv[0].parse::<ConnectionDescriptor>()?;
            return Ok(Some(vec![desc.device, desc.host, desc.port]));
        }
        1 => {
            argv.push(cfg.default_host.clone());
            argv.push(cfg.default_port.to_string());
        }
        2 => argv.push(cfg.default_port.to_string()),
        _ => {}
    }
    Ok(Some(argv))
}

fn load_config_or_default() -> Config {
    match config::load_or_default() {
        Ok(c) => c,
        Err(e) => {
            println!("{}: {} – using defaults", "Config error".red(), e);
            Config::default()
        }
    }
}

/// Prompt for a u16 value.  Returns `default` when the user presses Enter.
fn prompt_u16(msg: &str, default: u16) -> u16 {
    let raw = prompt_str(msg, &default.to_string());
    match raw.parse::<u16>() {
        Ok(v) => v,
        Err(_) => {
            println!(
                "  {} '{}' is not a valid port number, keeping {}",
                "Warning:".yellow(),
                raw,
                default
            );
            default
        }
    }
}

fn prompt_u64(msg: &str, default: u64) -> u64 {
    let raw = prompt_str(msg, &default.to_string());
    match raw.parse::<u64>() {
        Ok(v) => v,
        Err(_) => {
            println!("  {} '{}' is not a number, keeping {}", "Warning:".yellow(), raw, default);
            default
        }
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}
