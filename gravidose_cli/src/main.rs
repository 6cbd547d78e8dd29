//! `gravidose` binary: config loading, logging setup, and command dispatch
//! onto the simulated bench.

mod cli;
mod error_fmt;
mod sim;
mod store;

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);
    // color-eyre once, before any Report is created
    let _ = color_eyre::install();
    init_tracing(&args);

    match run(&args) {
        Ok(()) => {}
        Err(err) => {
            if *JSON_MODE.get().unwrap_or(&false) {
                eprintln!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            std::process::exit(exit_code_for_error(&err));
        }
    }
}

fn init_tracing(args: &Cli) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &Cli) -> eyre::Result<gravidose_config::Config> {
    if args.config.exists() {
        let text = fs::read_to_string(&args.config)
            .wrap_err_with(|| format!("failed to read config {}", args.config.display()))?;
        gravidose_config::load_toml(&text)
            .wrap_err_with(|| format!("invalid config {}", args.config.display()))
    } else {
        tracing::debug!(path = %args.config.display(), "no config file, using defaults");
        Ok(gravidose_config::Config::default())
    }
}

fn run(args: &Cli) -> eyre::Result<()> {
    let cfg = load_config(args)?;

    match &args.cmd {
        &Commands::Dose {
            grams,
            flow_gps,
            noise_counts,
            print_runtime,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let shutdown = Arc::clone(&shutdown);
                let _ = ctrlc::set_handler(move || {
                    shutdown.store(true, Ordering::Relaxed);
                });
            }
            let t0 = std::time::Instant::now();
            let s = sim::run_dose(&cfg, &args.state, grams, flow_gps, noise_counts, &shutdown)?;
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "target_mg": s.target_mg,
                        "final_mg": s.final_mg,
                        "overshoot_mg": s.overshoot_mg,
                        "elapsed_ms": s.elapsed_ms,
                        "kv_mg_per_gps": s.kv_mg_per_gps,
                        "stopped_early": s.stopped_early,
                    })
                );
            } else {
                println!(
                    "Dispensed {:.3} g (target {:.3} g, {:+} mg) in {:.1} s simulated",
                    f64::from(s.final_mg) / 1000.0,
                    f64::from(s.target_mg) / 1000.0,
                    s.overshoot_mg,
                    f64::from(s.elapsed_ms) / 1000.0,
                );
                if s.stopped_early {
                    println!("Stopped early by interrupt.");
                }
            }
            if print_runtime {
                eprintln!("Total runtime: {:?}", t0.elapsed());
            }
            Ok(())
        }
        &Commands::Calibrate { span_grams } => {
            let mut cfg = cfg;
            if let Some(g) = span_grams {
                if !(g.is_finite() && g > 0.0) {
                    eyre::bail!("span mass must be positive");
                }
                cfg.calibration.span_mass_mg = gravidose_core::util::lround_mg(g);
            }
            let s = sim::run_calibrate(&cfg, &args.state, 0)?;
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "factor_q16": s.factor_q16,
                        "ideal_q16": s.ideal_q16,
                        "span_mg": s.span_mg,
                    })
                );
            } else {
                println!(
                    "Calibrated with {:.3} g reference: factor {} (ideal {})",
                    f64::from(s.span_mg) / 1000.0,
                    s.factor_q16,
                    s.ideal_q16,
                );
            }
            Ok(())
        }
        Commands::SelfCheck => {
            sim::self_check(&cfg, &args.state)?;
            if args.json {
                println!("{}", serde_json::json!({ "status": "ok" }));
            } else {
                println!("OK");
            }
            Ok(())
        }
    }
}
