//! `graspkit` – grasp filter demo and configuration tool.
//!
//! ```text
//! graspkit            run the filter demo with the saved (or default) config
//! graspkit init       write the default config to ~/.graspkit/config.toml
//! graspkit help       print usage
//! ```
//!
//! Ctrl-C cancels the current filter run; candidates still queued are
//! reported as cancelled and no further trials start.

mod config;
mod demo;
mod telemetry;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use graspkit_filter::CancelToken;
use graspkit_types::GraspCandidate;

const SHOWN_GRASPS: usize = 3;

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("graspkit");

    let command = std::env::args().nth(1).unwrap_or_else(|| "run".to_string());
    match command.as_str() {
        "init" => init_config(),
        "run" => {
            print_banner();
            run_demo()
        }
        "help" | "-h" | "--help" => {
            print_usage();
            ExitCode::SUCCESS
        }
        other => {
            println!("{}: unknown command `{}`", "Error".red(), other);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn init_config() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return ExitCode::SUCCESS;
    }
    match config::save(&config::Config::default()) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_demo() -> ExitCode {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – cancelling filter run …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; runs cannot be cancelled");
    }
    let cancel = CancelToken::from_flag(shutdown);

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!(
                "  No config found.  Run `{}` to create one; using defaults.",
                "graspkit init".bold()
            );
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "  Filtering grasps for {} trial(s) with stages {}\n",
        cfg.demo.num_trials.to_string().bold(),
        format!("{:?}", cfg.filter.stages).dimmed()
    );

    let result = demo::run_trials(&cfg, &cancel, print_trial);
    match result {
        Ok(reports) => {
            let valid: usize = reports.iter().map(|r| r.outcome.statistics.valid).sum();
            let total: usize = reports.iter().map(|r| r.outcome.statistics.total).sum();
            println!(
                "  {} {} of {} candidate(s) valid across {} trial(s)",
                "✓".green().bold(),
                valid,
                total,
                reports.len()
            );
            if cancel.is_cancelled() {
                println!("  {}", "Stopped early on Ctrl-C.".yellow());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Demo failed".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_trial(report: &demo::TrialReport) {
    let stats = &report.outcome.statistics;
    let c = report.object_centre;
    println!(
        "{}",
        format!(
            "  ── Trial {} ── object at ({:.3}, {:.3}, {:.3})",
            report.trial + 1,
            c.x,
            c.y,
            c.z
        )
        .bold()
        .cyan()
    );
    for line in stats.to_string().lines() {
        println!("    {}", line.dimmed());
    }

    let best = report.outcome.valid_sorted();
    if best.is_empty() {
        println!("    {}", "No valid grasps.".yellow());
    }
    for grasp in best.into_iter().take(SHOWN_GRASPS) {
        println!("    {}", describe_grasp(grasp));
    }
    println!();
}

fn describe_grasp(grasp: &GraspCandidate) -> String {
    let p = grasp.grasp_pose().translation;
    let a = grasp.approach_direction();
    format!(
        "{} {}  score {:.2}  at ({:.3}, {:.3}, {:.3})  approach ({:+.2}, {:+.2}, {:+.2})",
        "•".green(),
        grasp.id(),
        grasp.score(),
        p.x,
        p.y,
        p.z,
        a.x,
        a.y,
        a.z
    )
}

fn print_usage() {
    println!("  Usage: {} [{}|{}|{}]", "graspkit".bold(), "run".cyan(), "init".cyan(), "help".cyan());
    println!();
    println!("    {:<6} run the grasp filter demo (default)", "run".cyan());
    println!(
        "    {:<6} write the default config to {}",
        "init".cyan(),
        config::config_path().display()
    );
    println!("    {:<6} show this message", "help".cyan());
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║         graspkit filter demo         ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
}
