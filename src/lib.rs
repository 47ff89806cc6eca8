// src/lib.rs

pub mod bus;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod trigger;
pub mod types;
pub mod ui;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::bus::EventBus;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::render::SimpleRenderer;
use crate::exec::RealSupervisor;
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::Flow;
use crate::ui::Renderer as OutputRenderer;

/// High-level entry point used by `main.rs`. Wires config loading, the
/// watcher, the event bus, the renderer, and the engine itself (§4.G).
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let flow = load_and_validate(&config_path)?;
    let flow = if args.once { flow.rewrite_once() } else { flow };

    if args.dry_run {
        print_dry_run(&args.flow_name, &flow);
        return Ok(0);
    }

    let cwd = config_root_dir(&config_path);
    let bus = EventBus::new();

    let render_rx = bus.subscribe().await;
    let render_task = tokio::spawn(OutputRenderer::new(render_rx).run());

    let roots = engine::watch_roots(&flow);
    let fs = RealFileSystem;
    let _watcher = if roots.is_empty() {
        None
    } else {
        Some(watch::spawn_watcher(&roots, &fs, bus.clone())?)
    };

    let supervisor = Arc::new(RealSupervisor::new(bus.clone()));
    let renderer = Arc::new(SimpleRenderer);
    let shutdown_signals = engine::signals::spawn();

    let exit_code =
        engine::run_engine(flow, cwd, bus, supervisor, renderer, shutdown_signals).await;

    let _ = render_task.await;
    Ok(exit_code)
}

/// The directory flow-relative paths (watch roots, `cwd`) are resolved
/// against: the config file's parent directory, or the current working
/// directory for a bare filename like `Synthesize.toml`.
fn config_root_dir(config_path: &std::path::Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn print_dry_run(flow_name: &str, flow: &Flow) {
    println!("synthesize dry-run: {flow_name}");
    println!();
    println!("targets ({}):", flow.targets.len());
    for (id, target) in flow.targets.iter() {
        println!("  - {id}: {}", target.commands.lines().next().unwrap_or(""));
    }
    println!();
    println!("nodes ({}):", flow.nodes.len());
    for (id, node) in flow.nodes.iter() {
        println!("  - {id} (target: {})", node.target_ref);
        for trigger in &node.triggers {
            println!("      {trigger:?}");
        }
    }
}
