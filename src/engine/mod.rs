// src/engine/mod.rs

//! Engine entry (§4.G): wires the event bus, the scheduler, the
//! supervisor, and trigger clocks into the single cooperative loop
//! described in §5, installs signal handlers, and computes the final exit
//! code.

pub mod scheduler;
pub mod signals;

pub use scheduler::{Scheduler, SchedulerOutput, ShutdownReason};

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bus::{Event, EventBus, TriggerCause};
use crate::config::render::Renderer;
use crate::engine::signals::ShutdownSignal;
use crate::exec::{SpawnRequest, Supervisor};
use crate::trigger::TriggerClocks;
use crate::types::{ExitInfo, Flow, NodeId, Trigger};

/// Run the flow to completion: start every `Once` trigger, then loop until
/// either the user interrupts or the scheduler reports quiescence,
/// returning the process exit code (§4.E, §4.G).
///
/// `shutdown_signals` is injected rather than installed internally (contrast
/// [`signals::spawn`]) so tests can drive the graceful/force shutdown path
/// without raising a real process signal.
pub async fn run_engine(
    flow: Flow,
    cwd: PathBuf,
    bus: Arc<EventBus>,
    supervisor: Arc<dyn Supervisor>,
    renderer: Arc<dyn Renderer>,
    mut shutdown_signals: mpsc::Receiver<ShutdownSignal>,
) -> i32 {
    let mut scheduler = Scheduler::new(&flow);
    let mut clocks = TriggerClocks::new();
    let mut rx = bus.subscribe().await;

    let now = Instant::now();
    for (node, idx, delay) in restart_triggers(&flow) {
        clocks.ensure_restart(&node, idx, delay, now);
    }

    let mut start_out = Vec::new();
    scheduler.start(&mut start_out);
    let mut queue: VecDeque<SchedulerOutput> = start_out.into();
    apply_queue(&mut queue, &mut scheduler, &flow, &cwd, &*renderer, &*supervisor, &bus).await;

    let mut shutting_down = false;
    let mut pending_stops: BTreeSet<NodeId> = BTreeSet::new();

    loop {
        if !shutting_down && scheduler.is_quiescent() {
            shutting_down = true;
            bus.publish(Event::EngineShuttingDown {
                reason: crate::bus::ShutdownReason::Quiescent,
            })
            .await;
            let mut out = Vec::new();
            for node in scheduler.shutdown(ShutdownReason::Quiescent, &mut out) {
                pending_stops.insert(node);
            }
            let mut queue: VecDeque<_> = out.into();
            apply_queue(&mut queue, &mut scheduler, &flow, &cwd, &*renderer, &*supervisor, &bus).await;
            if pending_stops.is_empty() {
                break;
            }
        }

        let wake = clocks.earliest_wake();

        tokio::select! {
            biased;

            signal = shutdown_signals.recv() => {
                match signal {
                    Some(ShutdownSignal::Graceful) => {
                        if !shutting_down {
                            shutting_down = true;
                            bus.publish(Event::EngineShuttingDown {
                                reason: crate::bus::ShutdownReason::UserInterrupt,
                            }).await;
                            let mut out = Vec::new();
                            for node in scheduler.shutdown(ShutdownReason::UserInterrupt, &mut out) {
                                pending_stops.insert(node);
                            }
                            let mut queue: VecDeque<_> = out.into();
                            apply_queue(&mut queue, &mut scheduler, &flow, &cwd, &*renderer, &*supervisor, &bus).await;
                            if pending_stops.is_empty() {
                                break;
                            }
                        }
                    }
                    Some(ShutdownSignal::Force) => {
                        warn!("second interrupt received, forcing shutdown");
                        for node in live_nodes(&scheduler) {
                            supervisor.force_kill(&node).await;
                        }
                        scheduler.finish_shutdown();
                        break;
                    }
                    None => {}
                }
            }

            event = rx.recv() => {
                match event {
                    Some(Event::NodeStarted { node, pid }) => {
                        scheduler.node_started(&node, pid);
                    }
                    Some(Event::NodeExited { node, exit }) => {
                        pending_stops.remove(&node);
                        rearm_restart(&flow, &node, &mut clocks, Instant::now());
                        let mut out = Vec::new();
                        scheduler.node_exited(&node, exit, &mut out);
                        let mut queue: VecDeque<_> = out.into();
                        apply_queue(&mut queue, &mut scheduler, &flow, &cwd, &*renderer, &*supervisor, &bus).await;
                        if shutting_down && pending_stops.is_empty() {
                            break;
                        }
                    }
                    Some(Event::WatchEvent { paths }) => {
                        record_watch_changes(&flow, &mut clocks, &paths, Instant::now(), &cwd);
                    }
                    Some(_) => {}
                    None => break,
                }
            }

            _ = sleep_until_wake(wake) => {
                let now = Instant::now();
                let mut out = Vec::new();
                for (node, idx) in clocks.due_restarts(now) {
                    if let Some(timer) = clocks.restart_timer_mut(&node, idx) {
                        timer.rearm(now);
                    }
                    scheduler.fire(&node, idx, TriggerCause::RestartTimer, &mut out);
                }
                for (node, idx, _paths) in clocks.due_watches(now) {
                    scheduler.fire(&node, idx, TriggerCause::WatchDebounce, &mut out);
                }
                let mut queue: VecDeque<_> = out.into();
                apply_queue(&mut queue, &mut scheduler, &flow, &cwd, &*renderer, &*supervisor, &bus).await;
            }
        }
    }

    scheduler.finish_shutdown();
    info!(exit_code = scheduler.exit_code(), "engine stopped");
    bus.publish(Event::EngineStopped).await;
    scheduler.exit_code()
}

/// Every node the scheduler still considers `Running`/`Terminating`, for
/// the second-interrupt force-kill escalation (§4.G).
fn live_nodes(scheduler: &Scheduler) -> Vec<NodeId> {
    scheduler
        .flow()
        .nodes
        .keys()
        .filter(|id| {
            scheduler
                .state(id)
                .map(|s| s.lifecycle.is_live())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Sleep until `wake`, or forever if nothing is scheduled -- letting the
/// other `select!` branches (bus events, signals) be the only way to wake.
async fn sleep_until_wake(wake: Option<Instant>) {
    match wake {
        Some(instant) => tokio::time::sleep_until(tokio::time::Instant::from_std(instant)).await,
        None => std::future::pending().await,
    }
}

/// Drain `queue`, carrying out spawns/stops/publishes and feeding any
/// synthetic exits (render failures) back through the scheduler.
async fn apply_queue(
    queue: &mut VecDeque<SchedulerOutput>,
    scheduler: &mut Scheduler,
    flow: &Flow,
    cwd: &Path,
    renderer: &dyn Renderer,
    supervisor: &dyn Supervisor,
    bus: &EventBus,
) {
    while let Some(output) = queue.pop_front() {
        match output {
            SchedulerOutput::Publish(event) => bus.publish(event).await,
            SchedulerOutput::Stop(node) => supervisor.stop(&node).await,
            SchedulerOutput::Spawn(node_id) => match render_spawn(flow, &node_id, cwd, renderer) {
                Ok(req) => supervisor.spawn(req).await,
                Err(err) => {
                    warn!(node = %node_id, error = %err, "failed to render command, treating as a failed run");
                    let exit = ExitInfo {
                        code: -1,
                        signal: None,
                        duration: Duration::ZERO,
                    };
                    bus.publish(Event::NodeExited {
                        node: node_id.clone(),
                        exit,
                    })
                    .await;
                    let mut more = Vec::new();
                    scheduler.node_exited(&node_id, exit, &mut more);
                    queue.extend(more);
                }
            },
        }
    }
}

/// Render a node's command and environment through the templating
/// collaborator, using effective (flow < node < target) bindings (§3, §6).
fn render_spawn(
    flow: &Flow,
    node_id: &NodeId,
    cwd: &Path,
    renderer: &dyn Renderer,
) -> Result<SpawnRequest, crate::config::render::RenderError> {
    let node = flow
        .nodes
        .get(node_id)
        .expect("scheduler only spawns nodes present in its own flow");
    let target = flow
        .target_for(node)
        .expect("flow validation guarantees every node's target_ref resolves");

    let args = flow.effective_args(node);
    let bindings: HashMap<String, String> = args.into_iter().collect();

    let command = renderer.render(&target.commands, &bindings)?;

    let mut env = HashMap::new();
    for (key, value) in flow.effective_env(node) {
        env.insert(key, renderer.render(&value, &bindings)?);
    }

    Ok(SpawnRequest {
        node: node_id.clone(),
        command,
        env,
        cwd: cwd.to_path_buf(),
    })
}

/// Every `(node, trigger_index, delay)` for `Restart` triggers in the flow.
fn restart_triggers(flow: &Flow) -> Vec<(NodeId, usize, Duration)> {
    flow.nodes
        .values()
        .flat_map(|node| {
            node.triggers.iter().enumerate().filter_map(move |(i, t)| match t {
                Trigger::Restart { delay } => Some((node.id.clone(), i, *delay)),
                _ => None,
            })
        })
        .collect()
}

/// Re-arm every `Restart` timer belonging to `node` after it exits, so the
/// next fire is `delay` after *this* exit (§4.D).
fn rearm_restart(flow: &Flow, node: &NodeId, clocks: &mut TriggerClocks, now: Instant) {
    let Some(n) = flow.nodes.get(node) else { return };
    for (idx, trigger) in n.triggers.iter().enumerate() {
        if let Trigger::Restart { .. } = trigger {
            if let Some(timer) = clocks.restart_timer_mut(node, idx) {
                timer.rearm(now);
            }
        }
    }
}

/// Every distinct `Watch` root path declared anywhere in the flow.
pub fn watch_roots(flow: &Flow) -> Vec<String> {
    let mut roots = BTreeSet::new();
    for node in flow.nodes.values() {
        for t in &node.triggers {
            if let Trigger::Watch { paths, .. } = t {
                roots.extend(paths.iter().cloned());
            }
        }
    }
    roots.into_iter().collect()
}

/// Record a raw watcher batch against every `Watch` trigger whose root is a
/// prefix of a changed path (§4.D).
fn record_watch_changes(
    flow: &Flow,
    clocks: &mut TriggerClocks,
    changed: &[String],
    now: Instant,
    cwd: &Path,
) {
    for node in flow.nodes.values() {
        for (idx, trigger) in node.triggers.iter().enumerate() {
            let Trigger::Watch { paths, debounce } = trigger else {
                continue;
            };
            for changed_path in changed {
                if paths.iter().any(|root| path_has_prefix(root, changed_path, cwd)) {
                    clocks
                        .ensure_watch(&node.id, idx, *debounce)
                        .record_change(changed_path.clone(), now);
                }
            }
        }
    }
}

/// Whether `changed` falls under `root`, comparing both lexically
/// normalized and made absolute against `cwd` (§4.D "prefix match on
/// normalized paths"). `Watch` roots are typically written relative to the
/// flow file while `notify` reports absolute paths, so a raw
/// `Path::starts_with` would never match in real usage.
fn path_has_prefix(root: &str, changed: &str, cwd: &Path) -> bool {
    normalize_path(cwd, changed).starts_with(normalize_path(cwd, root))
}

fn normalize_path(cwd: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    let absolute = if path.is_absolute() { path.to_path_buf() } else { cwd.join(path) };
    lexically_normalize(&absolute)
}

/// Resolve `.`/`..` components without touching the filesystem -- a real
/// `canonicalize` would fail for a watch root that has since disappeared,
/// which §4.C explicitly requires the engine to tolerate.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
