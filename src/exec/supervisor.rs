// src/exec/supervisor.rs

use std::collections::HashMap;
use std::future::Future;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bus::{Event, EventBus, OutputStream};
use crate::types::{ExitInfo, NodeId};

/// Lines longer than this are flushed as multiple `NodeOutput` events
/// rather than buffered without bound (§4.B).
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Grace period between SIGTERM and SIGKILL on `stop` (§4.B).
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

const READ_CHUNK: usize = 8 * 1024;

/// Everything the supervisor needs to start one run of one node.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub node: NodeId,
    pub command: String,
    pub env: HashMap<String, String>,
    pub cwd: PathBuf,
}

/// Abstracts how a node's process is actually run, so tests can swap in a
/// fake that never touches the OS. Mirrors the boxed-future shape the
/// teacher codebase uses for its own executor trait.
pub trait Supervisor: Send + Sync {
    fn spawn(&self, req: SpawnRequest) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
    fn stop(&self, node: &NodeId) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
    /// Escalate immediately to SIGKILL, bypassing any SIGTERM grace timer
    /// already in progress (§4.G's second-interrupt escalation).
    fn force_kill(&self, node: &NodeId) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

struct RunningNode {
    stop_tx: Option<oneshot::Sender<()>>,
    force_tx: Option<oneshot::Sender<()>>,
}

/// Production supervisor: one `tokio::spawn`ed task per run, a real `sh -c`
/// child in its own process group, and a small registry so `stop` can find
/// the in-flight run for a node.
pub struct RealSupervisor {
    bus: Arc<EventBus>,
    grace: Duration,
    running: Arc<Mutex<HashMap<NodeId, RunningNode>>>,
}

impl RealSupervisor {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_grace(bus, DEFAULT_GRACE)
    }

    pub fn with_grace(bus: Arc<EventBus>, grace: Duration) -> Self {
        Self {
            bus,
            grace,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Supervisor for RealSupervisor {
    fn spawn(&self, req: SpawnRequest) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let (stop_tx, stop_rx) = oneshot::channel();
            let (force_tx, force_rx) = oneshot::channel();
            self.running.lock().await.insert(
                req.node.clone(),
                RunningNode {
                    stop_tx: Some(stop_tx),
                    force_tx: Some(force_tx),
                },
            );

            let bus = self.bus.clone();
            let grace = self.grace;
            let running = self.running.clone();
            let node = req.node.clone();

            tokio::spawn(async move {
                run_node(req, bus, grace, stop_rx, force_rx).await;
                running.lock().await.remove(&node);
            });
        })
    }

    fn stop(&self, node: &NodeId) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let node = node.clone();
        Box::pin(async move {
            let mut guard = self.running.lock().await;
            if let Some(running) = guard.get_mut(&node) {
                if let Some(tx) = running.stop_tx.take() {
                    let _ = tx.send(());
                }
            }
        })
    }

    fn force_kill(&self, node: &NodeId) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let node = node.clone();
        Box::pin(async move {
            let mut guard = self.running.lock().await;
            if let Some(running) = guard.get_mut(&node) {
                if let Some(tx) = running.force_tx.take() {
                    let _ = tx.send(());
                }
            }
        })
    }
}

async fn run_node(
    req: SpawnRequest,
    bus: Arc<EventBus>,
    grace: Duration,
    stop_rx: oneshot::Receiver<()>,
    force_rx: oneshot::Receiver<()>,
) {
    let SpawnRequest { node, command, env, cwd } = req;
    let started_at = Instant::now();

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&command)
        .current_dir(&cwd)
        .envs(&env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        // New process group rooted at the child's own pid, so a single
        // group signal reaches the whole subtree it may fork (§4.B).
        .process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(%node, error = %err, "failed to spawn process");
            bus.publish(Event::NodeExited {
                node,
                exit: ExitInfo {
                    code: -1,
                    signal: None,
                    duration: started_at.elapsed(),
                },
            })
            .await;
            return;
        }
    };

    let pid = child.id().unwrap_or(0);
    info!(%node, pid, cmd = %command, "node started");
    bus.publish(Event::NodeStarted { node: node.clone(), pid }).await;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = tokio::spawn(stream_pipe(node.clone(), OutputStream::Stdout, stdout, bus.clone()));
    let err_task = tokio::spawn(stream_pipe(node.clone(), OutputStream::Stderr, stderr, bus.clone()));

    let (code, signal) = wait_or_terminate(&mut child, pid, grace, stop_rx, force_rx).await;

    // "When both pipes are drained and wait has returned, emit exactly one
    // NodeExited" (§4.B) -- join the readers before publishing.
    let _ = out_task.await;
    let _ = err_task.await;

    info!(%node, code, ?signal, "node exited");
    bus.publish(Event::NodeExited {
        node,
        exit: ExitInfo {
            code,
            signal,
            duration: started_at.elapsed(),
        },
    })
    .await;
}

async fn wait_or_terminate(
    child: &mut Child,
    pid: u32,
    grace: Duration,
    mut stop_rx: oneshot::Receiver<()>,
    mut force_rx: oneshot::Receiver<()>,
) -> (i32, Option<i32>) {
    tokio::select! {
        status = child.wait() => status_to_exit(status),
        _ = &mut stop_rx => terminate(child, pid, grace, &mut force_rx).await,
        _ = &mut force_rx => force_kill(child, pid).await,
    }
}

async fn terminate(
    child: &mut Child,
    pid: u32,
    grace: Duration,
    force_rx: &mut oneshot::Receiver<()>,
) -> (i32, Option<i32>) {
    send_signal(pid, Signal::SIGTERM);
    tokio::select! {
        status = child.wait() => status_to_exit(status),
        _ = sleep(grace) => {
            send_signal(pid, Signal::SIGKILL);
            status_to_exit(child.wait().await)
        }
        _ = &mut *force_rx => force_kill(child, pid).await,
    }
}

/// Skip straight to SIGKILL, bypassing the SIGTERM grace period entirely
/// (§4.G's second-interrupt escalation).
async fn force_kill(child: &mut Child, pid: u32) -> (i32, Option<i32>) {
    send_signal(pid, Signal::SIGKILL);
    status_to_exit(child.wait().await)
}

/// Signal the child's entire process group. A process that already exited
/// (ESRCH) is treated as already-exited, not an error (§4.B).
fn send_signal(pid: u32, signal: Signal) {
    let Ok(raw_pid) = i32::try_from(pid) else { return };
    let pgid = Pid::from_raw(-raw_pid);
    match kill(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(pid, ?signal, error = %err, "failed to signal process group"),
    }
}

fn status_to_exit(status: std::io::Result<std::process::ExitStatus>) -> (i32, Option<i32>) {
    match status {
        Ok(status) => (status.code().unwrap_or(-1), status.signal()),
        Err(_) => (-1, None),
    }
}

/// Read one pipe in fixed-size chunks, splitting on `\n` and flushing any
/// fragment that reaches [`MAX_LINE_BYTES`] without one, so a producer that
/// never writes a newline cannot stall the reader or grow memory without
/// bound (§4.B's long-line policy).
async fn stream_pipe(
    node: NodeId,
    stream: OutputStream,
    reader: Option<impl tokio::io::AsyncRead + Unpin>,
    bus: Arc<EventBus>,
) {
    let Some(mut reader) = reader else { return };
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                debug!(%node, ?stream, error = %err, "pipe read error");
                break;
            }
        };

        let mut start = 0;
        for i in 0..n {
            if chunk[i] == b'\n' {
                buf.extend_from_slice(&chunk[start..i]);
                publish_line(&bus, &node, stream, std::mem::take(&mut buf)).await;
                start = i + 1;
            }
        }
        buf.extend_from_slice(&chunk[start..n]);

        if buf.len() >= MAX_LINE_BYTES {
            publish_line(&bus, &node, stream, std::mem::take(&mut buf)).await;
        }
    }

    if !buf.is_empty() {
        publish_line(&bus, &node, stream, buf).await;
    }
}

async fn publish_line(bus: &Arc<EventBus>, node: &NodeId, stream: OutputStream, bytes: Vec<u8>) {
    bus.publish(Event::NodeOutput {
        node: node.clone(),
        stream,
        bytes,
    })
    .await;
}
