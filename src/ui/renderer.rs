// src/ui/renderer.rs

use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::time::interval;

use crate::bus::{Event, OutputStream};
use crate::types::NodeId;

/// Foreground color codes cycled across nodes, chosen to read well on both
/// light and dark terminal themes.
const PALETTE: &[u8] = &[36, 32, 33, 35, 34, 31, 92, 93, 94, 95, 96, 91];

/// How often the status footer redraws even if nothing changed (§4.F).
const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisplayState {
    Running,
    Idle,
}

#[derive(Debug, Clone)]
struct NodeSummary {
    state: DisplayState,
    run_count: u64,
    last_exit_code: Option<i32>,
    cumulative: Duration,
    running_since: Option<Instant>,
}

impl Default for NodeSummary {
    fn default() -> Self {
        Self {
            state: DisplayState::Idle,
            run_count: 0,
            last_exit_code: None,
            cumulative: Duration::ZERO,
            running_since: None,
        }
    }
}

impl NodeSummary {
    fn wall_time(&self) -> Duration {
        match self.running_since {
            Some(since) => self.cumulative + since.elapsed(),
            None => self.cumulative,
        }
    }
}

/// Consumes engine events from an [`EventBus`](crate::bus::EventBus)
/// subscription and renders them to stdout: timestamped/prefixed lines plus
/// a redrawing status footer (§4.F) that degrades to nothing when stdout
/// isn't a TTY.
pub struct Renderer {
    rx: mpsc::Receiver<Event>,
    colors: BTreeMap<NodeId, u8>,
    order: Vec<NodeId>,
    summary: BTreeMap<NodeId, NodeSummary>,
    is_tty: bool,
    footer_drawn: bool,
    any_failed: bool,
}

impl Renderer {
    pub fn new(rx: mpsc::Receiver<Event>) -> Self {
        Self {
            rx,
            colors: BTreeMap::new(),
            order: Vec::new(),
            summary: BTreeMap::new(),
            is_tty: std::io::stdout().is_terminal(),
            footer_drawn: false,
            any_failed: false,
        }
    }

    fn color_for(&mut self, node: &NodeId) -> u8 {
        let next = self.colors.len();
        *self
            .colors
            .entry(node.clone())
            .or_insert_with(|| PALETTE[next % PALETTE.len()])
    }

    fn entry(&mut self, node: &NodeId) -> &mut NodeSummary {
        if !self.summary.contains_key(node) {
            self.order.push(node.clone());
            self.summary.insert(node.clone(), NodeSummary::default());
        }
        self.summary.get_mut(node).unwrap()
    }

    fn timestamp() -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let secs_of_day = now.as_secs() % 86_400;
        format!(
            "{:02}:{:02}:{:02}",
            secs_of_day / 3600,
            (secs_of_day % 3600) / 60,
            secs_of_day % 60
        )
    }

    /// Erase a previously drawn footer (ANSI cursor restore + clear to end
    /// of screen).
    fn erase_footer(&mut self, out: &mut impl Write) {
        if self.footer_drawn {
            let _ = write!(out, "\x1b[u\x1b[0J");
            self.footer_drawn = false;
        }
    }

    /// Save the cursor position and print the live status panel (§4.F).
    fn draw_footer(&mut self, out: &mut impl Write) {
        if !self.is_tty || self.order.is_empty() {
            return;
        }
        let _ = write!(out, "\x1b[s");
        let _ = writeln!(out, "{:-<60}", "");
        let _ = writeln!(
            out,
            "{:<20} {:<10} {:>6} {:>8} {:>10}",
            "node", "state", "runs", "exit", "wall"
        );
        for node in &self.order {
            let s = &self.summary[node];
            let state = match s.state {
                DisplayState::Running => "running",
                DisplayState::Idle => "idle",
            };
            let exit = s
                .last_exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            let wall = s.wall_time();
            let _ = writeln!(
                out,
                "{node:<20} {state:<10} {:>6} {exit:>8} {:>9.1}s",
                s.run_count,
                wall.as_secs_f64()
            );
        }
        self.footer_drawn = true;
    }

    fn redraw_footer(&mut self) {
        if !self.is_tty {
            return;
        }
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.erase_footer(&mut out);
        self.draw_footer(&mut out);
    }

    fn write_line(&mut self, node: &NodeId, line: &[u8]) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.erase_footer(&mut out);
        let ts = Self::timestamp();
        let line_text = String::from_utf8_lossy(line);
        if self.is_tty {
            let color = self.color_for(node);
            let _ = writeln!(
                out,
                "\x1b[2m{ts}\x1b[0m \x1b[{color}m{node}\x1b[0m \u{2502} {line_text}"
            );
        } else {
            let _ = writeln!(out, "{ts} {node} | {line_text}");
        }
        self.draw_footer(&mut out);
    }

    /// Run the render loop until the bus reports the engine has stopped or
    /// the channel closes. Redraws the footer on every state change and on
    /// a 1 Hz tick (§4.F).
    pub async fn run(mut self) {
        let mut ticker = interval(TICK);
        ticker.tick().await; // first tick fires immediately; discard

        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    match event {
                        Some(event) => {
                            if self.handle_event(event) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.redraw_footer();
                }
            }
        }
    }

    /// Handle one event; returns `true` if the render loop should stop.
    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::NodeStarted { node, pid } => {
                tracing::debug!(%node, pid, "node started");
                let entry = self.entry(&node);
                entry.run_count += 1;
                entry.state = DisplayState::Running;
                entry.running_since = Some(Instant::now());
                self.redraw_footer();
            }
            Event::NodeOutput { node, stream, bytes } => {
                // Each event is already one line (or long-line fragment, for an
                // unterminated line) split by the supervisor; a blank line
                // arrives as empty `bytes` and must still be rendered.
                self.write_line(&node, &bytes);
                let _ = stream; // stdout/stderr render identically on the combined stream
            }
            Event::NodeExited { node, exit } => {
                let entry = self.entry(&node);
                entry.state = DisplayState::Idle;
                entry.last_exit_code = Some(exit.code);
                if let Some(since) = entry.running_since.take() {
                    entry.cumulative += since.elapsed();
                }
                if !exit.succeeded() {
                    self.any_failed = true;
                }
                self.redraw_footer();
            }
            Event::TriggerFired { .. } => {}
            Event::WatchEvent { paths } => {
                tracing::debug!(?paths, "watch event");
            }
            Event::EngineShuttingDown { reason } => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                self.erase_footer(&mut out);
                let _ = writeln!(out, "shutting down ({reason:?})...");
            }
            Event::EngineStopped => {
                self.print_summary();
                return true;
            }
        }
        false
    }

    fn print_summary(&mut self) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.erase_footer(&mut out);
        if self.summary.is_empty() {
            return;
        }
        let _ = writeln!(out, "\n{:<24} {:>6} {:>10}", "node", "runs", "last exit");
        for node in &self.order {
            let s = &self.summary[node];
            let exit = s
                .last_exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(out, "{node:<24} {:>6} {exit:>10}", s.run_count);
        }
        let rule: String = "\u{2500}".repeat(60);
        if self.is_tty && self.any_failed {
            let _ = writeln!(out, "\x1b[31m{rule}\x1b[0m");
        } else {
            let _ = writeln!(out, "{rule}");
        }
    }
}
