// src/exec/mod.rs

//! The child-process supervisor (§4.B).
//!
//! One [`Supervisor::spawn`] call owns exactly one run of one node: it
//! execs the rendered command under `sh -c`, places it in its own process
//! group, streams stdout/stderr line by line onto the event bus, and -- on
//! [`Supervisor::stop`] -- runs the SIGTERM-then-SIGKILL termination
//! protocol. [`RealSupervisor`] is the production implementation; tests
//! substitute a fake that never touches a real process.

pub mod supervisor;

pub use supervisor::{RealSupervisor, SpawnRequest, Supervisor};
