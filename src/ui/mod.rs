// src/ui/mod.rs

//! Output renderer (§4.F): multiplexes node stdout/stderr into one terminal
//! stream, each line tagged with a timestamp and a stable per-node color.

pub mod renderer;

pub use renderer::Renderer;
