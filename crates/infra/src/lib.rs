//! Real-time plumbing for fxgraph chains
//!
//! The core crate's `SignalGraph` takes `&mut self` for every edit, which is
//! right for one thread. This crate splits a graph between a control thread
//! and a render thread:
//! - The render side owns the graph and never blocks, allocates for control
//!   traffic, or regenerates derived buffers
//! - The control side validates edits, regenerates derived buffers and
//!   queues lock-free commands that land between buffers

pub mod engine;

pub use engine::{channel, channel_with_noise, ChainController, ChainRenderer, EngineError};
