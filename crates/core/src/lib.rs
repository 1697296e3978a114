//! fxgraph core: effect graph and per-effect signal algorithms
//!
//! Everything lives under [`domain`]. Threads and queues are left to
//! `fxgraph-infra`.

pub mod domain;
