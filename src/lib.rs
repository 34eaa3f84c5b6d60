//! Branch-scoped memory bank for AI agents, served over JSON-RPC.
//!
//! Each `(repository, branch)` pair owns an isolated property graph of
//! project metadata, daily context logs, components with `DEPENDS_ON` edges,
//! decisions and rules with `GOVERNS` edges, tags, and files. Agents reach it
//! through tools called over stdio or HTTP; long-running traversals and graph
//! algorithms stream progress frames before their result.
//!
//! # Architecture
//!
//! - **Storage**: SQLite, one table per node label and per edge type, every
//!   row keyed by repository and branch
//! - **Graph**: recursive CTEs for traversals; projections plus in-process
//!   algorithms (PageRank, Louvain, k-core, SCC/WCC)
//! - **Protocol**: JSON-RPC 2.0 with `notifications/progress` frames
//! - **Transport**: newline-delimited stdio, or HTTP with optional SSE
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML and environment variables
//! - [`db`]: schema, migrations, projections, and graph algorithms
//! - [`bank`]: entity repositories, the relationship manager, and [`bank::MemoryService`]
//! - [`session`]: session lifecycle and idle reaping
//! - [`tools`]: tool registry, handlers, and the progress channel
//! - [`protocol`] and [`transport`]: JSON-RPC framing over stdio and HTTP

pub mod bank;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;
