//! # Docs Harness
//!
//! Provision a local snapshot of a documentation corpus, keep it fresh, and
//! expose it to AI tools through a single MCP search tool.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌──────────────┐
//! │    Config    │──▶│  ProvisioningEngine │──▶│   dataDir    │
//! │ (TOML, once) │   │ copy/archive/clone  │   │ (plain files)│
//! └──────────────┘   └─────────┬───────────┘   └──────┬───────┘
//!                              │ mirror only          │ read per query
//!                              ▼                      ▼
//!                    ┌──────────────────┐     ┌──────────────┐
//!                    │ UpdateScheduler  │     │  MCP server  │
//!                    │ fetch + pull     │     │ (search tool)│
//!                    └──────────────────┘     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docs-harness build                 # produce a fresh snapshot
//! docs-harness serve                 # provision, then serve MCP on stdio
//! docs-harness sync                  # one-off pull of an existing clone
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`engine`] | Strategy selection, fallback, and orchestration |
//! | [`archive`] | Tarball download and extraction |
//! | [`mirror`] | Shallow git clone, clone detection, synchronize |
//! | [`static_copy`] | Local directory copy with ignore rules |
//! | [`scheduler`] | Periodic background synchronize |
//! | [`target_dir`] | Data directory reset helpers |
//! | [`search`] | Search collaborator trait and keyword implementation |
//! | [`mcp`] | MCP server exposing the search tool |
//! | [`error`] | Strategy error types |

pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod mcp;
pub mod mirror;
pub mod scheduler;
pub mod search;
pub mod static_copy;
pub mod target_dir;

pub use engine::{Mode, Provisioned, ProvisioningEngine, Strategy};
pub use scheduler::UpdateScheduler;
