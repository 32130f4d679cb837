// Purpose: Define crate-level module surface for the packaging pipeline and its CLI.
// Inputs/Outputs: Re-exports stage modules for the binary, tests and embedding callers.
// Invariants: Stages stay independent of the CLI; only cli/ prints user-facing output.
// Gotchas: Keep module wiring consistent with src/main.rs.

pub mod backup;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod filter;
pub mod lock;
pub mod logging;
pub mod normalize;
pub mod packer;
pub mod toolchain;
pub mod walker;

pub use config::PackConfig;
pub use packer::{PackReport, Packer, Stage};
