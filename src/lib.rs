//! Configuration-driven TCP/UDP super-server: one supervisor process that
//! owns every configured listening socket, dispatches incoming traffic to
//! on-demand child processes, and reaps them on exit.
//!
//! See `SPEC_FULL.md` for the full component design; `supervisor::Supervisor`
//! is the entry point the `superserver` binary drives.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod initializer;
pub mod reaper;
pub mod readiness;
pub mod spawner;
pub mod supervisor;
