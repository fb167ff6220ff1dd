//! Cycle-level simulator of the SATACC watcher-list accelerator.
//!
//! A [`satacc::SataccMinisatTask`] records the watcher operations of a real
//! MiniSat run, round by round. A [`satacc::Simulator`] replays those rounds
//! against a modeled memory system (private caches, a banked L3, DRAM
//! channels, three interconnects and a writer-merge stage) and collects
//! timing and utilization statistics.
pub mod config;
pub mod error;
pub mod ffi;
#[macro_use]
pub(crate) mod macros;
pub mod satacc;
pub mod satstat;
pub mod sim;
pub(crate) mod test_utils;

use tracing_subscriber::EnvFilter;

/// install the global tracing subscriber, `RUST_LOG` overrides the default `info` level
///
/// it's safe to call this more than once, later calls are ignored
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .unwrap_or_default();
}
