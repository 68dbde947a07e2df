//! Two-level virtual memory simulator with copy-on-write fork.
//!
//! The layers live in their own crates: [`memory`] tracks physical frames,
//! [`paging`] holds page tables and address translation, and
//! [`process_manager`] forks and tears down processes. [`Simulator`] owns
//! the state of one simulated machine.

pub mod command;
pub mod meta_commands;
pub mod repl;
pub mod scenarios;
mod simulator;

pub use memory;
pub use paging;
pub use process_manager;

pub use simulator::{ShareCountMismatch, Simulator};

pub const NUM_FRAMES: usize = 64;
pub const NUM_PAGES: usize = 16;
pub const MAX_PROCESSES: usize = 10;

pub type DefaultSimulator = Simulator<NUM_FRAMES, NUM_PAGES, MAX_PROCESSES>;
