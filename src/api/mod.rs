mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;

pub use server::{build_wiring, run, run_worker_only, Wiring};
