//! Per-section DER efficacy for platform power-grid co-simulations.

#[cfg(feature = "api")]
pub mod api;
pub mod app;
/// Message bus seam, STOMP client, and topic names.
pub mod bus;
pub mod cim;
pub mod cli;
pub mod config;
pub mod io;
pub mod logging;
pub mod report;
pub mod runner;
/// Simulation messages, measurements, section balances, and run lifecycle.
pub mod sim;
