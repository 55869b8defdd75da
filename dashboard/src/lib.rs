//! Read-only dashboard for a GMX trading agent: polls the exchange and the
//! agent's telemetry, derives performance views and serves them as JSON.

pub mod analytics;
pub mod config;
pub mod error;
pub mod gmx;
pub mod poller;
pub mod report;
pub mod server;
pub mod sources;
pub mod telemetry;
pub mod types;
