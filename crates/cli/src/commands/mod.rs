//! CLI subcommands

pub mod anomalies;
pub mod health;
