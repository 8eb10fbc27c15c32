//! Common functionality for optiport.
//!
//! optiport reads the solution of a building portfolio investment MILP, decodes its variable names
//! against the instance's configuration tables and produces summaries, tables and chart data.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod aggregate;
pub mod building;
pub mod cli;
pub mod config;
pub mod id;
pub mod input;
pub mod instance;
pub mod log;
pub mod model;
pub mod output;
pub mod settings;
pub mod solution;
pub mod technology;
pub mod units;
pub mod validation;
pub mod variable;
pub mod view;

#[cfg(test)]
mod fixture;

/// Get the directory where program settings are stored
pub fn get_optiport_config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_default();
    path.push("optiport");

    path
}
