//! Integration tests for the `view` command.
use optiport::cli::handle_view_command;
use optiport::settings::Settings;
use optiport::view::ViewRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Get the path to the demo instance.
fn get_instance_dir() -> PathBuf {
    PathBuf::from("demos/portfolio")
}

fn view(instance_dir: &Path, view_name: &str) -> anyhow::Result<()> {
    unsafe { std::env::set_var("OPTIPORT_LOG_LEVEL", "off") };
    handle_view_command(instance_dir, view_name, Some(Settings::default()))
}

/// Every registered view can be produced for the demo instance
#[test]
fn test_handle_view_command() {
    for registered in ViewRegistry::default().iter() {
        view(&get_instance_dir(), registered.name()).unwrap();
    }
}

#[test]
fn test_unknown_view() {
    let err = view(&get_instance_dir(), "scatter").unwrap_err();
    assert!(err.to_string().starts_with("Unknown view scatter"));
}

/// Views are still produced for an instance with no solution
#[test]
fn test_view_without_solution() {
    let dir = tempdir().unwrap();
    fs::copy(
        get_instance_dir().join("stock_properties.csv"),
        dir.path().join("stock_properties.csv"),
    )
    .unwrap();
    view(dir.path(), "building_table").unwrap();
}
