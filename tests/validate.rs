//! Integration tests for the `validate` command.
use optiport::cli::handle_validate_command;
use optiport::log::is_logger_initialised;
use optiport::settings::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

/// Get the path to the demo instance.
fn get_instance_dir() -> PathBuf {
    PathBuf::from("demos/portfolio")
}

/// Copy the demo instance's configuration tables (but not its solution) to a temporary folder
fn copy_instance_tables() -> TempDir {
    let dir = tempdir().unwrap();
    for entry in fs::read_dir(get_instance_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.is_file() {
            fs::copy(&path, dir.path().join(path.file_name().unwrap())).unwrap();
        }
    }

    dir
}

fn validate(instance_dir: &Path, schema: Option<&Path>) -> anyhow::Result<()> {
    unsafe { std::env::set_var("OPTIPORT_LOG_LEVEL", "off") };
    handle_validate_command(instance_dir, schema, Some(Settings::default()))
}

/// An integration test for the `validate` command.
///
/// We also check that the logger is initialised after it is run.
#[test]
fn test_handle_validate_command() {
    validate(&get_instance_dir(), None).unwrap();
    assert!(is_logger_initialised());
}

#[test]
fn test_validate_without_solution() {
    let dir = copy_instance_tables();
    validate(dir.path(), None).unwrap();
}

#[test]
fn test_validate_missing_file() {
    let dir = copy_instance_tables();
    fs::remove_file(dir.path().join("financial_properties.csv")).unwrap();
    assert_eq!(
        validate(dir.path(), None).unwrap_err().to_string(),
        "Instance validation failed."
    );
}

#[test]
fn test_validate_custom_schema() {
    let dir = copy_instance_tables();
    let schema_path = dir.path().join("schema.toml");
    fs::write(
        &schema_path,
        "[[files]]\ntable = \"portfolio_caps\"\ncolumns = [\"max_investment\", \"max_co2\"]\n",
    )
    .unwrap();
    assert!(validate(dir.path(), Some(&schema_path)).is_err());

    fs::write(
        &schema_path,
        "[[files]]\ntable = \"portfolio_caps\"\n\
         columns = [\"max_investment\", \"max_emissions\"]\n",
    )
    .unwrap();
    validate(dir.path(), Some(&schema_path)).unwrap();
}

#[test]
fn test_validate_not_a_directory() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("file.txt");
    fs::write(&file_path, "").unwrap();
    assert_eq!(
        validate(&file_path, None).unwrap_err().to_string(),
        "Failed to find instance."
    );
}
