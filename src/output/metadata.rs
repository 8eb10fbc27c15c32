//! Code for writing metadata to file
use crate::instance::InstanceDescriptor;
use anyhow::Result;
use chrono::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output file name for metadata
const METADATA_FILE_NAME: &str = "metadata.toml";

#[derive(Serialize)]
struct Metadata<'a> {
    run: RunMetadata<'a>,
    program: ProgramMetadata,
    instance: InstanceInfo<'a>,
}

/// Information about the analysis run
#[derive(Serialize)]
struct RunMetadata<'a> {
    /// Path to the instance which was analysed
    instance_path: &'a Path,
    /// The date and time on which the run started
    datetime: String,
}

impl<'a> RunMetadata<'a> {
    fn new(instance_path: &'a Path) -> Self {
        let dt = Local::now();
        Self {
            instance_path,
            datetime: dt.to_rfc2822(),
        }
    }
}

#[derive(Serialize)]
struct ProgramMetadata {
    /// The program name
    name: &'static str,
    /// The program version as specified in Cargo.toml
    version: &'static str,
    /// Whether it is a debug build
    is_debug: bool,
}

impl Default for ProgramMetadata {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            is_debug: cfg!(debug_assertions),
        }
    }
}

/// Descriptive information about the analysed instance
#[derive(Serialize)]
struct InstanceInfo<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_buildings: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_periods: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    solution_path: Option<&'a Path>,
}

impl<'a> InstanceInfo<'a> {
    fn new(descriptor: &'a InstanceDescriptor) -> Self {
        let metadata = &descriptor.metadata;
        Self {
            name: &descriptor.name,
            description: metadata.description.as_deref(),
            num_buildings: metadata.num_buildings,
            num_periods: metadata.num_periods,
            modified: metadata.modified.as_ref().map(DateTime::to_rfc2822),
            solution_path: descriptor.solution_path.as_deref(),
        }
    }
}

/// Write metadata to the specified output path in TOML format
pub fn write_metadata(output_path: &Path, descriptor: &InstanceDescriptor) -> Result<()> {
    let metadata = Metadata {
        run: RunMetadata::new(&descriptor.root_path),
        program: ProgramMetadata::default(),
        instance: InstanceInfo::new(descriptor),
    };
    let file_path = output_path.join(METADATA_FILE_NAME);
    fs::write(&file_path, toml::to_string(&metadata)?)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::fixture::instance_dir;
    use rstest::rstest;
    use tempfile::{TempDir, tempdir};

    #[rstest]
    fn test_write_metadata(instance_dir: TempDir) {
        let descriptor =
            InstanceDescriptor::from_dir(instance_dir.path(), &AnalysisConfig::default()).unwrap();
        let output_dir = tempdir().unwrap();
        write_metadata(output_dir.path(), &descriptor).unwrap();

        let contents = fs::read_to_string(output_dir.path().join(METADATA_FILE_NAME)).unwrap();
        let metadata: toml::Table = toml::from_str(&contents).unwrap();
        assert_eq!(metadata["program"]["name"].as_str(), Some("optiport"));
        assert_eq!(
            metadata["instance"]["description"].as_str(),
            Some("Test portfolio")
        );
        assert_eq!(metadata["instance"]["num_buildings"].as_integer(), Some(3));
        assert_eq!(metadata["instance"]["num_periods"].as_integer(), Some(3));
        assert!(metadata["run"]["datetime"].is_str());
    }
}
