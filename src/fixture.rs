//! Fixtures for tests
use crate::building::Universe;
use crate::config::AnalysisConfig;
use crate::model::SolutionModel;
use crate::solution::SolutionReader;
use rstest::fixture;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::{TempDir, tempdir};

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// A small investment plan for three buildings over three periods.
///
/// * Building 0 installs an air heat pump in period 0 and removes its gas boiler in period 2
/// * Building 1 insulates its walls in period 1 (with some solver slack)
/// * Building 2 installs hot water storage in periods 0 and 2 but not 1
pub const SAMPLE_SOLUTION: &str = "# Objective value = 123456.7
X_in_0_0_hp_air 1
X_in_0_1_hp_air 1
X_in_0_2_hp_air 1
E_in_0_0_hp_air 10
E_in_0_1_hp_air 10
E_in_0_2_hp_air 10
X_in_1_0_pv_0 0
X_in_1_1_wall_1 0.9995
X_in_1_2_wall_1 1
E_in_1_1_wall_1 5
X_out_0_2_boi_gas 1
P_el_0_1_hp_air_0 2
P_el_0_1_hp_air_1 3
Q_in_1_2_wall_1 4
X_in_2_0_tes_dhw 1
X_in_2_1_tes_dhw 0
X_in_2_2_tes_dhw 1
";

/// Write `contents` to `file_path`, creating parent directories as needed
pub fn write_file(file_path: &Path, contents: &str) {
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(file_path, contents).unwrap();
}

/// Build a model from the contents of a solution file, using the default configuration
pub fn model_from_str(contents: &str, universe: Universe) -> SolutionModel {
    let config = AnalysisConfig::default();
    let reader = SolutionReader::new(Cursor::new(contents.as_bytes()), &config);
    SolutionModel::from_lines(universe, reader, &config).unwrap()
}

#[fixture]
pub fn universe() -> Universe {
    Universe {
        buildings: Some(["0".into(), "1".into(), "2".into()].into_iter().collect()),
        periods: Some(0..3),
    }
}

#[fixture]
pub fn model(universe: Universe) -> SolutionModel {
    model_from_str(SAMPLE_SOLUTION, universe)
}

/// A complete instance directory whose solution is [`SAMPLE_SOLUTION`]
#[fixture]
pub fn instance_dir() -> TempDir {
    let dir = tempdir().unwrap();
    let path = dir.path();

    write_file(
        &path.join("stock_properties.csv"),
        "id,type,year,location,region,num,area,num_floors,num_flats,persons_per_apartment
0,MFH,1965,Berlin,east,1,820.5,4,12,2.1
1,MFH,1972,Berlin,east,1,640,3,9,2.3
2,SFH,1990,Potsdam,east,1,140,2,1,3.0
",
    );
    write_file(
        &path.join("financial_properties.csv"),
        "id;c_comp;c_comp_increase;rent-1;rent-2;rent-3;cap_rent;cap_warm_rent;\
         En_Gas_cost;En_HP_cost;En_El_cost
0;1000;0.02;7.5;8;8.5;12;14;0.1;0.25;0.3
1;900;0.02;7;7.5;8;12;14;0.1;0.25;0.3
2;300;0.02;9;9.5;10;14;16;0.1;0.25;0.3
",
    );
    write_file(
        &path.join("building_constraints.csv"),
        "id,max_hp,max_pv\n0,1,1\n1,1,0\n2,0,1\n",
    );
    write_file(
        &path.join("general_finances.json"),
        r#"{
    "description": "Test portfolio",
    "time_periods": [2025, 2030, 2035],
    "equity": {"initial_equity": 100000},
    "liabilities": {"initial_liabilities": 50000}
}"#,
    );
    write_file(
        &path.join("portfolio_caps.json"),
        r#"{"max_investment": 1000000}"#,
    );

    let name = path.canonicalize().unwrap();
    let name = name.file_name().unwrap().to_string_lossy();
    write_file(
        &path.join("results").join(format!("{name}.sol")),
        SAMPLE_SOLUTION,
    );

    dir
}
