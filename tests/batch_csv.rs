use std::fs;
use std::path::Path;

use tempfile::{tempdir, TempDir};
use timegrid::{
    assemble_stays, load_lab_csv, load_vital_csv, run_batch, write_dense_csv, write_sparse_csv,
    ConfigError, GridConfig, GridError, GridTransformer, InputError, OutputMode, QuantileTable,
    VariableSelection,
};

fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("fixture should be written");
    path
}

fn flat(median: f64) -> Vec<f64> {
    vec![median; 99]
}

struct Fixture {
    _dir: TempDir,
    stays: Vec<timegrid::StayTables>,
    quantiles: QuantileTable,
}

fn fixture() -> Fixture {
    let dir = tempdir().expect("temp dir should be created");
    let labs = write(
        dir.path(),
        "lab.csv",
        "patientunitstayid,labname,labresultoffset,labresult\n\
         10,sodium,30,140\n\
         10,sodium,95,\n\
         20,sodium,5,133.5\n\
         30,sodium,0,150\n",
    );
    let periodic = write(
        dir.path(),
        "vitalPeriodic.csv",
        "patientunitstayid,observationoffset,heartrate,sao2\n\
         10,0,80,97\n\
         10,60,82,\n\
         10,120.0,,96\n\
         10,125,84,\n\
         20,10,100,90\n\
         20,70,101,91\n\
         30,0,,99\n",
    );
    let aperiodic = write(
        dir.path(),
        "vitalAperiodic.csv",
        "patientunitstayid,observationoffset,noninvasivemean\n\
         10,61,75\n",
    );
    let quantiles_path = write(
        dir.path(),
        "quantiles.json",
        &serde_json::json!({
            "periodic_heartrate": flat(75.0),
            "periodic_sao2": flat(97.5),
            "aperiodic_noninvasivemean": flat(80.0),
            "lab_sodium": flat(139.0),
        })
        .to_string(),
    );

    let stays = assemble_stays(
        load_lab_csv(&labs).expect("labs load"),
        load_vital_csv(&periodic).expect("periodic loads"),
        load_vital_csv(&aperiodic).expect("aperiodic loads"),
    );
    let quantiles = QuantileTable::load(&quantiles_path).expect("quantiles load");

    Fixture {
        _dir: dir,
        stays,
        quantiles,
    }
}

fn selection() -> VariableSelection {
    VariableSelection {
        periodic: vec!["heartrate".to_string(), "sao2".to_string()],
        aperiodic: vec!["noninvasivemean".to_string()],
        lab: vec!["sodium".to_string()],
    }
}

#[test]
fn csv_inputs_group_by_stay() {
    let fx = fixture();
    let ids: Vec<i64> = fx.stays.iter().map(|stay| stay.patient_id).collect();
    assert_eq!(ids, vec![10, 20, 30]);

    let first = &fx.stays[0];
    assert_eq!(first.periodic.variables, vec!["heartrate", "sao2"]);
    assert_eq!(first.periodic.rows.len(), 4);
    assert_eq!(first.periodic.series("heartrate").offset_range(), Some((0, 125)));
    assert_eq!(first.labs.series("sodium").len(), 1);
    assert!(fx.stays[1].aperiodic.rows.is_empty());
}

#[test]
fn batch_skips_stays_without_anchor_and_writes_both_modes() {
    let fx = fixture();
    let transformer = GridTransformer::new(&fx.quantiles);
    let output = run_batch(
        &fx.stays,
        &transformer,
        &GridConfig::default(),
        &selection(),
        OutputMode::Both,
    )
    .expect("batch succeeds");

    assert_eq!(output.report.stays_total, 3);
    assert_eq!(output.report.stays_gridded, 2);
    assert_eq!(output.report.stays_skipped, 1);
    assert_eq!(output.report.skipped_patient_ids, vec![30]);
    assert_eq!(output.dense.len(), 2);
    assert_eq!(output.sparse.len(), 2);

    // Stay 10: anchor range [0, 125] at step 60 -> 0, 60, 120.
    let dense = &output.dense[0];
    assert_eq!(dense.timestamps, vec![0, 60, 120]);
    assert_eq!(dense.column("vs_heartrate").unwrap(), &[80.0, 82.0, 82.0]);
    assert_eq!(dense.column("vs_sao2").unwrap(), &[97.0, 97.0, 96.0]);
    assert_eq!(
        dense.column("avs_noninvasivemean").unwrap(),
        &[80.0, 80.0, 75.0]
    );
    assert_eq!(dense.column("lab_sodium").unwrap(), &[139.0, 140.0, 140.0]);

    let mut dense_buf = Vec::new();
    let dense_rows = write_dense_csv(&output.dense, &mut dense_buf).unwrap();
    assert_eq!(dense_rows, output.report.dense_rows);
    let dense_text = String::from_utf8(dense_buf).unwrap();
    assert!(dense_text.starts_with(
        "ts,patientunitstayid,vs_heartrate,vs_sao2,avs_noninvasivemean,lab_sodium\n0,10,80,97,80,139\n"
    ));

    let mut sparse_buf = Vec::new();
    let sparse_rows = write_sparse_csv(&output.sparse, &mut sparse_buf).unwrap();
    assert_eq!(sparse_rows, output.report.sparse_rows);
    let sparse_text = String::from_utf8(sparse_buf).unwrap();
    let lines: Vec<&str> = sparse_text.lines().collect();
    assert_eq!(
        lines[0],
        "patientunitstayid,ts,vs_heartrate,vs_sao2,avs_noninvasivemean,lab_sodium"
    );
    assert_eq!(lines[1], "10,0,80,97,,");
    assert!(lines.contains(&"10,30,,,,140"));
    assert!(lines.contains(&"10,61,,,75,"));
    assert!(lines.contains(&"20,10,100,90,,"));
}

#[test]
fn dense_only_mode_produces_no_sparse_tables() {
    let fx = fixture();
    let transformer = GridTransformer::new(&fx.quantiles);
    let output = run_batch(
        &fx.stays,
        &transformer,
        &GridConfig::default(),
        &selection(),
        OutputMode::Dense,
    )
    .unwrap();

    assert_eq!(output.dense.len(), 2);
    assert!(output.sparse.is_empty());
    assert_eq!(output.report.sparse_rows, 0);
}

#[test]
fn missing_quantile_aborts_the_batch() {
    let fx = fixture();
    let transformer = GridTransformer::new(&fx.quantiles);
    let mut sel = selection();
    sel.lab.push("lactate".to_string());

    let err = run_batch(
        &fx.stays,
        &transformer,
        &GridConfig::default(),
        &sel,
        OutputMode::Dense,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        GridError::Configuration(ConfigError::MissingQuantile { ref key }) if key == "lab_lactate"
    ));
}

#[test]
fn malformed_inputs_are_reported() {
    let dir = tempdir().unwrap();
    let missing_col = write(
        dir.path(),
        "vitals.csv",
        "patientunitstayid,heartrate\n1,80\n",
    );
    assert!(matches!(
        load_vital_csv(&missing_col),
        Err(InputError::MissingColumn {
            column: "observationoffset",
            ..
        })
    ));

    let bad_value = write(
        dir.path(),
        "labs.csv",
        "patientunitstayid,labname,labresultoffset,labresult\n1,sodium,5,high\n",
    );
    assert!(matches!(
        load_lab_csv(&bad_value),
        Err(InputError::ParseField { .. })
    ));
}

#[test]
fn fractional_stay_id_is_rejected_as_an_id() {
    let dir = tempdir().unwrap();
    let vitals = write(
        dir.path(),
        "vitals.csv",
        "patientunitstayid,observationoffset,heartrate\n12.0,5,80\n",
    );

    match load_vital_csv(&vitals) {
        Err(InputError::ParseField { field, value, .. }) => {
            assert_eq!(field, "patientunitstayid");
            assert_eq!(value, "12.0");
        }
        other => panic!("expected a stay id parse error, got {other:?}"),
    }
}

#[test]
fn infinite_readings_fall_back_to_the_median() {
    let dir = tempdir().unwrap();
    let periodic = write(
        dir.path(),
        "vitalPeriodic.csv",
        "patientunitstayid,observationoffset,heartrate,sao2\n\
         7,0,80,inf\n\
         7,60,-inf,96\n\
         7,120,82,\n",
    );
    let stays = assemble_stays(
        Default::default(),
        load_vital_csv(&periodic).unwrap(),
        Default::default(),
    );
    let quantiles = QuantileTable::from_json_str(
        &serde_json::json!({
            "periodic_heartrate": flat(75.0),
            "periodic_sao2": flat(97.5),
        })
        .to_string(),
    )
    .unwrap();
    let sel = VariableSelection {
        periodic: vec!["heartrate".to_string(), "sao2".to_string()],
        aperiodic: Vec::new(),
        lab: Vec::new(),
    };

    let table = GridTransformer::new(&quantiles)
        .transform(&stays[0], &GridConfig::default(), &sel)
        .unwrap();
    assert_eq!(table.timestamps, vec![0, 60, 120]);
    assert_eq!(table.column("vs_heartrate").unwrap(), &[80.0, 80.0, 82.0]);
    assert_eq!(table.column("vs_sao2").unwrap(), &[97.5, 96.0, 96.0]);
}

#[test]
fn stay_with_extreme_offsets_is_skipped_not_fatal() {
    let dir = tempdir().unwrap();
    let periodic = write(
        dir.path(),
        "vitalPeriodic.csv",
        &format!(
            "patientunitstayid,observationoffset,heartrate\n\
             1,{},80\n\
             1,0,81\n\
             1,{},82\n\
             2,0,90\n",
            i64::MIN,
            i64::MAX
        ),
    );
    let stays = assemble_stays(
        Default::default(),
        load_vital_csv(&periodic).unwrap(),
        Default::default(),
    );
    let quantiles = QuantileTable::from_json_str(
        &serde_json::json!({ "periodic_heartrate": flat(75.0) }).to_string(),
    )
    .unwrap();
    let sel = VariableSelection {
        periodic: vec!["heartrate".to_string()],
        aperiodic: Vec::new(),
        lab: Vec::new(),
    };

    let output = run_batch(
        &stays,
        &GridTransformer::new(&quantiles),
        &GridConfig::default(),
        &sel,
        OutputMode::Both,
    )
    .expect("an oversized stay does not abort the batch");
    assert_eq!(output.report.skipped_patient_ids, vec![1]);
    assert_eq!(output.report.stays_gridded, 1);
    assert_eq!(output.dense[0].patient_id, 2);
}
