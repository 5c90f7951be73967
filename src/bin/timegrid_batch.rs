use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;

use timegrid::{
    assemble_stays, init_logging, load_grid_config, load_lab_csv, load_vital_csv, log_app_start,
    log_inputs_selected, log_output_written, logging_config_from_env, read_lab_variable_list,
    read_variable_list, run_batch, write_dense_csv, write_sparse_csv, GridConfig, GridTransformer,
    OutputMode, QuantileTable, VariableSelection,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let lab_csv = required_path("TIMEGRID_LAB_CSV")?;
    let periodic_csv = required_path("TIMEGRID_PERIODIC_CSV")?;
    let aperiodic_csv = required_path("TIMEGRID_APERIODIC_CSV")?;
    let quantiles_json = required_path("TIMEGRID_QUANTILES")?;
    log_inputs_selected(&lab_csv, &periodic_csv, &aperiodic_csv, &quantiles_json);

    let selection = VariableSelection {
        periodic: read_variable_list(&required_path("TIMEGRID_PERIODIC_VARS")?)?,
        aperiodic: read_variable_list(&required_path("TIMEGRID_APERIODIC_VARS")?)?,
        lab: read_lab_variable_list(&required_path("TIMEGRID_LAB_VARS")?)?,
    };
    let config = match std::env::var_os("TIMEGRID_CONFIG") {
        Some(path) => load_grid_config(&PathBuf::from(path))?,
        None => GridConfig::default(),
    };
    let mode = match std::env::var("TIMEGRID_MODE") {
        Ok(raw) => OutputMode::parse(&raw)
            .ok_or_else(|| format!("TIMEGRID_MODE must be dense, async or both, got '{raw}'"))?,
        Err(_) => OutputMode::Dense,
    };
    let output_dir = std::env::var_os("TIMEGRID_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("out"));

    let quantiles = QuantileTable::load(&quantiles_json)?;
    let stays = assemble_stays(
        load_lab_csv(&lab_csv)?,
        load_vital_csv(&periodic_csv)?,
        load_vital_csv(&aperiodic_csv)?,
    );

    let transformer = GridTransformer::new(&quantiles);
    let output = run_batch(&stays, &transformer, &config, &selection, mode)?;

    fs::create_dir_all(&output_dir)?;
    if !output.dense.is_empty() {
        let path = output_dir.join("dense.csv");
        let rows = write_dense_csv(&output.dense, BufWriter::new(fs::File::create(&path)?))?;
        log_output_written("dense", &path, Some(rows));
    }
    if !output.sparse.is_empty() {
        let path = output_dir.join("async.csv");
        let rows = write_sparse_csv(&output.sparse, BufWriter::new(fs::File::create(&path)?))?;
        log_output_written("async", &path, Some(rows));
    }

    let report_path = output_dir.join("report.json");
    fs::write(&report_path, serde_json::to_vec_pretty(&output.report)?)?;
    log_output_written("report", &report_path, None);

    Ok(())
}

fn required_path(var: &str) -> Result<PathBuf, String> {
    std::env::var_os(var)
        .map(PathBuf::from)
        .ok_or_else(|| format!("{var} must be set"))
}
