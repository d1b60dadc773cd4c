use std::time::{Duration, SystemTime};

use dcfsim::{output, run_batch, BatchConfig, HistogramRow, RunRecord};
use indicatif::ProgressBar;

#[test]
fn test_save_batch_results() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = BatchConfig {
        max_stations: 2,
        seeds: 2,
        horizon: Duration::from_millis(100),
        label: String::from("test"),
        ..BatchConfig::default()
    };
    let results = run_batch(&config, &ProgressBar::hidden())?;
    let started = SystemTime::now();
    let path = output::save(dir.path(), started, &config.label, &results)?;
    assert_eq!(path.parent(), Some(dir.path()));
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("-test"));

    let mut reader = csv::Reader::from_path(path.join(output::RESULTS_FILE))?;
    assert_eq!(
        reader.headers()?.iter().collect::<Vec<_>>(),
        vec![
            "TIMESTAMP",
            "CW_MIN",
            "CW_MAX",
            "N_OF_STATIONS",
            "SEED",
            "P_COLL",
            "THR",
            "FAILED_TRANSMISSIONS",
            "SUCCEEDED_TRANSMISSIONS",
            "PAYLOAD",
            "MCS"
        ]
    );
    let records = reader
        .deserialize()
        .collect::<Result<Vec<RunRecord>, _>>()?;
    assert_eq!(records, results.records);
    assert!(records.iter().all(|r| r.p_coll.len() == 6));

    let mut reader = csv::Reader::from_path(path.join(output::BACKOFFS_FILE))?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<HistogramRow>, _>>()?;
    assert_eq!(rows, results.backoffs.rows().collect::<Vec<_>>());
    assert!(rows.iter().all(|row| row.backoff <= 1023));

    // The same directory cannot be created twice.
    assert!(output::save(dir.path(), started, &config.label, &results).is_err());
    Ok(())
}
