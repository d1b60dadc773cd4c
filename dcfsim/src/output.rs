//! Persistence of batch results as CSV files.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::{BackoffHistogram, BatchResults, Result, RunRecord};

/// Name of the file with one [`RunRecord`] per run.
pub const RESULTS_FILE: &str = "results.csv";

/// Name of the file with the backoff histogram.
pub const BACKOFFS_FILE: &str = "backoffs.csv";

/// Writes the run records, with a header row.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_records<W: Write>(writer: W, records: &[RunRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the histogram in the long format, one row per backoff value and station count.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_backoffs<W: Write>(writer: W, backoffs: &BackoffHistogram) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in backoffs.rows() {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Name of the results directory of a batch labeled `label` and started at `time`.
#[must_use]
pub fn directory_name(time: SystemTime, label: &str) -> String {
    let timestamp = humantime::format_rfc3339_seconds(time)
        .to_string()
        .replace(':', "-");
    format!("{}-{}", timestamp, label)
}

/// Creates a new directory for the results under `output_dir`, and writes both result files
/// into it. Returns the path to the created directory.
///
/// # Errors
///
/// Returns an error if the directory already exists, or creating or writing the files fails.
pub fn save(
    output_dir: &Path,
    time: SystemTime,
    label: &str,
    results: &BatchResults,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(directory_name(time, label));
    std::fs::create_dir(&path)?;
    write_records(
        std::fs::File::create(path.join(RESULTS_FILE))?,
        &results.records,
    )?;
    write_backoffs(
        std::fs::File::create(path.join(BACKOFFS_FILE))?,
        &results.backoffs,
    )?;
    log::info!("Results saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_directory_name() {
        let time = UNIX_EPOCH + Duration::from_secs(86_400 + 3_723);
        assert_eq!(
            directory_name(time, "dcf"),
            "1970-01-02T01-02-03Z-dcf"
        );
    }

    #[test]
    fn test_write_backoffs() {
        let mut histogram = BackoffHistogram::default();
        histogram.record(3, 2);
        histogram.record(0, 1);
        histogram.record(3, 2);
        let mut buffer = Vec::new();
        write_backoffs(&mut buffer, &histogram).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "BACKOFF,N_OF_STATIONS,COUNT\n0,1,1\n3,2,2\n"
        );
    }
}
