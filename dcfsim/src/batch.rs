use std::time::SystemTime;

use indicatif::ProgressBar;
use rayon::prelude::*;

use crate::{BackoffHistogram, BatchConfig, DcfSimulation, Result, RunOutcome, RunRecord};

/// Outcomes of all runs of a batch.
#[derive(Debug, Clone)]
pub struct BatchResults {
    /// Outcomes in the order of [`BatchConfig::runs`].
    pub outcomes: Vec<RunOutcome>,
    /// Output records, in the same order, stamped with the time each run finished.
    pub records: Vec<RunRecord>,
    /// Backoff histogram merged across all runs.
    pub backoffs: BackoffHistogram,
}

/// Executes all runs of the batch in parallel. Each run is independent and builds its own
/// simulation, so the outcomes do not depend on the number of threads.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, or if any run fails.
pub fn run_batch(config: &BatchConfig, pb: &ProgressBar) -> Result<BatchResults> {
    config.validate()?;
    let runs = config.runs();
    log::info!(
        "Running {} simulations of {:?} each",
        runs.len(),
        config.horizon
    );
    pb.set_length(runs.len() as u64);
    let finished = runs
        .into_par_iter()
        .map(|run| -> Result<_> {
            let outcome = DcfSimulation::new(run)?.run()?;
            let timestamp = humantime::format_rfc3339_seconds(SystemTime::now()).to_string();
            pb.inc(1);
            Ok((outcome, timestamp))
        })
        .collect::<Result<Vec<_>>>()?;
    pb.finish();

    let mut backoffs = BackoffHistogram::default();
    let mut outcomes = Vec::with_capacity(finished.len());
    let mut records = Vec::with_capacity(finished.len());
    for (outcome, timestamp) in finished {
        backoffs.merge(&outcome.backoffs);
        records.push(outcome.record(timestamp));
        outcomes.push(outcome);
    }
    log::info!(
        "Finished {} runs; {} retry drops in total",
        outcomes.len(),
        outcomes.iter().map(RunOutcome::retry_drops).sum::<u64>()
    );
    Ok(BatchResults {
        outcomes,
        records,
        backoffs,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_small_batch() {
        let config = BatchConfig {
            max_stations: 3,
            seeds: 2,
            horizon: Duration::from_millis(200),
            ..BatchConfig::default()
        };
        let results = run_batch(&config, &ProgressBar::hidden()).unwrap();
        assert_eq!(results.outcomes.len(), 6);
        assert_eq!(
            results
                .records
                .iter()
                .map(|r| (r.seed, r.stations))
                .collect::<Vec<_>>(),
            vec![(33, 1), (33, 2), (33, 3), (66, 1), (66, 2), (66, 3)]
        );
        assert_eq!(
            results.backoffs.total(),
            results
                .outcomes
                .iter()
                .map(|o| o.backoffs.total())
                .sum::<u64>()
        );
        for record in &results.records {
            if record.stations == 1 {
                assert_eq!(record.p_coll, "0.0000");
            }
        }
    }

    #[test]
    fn test_invalid_batch() {
        let config = BatchConfig {
            max_stations: 0,
            ..BatchConfig::default()
        };
        assert!(run_batch(&config, &ProgressBar::hidden()).is_err());
    }
}
