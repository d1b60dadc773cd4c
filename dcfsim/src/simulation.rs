use std::rc::Rc;

use rand::RngCore;
use rand_chacha::{rand_core::SeedableRng, ChaChaRng};
use serde::{Deserialize, Serialize};
use simproc::Simulation;

use crate::{
    BackoffHistogram, Channel, Result, Round, RunConfig, Station, StationId, StationKeys,
    StationStats, Timing, VhtTiming,
};

/// A single run: a channel with a number of contending stations, simulated up to a horizon.
pub struct DcfSimulation {
    config: RunConfig,
    timing: Rc<dyn Timing>,
    record_rounds: bool,
}

impl DcfSimulation {
    /// Creates a run using [`VhtTiming`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: RunConfig) -> Result<Self> {
        Self::with_timing(config, Rc::new(VhtTiming))
    }

    /// Creates a run using a custom timing provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid for the given timing.
    pub fn with_timing(config: RunConfig, timing: Rc<dyn Timing>) -> Result<Self> {
        config.validate(timing.as_ref())?;
        Ok(Self {
            config,
            timing,
            record_rounds: false,
        })
    }

    /// Keeps the summary of every transmission round in the outcome.
    #[must_use]
    pub fn record_rounds(mut self) -> Self {
        self.record_rounds = true;
        self
    }

    /// Runs the simulation up to the configured horizon.
    ///
    /// Each station draws from its own generator, seeded from a master generator seeded with
    /// the run's seed, so the outcome is fully determined by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the simulation kernel detects an inconsistency.
    pub fn run(&self) -> Result<RunOutcome> {
        let mut sim = Simulation::default();
        let tx_lock = sim.add_mutex();
        let mut channel = Channel::new(tx_lock, self.config.stations);
        if self.record_rounds {
            channel = channel.with_history();
        }
        let channel = sim.state.insert(channel);
        let backoffs = sim.state.insert(BackoffHistogram::default());

        let mut master = ChaChaRng::seed_from_u64(self.config.seed);
        let stats: Vec<_> = (1..=self.config.stations)
            .map(|id| -> Result<_> {
                let keys = StationKeys {
                    channel,
                    backoffs,
                    stats: sim.state.insert(StationStats::default()),
                };
                let station = Station::new(
                    StationId::from(id),
                    self.config.station,
                    Rc::clone(&self.timing),
                    ChaChaRng::seed_from_u64(master.next_u64()),
                    keys,
                )?;
                sim.add_process(station);
                Ok(keys.stats)
            })
            .collect::<Result<_>>()?;

        let horizon = sim.run_until(self.config.horizon)?;
        log::debug!(
            "Run with {} stations reached {:?} after {} rounds",
            self.config.stations,
            horizon,
            sim.state
                .get(channel)
                .map_or(0, Channel::rounds)
        );

        let missing = || simproc::Error::MissingValue;
        let channel = sim.state.remove(channel).ok_or_else(missing)?;
        let outcome = RunOutcome {
            config: self.config.clone(),
            failed: channel.failed(),
            succeeded: channel.succeeded(),
            bytes_sent: channel.bytes_sent(),
            rounds: channel.rounds(),
            history: channel.history().map(<[Round]>::to_vec),
            stations: stats
                .into_iter()
                .map(|key| sim.state.remove(key).ok_or_else(missing))
                .collect::<std::result::Result<_, _>>()?,
            backoffs: sim.state.remove(backoffs).ok_or_else(missing)?,
        };
        log::info!(
            "SEED = {} N={} CW_MIN = {} CW_MAX = {} PCOLL: {:.4} THR: {} \
             FAILED_TRANSMISSIONS: {} SUCCEEDED_TRANSMISSION {}",
            outcome.config.seed,
            outcome.config.stations,
            outcome.config.station.cw_min,
            outcome.config.station.cw_max,
            outcome.collision_probability(),
            outcome.throughput(),
            outcome.failed,
            outcome.succeeded
        );
        Ok(outcome)
    }
}

/// Final counters of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Configuration of the run.
    pub config: RunConfig,
    /// Collided transmissions of all stations.
    pub failed: u64,
    /// Successful transmissions of all stations.
    pub succeeded: u64,
    /// Payload bytes delivered.
    pub bytes_sent: u64,
    /// Number of transmission rounds.
    pub rounds: usize,
    /// Summaries of all rounds, if requested with [`DcfSimulation::record_rounds`].
    pub history: Option<Vec<Round>>,
    /// Per-station counters, in the order of station IDs.
    pub stations: Vec<StationStats>,
    /// Drawn backoff values.
    pub backoffs: BackoffHistogram,
}

impl RunOutcome {
    /// Fraction of transmissions that collided; zero if nothing was transmitted.
    #[must_use]
    pub fn collision_probability(&self) -> f64 {
        let total = self.failed + self.succeeded;
        if total == 0 {
            0.0
        } else {
            self.failed as f64 / total as f64
        }
    }

    /// Delivered payload in Mb/s.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        (self.bytes_sent * 8) as f64 / self.config.horizon.as_micros() as f64
    }

    /// Frames dropped by all stations after exceeding the retry limit.
    #[must_use]
    pub fn retry_drops(&self) -> u64 {
        self.stations.iter().map(|s| s.retry_drops).sum()
    }

    /// Creates the output record of this run.
    #[must_use]
    pub fn record(&self, timestamp: String) -> RunRecord {
        RunRecord {
            timestamp,
            cw_min: self.config.station.cw_min,
            cw_max: self.config.station.cw_max,
            stations: self.config.stations,
            seed: self.config.seed,
            p_coll: format!("{:.4}", self.collision_probability()),
            throughput: self.throughput(),
            failed: self.failed,
            succeeded: self.succeeded,
            payload: self.config.station.payload,
            mcs: self.config.station.mcs,
        }
    }
}

/// A row of the results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RunRecord {
    /// When the run finished.
    pub timestamp: String,
    /// Minimum contention window.
    pub cw_min: u32,
    /// Maximum contention window.
    pub cw_max: u32,
    /// Number of stations.
    #[serde(rename = "N_OF_STATIONS")]
    pub stations: usize,
    /// Seed of the run.
    pub seed: u64,
    /// Collision probability, with four decimal places.
    pub p_coll: String,
    /// Throughput in Mb/s.
    #[serde(rename = "THR")]
    pub throughput: f64,
    /// Collided transmissions.
    #[serde(rename = "FAILED_TRANSMISSIONS")]
    pub failed: u64,
    /// Successful transmissions.
    #[serde(rename = "SUCCEEDED_TRANSMISSIONS")]
    pub succeeded: u64,
    /// Payload size in bytes.
    pub payload: u32,
    /// MCS index.
    pub mcs: u8,
}
