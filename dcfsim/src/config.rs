use std::time::Duration;

use itertools::iproduct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Timing, VhtTiming};

/// Rejected configuration. Nothing is ever clamped into range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The minimum contention window exceeds the maximum.
    #[error("cw_min ({cw_min}) must not exceed cw_max ({cw_max})")]
    ContentionWindow {
        /// Configured minimum.
        cw_min: u32,
        /// Configured maximum.
        cw_max: u32,
    },
    /// A run needs at least one station.
    #[error("number of stations must be positive")]
    NoStations,
    /// Frames must carry a payload.
    #[error("payload must be positive")]
    EmptyPayload,
    /// The timing provider has no rate for this MCS index.
    #[error("unsupported MCS index: {0}")]
    UnsupportedMcs(u8),
    /// The simulated time must be positive.
    #[error("simulation time must be positive")]
    ZeroHorizon,
}

/// Per-station MAC parameters, shared by all stations of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Payload size in bytes.
    pub payload: u32,
    /// Minimum contention window.
    pub cw_min: u32,
    /// Maximum contention window.
    pub cw_max: u32,
    /// Number of retransmissions allowed before the frame is dropped.
    pub retry_limit: u32,
    /// Modulation and coding scheme index.
    pub mcs: u8,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            payload: 1472,
            cw_min: 15,
            cw_max: 1023,
            retry_limit: 7,
            mcs: 7,
        }
    }
}

impl StationConfig {
    /// Checks the parameters against the given timing provider.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self, timing: &dyn Timing) -> Result<(), ConfigError> {
        if self.cw_min > self.cw_max {
            return Err(ConfigError::ContentionWindow {
                cw_min: self.cw_min,
                cw_max: self.cw_max,
            });
        }
        if self.payload == 0 {
            return Err(ConfigError::EmptyPayload);
        }
        if timing.frame_duration(self.payload, self.mcs).is_none() {
            return Err(ConfigError::UnsupportedMcs(self.mcs));
        }
        Ok(())
    }
}

fn default_horizon() -> Duration {
    Duration::from_secs(100)
}

fn default_max_stations() -> usize {
    10
}

fn default_seeds() -> u64 {
    5
}

fn default_label() -> String {
    String::from("dcf")
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_duration<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*duration))
}

fn deserialize_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

/// Configuration of a single simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Station parameters.
    #[serde(flatten)]
    pub station: StationConfig,
    /// Number of contending stations.
    pub stations: usize,
    /// Seed of the run's random generators.
    #[serde(default)]
    pub seed: u64,
    /// Simulated time.
    #[serde(
        default = "default_horizon",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub horizon: Duration,
}

impl RunConfig {
    /// Creates a run of `stations` stations with default parameters and a 100 second horizon.
    #[must_use]
    pub fn new(stations: usize, seed: u64) -> Self {
        Self {
            station: StationConfig::default(),
            stations,
            seed,
            horizon: default_horizon(),
        }
    }

    /// Checks the configuration against the given timing provider.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self, timing: &dyn Timing) -> Result<(), ConfigError> {
        if self.stations == 0 {
            return Err(ConfigError::NoStations);
        }
        if self.horizon == Duration::default() {
            return Err(ConfigError::ZeroHorizon);
        }
        self.station.validate(timing)
    }
}

/// Configuration of a grid of runs: every station count up to `max_stations`, each repeated
/// with `seeds` different seeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Station parameters shared by all runs.
    #[serde(flatten)]
    pub station: StationConfig,
    /// Runs are executed for `1..=max_stations` stations.
    #[serde(default = "default_max_stations")]
    pub max_stations: usize,
    /// Number of runs per station count.
    #[serde(default = "default_seeds")]
    pub seeds: u64,
    /// Simulated time of each run.
    #[serde(
        default = "default_horizon",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub horizon: Duration,
    /// Suffix of the results directory.
    #[serde(default = "default_label")]
    pub label: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            station: StationConfig::default(),
            max_stations: default_max_stations(),
            seeds: default_seeds(),
            horizon: default_horizon(),
            label: default_label(),
        }
    }
}

impl BatchConfig {
    /// Expands the grid into individual runs, ordered by seed and then station count.
    /// The `i`-th seed (counting from 1) is `i * 33`.
    #[must_use]
    pub fn runs(&self) -> Vec<RunConfig> {
        iproduct!(1..=self.seeds, 1..=self.max_stations)
            .map(|(i, stations)| RunConfig {
                station: self.station,
                stations,
                seed: i * 33,
                horizon: self.horizon,
            })
            .collect()
    }

    /// Checks the configuration against the default timing provider.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_stations == 0 {
            return Err(ConfigError::NoStations);
        }
        if self.horizon == Duration::default() {
            return Err(ConfigError::ZeroHorizon);
        }
        self.station.validate(&VhtTiming)
    }
}
