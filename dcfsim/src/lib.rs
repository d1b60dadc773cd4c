//! IEEE 802.11 DCF channel access simulation.
//!
//! A population of stations contends for a shared medium using exponential-backoff CSMA/CA.
//! Each station is a [`simproc::Process`] driving itself through backoff, transmission, and
//! collision handling against the shared [`Channel`]. A run yields the collision probability
//! and throughput, see [`RunOutcome`].

#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::default_trait_access,
    clippy::cast_precision_loss
)]

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

mod batch;
pub use batch::{run_batch, BatchResults};

mod channel;
pub use channel::{Channel, Round};

mod config;
pub use config::{BatchConfig, ConfigError, RunConfig, StationConfig};

mod frame;
pub use frame::Frame;

mod histogram;
pub use histogram::{BackoffHistogram, HistogramRow};

pub mod output;

mod simulation;
pub use simulation::{DcfSimulation, RunOutcome, RunRecord};

mod station;
pub use station::{
    backoff_upper_limit, draw_backoff, Station, StationKeys, StationStats, SENSING_DELAY,
};

mod timing;
pub use timing::{Timing, VhtTiming};

/// Station ID.
#[derive(
    From,
    Into,
    Debug,
    PartialEq,
    PartialOrd,
    Eq,
    Ord,
    Serialize,
    Deserialize,
    Copy,
    Clone,
    Hash,
    Display,
)]
pub struct StationId(usize);

/// Error type encompassing all failures of a simulation run and of storing its results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The run was configured incorrectly.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The simulation kernel detected an internal inconsistency.
    #[error("simulation failed: {0}")]
    Simulation(#[from] simproc::Error),
    /// Failed to write results.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to serialize results.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result alias using [`Error`](enum.Error.html).
pub type Result<T> = std::result::Result<T, Error>;
