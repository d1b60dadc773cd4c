use std::fmt;
use std::time::Duration;

use crate::StationId;

/// A MAC frame waiting to be delivered, together with its delivery history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Air time of the frame.
    pub duration: Duration,
    /// The station sending the frame.
    pub station: StationId,
    /// Payload size in bytes.
    pub payload: u32,
    /// When the frame was generated.
    pub created: Duration,
    /// When the frame was successfully delivered.
    pub completed: Option<Duration>,
    /// Number of failed attempts so far.
    pub retransmissions: u32,
}

impl Frame {
    /// Creates a fresh frame generated at `created`.
    #[must_use]
    pub fn new(station: StationId, duration: Duration, payload: u32, created: Duration) -> Self {
        Self {
            duration,
            station,
            payload,
            created,
            completed: None,
            retransmissions: 0,
        }
    }

    /// Time between generation and successful delivery.
    #[must_use]
    pub fn time_to_send(&self) -> Option<Duration> {
        self.completed.map(|completed| completed - self.created)
    }

    /// Marks the frame delivered at `time`.
    pub fn complete(&mut self, time: Duration) {
        self.completed = Some(time);
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame: station={}, start={}, ",
            self.station,
            self.created.as_micros()
        )?;
        match self.time_to_send() {
            Some(elapsed) => write!(
                f,
                "end={}, time_to_send={}, ",
                self.completed.unwrap_or_default().as_micros(),
                elapsed.as_micros()
            )?,
            None => write!(f, "pending, ")?,
        }
        write!(
            f,
            "frame_time={}, retransmissions={}",
            self.duration.as_micros(),
            self.retransmissions
        )
    }
}
