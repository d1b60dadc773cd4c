use std::time::Duration;

/// Provides the PHY/MAC timing of the simulated network.
///
/// All durations are whole microseconds, the unit of the simulation clock.
pub trait Timing {
    /// Duration of a single backoff slot.
    fn slot(&self) -> Duration;
    /// Short interframe space.
    fn sifs(&self) -> Duration;
    /// Distributed (DCF) interframe space.
    fn difs(&self) -> Duration;
    /// How long a transmitter waits for an ACK before declaring the frame lost.
    fn ack_timeout(&self) -> Duration;
    /// Air time of an ACK frame.
    fn ack_duration(&self) -> Duration;
    /// Air time of a data frame carrying `payload` bytes, sent with the given MCS index.
    /// Returns `None` if the MCS is not supported.
    fn frame_duration(&self, payload: u32, mcs: u8) -> Option<Duration>;
}

const SLOT: u64 = 9;
const SIFS: u64 = 16;
const DIFS: u64 = SIFS + 2 * SLOT;
const PHY_RX_START_DELAY: u64 = 20;
const SYMBOL: u64 = 4;
const LEGACY_PREAMBLE: u64 = 20;
const VHT_PREAMBLE: u64 = 40;
const SERVICE_BITS: u64 = 16;
const TAIL_BITS: u64 = 6;
/// QoS data header (26), LLC/SNAP (8), and FCS (4).
const MAC_OVERHEAD: u64 = 38;
const ACK_BYTES: u64 = 14;
/// Control responses go at 24 Mb/s legacy OFDM.
const ACK_BITS_PER_SYMBOL: u64 = 96;
/// Data bits per OFDM symbol, 20 MHz, one spatial stream, long guard interval.
const VHT_BITS_PER_SYMBOL: [u64; 9] = [26, 52, 78, 104, 156, 208, 234, 260, 312];

fn symbols(bits: u64, bits_per_symbol: u64) -> u64 {
    (bits + bits_per_symbol - 1) / bits_per_symbol
}

/// 802.11ac timing for a 20 MHz channel and a single spatial stream.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use dcfsim::{Timing, VhtTiming};
/// let timing = VhtTiming;
/// assert_eq!(timing.difs(), Duration::from_micros(34));
/// assert_eq!(timing.frame_duration(1472, 7), Some(Duration::from_micros(228)));
/// assert_eq!(timing.frame_duration(1472, 9), None);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VhtTiming;

impl Timing for VhtTiming {
    fn slot(&self) -> Duration {
        Duration::from_micros(SLOT)
    }

    fn sifs(&self) -> Duration {
        Duration::from_micros(SIFS)
    }

    fn difs(&self) -> Duration {
        Duration::from_micros(DIFS)
    }

    fn ack_timeout(&self) -> Duration {
        Duration::from_micros(SIFS + SLOT + PHY_RX_START_DELAY)
    }

    fn ack_duration(&self) -> Duration {
        let bits = SERVICE_BITS + 8 * ACK_BYTES + TAIL_BITS;
        Duration::from_micros(LEGACY_PREAMBLE + SYMBOL * symbols(bits, ACK_BITS_PER_SYMBOL))
    }

    fn frame_duration(&self, payload: u32, mcs: u8) -> Option<Duration> {
        let bits_per_symbol = *VHT_BITS_PER_SYMBOL.get(usize::from(mcs))?;
        let bits = SERVICE_BITS + 8 * (u64::from(payload) + MAC_OVERHEAD) + TAIL_BITS;
        Some(Duration::from_micros(
            VHT_PREAMBLE + SYMBOL * symbols(bits, bits_per_symbol),
        ))
    }
}
