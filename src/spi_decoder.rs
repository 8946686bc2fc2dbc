use crate::channel_config::SpiChannels;
use crate::edge_analysis::{bits_to_byte, Interval};
use crate::logic_analyzer::{AnalyzerError, LogicAnalyzer, SampleSpan, TimeBase};
use std::fmt;
use std::ops::Index;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpiDecodeError {
    #[error("No clock edges detected in transaction starting at {start}s")]
    NoClockEdges { start: f64 },

    #[error("Clock polarity could not be detected: SCK idles at different levels around the transaction at {start}s")]
    PhaseIndeterminate { start: f64 },

    #[error("Outbound and inbound SPI modes do not match at {start}s: master and slave are operating in different modes")]
    ModeMismatch { start: f64 },

    #[error("Transaction size not a multiple of 8 bits ({bits})")]
    MisalignedTransaction { bits: usize },

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
}

/// Clock polarity and phase, numbered the usual way (`CPOL << 1 | CPHA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpiMode {
    pub cpol: bool,
    pub cpha: bool,
}

impl SpiMode {
    pub const MODE0: Self = Self::new(false, false);
    pub const MODE1: Self = Self::new(false, true);
    pub const MODE2: Self = Self::new(true, false);
    pub const MODE3: Self = Self::new(true, true);

    pub const fn new(cpol: bool, cpha: bool) -> Self {
        Self { cpol, cpha }
    }

    pub fn value(self) -> u8 {
        u8::from(self.cpol) << 1 | u8::from(self.cpha)
    }

    pub fn from_value(value: u8) -> Self {
        Self::new(value & 2 != 0, value & 1 != 0)
    }

    /// Whether data is sampled on the falling clock edge.
    pub fn samples_on_falling(self) -> bool {
        self.cpol != self.cpha
    }
}

impl fmt::Display for SpiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:x} (CPOL={} CPHA={})",
            self.value(),
            u8::from(self.cpol),
            u8::from(self.cpha)
        )
    }
}

/// One chip-select-low interval worth of full-duplex traffic.
#[derive(Debug, Clone, PartialEq)]
pub struct SpiTransaction {
    pub outbound: Vec<u8>,
    pub inbound: Vec<u8>,
    pub mode: SpiMode,
    /// Seconds from CS assertion to the first clock edge.
    pub cs_lead_time: f64,
    /// Seconds from the last clock edge to CS release.
    pub cs_lag_time: f64,
    /// Bytes per second over the whole CS-low interval.
    pub data_rate: f64,
    pub span: SampleSpan,
}

impl SpiTransaction {
    pub fn len(&self) -> usize {
        self.outbound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty()
    }

    pub fn cpol(&self) -> bool {
        self.mode.cpol
    }

    pub fn cpha(&self) -> bool {
        self.mode.cpha
    }

    /// `(outbound, inbound)` byte pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.outbound.iter().copied().zip(self.inbound.iter().copied())
    }

    pub fn pretty(&self) -> String {
        let mut s = String::new();
        s += "      SPI Transaction\n";
        s += "-----------------------------\n";
        s += &format!("        Mode: 0x{:x}\n", self.mode.value());
        s += &format!("CS Lead Time: {:e}s\n", self.cs_lead_time);
        s += &format!(" CS Lag Time: {:e}s\n", self.cs_lag_time);
        s += &format!("   Data Rate: {:.0} B/s\n", self.data_rate);
        s += "        Data: Outbound  Inbound\n";
        for (i, (outbound, inbound)) in self.iter().enumerate() {
            s += &format!("         {:03}: 0x{:02x}      0x{:02x}\n", i, outbound, inbound);
        }
        s
    }
}

impl Index<usize> for SpiTransaction {
    type Output = u8;

    /// Outbound byte at `index`; use [`SpiTransaction::iter`] for pairs.
    fn index(&self, index: usize) -> &u8 {
        &self.outbound[index]
    }
}

impl fmt::Display for SpiTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .iter()
            .map(|(outbound, inbound)| format!("0x{:02x}/0x{:02x}", outbound, inbound))
            .collect();
        write!(
            f,
            "<SPI mode={}, {} bytes: {} (out/in)>",
            self.mode,
            self.len(),
            pairs.join(" ")
        )
    }
}

fn nearest_distance(time: f64, edges: &[f64]) -> f64 {
    edges
        .iter()
        .map(|edge| (time - edge).abs())
        .fold(f64::INFINITY, f64::min)
}

/// Whether a data line changes closer to rising than to falling clock edges,
/// on average. `None` when the line never changes.
fn launches_on_rising(data_edges: &[f64], rising: &[f64], falling: &[f64]) -> Option<bool> {
    if data_edges.is_empty() {
        return None;
    }
    let count = data_edges.len() as f64;
    let to_rising = data_edges.iter().map(|&t| nearest_distance(t, rising)).sum::<f64>() / count;
    let to_falling = data_edges.iter().map(|&t| nearest_distance(t, falling)).sum::<f64>() / count;
    Some(to_rising < to_falling)
}

/// SPI decoder over the MISO, MOSI, SCK and CS channels of a capture.
#[derive(Debug, Clone)]
pub struct SpiAnalyzer {
    analyzer: LogicAnalyzer,
    channels: SpiChannels,
}

impl SpiAnalyzer {
    pub fn new(analyzer: LogicAnalyzer, channels: SpiChannels) -> Result<Self, AnalyzerError> {
        for key in channels.keys() {
            if !analyzer.contains(key) {
                return Err(AnalyzerError::KeyNotFound {
                    key: key.to_string(),
                });
            }
        }
        Ok(Self { analyzer, channels })
    }

    /// Build an analyzer with the default `MISO`/`MOSI`/`SCK`/`CS` names.
    pub fn from_samples(
        timebase: impl Into<TimeBase>,
        miso: Vec<f64>,
        mosi: Vec<f64>,
        sck: Vec<f64>,
        cs: Vec<f64>,
    ) -> Result<Self, AnalyzerError> {
        let channels = SpiChannels::default();
        let mut analyzer = LogicAnalyzer::new(timebase);
        analyzer.set(channels.miso.as_str(), miso)?;
        analyzer.set(channels.mosi.as_str(), mosi)?;
        analyzer.set(channels.sck.as_str(), sck)?;
        analyzer.set(channels.cs.as_str(), cs)?;
        Ok(Self { analyzer, channels })
    }

    pub fn analyzer(&self) -> &LogicAnalyzer {
        &self.analyzer
    }

    pub fn channels(&self) -> &SpiChannels {
        &self.channels
    }

    /// Every interval during which chip select is held low.
    pub fn transaction_ranges(&self) -> Result<Vec<Interval>, SpiDecodeError> {
        Ok(self.analyzer.low_ranges(&self.channels.cs)?)
    }

    fn clock_polarity(&self, sub: &LogicAnalyzer, start: f64) -> Result<bool, SpiDecodeError> {
        let timebase = sub.timebase();
        let (Some(first), Some(last)) = (timebase.first(), timebase.last()) else {
            return Err(SpiDecodeError::NoClockEdges { start });
        };
        let sck = self.channels.sck.as_str();
        match (sub.state(sck, first)?, sub.state(sck, last)?) {
            (true, true) => Ok(true),
            (false, false) => Ok(false),
            _ => Err(SpiDecodeError::PhaseIndeterminate { start }),
        }
    }

    fn sample_bits(
        sub: &LogicAnalyzer,
        key: &str,
        clocks: &[f64],
    ) -> Result<Vec<bool>, AnalyzerError> {
        clocks.iter().map(|&t| sub.state(key, t)).collect()
    }

    /// Decode a single CS-low interval on its own.
    pub fn decode_range(&self, range: Interval) -> Result<SpiTransaction, SpiDecodeError> {
        let (sub, span) = self.analyzer.slice_with_span(range.start, range.end);
        let channels = &self.channels;

        let rising = sub.rising_edges(&channels.sck)?;
        let falling = sub.falling_edges(&channels.sck)?;
        if rising.is_empty() || falling.is_empty() {
            return Err(SpiDecodeError::NoClockEdges { start: range.start });
        }

        let cpol = self.clock_polarity(&sub, range.start)?;

        let miso = launches_on_rising(&sub.edges(&channels.miso)?, &rising, &falling);
        let mosi = launches_on_rising(&sub.edges(&channels.mosi)?, &rising, &falling);
        let launch_on_rising = match (miso, mosi) {
            (Some(miso), Some(mosi)) if miso != mosi => {
                return Err(SpiDecodeError::ModeMismatch { start: range.start });
            }
            (Some(launch), _) | (None, Some(launch)) => launch,
            (None, None) => false,
        };

        // Data is sampled on the edge opposite to the one that launches it.
        let mode = SpiMode::new(cpol, launch_on_rising != cpol);
        let clocks = if mode.samples_on_falling() { &falling } else { &rising };
        log::trace!(
            "SPI range {:.9}..{:.9}: mode {}, {} clocks",
            range.start,
            range.end,
            mode,
            clocks.len()
        );

        let inbound_bits = Self::sample_bits(&sub, &channels.miso, clocks)?;
        let outbound_bits = Self::sample_bits(&sub, &channels.mosi, clocks)?;
        if inbound_bits.len() % 8 != 0 {
            return Err(SpiDecodeError::MisalignedTransaction {
                bits: inbound_bits.len(),
            });
        }

        let inbound: Vec<u8> = inbound_bits.chunks(8).map(bits_to_byte).collect();
        let outbound: Vec<u8> = outbound_bits.chunks(8).map(bits_to_byte).collect();

        let clock_edges = sub.edges(&channels.sck)?;
        let timebase = sub.timebase();
        let (first, last) = (
            timebase.first().unwrap_or_default(),
            timebase.last().unwrap_or_default(),
        );
        let cs_lead_time = clock_edges.first().map_or(0.0, |&edge| edge - first);
        let cs_lag_time = clock_edges.last().map_or(0.0, |&edge| last - edge);
        let duration = last - first;
        let data_rate = if duration > 0.0 {
            inbound.len() as f64 / duration
        } else {
            0.0
        };

        Ok(SpiTransaction {
            outbound,
            inbound,
            mode,
            cs_lead_time,
            cs_lag_time,
            data_rate,
            span,
        })
    }

    /// Decode every range, keeping each range's outcome separate.
    pub fn transaction_results(&self) -> Result<Vec<Result<SpiTransaction, SpiDecodeError>>, SpiDecodeError> {
        Ok(self
            .transaction_ranges()?
            .into_iter()
            .map(|range| self.decode_range(range))
            .collect())
    }

    /// Decode every range, stopping at the first one that fails.
    pub fn transactions(&self) -> Result<Vec<SpiTransaction>, SpiDecodeError> {
        #[cfg(feature = "cpu-profiling")]
        let _zone = tracy_client::span!("SpiAnalyzer::transactions");

        let ranges = self.transaction_ranges()?;
        let _span = tracing::debug_span!("spi_transactions", ranges = ranges.len()).entered();

        ranges
            .into_iter()
            .map(|range| {
                let transaction = self.decode_range(range)?;
                log::debug!("Decoded {}", transaction);
                Ok(transaction)
            })
            .collect()
    }
}
