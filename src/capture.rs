//! The boundary between the decoders and whatever captured the waveforms.
//!
//! An acquisition source hands back a [`Capture`]: one time axis plus a
//! sample vector per requested channel. Instrument drivers implement
//! [`Acquire`]; [`CsvCapture`] replays a capture saved to disk.

use crate::channel_config::{I2cChannels, SpiChannels};
use crate::i2c_decoder::{I2cAnalyzer, I2cDecodeError, I2cTransaction};
use crate::logic_analyzer::{AnalyzerError, LogicAnalyzer, TimeBase};
use crate::spi_decoder::{SpiAnalyzer, SpiDecodeError, SpiTransaction};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

const TIME_COLUMN_NAME: &str = "time";

/// Channels delivered per logic pod byte.
const POD_WIDTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Failure to parse capture data: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capture has no column named '{name}'")]
    MissingColumn { name: String },

    #[error("Pod data has {actual} samples but the timebase has {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
}

/// Number of points to request from the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleCount {
    Points100,
    Points200,
    Points500,
    #[default]
    Points1000,
    Points2000,
    Max,
}

impl SampleCount {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleCount::Points100 => "100",
            SampleCount::Points200 => "200",
            SampleCount::Points500 => "500",
            SampleCount::Points1000 => "1000",
            SampleCount::Points2000 => "2000",
            SampleCount::Max => "MAX",
        }
    }

    /// `None` for [`SampleCount::Max`].
    pub fn points(&self) -> Option<usize> {
        match self {
            SampleCount::Points100 => Some(100),
            SampleCount::Points200 => Some(200),
            SampleCount::Points500 => Some(500),
            SampleCount::Points1000 => Some(1000),
            SampleCount::Points2000 => Some(2000),
            SampleCount::Max => None,
        }
    }
}

/// Time-aligned samples for a set of named channels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Capture {
    pub timebase: TimeBase,
    pub channels: BTreeMap<String, Vec<f64>>,
}

impl Capture {
    pub fn new(timebase: impl Into<TimeBase>) -> Self {
        Self {
            timebase: timebase.into(),
            channels: BTreeMap::new(),
        }
    }

    pub fn with_channel(mut self, name: impl Into<String>, samples: Vec<f64>) -> Self {
        self.channels.insert(name.into(), samples);
        self
    }

    pub fn into_analyzer(self) -> Result<LogicAnalyzer, AnalyzerError> {
        let mut analyzer = LogicAnalyzer::new(self.timebase);
        for (name, samples) in self.channels {
            analyzer.set(name, samples)?;
        }
        Ok(analyzer)
    }

    /// Unpack logic pod data: one byte per sample, bit `i` belongs to
    /// `names[i]`. Names past the pod width are ignored.
    pub fn from_pod_bitmap(
        timebase: impl Into<TimeBase>,
        names: &[&str],
        data: &[u8],
    ) -> Result<Self, CaptureError> {
        let timebase = timebase.into();
        if data.len() != timebase.len() {
            return Err(CaptureError::LengthMismatch {
                expected: timebase.len(),
                actual: data.len(),
            });
        }

        let channels = names
            .iter()
            .take(POD_WIDTH)
            .enumerate()
            .map(|(bit, name)| {
                let samples = data
                    .iter()
                    .map(|&byte| f64::from((byte >> bit) & 1))
                    .collect();
                ((*name).to_string(), samples)
            })
            .collect();

        Ok(Self { timebase, channels })
    }

    /// Parse CSV text with a header row. `keys` selects the channel columns;
    /// at most `count` rows are kept.
    pub fn from_csv_bytes(
        data: &[u8],
        time_column: &str,
        keys: &[&str],
        count: SampleCount,
    ) -> Result<Self, CaptureError> {
        #[cfg(feature = "cpu-profiling")]
        let _zone = tracy_client::span!("Capture::from_csv_bytes");

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(std::io::Cursor::new(data))
            .finish()?;
        let rows = count.points().map_or(df.height(), |n| n.min(df.height()));
        let df = df.head(Some(rows));
        log::debug!("Parsed CSV capture: {} rows, {} columns", df.height(), df.width());

        let timebase = TimeBase::new(column_values(&df, time_column)?);
        let mut channels = BTreeMap::new();
        for &key in keys {
            channels.insert(key.to_string(), column_values(&df, key)?);
        }
        Ok(Self { timebase, channels })
    }

    /// Time column followed by one column per channel.
    pub fn to_dataframe(&self, time_column: &str) -> Result<DataFrame, PolarsError> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.channels.len() + 1);
        columns.push(Series::new(time_column.into(), self.timebase.as_slice()).into());
        for (name, samples) in &self.channels {
            columns.push(Series::new(name.as_str().into(), samples.as_slice()).into());
        }
        DataFrame::new(columns)
    }
}

fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>, CaptureError> {
    let column = df.column(name).map_err(|_| CaptureError::MissingColumn {
        name: name.to_string(),
    })?;
    let values = column.cast(&DataType::Float64)?;
    // Default to 0 for nulls and unparseable values
    Ok(values
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(0.0))
        .collect())
}

/// A source of captured waveforms.
pub trait Acquire {
    type Error: std::error::Error + 'static;

    fn acquire(&mut self, keys: &[&str], count: SampleCount) -> Result<Capture, Self::Error>;
}

/// Replays a capture stored as CSV.
#[derive(Debug, Clone)]
pub struct CsvCapture {
    path: PathBuf,
    time_column: String,
}

impl CsvCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            time_column: TIME_COLUMN_NAME.to_string(),
        }
    }

    pub fn with_time_column(mut self, name: impl Into<String>) -> Self {
        self.time_column = name.into();
        self
    }
}

impl Acquire for CsvCapture {
    type Error = CaptureError;

    fn acquire(&mut self, keys: &[&str], count: SampleCount) -> Result<Capture, CaptureError> {
        log::debug!("Reading capture from {}", self.path.display());
        let data = std::fs::read(&self.path)?;
        Capture::from_csv_bytes(&data, &self.time_column, keys, count)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError<E>
where
    E: std::error::Error + 'static,
{
    #[error("Acquisition failed: {0}")]
    Acquire(#[source] E),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("I2C decode error: {0}")]
    I2c(#[from] I2cDecodeError),

    #[error("SPI decode error: {0}")]
    Spi(#[from] SpiDecodeError),
}

/// Acquire the SDA/SCL channels and decode every I2C transaction in them.
pub fn decode_i2c<A: Acquire>(
    source: &mut A,
    channels: &I2cChannels,
    count: SampleCount,
) -> Result<Vec<I2cTransaction>, DecodeError<A::Error>> {
    let capture = source
        .acquire(&channels.keys(), count)
        .map_err(DecodeError::Acquire)?;
    let analyzer = I2cAnalyzer::new(capture.into_analyzer()?, channels.clone())?;
    Ok(analyzer.transactions()?)
}

/// Acquire the SPI channels and decode every chip-select interval.
pub fn decode_spi<A: Acquire>(
    source: &mut A,
    channels: &SpiChannels,
    count: SampleCount,
) -> Result<Vec<SpiTransaction>, DecodeError<A::Error>> {
    let capture = source
        .acquire(&channels.keys(), count)
        .map_err(DecodeError::Acquire)?;
    let analyzer = SpiAnalyzer::new(capture.into_analyzer()?, channels.clone())?;
    Ok(analyzer.transactions()?)
}
