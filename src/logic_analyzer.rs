use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Waveform '{key}' has {actual} samples but the timebase has {expected}")]
    DimensionMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("No waveform named '{key}' in this analyzer")]
    KeyNotFound { key: String },

    #[error("The timebase is empty")]
    EmptyTimeBase,
}

/// Sample timestamps (seconds) shared by every channel of one capture.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeBase {
    samples: Vec<f64>,
}

impl TimeBase {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    /// Build a uniform time axis the way scope waveform preambles describe it:
    /// `t[i] = origin + increment * (i - reference)`.
    pub fn from_increment(origin: f64, increment: f64, reference: f64, len: usize) -> Self {
        let samples = (0..len)
            .map(|i| increment.mul_add(i as f64 - reference, origin))
            .collect();
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.samples.get(index).copied()
    }

    pub fn first(&self) -> Option<f64> {
        self.samples.first().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.last().copied()
    }
}

impl From<Vec<f64>> for TimeBase {
    fn from(samples: Vec<f64>) -> Self {
        Self::new(samples)
    }
}

/// Threshold samples at the midpoint between their minimum and maximum.
/// A sample maps to `true` only if it is strictly above the midpoint, so a
/// flat waveform digitizes to all-low.
pub fn digitize(samples: &[f64]) -> Vec<bool> {
    if samples.is_empty() {
        return Vec::new();
    }
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let threshold = min + (max - min) / 2.0;

    samples.iter().map(|&x| x > threshold).collect()
}

#[derive(Debug, Clone, PartialEq)]
struct Channel {
    samples: Vec<f64>,
    digitized: Vec<bool>,
}

/// Where a decoded transaction sits inside the capture it was decoded from.
///
/// Indices refer to the parent analyzer's timebase; `end_index` is exclusive.
/// The times are the first and last timestamps of the transaction's slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSpan {
    pub start_index: usize,
    pub end_index: usize,
    pub first_time: f64,
    pub last_time: f64,
}

impl SampleSpan {
    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        self.last_time - self.first_time
    }
}

/// A set of named waveforms over a common timebase, each kept both raw and
/// digitized.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogicAnalyzer {
    timebase: TimeBase,
    channels: BTreeMap<String, Channel>,
}

impl LogicAnalyzer {
    pub fn new(timebase: impl Into<TimeBase>) -> Self {
        Self {
            timebase: timebase.into(),
            channels: BTreeMap::new(),
        }
    }

    pub fn timebase(&self) -> &TimeBase {
        &self.timebase
    }

    pub fn len(&self) -> usize {
        self.timebase.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timebase.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.channels.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.channels.contains_key(key)
    }

    /// Store a waveform under `key`, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, samples: Vec<f64>) -> Result<(), AnalyzerError> {
        let key = key.into();
        if samples.len() != self.timebase.len() {
            return Err(AnalyzerError::DimensionMismatch {
                key,
                expected: self.timebase.len(),
                actual: samples.len(),
            });
        }

        let digitized = digitize(&samples);
        log::trace!("Stored waveform '{}' ({} samples)", key, samples.len());
        self.channels.insert(key, Channel { samples, digitized });
        Ok(())
    }

    fn channel(&self, key: &str) -> Result<&Channel, AnalyzerError> {
        self.channels
            .get(key)
            .ok_or_else(|| AnalyzerError::KeyNotFound {
                key: key.to_string(),
            })
    }

    /// The waveform as it was stored, before digitizing.
    pub fn get(&self, key: &str) -> Result<&[f64], AnalyzerError> {
        Ok(&self.channel(key)?.samples)
    }

    pub fn digitized(&self, key: &str) -> Result<&[bool], AnalyzerError> {
        Ok(&self.channel(key)?.digitized)
    }

    /// Index of the sample at `time`.
    ///
    /// An exact timestamp match wins. Otherwise this is a single forward scan
    /// that starts from the distance between the first and last timestamps
    /// and only moves on a strictly smaller distance, so it falls back to
    /// index 0 when no sample beats that seed.
    pub fn index_of(&self, time: f64) -> usize {
        let samples = self.timebase.as_slice();
        let (Some(&first), Some(&last)) = (samples.first(), samples.last()) else {
            return 0;
        };

        if let Some(index) = samples.iter().position(|&t| t == time) {
            return index;
        }

        let mut best = (last - first).abs();
        let mut index = 0;
        for (i, &t) in samples.iter().enumerate() {
            let distance = (time - t).abs();
            if distance < best {
                best = distance;
                index = i;
            }
        }
        index
    }

    /// Digitized level of `key` at the sample nearest to `time`.
    pub fn state(&self, key: &str, time: f64) -> Result<bool, AnalyzerError> {
        let digitized = self.digitized(key)?;
        digitized
            .get(self.index_of(time))
            .copied()
            .ok_or(AnalyzerError::EmptyTimeBase)
    }

    /// Copy of samples `[start, end)` of every channel. Bounds are clamped to
    /// the buffer and an inverted range gives an empty analyzer.
    pub fn slice_by_index(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let start = start.min(end);

        let channels = self
            .channels
            .iter()
            .map(|(key, channel)| {
                (
                    key.clone(),
                    Channel {
                        samples: channel.samples[start..end].to_vec(),
                        digitized: channel.digitized[start..end].to_vec(),
                    },
                )
            })
            .collect();

        Self {
            timebase: TimeBase::new(self.timebase.as_slice()[start..end].to_vec()),
            channels,
        }
    }

    pub fn slice(&self, start_time: f64, end_time: f64) -> Self {
        self.slice_by_index(self.index_of(start_time), self.index_of(end_time))
    }

    /// Describe samples `[start, end)` as a [`SampleSpan`], clamped like
    /// [`Self::slice_by_index`].
    pub fn span(&self, start: usize, end: usize) -> SampleSpan {
        let end = end.min(self.len());
        let start = start.min(end);
        let first_time = self.timebase.get(start).unwrap_or_default();
        let last_time = end
            .checked_sub(1)
            .and_then(|last| self.timebase.get(last))
            .filter(|_| end > start)
            .unwrap_or(first_time);

        SampleSpan {
            start_index: start,
            end_index: end,
            first_time,
            last_time,
        }
    }

    /// Slice by time and report where the slice sits in this analyzer.
    pub fn slice_with_span(&self, start_time: f64, end_time: f64) -> (Self, SampleSpan) {
        let start = self.index_of(start_time);
        let end = self.index_of(end_time);
        (self.slice_by_index(start, end), self.span(start, end))
    }

    pub fn slice_span(&self, span: &SampleSpan) -> Self {
        self.slice_by_index(span.start_index, span.end_index)
    }
}
