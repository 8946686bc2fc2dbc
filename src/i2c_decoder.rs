use crate::channel_config::I2cChannels;
use crate::edge_analysis::{bits_to_byte, Interval};
use crate::logic_analyzer::{AnalyzerError, LogicAnalyzer, SampleSpan, TimeBase};
use std::fmt;

/// Eight data bits followed by the acknowledge bit.
const BITS_PER_FRAME: usize = 9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum I2cDecodeError {
    #[error("No SCL clock detected")]
    NoClockDetected,

    #[error("Mismatching start and stop conditions ({starts} starts, {stops} stops)")]
    UnbalancedConditions { starts: usize, stops: usize },

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
}

/// One START..STOP exchange on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct I2cTransaction {
    /// 7-bit target address.
    pub address: u8,
    pub read: bool,
    pub address_ack: bool,
    pub payload: Vec<u8>,
    /// Acknowledge flag for each payload byte, `true` when the receiver
    /// pulled SDA low on the ninth clock.
    pub acks: Vec<bool>,
    /// Every byte on the wire, address byte first.
    pub raw: Vec<u8>,
    pub span: SampleSpan,
}

impl I2cTransaction {
    fn from_frames(frames: &[(u8, bool)], span: SampleSpan) -> Option<Self> {
        let (&(address_byte, address_ack), data) = frames.split_first()?;
        Some(Self {
            address: address_byte >> 1,
            read: address_byte & 1 == 1,
            address_ack,
            payload: data.iter().map(|&(byte, _)| byte).collect(),
            acks: data.iter().map(|&(_, ack)| ack).collect(),
            raw: frames.iter().map(|&(byte, _)| byte).collect(),
            span,
        })
    }

    /// The R/W bit as sent on the wire: 1 for a read, 0 for a write.
    pub fn readwrite(&self) -> u8 {
        u8::from(self.read)
    }
}

impl fmt::Display for I2cTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data: Vec<String> = self
            .payload
            .iter()
            .zip(&self.acks)
            .map(|(byte, &ack)| format!("{:02x}{}", byte, if ack { "!" } else { "" }))
            .collect();
        write!(
            f,
            "<I2C {} addr=0x{:02x} data={}>",
            if self.read { "READ" } else { "WRITE" },
            self.address,
            data.join(" ")
        )
    }
}

/// I2C decoder over the SDA and SCL channels of a capture.
#[derive(Debug, Clone)]
pub struct I2cAnalyzer {
    analyzer: LogicAnalyzer,
    channels: I2cChannels,
}

impl I2cAnalyzer {
    pub fn new(analyzer: LogicAnalyzer, channels: I2cChannels) -> Result<Self, AnalyzerError> {
        for key in channels.keys() {
            if !analyzer.contains(key) {
                return Err(AnalyzerError::KeyNotFound {
                    key: key.to_string(),
                });
            }
        }
        Ok(Self { analyzer, channels })
    }

    /// Build an analyzer with the default `SDA`/`SCL` channel names.
    pub fn from_samples(
        timebase: impl Into<TimeBase>,
        sda: Vec<f64>,
        scl: Vec<f64>,
    ) -> Result<Self, AnalyzerError> {
        let channels = I2cChannels::default();
        let mut analyzer = LogicAnalyzer::new(timebase);
        analyzer.set(channels.sda.as_str(), sda)?;
        analyzer.set(channels.scl.as_str(), scl)?;
        Ok(Self { analyzer, channels })
    }

    pub fn analyzer(&self) -> &LogicAnalyzer {
        &self.analyzer
    }

    pub fn channels(&self) -> &I2cChannels {
        &self.channels
    }

    /// SCL frequency estimated from the mean width of its low pulses.
    pub fn clock_rate(&self) -> Result<f64, I2cDecodeError> {
        let low_pulses = self.analyzer.pulse_widths(&self.channels.scl, false)?;
        if low_pulses.is_empty() {
            return Err(I2cDecodeError::NoClockDetected);
        }
        let mean = low_pulses.iter().sum::<f64>() / low_pulses.len() as f64;
        Ok(1.0 / mean)
    }

    /// Keep the SDA edges at which SCL is high and still high half a clock
    /// period later.
    fn while_clock_high(&self, sda_edges: Vec<f64>) -> Result<Vec<f64>, I2cDecodeError> {
        let half_period = 0.5 / self.clock_rate()?;
        let scl = self.channels.scl.as_str();

        let mut conditions = Vec::new();
        for t in sda_edges {
            if self.analyzer.state(scl, t)? && self.analyzer.state(scl, t + half_period)? {
                conditions.push(t);
            }
        }
        Ok(conditions)
    }

    pub fn start_conditions(&self) -> Result<Vec<f64>, I2cDecodeError> {
        self.while_clock_high(self.analyzer.falling_edges(&self.channels.sda)?)
    }

    pub fn stop_conditions(&self) -> Result<Vec<f64>, I2cDecodeError> {
        self.while_clock_high(self.analyzer.rising_edges(&self.channels.sda)?)
    }

    /// Pair the n-th START with the n-th STOP.
    pub fn transaction_ranges(&self) -> Result<Vec<Interval>, I2cDecodeError> {
        let starts = self.start_conditions()?;
        let stops = self.stop_conditions()?;
        if starts.len() != stops.len() {
            return Err(I2cDecodeError::UnbalancedConditions {
                starts: starts.len(),
                stops: stops.len(),
            });
        }

        Ok(starts
            .into_iter()
            .zip(stops)
            .filter(|(start, stop)| stop > start)
            .map(Interval::from)
            .collect())
    }

    /// Decode the bytes between one START and STOP.
    ///
    /// SDA is sampled at every SCL rising edge but the last, which belongs to
    /// the STOP. Returns `None` when the bits don't form whole 9-bit frames.
    pub fn decode_range(&self, range: Interval) -> Result<Option<I2cTransaction>, I2cDecodeError> {
        let (sub, span) = self.analyzer.slice_with_span(range.start, range.end);

        let mut clocks = sub.rising_edges(&self.channels.scl)?;
        clocks.pop();

        let bits = clocks
            .iter()
            .map(|&t| sub.state(&self.channels.sda, t))
            .collect::<Result<Vec<bool>, _>>()?;

        if bits.is_empty() || bits.len() % BITS_PER_FRAME != 0 {
            log::debug!(
                "Skipping I2C range {:.9}..{:.9}: {} bits is not a whole number of frames",
                range.start,
                range.end,
                bits.len()
            );
            return Ok(None);
        }

        let frames: Vec<(u8, bool)> = bits
            .chunks_exact(BITS_PER_FRAME)
            .map(|frame| (bits_to_byte(&frame[..8]), !frame[8]))
            .collect();

        Ok(I2cTransaction::from_frames(&frames, span))
    }

    pub fn transactions(&self) -> Result<Vec<I2cTransaction>, I2cDecodeError> {
        #[cfg(feature = "cpu-profiling")]
        let _zone = tracy_client::span!("I2cAnalyzer::transactions");

        let ranges = self.transaction_ranges()?;
        let _span = tracing::debug_span!("i2c_transactions", ranges = ranges.len()).entered();

        let mut transactions = Vec::with_capacity(ranges.len());
        for range in ranges {
            if let Some(transaction) = self.decode_range(range)? {
                log::debug!("Decoded {}", transaction);
                transactions.push(transaction);
            }
        }
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds SDA/SCL traces one sample per time unit. Every SCL low phase is
    /// four samples wide.
    #[derive(Default)]
    struct BusTrace {
        sda: Vec<f64>,
        scl: Vec<f64>,
    }

    impl BusTrace {
        fn push(&mut self, sda: bool, scl: bool, samples: usize) -> &mut Self {
            for _ in 0..samples {
                self.sda.push(f64::from(u8::from(sda)) * 3.3);
                self.scl.push(f64::from(u8::from(scl)) * 3.3);
            }
            self
        }

        fn start(&mut self) -> &mut Self {
            self.push(true, true, 4).push(false, true, 4).push(false, false, 2)
        }

        fn repeated_start(&mut self) -> &mut Self {
            self.push(true, false, 2)
                .push(true, true, 4)
                .push(false, true, 4)
                .push(false, false, 2)
        }

        fn bit(&mut self, bit: bool) -> &mut Self {
            self.push(bit, false, 2).push(bit, true, 4).push(bit, false, 2)
        }

        fn byte(&mut self, byte: u8, ack: bool) -> &mut Self {
            for i in (0..8).rev() {
                self.bit(byte >> i & 1 == 1);
            }
            self.bit(!ack)
        }

        fn stop(&mut self) -> &mut Self {
            self.push(false, false, 2).push(false, true, 4).push(true, true, 8)
        }

        fn analyzer(&self) -> I2cAnalyzer {
            let timebase: Vec<f64> = (0..self.sda.len()).map(|i| i as f64).collect();
            I2cAnalyzer::from_samples(timebase, self.sda.clone(), self.scl.clone()).unwrap()
        }
    }

    fn write_trace() -> BusTrace {
        let mut trace = BusTrace::default();
        trace
            .start()
            .byte(0x50 << 1, true)
            .byte(0xAA, true)
            .byte(0x55, true)
            .stop();
        trace
    }

    #[test]
    fn test_clock_rate() {
        let i2c = write_trace().analyzer();
        assert_eq!(i2c.clock_rate().unwrap(), 0.25);
    }

    #[test]
    fn test_no_clock_detected() {
        let i2c = I2cAnalyzer::from_samples(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![1.0, 0.0, 0.0, 1.0],
            vec![1.0; 4],
        )
        .unwrap();
        assert_eq!(i2c.clock_rate(), Err(I2cDecodeError::NoClockDetected));
        assert_eq!(i2c.transactions(), Err(I2cDecodeError::NoClockDetected));
    }

    #[test]
    fn test_start_and_stop_conditions() {
        let trace = write_trace();
        let i2c = trace.analyzer();
        assert_eq!(i2c.start_conditions().unwrap(), vec![3.0]);

        // Idle tail is 8 samples, STOP edge is on the sample before it.
        let stop = (trace.sda.len() - 9) as f64;
        assert_eq!(i2c.stop_conditions().unwrap(), vec![stop]);
        assert_eq!(
            i2c.transaction_ranges().unwrap(),
            vec![Interval::new(3.0, stop)]
        );
    }

    #[test]
    fn test_decode_write_transaction() {
        let i2c = write_trace().analyzer();
        let transactions = i2c.transactions().unwrap();

        assert_eq!(transactions.len(), 1);
        let transaction = &transactions[0];
        assert_eq!(transaction.address, 0x50);
        assert_eq!(transaction.readwrite(), 0);
        assert!(!transaction.read);
        assert!(transaction.address_ack);
        assert_eq!(transaction.payload, vec![0xAA, 0x55]);
        assert_eq!(transaction.acks, vec![true, true]);
        assert_eq!(transaction.raw, vec![0xA0, 0xAA, 0x55]);
        assert_eq!(transaction.span.start_index, 3);
        assert_eq!(transaction.span.first_time, 3.0);
    }

    #[test]
    fn test_decode_read_with_nack() {
        let mut trace = BusTrace::default();
        trace
            .start()
            .byte(0x3C << 1 | 1, true)
            .byte(0x12, true)
            .byte(0x34, false)
            .stop();
        let transactions = trace.analyzer().transactions().unwrap();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].address, 0x3C);
        assert_eq!(transactions[0].readwrite(), 1);
        assert_eq!(transactions[0].payload, vec![0x12, 0x34]);
        assert_eq!(transactions[0].acks, vec![true, false]);
        assert_eq!(
            transactions[0].to_string(),
            "<I2C READ addr=0x3c data=12! 34>"
        );
    }

    #[test]
    fn test_two_transactions_in_order() {
        let mut trace = BusTrace::default();
        trace.start().byte(0x20 << 1, true).byte(0x01, true).stop();
        trace.start().byte(0x21 << 1, true).byte(0x02, true).stop();
        let transactions = trace.analyzer().transactions().unwrap();

        let summary: Vec<(u8, Vec<u8>)> = transactions
            .iter()
            .map(|t| (t.address, t.payload.clone()))
            .collect();
        assert_eq!(summary, vec![(0x20, vec![0x01]), (0x21, vec![0x02])]);
        assert!(transactions[0].span.end_index <= transactions[1].span.start_index);
    }

    #[test]
    fn test_unbalanced_conditions() {
        let mut trace = BusTrace::default();
        trace
            .start()
            .byte(0x50 << 1, true)
            .repeated_start()
            .byte(0x50 << 1 | 1, true)
            .byte(0x99, false)
            .stop();
        let i2c = trace.analyzer();

        assert_eq!(i2c.start_conditions().unwrap().len(), 2);
        assert_eq!(
            i2c.transactions(),
            Err(I2cDecodeError::UnbalancedConditions { starts: 2, stops: 1 })
        );
    }

    #[test]
    fn test_partial_frame_is_skipped() {
        let mut trace = BusTrace::default();
        trace.start();
        for _ in 0..8 {
            trace.bit(true);
        }
        trace.stop();
        trace.start().byte(0x10 << 1, true).stop();

        let transactions = trace.analyzer().transactions().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].address, 0x10);
        assert!(transactions[0].payload.is_empty());
    }

    #[test]
    fn test_custom_channel_names() {
        let trace = write_trace();
        let timebase: Vec<f64> = (0..trace.sda.len()).map(|i| i as f64).collect();
        let mut analyzer = LogicAnalyzer::new(timebase);
        analyzer.set("DIG0", trace.sda.clone()).unwrap();
        analyzer.set("DIG1", trace.scl.clone()).unwrap();

        let i2c = I2cAnalyzer::new(analyzer.clone(), I2cChannels::new("DIG0", "DIG1")).unwrap();
        assert_eq!(i2c.transactions().unwrap()[0].payload, vec![0xAA, 0x55]);

        assert!(matches!(
            I2cAnalyzer::new(analyzer, I2cChannels::default()),
            Err(AnalyzerError::KeyNotFound { key }) if key == "SDA"
        ));
    }

    #[test]
    fn test_decoding_is_repeatable() {
        let i2c = write_trace().analyzer();
        assert_eq!(i2c.transactions().unwrap(), i2c.transactions().unwrap());
    }
}
