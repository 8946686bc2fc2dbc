//! # LogicScope RS
//!
//! A Rust library for reconstructing I2C and SPI bus transactions from
//! waveforms captured by an oscilloscope or logic analyzer.
//!
//! Captured channels are stored in a [`LogicAnalyzer`], digitized at the
//! midpoint of their swing, and handed to a protocol decoder which slices
//! the capture into transactions and recovers their bytes and timing.
//!
//! ## Features
//!
//! - **Edge and pulse analysis**: rising/falling edges, high/low ranges, time-to-sample lookup
//! - **I2C decoding**: clock estimation, START/STOP detection, address, payload and acks
//! - **SPI decoding**: CPOL/CPHA inference from edge timing, CS lead/lag time and data rate
//! - **Configurable channel names**: decode from analog inputs, pod bits or labels
//! - **Capture replay**: load CSV captures with `polars`, unpack logic pod bitmaps
//! - **Type safety**: Strong typing and error handling throughout
//!
//! ## Examples
//!
//! ### Decoding SPI from raw samples
//!
//! ```rust
//! use logicscope_rs::SpiAnalyzer;
//!
//! // CS low for one mode 0 byte (0x80 out, 0x00 in), one sample per microsecond
//! let t: Vec<f64> = (0..14).map(|i| f64::from(i) * 1e-6).collect();
//! let cs   = vec![1., 0., 0., 0., 0., 0., 0., 0., 0., 0., 0., 0., 1., 1.];
//! let sck  = vec![0., 0., 1., 0., 1., 0., 1., 0., 1., 0., 1., 0., 1., 0.];
//! let mosi = vec![0., 1., 1., 0., 0., 0., 0., 0., 0., 0., 0., 0., 0., 0.];
//! let miso = vec![0.0; 14];
//!
//! let spi = SpiAnalyzer::from_samples(t, miso, mosi, sck, cs)?;
//! for range in spi.transaction_ranges()? {
//!     println!("CS low from {}s to {}s", range.start, range.end);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Channel configuration
//!
//! ```rust
//! use logicscope_rs::{I2cChannels, SpiChannels};
//!
//! let i2c = I2cChannels::default().sda("CHAN1").scl("CHAN2");
//! let spi = SpiChannels::default().sck("DIG2").cs("DIG3");
//! assert_eq!(spi.keys(), ["MISO", "MOSI", "DIG2", "DIG3"]);
//! ```
//!
//! ### Replaying a saved capture
//!
//! ```rust,no_run
//! use logicscope_rs::{decode_i2c, CsvCapture, I2cChannels, SampleCount};
//!
//! let mut source = CsvCapture::new("capture.csv");
//! let transactions = decode_i2c(&mut source, &I2cChannels::default(), SampleCount::Max)?;
//! for transaction in &transactions {
//!     println!("{}", transaction);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capture;
pub mod channel_config;
pub mod cursor;
pub mod edge_analysis;
pub mod i2c_decoder;
pub mod logic_analyzer;
pub mod spi_decoder;

// Re-export the main types for convenience
pub use logic_analyzer::{digitize, AnalyzerError, LogicAnalyzer, SampleSpan, TimeBase};

pub use edge_analysis::{bits_to_byte, Interval};

pub use channel_config::{I2cChannels, SpiChannels};

pub use i2c_decoder::{I2cAnalyzer, I2cDecodeError, I2cTransaction};

pub use spi_decoder::{SpiAnalyzer, SpiDecodeError, SpiMode, SpiTransaction};

pub use capture::{
    decode_i2c, decode_spi, Acquire, Capture, CaptureError, CsvCapture, DecodeError, SampleCount,
};

pub use cursor::{show, CursorPair, Transaction};
