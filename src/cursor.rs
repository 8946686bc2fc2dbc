//! Placing a decoded transaction on an instrument's display.

use crate::i2c_decoder::I2cTransaction;
use crate::logic_analyzer::SampleSpan;
use crate::spi_decoder::SpiTransaction;

/// A pair of vertical time cursors (X1/X2) on some display.
pub trait CursorPair {
    type Error;

    fn set_positions(&mut self, x1: f64, x2: f64) -> Result<(), Self::Error>;
}

/// Anything decoded from a slice of a capture.
pub trait Transaction {
    fn span(&self) -> &SampleSpan;
}

impl Transaction for I2cTransaction {
    fn span(&self) -> &SampleSpan {
        &self.span
    }
}

impl Transaction for SpiTransaction {
    fn span(&self) -> &SampleSpan {
        &self.span
    }
}

/// Bracket `transaction` between the cursors: X1 on its first sample, X2 on
/// its last.
pub fn show<C, T>(cursors: &mut C, transaction: &T) -> Result<(), C::Error>
where
    C: CursorPair + ?Sized,
    T: Transaction + ?Sized,
{
    let span = transaction.span();
    log::debug!(
        "Moving cursors to {:.9}..{:.9}",
        span.first_time,
        span.last_time
    );
    cursors.set_positions(span.first_time, span.last_time)
}
