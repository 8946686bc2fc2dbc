//! Which captured channels play which role on the bus.
//!
//! Channels are looked up by name in the [`LogicAnalyzer`](crate::LogicAnalyzer),
//! so the same decoder works whether a line was captured on an analog input
//! (`"CHAN1"`), a logic pod bit (`"DIG3"`) or a user label.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cChannels {
    pub sda: String,
    pub scl: String,
}

impl I2cChannels {
    pub fn new(sda: impl Into<String>, scl: impl Into<String>) -> Self {
        Self {
            sda: sda.into(),
            scl: scl.into(),
        }
    }

    pub fn sda(mut self, name: impl Into<String>) -> Self {
        self.sda = name.into();
        self
    }

    pub fn scl(mut self, name: impl Into<String>) -> Self {
        self.scl = name.into();
        self
    }

    /// Channels to request from the acquisition layer.
    pub fn keys(&self) -> [&str; 2] {
        [&self.sda, &self.scl]
    }
}

impl Default for I2cChannels {
    fn default() -> Self {
        Self::new("SDA", "SCL")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiChannels {
    pub miso: String,
    pub mosi: String,
    pub sck: String,
    pub cs: String,
}

impl SpiChannels {
    pub fn new(
        miso: impl Into<String>,
        mosi: impl Into<String>,
        sck: impl Into<String>,
        cs: impl Into<String>,
    ) -> Self {
        Self {
            miso: miso.into(),
            mosi: mosi.into(),
            sck: sck.into(),
            cs: cs.into(),
        }
    }

    pub fn miso(mut self, name: impl Into<String>) -> Self {
        self.miso = name.into();
        self
    }

    pub fn mosi(mut self, name: impl Into<String>) -> Self {
        self.mosi = name.into();
        self
    }

    pub fn sck(mut self, name: impl Into<String>) -> Self {
        self.sck = name.into();
        self
    }

    pub fn cs(mut self, name: impl Into<String>) -> Self {
        self.cs = name.into();
        self
    }

    pub fn keys(&self) -> [&str; 4] {
        [&self.miso, &self.mosi, &self.sck, &self.cs]
    }
}

impl Default for SpiChannels {
    fn default() -> Self {
        Self::new("MISO", "MOSI", "SCK", "CS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(I2cChannels::default().keys(), ["SDA", "SCL"]);
        assert_eq!(SpiChannels::default().keys(), ["MISO", "MOSI", "SCK", "CS"]);
    }

    #[test]
    fn test_builder_overrides_single_channel() {
        let spi = SpiChannels::default().sck("DIG2").cs("DIG3");
        assert_eq!(spi.keys(), ["MISO", "MOSI", "DIG2", "DIG3"]);

        let i2c = I2cChannels::default().sda("CHAN1").scl("CHAN2");
        assert_eq!(i2c, I2cChannels::new("CHAN1", "CHAN2"));
    }
}
