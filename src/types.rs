use core::fmt;

/// Lowest bus address of an MB85RC chip (A2..A0 = 0).
pub const MIN_ADDRESS: u8 = 0x50;
/// Number of bus addresses the address pins can select.
pub const MAX_DEVICES: usize = 8;
/// Bytes per transaction when nothing else is configured (the Arduino Wire buffer).
pub const DEFAULT_TRANSACTION_SIZE: usize = 32;
/// Upper bound for [`Config::transaction_size`].
pub const MAX_TRANSACTION_SIZE: usize = 256;

/// Two memory-address bytes precede every positioned transaction.
pub(crate) const ADDRESS_BYTES: usize = 2;

/// Frequency in hertz.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hertz(pub u32);

/// Standard I2C bus speeds supported by the MB85RC family.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusSpeed {
    /// 100 kHz
    Standard,
    /// 400 kHz
    Fast,
    /// 1 MHz
    FastPlus,
    /// 3.4 MHz
    HighSpeed,
}

impl BusSpeed {
    pub const fn frequency(self) -> Hertz {
        match self {
            Self::Standard => Hertz(100_000),
            Self::Fast => Hertz(400_000),
            Self::FastPlus => Hertz(1_000_000),
            Self::HighSpeed => Hertz(3_400_000),
        }
    }

    pub fn from_frequency(frequency: Hertz) -> Option<Self> {
        [Self::Standard, Self::Fast, Self::FastPlus, Self::HighSpeed]
            .into_iter()
            .find(|speed| speed.frequency() == frequency)
    }
}

/// FRAM driver configuration
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Bus frequency the transport was set up with (default: 100 kHz standard mode).
    ///
    /// embedded-hal has no clock setter, so the transport must already run at this
    /// speed when it is handed to the driver. The value is validated and logged.
    pub frequency: Hertz,
    /// Largest number of bytes moved by one bus transaction, address bytes included
    /// for writes.
    pub transaction_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frequency: BusSpeed::Standard.frequency(),
            transaction_size: DEFAULT_TRANSACTION_SIZE,
        }
    }
}

impl Config {
    pub fn with_speed(speed: BusSpeed) -> Self {
        Self {
            frequency: speed.frequency(),
            ..Self::default()
        }
    }

    pub(crate) fn validate<E>(&self) -> Result<(), Error<E>> {
        if self.frequency.0 == 0 || self.frequency > BusSpeed::HighSpeed.frequency() {
            return Err(Error::InvalidConfiguration);
        }
        if !(ADDRESS_BYTES + 1..=MAX_TRANSACTION_SIZE).contains(&self.transaction_size) {
            return Err(Error::InvalidConfiguration);
        }
        Ok(())
    }

    /// Data bytes per read transaction.
    pub(crate) const fn read_chunk(&self) -> usize {
        self.transaction_size
    }

    /// Data bytes per write transaction.
    pub(crate) const fn write_chunk(&self) -> usize {
        self.transaction_size - ADDRESS_BYTES
    }
}

/// FRAM driver error, generic over the transport error `E`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The bus transport reported a failure. The call stopped at the failing transaction.
    ///
    /// `transferred` counts the bytes of the call moved by the transactions that
    /// completed before it. The failing transaction itself may have been partly applied.
    I2c { error: E, transferred: usize },
    /// No chip has been discovered, the virtual address space is empty.
    NoCapacity,
    /// Zero-sized fill record.
    InvalidLength,
    /// Rejected [`Config`] value.
    InvalidConfiguration,
    /// The requested slot holds no chip.
    NoDevice,
    /// The device-ID response does not come from a Fujitsu part.
    UnsupportedDeviceId,
}

impl<E> Error<E> {
    pub(crate) fn bus(error: E) -> Self {
        Self::I2c {
            error,
            transferred: 0,
        }
    }

    /// Bytes completed before a bus failure, `None` for other errors.
    pub fn transferred(&self) -> Option<usize> {
        match self {
            Self::I2c { transferred, .. } => Some(*transferred),
            _ => None,
        }
    }
}

impl<E: embedded_hal_1::i2c::Error> Error<E> {
    /// Transport error kind, if this is a bus failure.
    pub fn i2c_kind(&self) -> Option<embedded_hal_1::i2c::ErrorKind> {
        match self {
            Self::I2c { error, .. } => Some(error.kind()),
            _ => None,
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c { error, transferred } => write!(
                f,
                "I2C transaction failed after {} bytes: {:?}",
                transferred, error
            ),
            Self::NoCapacity => f.write_str("no FRAM capacity discovered"),
            Self::InvalidLength => f.write_str("record length must be non-zero"),
            Self::InvalidConfiguration => f.write_str("invalid FRAM configuration"),
            Self::NoDevice => f.write_str("no FRAM chip in slot"),
            Self::UnsupportedDeviceId => f.write_str("device ID is not a Fujitsu FRAM"),
        }
    }
}
