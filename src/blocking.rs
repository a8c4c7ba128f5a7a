use embedded_hal_1::i2c::I2c;
use embedded_storage::{ReadStorage, Storage};

use crate::detect::{
    device_id_command, probe_candidates, DeviceId, DEVICE_ID_ADDRESS, SENTINEL_HIGH, SENTINEL_LOW,
};
use crate::record::Record;
use crate::registry::{ChipRegistry, ChipSize};
use crate::transfer::{Payload, Segments};
use crate::types::{Config, Error, MAX_DEVICES, MAX_TRANSACTION_SIZE};

/// Blocking driver for up to eight MB85RC chips on one bus.
///
/// The chips found by [`Fram::discover`] are addressed as one contiguous ring of
/// bytes: offsets are reduced modulo [`Fram::total_bytes`], and transfers run from
/// the end of one chip into the start of the next.
pub struct Fram<I2C> {
    i2c: I2C,
    config: Config,
    registry: ChipRegistry,
}

impl<I2C: I2c> Fram<I2C> {
    /// Take ownership of the bus. Nothing is transferred until [`Fram::discover`].
    pub fn new(i2c: I2C, config: Config) -> Result<Self, Error<I2C::Error>> {
        config.validate()?;
        Ok(Self {
            i2c,
            config,
            registry: ChipRegistry::new(),
        })
    }

    /// Find and size every chip on the bus, returning the number found.
    ///
    /// Sizing temporarily overwrites two bytes per chip and candidate size and
    /// restores them afterwards, so this must run with exclusive access to the bus
    /// and before any other traffic to the chips. A bus failure while sizing may
    /// leave a sentinel byte behind.
    pub fn discover(&mut self) -> usize {
        debug!(
            "FRAM discovery at {} Hz, {} byte transactions",
            self.config.frequency.0,
            self.config.transaction_size
        );

        let mut slots = [None; MAX_DEVICES];
        for (slot, entry) in slots.iter_mut().enumerate() {
            let address = ChipRegistry::address(slot);
            if self.i2c.write(address, &[]).is_err() {
                trace!("no FRAM at {:#x}", address);
                continue;
            }
            let size = self.probe_size(address);
            info!("FRAM at {:#x}: {} bytes", address, size.bytes());
            *entry = Some(size);
        }

        self.registry = ChipRegistry::from_slots(slots);
        info!(
            "FRAM discovery done: {} chips, {} bytes",
            self.registry.device_count(),
            self.registry.total_bytes()
        );
        self.registry.device_count()
    }

    pub fn registry(&self) -> &ChipRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device_count(&self) -> usize {
        self.registry.device_count()
    }

    /// Size of the virtual address space.
    pub fn total_bytes(&self) -> u32 {
        self.registry.total_bytes()
    }

    /// Capacity of the chip in `slot`, 0 for an empty or out-of-range slot.
    pub fn chip_bytes(&self, slot: usize) -> u32 {
        self.registry.chip_bytes(slot)
    }

    /// Read `out.len()` bytes starting at `offset`.
    ///
    /// On a bus failure, [`Error::I2c`] reports how many leading bytes of `out`
    /// were filled.
    pub fn read(&mut self, offset: u32, out: &mut [u8]) -> Result<usize, Error<I2C::Error>> {
        if out.is_empty() {
            return Ok(0);
        }
        let segments = Segments::new(&self.registry, offset, out.len(), self.config.read_chunk())
            .ok_or(Error::NoCapacity)?;
        for segment in segments {
            self.i2c
                .write_read(
                    segment.address(),
                    &segment.memory_address(),
                    &mut out[segment.range()],
                )
                .map_err(|error| Error::I2c {
                    error,
                    transferred: segment.start,
                })?;
        }
        Ok(out.len())
    }

    /// Write `data` starting at `offset`.
    ///
    /// Every transaction is closed before the next one starts, so the data is on
    /// the chips when this returns `Ok`. On a bus failure, [`Error::I2c`] reports
    /// how many leading bytes of `data` were acknowledged.
    pub fn write(&mut self, offset: u32, data: &[u8]) -> Result<usize, Error<I2C::Error>> {
        self.write_payload(offset, Payload::Bytes(data))
    }

    /// Write as many back-to-back copies of `record` as fit, starting at offset 0.
    ///
    /// Trailing bytes that cannot hold a whole copy are left untouched. Returns the
    /// number of copies written.
    pub fn fill(&mut self, record: &[u8]) -> Result<u32, Error<I2C::Error>> {
        if record.is_empty() {
            return Err(Error::InvalidLength);
        }
        if self.registry.is_empty() {
            return Err(Error::NoCapacity);
        }
        let len = u32::try_from(record.len()).unwrap_or(u32::MAX);
        let copies = self.registry.total_bytes() / len;
        self.write_payload(
            0,
            Payload::Repeat {
                record,
                len: (copies * len) as usize,
            },
        )?;
        Ok(copies)
    }

    pub fn read_record<T: Record>(&mut self, offset: u32) -> Result<T, Error<I2C::Error>> {
        let mut bytes = T::ZEROED;
        self.read(offset, bytes.as_mut())?;
        Ok(T::from_bytes(&bytes))
    }

    pub fn write_record<T: Record>(
        &mut self,
        offset: u32,
        value: &T,
    ) -> Result<usize, Error<I2C::Error>> {
        self.write(offset, value.to_bytes().as_ref())
    }

    pub fn fill_record<T: Record>(&mut self, value: &T) -> Result<u32, Error<I2C::Error>> {
        self.fill(value.to_bytes().as_ref())
    }

    /// Read the manufacturer and product ID of the chip in `slot`.
    ///
    /// Only MB85RC256V and MB85RC512T implement the command; other parts NACK it.
    pub fn read_device_id(&mut self, slot: usize) -> Result<DeviceId, Error<I2C::Error>> {
        if self.registry.slot(slot).is_none() {
            return Err(Error::NoDevice);
        }
        let mut raw = [0u8; 3];
        self.i2c
            .write_read(
                DEVICE_ID_ADDRESS,
                &device_id_command(ChipRegistry::address(slot)),
                &mut raw,
            )
            .map_err(Error::bus)?;
        DeviceId::from_raw(raw).ok_or(Error::UnsupportedDeviceId)
    }

    /// Give the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write_payload(
        &mut self,
        offset: u32,
        payload: Payload<'_>,
    ) -> Result<usize, Error<I2C::Error>> {
        let len = payload.len();
        if len == 0 {
            return Ok(0);
        }
        let segments = Segments::new(&self.registry, offset, len, self.config.write_chunk())
            .ok_or(Error::NoCapacity)?;
        let mut buf = [0u8; MAX_TRANSACTION_SIZE];
        for segment in segments {
            let frame = segment.write_frame(&mut buf, &payload);
            self.i2c
                .write(segment.address(), frame)
                .map_err(|error| Error::I2c {
                    error,
                    transferred: segment.start,
                })?;
        }
        Ok(len)
    }

    fn probe_size(&mut self, address: u8) -> ChipSize {
        for (size, wrap_offset) in probe_candidates() {
            match self.probe_wraparound(address, wrap_offset) {
                Ok(true) => return size,
                Ok(false) => trace!("{:#x}: no wraparound at {}", address, wrap_offset),
                Err(_) => warn!("{:#x}: probe at {} failed", address, wrap_offset),
            }
        }
        debug!("{:#x}: no wraparound, largest size", address);
        ChipSize::LARGEST
    }

    /// Whether a write to `wrap_offset` lands on offset 0.
    ///
    /// Offset 0 is restored last whatever happened, which also undoes the aliased
    /// write when the chip did wrap.
    fn probe_wraparound(&mut self, address: u8, wrap_offset: u16) -> Result<bool, I2C::Error> {
        let original = self.read_byte(address, 0)?;
        let wrapped = self.write_probe_sentinels(address, wrap_offset);
        let restored = self.write_byte(address, 0, original);
        let wrapped = wrapped?;
        restored?;
        Ok(wrapped)
    }

    fn write_probe_sentinels(&mut self, address: u8, wrap_offset: u16) -> Result<bool, I2C::Error> {
        self.write_byte(address, 0, SENTINEL_LOW)?;
        let saved = self.read_byte(address, wrap_offset)?;
        self.write_byte(address, wrap_offset, SENTINEL_HIGH)?;
        let seen = self.read_byte(address, 0)?;
        self.write_byte(address, wrap_offset, saved)?;
        Ok(seen == SENTINEL_HIGH)
    }

    fn read_byte(&mut self, address: u8, offset: u16) -> Result<u8, I2C::Error> {
        let mut byte = [0u8; 1];
        self.i2c
            .write_read(address, &offset.to_be_bytes(), &mut byte)?;
        Ok(byte[0])
    }

    fn write_byte(&mut self, address: u8, offset: u16, value: u8) -> Result<(), I2C::Error> {
        let [hi, lo] = offset.to_be_bytes();
        self.i2c.write(address, &[hi, lo, value])
    }
}

impl<I2C: I2c> ReadStorage for Fram<I2C> {
    type Error = Error<I2C::Error>;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        Fram::read(self, offset, bytes).map(drop)
    }

    fn capacity(&self) -> usize {
        self.registry.total_bytes() as usize
    }
}

impl<I2C: I2c> Storage for Fram<I2C> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        Fram::write(self, offset, bytes).map(drop)
    }
}
