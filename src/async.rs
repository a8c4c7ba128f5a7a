use embedded_hal_async::i2c::I2c;

use crate::detect::{
    device_id_command, probe_candidates, DeviceId, DEVICE_ID_ADDRESS, SENTINEL_HIGH, SENTINEL_LOW,
};
use crate::record::Record;
use crate::registry::{ChipRegistry, ChipSize};
use crate::transfer::{Payload, Segments};
use crate::types::{Config, Error, MAX_DEVICES, MAX_TRANSACTION_SIZE};

/// Async driver for up to eight MB85RC chips on one bus.
///
/// Same addressing model as [`Fram`](crate::Fram). Dropping a pending write
/// future may leave the transfer partially written.
pub struct AsyncFram<I2C> {
    i2c: I2C,
    config: Config,
    registry: ChipRegistry,
}

impl<I2C: I2c> AsyncFram<I2C> {
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
    /// See [`Fram::discover`](crate::Fram::discover) for the bus access
    /// requirements.
    pub async fn discover(&mut self) -> usize {
        debug!(
            "FRAM discovery at {} Hz, {} byte transactions",
            self.config.frequency.0,
            self.config.transaction_size
        );

        let mut slots = [None; MAX_DEVICES];
        for (slot, entry) in slots.iter_mut().enumerate() {
            let address = ChipRegistry::address(slot);
            if self.i2c.write(address, &[]).await.is_err() {
                trace!("no FRAM at {:#x}", address);
                continue;
            }
            let size = self.probe_size(address).await;
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

    pub fn total_bytes(&self) -> u32 {
        self.registry.total_bytes()
    }

    pub fn chip_bytes(&self, slot: usize) -> u32 {
        self.registry.chip_bytes(slot)
    }

    pub async fn read(&mut self, offset: u32, out: &mut [u8]) -> Result<usize, Error<I2C::Error>> {
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
                .await
                .map_err(|error| Error::I2c {
                    error,
                    transferred: segment.start,
                })?;
        }
        Ok(out.len())
    }

    pub async fn write(&mut self, offset: u32, data: &[u8]) -> Result<usize, Error<I2C::Error>> {
        self.write_payload(offset, Payload::Bytes(data)).await
    }

    pub async fn fill(&mut self, record: &[u8]) -> Result<u32, Error<I2C::Error>> {
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
        )
        .await?;
        Ok(copies)
    }

    pub async fn read_record<T: Record>(&mut self, offset: u32) -> Result<T, Error<I2C::Error>> {
        let mut bytes = T::ZEROED;
        self.read(offset, bytes.as_mut()).await?;
        Ok(T::from_bytes(&bytes))
    }

    pub async fn write_record<T: Record>(
        &mut self,
        offset: u32,
        value: &T,
    ) -> Result<usize, Error<I2C::Error>> {
        self.write(offset, value.to_bytes().as_ref()).await
    }

    pub async fn fill_record<T: Record>(&mut self, value: &T) -> Result<u32, Error<I2C::Error>> {
        self.fill(value.to_bytes().as_ref()).await
    }

    pub async fn read_device_id(&mut self, slot: usize) -> Result<DeviceId, Error<I2C::Error>> {
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
            .await
            .map_err(Error::bus)?;
        DeviceId::from_raw(raw).ok_or(Error::UnsupportedDeviceId)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    async fn write_payload(
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
                .await
                .map_err(|error| Error::I2c {
                    error,
                    transferred: segment.start,
                })?;
        }
        Ok(len)
    }

    async fn probe_size(&mut self, address: u8) -> ChipSize {
        for (size, wrap_offset) in probe_candidates() {
            match self.probe_wraparound(address, wrap_offset).await {
                Ok(true) => return size,
                Ok(false) => trace!("{:#x}: no wraparound at {}", address, wrap_offset),
                Err(_) => warn!("{:#x}: probe at {} failed", address, wrap_offset),
            }
        }
        debug!("{:#x}: no wraparound, largest size", address);
        ChipSize::LARGEST
    }

    async fn probe_wraparound(&mut self, address: u8, wrap_offset: u16) -> Result<bool, I2C::Error> {
        let original = self.read_byte(address, 0).await?;
        let wrapped = self.write_probe_sentinels(address, wrap_offset).await;
        let restored = self.write_byte(address, 0, original).await;
        let wrapped = wrapped?;
        restored?;
        Ok(wrapped)
    }

    async fn write_probe_sentinels(
        &mut self,
        address: u8,
        wrap_offset: u16,
    ) -> Result<bool, I2C::Error> {
        self.write_byte(address, 0, SENTINEL_LOW).await?;
        let saved = self.read_byte(address, wrap_offset).await?;
        self.write_byte(address, wrap_offset, SENTINEL_HIGH).await?;
        let seen = self.read_byte(address, 0).await?;
        self.write_byte(address, wrap_offset, saved).await?;
        Ok(seen == SENTINEL_HIGH)
    }

    async fn read_byte(&mut self, address: u8, offset: u16) -> Result<u8, I2C::Error> {
        let mut byte = [0u8; 1];
        self.i2c
            .write_read(address, &offset.to_be_bytes(), &mut byte)
            .await?;
        Ok(byte[0])
    }

    async fn write_byte(&mut self, address: u8, offset: u16, value: u8) -> Result<(), I2C::Error> {
        let [hi, lo] = offset.to_be_bytes();
        self.i2c.write(address, &[hi, lo, value]).await
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::sim::{SimBus, SimError};

    fn discovered(bus: SimBus) -> AsyncFram<SimBus> {
        let mut fram = AsyncFram::new(bus, Config::default()).unwrap();
        block_on(fram.discover());
        fram
    }

    #[test]
    fn discover_matches_blocking_driver() {
        let bus = SimBus::new()
            .with_chip(0, ChipSize::Kib8)
            .with_chip(1, ChipSize::Kib32)
            .with_chip(5, ChipSize::Kib64);
        let before = bus.memory(1).to_vec();
        let fram = discovered(bus);

        assert_eq!(fram.config(), &Config::default());
        assert_eq!(fram.device_count(), 3);
        assert_eq!(fram.total_bytes(), 8192 + 32768 + 65536);
        assert_eq!(fram.registry().slot(5), Some(ChipSize::Kib64));
        assert_eq!(fram.release().memory(1), &before[..]);
    }

    #[test]
    fn write_spans_chip_boundary() {
        let mut fram = discovered(
            SimBus::new()
                .with_chip(0, ChipSize::Kib8)
                .with_chip(1, ChipSize::Kib32),
        );
        let data: Vec<u8> = (0..40u8).collect();

        assert_eq!(block_on(fram.write(8180, &data)), Ok(40));
        let mut back = [0u8; 40];
        assert_eq!(block_on(fram.read(8180, &mut back)), Ok(40));
        assert_eq!(&back[..], &data[..]);

        let bus = fram.release();
        assert_eq!(&bus.memory(0)[8180..], &data[..12]);
        assert_eq!(&bus.memory(1)[..28], &data[12..]);
    }

    #[test]
    fn empty_bus_rejects_transfers() {
        let mut fram = discovered(SimBus::new());
        let mut buf = [0u8; 2];
        assert_eq!(block_on(fram.read(0, &mut buf)), Err(Error::NoCapacity));
        assert_eq!(block_on(fram.read(0, &mut [])), Ok(0));
    }

    #[test]
    fn fill_and_records() {
        let mut fram = discovered(SimBus::new().with_chip(3, ChipSize::Kib8));
        fram.i2c.clear_log();
        assert_eq!(block_on(fram.fill_record(&[1u8, 2, 3, 4, 5])), Ok(8192 / 5));
        assert!(fram.i2c.log.iter().all(|t| t.written == 30));
        assert_eq!(block_on(fram.read_record::<[u8; 5]>(5)), Ok([1, 2, 3, 4, 5]));
        assert_eq!(block_on(fram.fill(&[])), Err(Error::InvalidLength));

        block_on(fram.write_record(100, &-42i64)).unwrap();
        assert_eq!(block_on(fram.read_record::<i64>(100)), Ok(-42));
    }

    #[test]
    fn bus_error_is_reported() {
        let mut fram = discovered(SimBus::new().with_chip(0, ChipSize::Kib8));
        fram.i2c = core::mem::take(&mut fram.i2c).fail_once_at(0x50, 64);

        let mut buf = [0u8; 80];
        assert_eq!(
            block_on(fram.read(0, &mut buf)),
            Err(Error::I2c {
                error: SimError::Injected,
                transferred: 64
            })
        );

        fram.i2c = core::mem::take(&mut fram.i2c).fail_once_at(0x50, 60);
        let err = block_on(fram.write(0, &[1; 100])).unwrap_err();
        assert_eq!(err.transferred(), Some(60));
        assert!(fram.i2c.memory(0)[..60].iter().all(|&b| b == 1));
    }

    #[test]
    fn device_id_query() {
        let mut fram = discovered(
            SimBus::new()
                .with_chip(1, ChipSize::Kib64)
                .with_device_id(1, [0x00, 0xA6, 0x58]),
        );
        let id = block_on(fram.read_device_id(1)).unwrap();
        assert_eq!(id.size(), Some(ChipSize::Kib64));
        assert_eq!(block_on(fram.read_device_id(0)), Err(Error::NoDevice));
    }
}
