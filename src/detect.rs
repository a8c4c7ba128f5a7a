//! Chip identification helpers shared by the blocking and async drivers.
//!
//! Only MB85RC256V and MB85RC512T answer the device-ID command. The smaller parts
//! have no identification at all, so capacity is found with a wraparound probe:
//! writing one byte past the end of a chip lands on offset 0.

use crate::registry::ChipSize;

/// Written to offset 0 before the candidate wrap address is touched.
pub(crate) const SENTINEL_LOW: u8 = 0x00;
/// Written to the candidate wrap address; shows up at offset 0 on a wraparound.
pub(crate) const SENTINEL_HIGH: u8 = 0xFF;

/// Reserved slave address answering the device-ID command.
pub(crate) const DEVICE_ID_ADDRESS: u8 = 0x7C;

/// JEDEC-assigned manufacturer ID of Fujitsu.
pub const FUJITSU_MANUFACTURER_ID: u16 = 0x00A;

/// Candidate sizes paired with the memory address that wraps onto offset 0.
pub(crate) fn probe_candidates() -> impl Iterator<Item = (ChipSize, u16)> {
    ChipSize::ALL
        .into_iter()
        .filter_map(|size| size.wrap_offset().map(|offset| (size, offset)))
}

/// Manufacturer and product ID reported by the device-ID command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId {
    /// 12-bit manufacturer ID.
    pub manufacturer: u16,
    /// 12-bit product ID; the upper nibble is the density code.
    pub product: u16,
}

impl DeviceId {
    /// `None` unless the response carries the Fujitsu manufacturer ID.
    pub(crate) fn from_raw(raw: [u8; 3]) -> Option<Self> {
        let manufacturer = (u16::from(raw[0]) << 4) | u16::from(raw[1] >> 4);
        let product = (u16::from(raw[1] & 0x0F) << 8) | u16::from(raw[2]);
        if manufacturer != FUJITSU_MANUFACTURER_ID {
            return None;
        }
        Some(Self {
            manufacturer,
            product,
        })
    }

    pub const fn density(&self) -> u8 {
        (self.product >> 8) as u8
    }

    /// Capacity implied by the density code, when it is a supported size.
    pub fn size(&self) -> Option<ChipSize> {
        match self.density() {
            0x5 => Some(ChipSize::Kib32),
            0x6 => Some(ChipSize::Kib64),
            _ => None,
        }
    }
}

/// Command byte for the device-ID request: the chip's address in write form.
pub(crate) const fn device_id_command(address: u8) -> [u8; 1] {
    [address << 1]
}
