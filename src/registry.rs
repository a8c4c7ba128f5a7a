//! Chip registry and address translation.
//!
//! The registry holds one slot per selectable bus address. Present chips are
//! concatenated in slot order into a single virtual address space.

use crate::types::{MAX_DEVICES, MIN_ADDRESS};

/// Capacities the wraparound probe can tell apart.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipSize {
    /// 64 Kbit: MB85RC64V, MB85RC64A, MB85RC64TA
    Kib8,
    /// 128 Kbit: MB85RC128A
    Kib16,
    /// 256 Kbit: MB85RC256V
    Kib32,
    /// 512 Kbit: MB85RC512T
    Kib64,
}

impl ChipSize {
    /// All sizes, smallest first.
    pub const ALL: [ChipSize; 4] = [Self::Kib8, Self::Kib16, Self::Kib32, Self::Kib64];
    pub const SMALLEST: ChipSize = Self::Kib8;
    pub const LARGEST: ChipSize = Self::Kib64;

    pub const fn bytes(self) -> u32 {
        match self {
            Self::Kib8 => 8 * 1024,
            Self::Kib16 => 16 * 1024,
            Self::Kib32 => 32 * 1024,
            Self::Kib64 => 64 * 1024,
        }
    }

    pub fn from_bytes(bytes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|size| size.bytes() == bytes)
    }

    /// Memory address that aliases onto offset 0 on a chip of exactly this size.
    ///
    /// `None` for the largest size, whose first wrapping address does not fit the
    /// 16-bit memory address.
    pub fn wrap_offset(self) -> Option<u16> {
        u16::try_from(self.bytes()).ok()
    }
}

/// Position of a virtual offset on a physical chip.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Location {
    pub slot: usize,
    /// Offset inside the chip.
    pub offset: u32,
    /// Bytes after `offset` up to and including the chip's last byte.
    pub until_end: u32,
}

/// Discovered chips, one optional entry per bus address.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipRegistry {
    slots: [Option<ChipSize>; MAX_DEVICES],
    total: u32,
}

impl ChipRegistry {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_DEVICES],
            total: 0,
        }
    }

    pub fn from_slots(slots: [Option<ChipSize>; MAX_DEVICES]) -> Self {
        let total = slots.iter().flatten().map(|size| size.bytes()).sum();
        Self { slots, total }
    }

    /// Bus address served by `slot`.
    pub const fn address(slot: usize) -> u8 {
        MIN_ADDRESS + slot as u8
    }

    pub fn slot(&self, slot: usize) -> Option<ChipSize> {
        self.slots.get(slot).copied().flatten()
    }

    /// Capacity of the chip in `slot`, 0 for an empty or out-of-range slot.
    pub fn chip_bytes(&self, slot: usize) -> u32 {
        self.slot(slot).map_or(0, ChipSize::bytes)
    }

    pub const fn total_bytes(&self) -> u32 {
        self.total
    }

    pub fn device_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Present chips in slot order.
    pub fn chips(&self) -> impl Iterator<Item = (usize, ChipSize)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, size)| size.map(|size| (slot, size)))
    }

    /// Translate a virtual offset. `None` if `offset` is not below the total capacity.
    pub fn locate(&self, offset: u32) -> Option<Location> {
        let mut remaining = offset;
        for (slot, size) in self.chips() {
            let capacity = size.bytes();
            if remaining < capacity {
                return Some(Location {
                    slot,
                    offset: remaining,
                    until_end: capacity - 1 - remaining,
                });
            }
            remaining -= capacity;
        }
        None
    }

    /// First present slot after `slot`, wrapping past the last one.
    ///
    /// Returns `slot` itself when it is the only present chip. The registry must
    /// not be empty.
    pub(crate) fn next_present(&self, slot: usize) -> usize {
        (1..=MAX_DEVICES)
            .map(|step| (slot + step) % MAX_DEVICES)
            .find(|&candidate| self.slots[candidate].is_some())
            .unwrap_or(slot)
    }
}
