//! Splitting of virtual-space transfers into bus transactions.

use core::ops::Range;

use crate::registry::ChipRegistry;
use crate::types::{ADDRESS_BYTES, MAX_TRANSACTION_SIZE};

/// One bus transaction worth of a transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Segment {
    pub slot: usize,
    /// Offset inside the chip.
    pub offset: u32,
    /// Position of the segment in the caller's buffer.
    pub start: usize,
    pub len: usize,
}

impl Segment {
    pub fn address(&self) -> u8 {
        ChipRegistry::address(self.slot)
    }

    pub fn memory_address(&self) -> [u8; ADDRESS_BYTES] {
        (self.offset as u16).to_be_bytes()
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    /// Address bytes followed by this segment's part of `payload`.
    pub fn write_frame<'b>(
        &self,
        frame: &'b mut [u8; MAX_TRANSACTION_SIZE],
        payload: &Payload<'_>,
    ) -> &'b [u8] {
        let end = ADDRESS_BYTES + self.len;
        frame[..ADDRESS_BYTES].copy_from_slice(&self.memory_address());
        payload.copy_into(self.start, &mut frame[ADDRESS_BYTES..end]);
        &frame[..end]
    }
}

/// Source of the bytes sent by a write transfer.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Payload<'d> {
    Bytes(&'d [u8]),
    /// `record` repeated back to back over `len` bytes.
    Repeat { record: &'d [u8], len: usize },
}

impl Payload<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(data) => data.len(),
            Self::Repeat { len, .. } => *len,
        }
    }

    fn copy_into(&self, start: usize, out: &mut [u8]) {
        match self {
            Self::Bytes(data) => out.copy_from_slice(&data[start..start + out.len()]),
            Self::Repeat { record, .. } => {
                for (i, byte) in out.iter_mut().enumerate() {
                    *byte = record[(start + i) % record.len()];
                }
            }
        }
    }
}

/// Transfer cursor over the virtual address space.
///
/// Yields segments no longer than `chunk` that never cross a chip's last byte.
/// After a chip's last byte the cursor continues at offset 0 of the next present
/// chip, wrapping from the last one to the first.
pub(crate) struct Segments<'a> {
    registry: &'a ChipRegistry,
    chunk: usize,
    slot: usize,
    offset: u32,
    until_end: u32,
    done: usize,
    len: usize,
}

impl<'a> Segments<'a> {
    /// `None` when the registry is empty.
    pub fn new(registry: &'a ChipRegistry, offset: u32, len: usize, chunk: usize) -> Option<Self> {
        let total = registry.total_bytes();
        if total == 0 {
            return None;
        }
        let start = registry.locate(offset % total)?;
        Some(Self {
            registry,
            chunk,
            slot: start.slot,
            offset: start.offset,
            until_end: start.until_end,
            done: 0,
            len,
        })
    }
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.done >= self.len {
            return None;
        }

        let in_chip = self.until_end as usize + 1;
        let step = (self.len - self.done).min(self.chunk).min(in_chip);
        let segment = Segment {
            slot: self.slot,
            offset: self.offset,
            start: self.done,
            len: step,
        };
        self.done += step;

        if step == in_chip {
            self.slot = self.registry.next_present(self.slot);
            self.offset = 0;
            self.until_end = self.registry.chip_bytes(self.slot) - 1;
        } else {
            self.offset += step as u32;
            self.until_end -= step as u32;
        }

        Some(segment)
    }
}
