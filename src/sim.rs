//! Simulated I2C bus with MB85RC chips, for tests.
//!
//! Memory addresses are masked to the chip size, which reproduces the wraparound
//! the capacity probe relies on.

use embedded_hal_1::i2c::{ErrorKind, NoAcknowledgeSource, Operation};

use crate::detect::DEVICE_ID_ADDRESS;
use crate::registry::ChipSize;
use crate::types::{MAX_DEVICES, MIN_ADDRESS};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SimError {
    Nack,
    Injected,
}

impl embedded_hal_1::i2c::Error for SimError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Self::Injected => ErrorKind::Bus,
        }
    }
}

pub(crate) struct SimChip {
    pub memory: Vec<u8>,
    pub device_id: Option<[u8; 3]>,
    pointer: usize,
}

impl SimChip {
    fn write_byte(&mut self, value: u8) {
        self.memory[self.pointer] = value;
        self.pointer = (self.pointer + 1) % self.memory.len();
    }

    fn read_byte(&mut self) -> u8 {
        let value = self.memory[self.pointer];
        self.pointer = (self.pointer + 1) % self.memory.len();
        value
    }
}

/// Transaction record: bus address, memory address (if positioned), data bytes moved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Logged {
    pub address: u8,
    pub memory_address: Option<u16>,
    pub written: usize,
    pub read: usize,
}

#[derive(Default)]
pub(crate) struct SimBus {
    pub chips: [Option<SimChip>; MAX_DEVICES],
    pub log: Vec<Logged>,
    /// Fail transactions positioned at `(bus address, memory address)`, `budget` times,
    /// after letting `fail_skip` of them through.
    pub fail_at: Option<(u8, u16)>,
    pub fail_skip: usize,
    pub fail_budget: usize,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chip filled with a position-dependent pattern so restores are observable.
    pub fn with_chip(mut self, slot: usize, size: ChipSize) -> Self {
        let memory = (0..size.bytes() as usize)
            .map(|i| (i as u8).wrapping_mul(7).wrapping_add(3))
            .collect();
        self.chips[slot] = Some(SimChip {
            memory,
            device_id: None,
            pointer: 0,
        });
        self
    }

    pub fn with_device_id(mut self, slot: usize, raw: [u8; 3]) -> Self {
        if let Some(chip) = self.chips[slot].as_mut() {
            chip.device_id = Some(raw);
        }
        self
    }

    pub fn fail_once_at(self, address: u8, memory_address: u16) -> Self {
        self.fail_nth_at(address, memory_address, 0)
    }

    /// Fail only the transaction after the first `skip` ones positioned there.
    pub fn fail_nth_at(mut self, address: u8, memory_address: u16, skip: usize) -> Self {
        self.fail_at = Some((address, memory_address));
        self.fail_skip = skip;
        self.fail_budget = 1;
        self
    }

    pub fn memory(&self, slot: usize) -> &[u8] {
        &self.chips[slot].as_ref().unwrap().memory
    }

    pub fn memory_mut(&mut self, slot: usize) -> &mut [u8] {
        &mut self.chips[slot].as_mut().unwrap().memory
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn injected_failure(&mut self, address: u8, memory_address: Option<u16>) -> bool {
        match (self.fail_at, memory_address) {
            (Some(target), Some(memory_address))
                if target == (address, memory_address) && self.fail_budget > 0 =>
            {
                if self.fail_skip > 0 {
                    self.fail_skip -= 1;
                    return false;
                }
                self.fail_budget -= 1;
                true
            }
            _ => false,
        }
    }

    fn device_id(&mut self, operations: &mut [Operation<'_>]) -> Result<(), SimError> {
        let [Operation::Write(command), Operation::Read(out)] = operations else {
            return Err(SimError::Nack);
        };
        let slot = usize::from(command[0] >> 1)
            .checked_sub(usize::from(MIN_ADDRESS))
            .filter(|slot| *slot < MAX_DEVICES)
            .ok_or(SimError::Nack)?;
        let raw = self.chips[slot]
            .as_ref()
            .and_then(|chip| chip.device_id)
            .ok_or(SimError::Nack)?;
        out.copy_from_slice(&raw[..out.len()]);
        Ok(())
    }
}

impl embedded_hal_1::i2c::ErrorType for SimBus {
    type Error = SimError;
}

impl embedded_hal_1::i2c::I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address == DEVICE_ID_ADDRESS {
            return self.device_id(operations);
        }

        let memory_address = match operations.first() {
            Some(Operation::Write(bytes)) if bytes.len() >= 2 => {
                Some(u16::from_be_bytes([bytes[0], bytes[1]]))
            }
            _ => None,
        };
        if self.injected_failure(address, memory_address) {
            return Err(SimError::Injected);
        }

        let slot = usize::from(address.wrapping_sub(MIN_ADDRESS));
        let chip = self
            .chips
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(SimError::Nack)?;

        let mut entry = Logged {
            address,
            memory_address,
            written: 0,
            read: 0,
        };
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if bytes.len() < 2 {
                        continue;
                    }
                    let mask = chip.memory.len() - 1;
                    chip.pointer = usize::from(u16::from_be_bytes([bytes[0], bytes[1]])) & mask;
                    for &byte in &bytes[2..] {
                        chip.write_byte(byte);
                    }
                    entry.written += bytes.len() - 2;
                }
                Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = chip.read_byte();
                    }
                    entry.read += buffer.len();
                }
            }
        }
        self.log.push(entry);
        Ok(())
    }
}

impl embedded_hal_async::i2c::I2c for SimBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        embedded_hal_1::i2c::I2c::transaction(self, address, operations)
    }
}
