#![cfg_attr(not(test), no_std)]
//! Driver for Fujitsu MB85RCxx I2C FRAM chips.
//!
//! Up to eight chips on one bus are discovered, sized, and presented as a single
//! contiguous byte store. Built on the `embedded-hal` I2C traits.
//!
//! # Supported parts
//!
//! | Part | Capacity | Device ID |
//! |------|----------|-----------|
//! | MB85RC64V / MB85RC64A / MB85RC64TA | 8 KiB | no |
//! | MB85RC128A | 16 KiB | no |
//! | MB85RC256V | 32 KiB | yes |
//! | MB85RC512T | 64 KiB | yes |
//!
//! Most parts cannot report their size, so discovery relies on the memory address
//! wrapping at the end of the chip: a byte written one past the end shows up at
//! offset 0.
//!
//! # Example (blocking)
//! ```ignore
//! let mut fram = mb85_fram::Fram::new(i2c, mb85_fram::Config::default())?;
//! let chips = fram.discover();
//! fram.write(8180, b"spans two chips")?;
//! let mut buf = [0u8; 15];
//! fram.read(8180, &mut buf)?;
//! ```
//!
//! # Example (async)
//! ```ignore
//! let mut fram = mb85_fram::AsyncFram::new(i2c, mb85_fram::Config::default())?;
//! fram.discover().await;
//! fram.fill_record(&0u32).await?;
//! ```

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod r#async;
mod blocking;
mod detect;
pub mod record;
pub mod registry;
mod transfer;
mod types;

#[cfg(test)]
mod sim;

pub use blocking::Fram;
pub use detect::{DeviceId, FUJITSU_MANUFACTURER_ID};
pub use r#async::AsyncFram;
pub use record::Record;
pub use registry::{ChipRegistry, ChipSize, Location};
pub use types::{
    BusSpeed, Config, Error, Hertz, DEFAULT_TRANSACTION_SIZE, MAX_DEVICES, MAX_TRANSACTION_SIZE,
    MIN_ADDRESS,
};
