//! Fixed-size values stored as bytes.
//!
//! The transfer engine only moves byte slices. [`Record`] converts a value to and
//! from its stored form so it can be read, written, or used as a fill pattern.
//! Primitive numbers are stored little-endian.

/// A value with a fixed-size byte representation.
pub trait Record: Sized {
    /// Stored representation, usually `[u8; N]`.
    type Bytes: AsRef<[u8]> + AsMut<[u8]>;

    /// All-zero representation used as the read buffer.
    const ZEROED: Self::Bytes;

    fn to_bytes(&self) -> Self::Bytes;
    fn from_bytes(bytes: &Self::Bytes) -> Self;
}

macro_rules! impl_record_le {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Record for $ty {
                type Bytes = [u8; core::mem::size_of::<$ty>()];

                const ZEROED: Self::Bytes = [0; core::mem::size_of::<$ty>()];

                fn to_bytes(&self) -> Self::Bytes {
                    self.to_le_bytes()
                }

                fn from_bytes(bytes: &Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(*bytes)
                }
            }
        )*
    };
}

impl_record_le!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl<const N: usize> Record for [u8; N] {
    type Bytes = [u8; N];

    const ZEROED: Self::Bytes = [0; N];

    fn to_bytes(&self) -> Self::Bytes {
        *self
    }

    fn from_bytes(bytes: &Self::Bytes) -> Self {
        *bytes
    }
}
