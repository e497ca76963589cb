//! Register definitions for the P9221
//!
//! Register values are little-endian. Multi-byte windows (message buffers,
//! FOD table, firmware staging areas) are accessed as raw blocks through
//! [`Device`](crate::Device) and only their base addresses are listed here.

/// Defines a register holding a single little-endian unsigned value.
macro_rules! value_register {
    (
        $(#[$meta:meta])*
        $name:ident: $ty:ty = $addr:tt
    ) => {
        $(#[$meta])*
        #[regiface::register($addr)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister, WritableRegister)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name {
            /// Raw register value
            pub value: $ty,
        }

        impl FromByteArray for $name {
            type Error = Infallible;
            type Array = [u8; core::mem::size_of::<$ty>()];

            fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
                Ok(Self {
                    value: <$ty>::from_le_bytes(bytes),
                })
            }
        }

        impl ToByteArray for $name {
            type Error = Infallible;
            type Array = [u8; core::mem::size_of::<$ty>()];

            fn to_bytes(self) -> Result<Self::Array, Self::Error> {
                Ok(self.value.to_le_bytes())
            }
        }
    };
}

mod identity;
mod message;
mod otp;
mod status;
mod telemetry;

pub use identity::*;
pub use message::*;
pub use otp::*;
pub use status::*;
pub use telemetry::*;
