//! Newtype wrappers for identifiers that travel through the node.
//!
//! Destination hashes and link ids share the same 16-byte representation;
//! keeping them as distinct types prevents passing one where the other is
//! expected.

use std::fmt;

use crate::error::InvalidLength;

fn fmt_hex(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in bytes {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

/// Declares a 16-byte hash newtype with hex `Display` and a short `Debug`.
macro_rules! hash16 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[must_use]
        pub struct $name([u8; 16]);

        impl $name {
            pub const LEN: usize = 16;

            pub const fn new(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            pub const fn to_bytes(self) -> [u8; 16] {
                self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 16]> for $name {
            fn from(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = InvalidLength;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; 16] = bytes.try_into().map_err(|_| InvalidLength {
                    expected: 16,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt_hex(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "("))?;
                fmt_hex(&self.0[..4], f)?;
                write!(f, "..)")
            }
        }
    };
}

hash16!(
    /// Address of a destination in the mesh (truncated SHA-256 of its identity
    /// and name).
    DestinationHash
);

hash16!(
    /// Identifier of an established link, derived from the link request so
    /// both ends compute the same value.
    LinkId
);

/// Process-local identifier of a physical interface instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(pub u64);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if#{}", self.0)
    }
}
