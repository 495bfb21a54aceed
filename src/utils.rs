use core::fmt;

/// Creates an enum representing a one-byte wire field, with unassigned
/// values preserved in a catch-all `Unknown` variant.
///
/// The controller side of the protocol grows new packet kinds faster than
/// deployed firmwares are reflashed, and the dispatcher is required to
/// relay frames it does not understand (they are treated like reports).
/// Round-tripping through the typed enum therefore must not lose the raw
/// discriminant, which rules out plain `#[repr(u8)]` conversions. The
/// expansion technique follows [smoltcp]'s wire enums.
///
/// [smoltcp]: https://github.com/m-labs/smoltcp/blob/cd893e6ab60f094d684b37be7bc013bf79f0459d/src/macros.rs
macro_rules! wire_enum {
    (
        $( #[$enum_attr:meta] )*
        $v:vis enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr $(,)*
            ),*
        }
    ) => {
        $( #[$enum_attr] )*
        $v enum $name {
            $(
              $( #[$variant_attr] )*
              $variant,
            )*
            /// A value this firmware does not know; carried so it can be
            /// re-encoded unchanged.
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant, )*
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value, )*
                    $name::Unknown(other) => other
                }
            }
        }
    }
}

/// `Debug`-formats a frame or payload as space-separated hex bytes.
///
/// Used by the packet traces (`TXU`/`TXB` and the dispatcher's drop lines)
/// where the raw bytes matter more than the decoded fields.
#[derive(Copy, Clone)]
pub struct HexSlice<T>(pub T)
where
    T: AsRef<[u8]>;

impl<T: AsRef<[u8]>> fmt::Debug for HexSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, byte) in self.0.as_ref().iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_slice_formats_payload_bytes() {
        let payload = [0x00u8, 0x85, 0x0f];
        assert_eq!(format!("{:?}", HexSlice(&payload[..])), "[00 85 0f]");
        assert_eq!(format!("{:?}", HexSlice(&[0u8; 0][..])), "[]");
    }
}
