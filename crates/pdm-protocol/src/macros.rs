/// Declare a `u8`-backed wire enum with lossless raw conversions
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[repr(u8)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value
            ),+
        }

        impl $name {
            /// Raw wire value
            pub const fn raw(self) -> u8 {
                self as u8
            }

            /// Parse a raw wire value
            pub fn from_raw(raw: u8) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(raw: u8) -> Result<Self, u8> {
                Self::from_raw(raw).ok_or(raw)
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value.raw()
            }
        }
    };
}
