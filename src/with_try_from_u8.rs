/// Wraps a fieldless `#[repr(u8)]` enum, deriving `TryFrom<u8>` for it.
///
/// The conversion hands back the rejected byte on failure, so callers can report exactly what
/// they could not decode.
#[macro_export]
macro_rules! with_try_from_u8 {
    ($(#[$meta:meta])* $vis:vis enum $name:ident {
        $($(#[$vmeta:meta])* $vname:ident $(= $val:expr)?,)*
    }) => {
        $(#[$meta])*
        $vis enum $name {
            $($(#[$vmeta])* $vname $(= $val)?,)*
        }

        impl std::convert::TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(byte: u8) -> Result<Self, Self::Error> {
                match byte {
                    $(x if x == $name::$vname as u8 => Ok($name::$vname),)*
                    _ => Err(byte),
                }
            }
        }
    }
}
