use thiserror::Error;

/// Raised when a read asks for more bytes than the buffer has left.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("out of bytes (wanted {wanted}, {remaining} remaining)")]
pub struct OutOfBytes {
    pub wanted: usize,
    pub remaining: usize,
}

/**
This macro builds a set of `try_get_{number_type}` functions for safe reading of
bytes from a Buf. They return Result<T, OutOfBytes> instead of panicking
 */
macro_rules! impl_safebuf {
    ( $($type:ty),* ) => {
        pub trait SafeBuf: bytes::Buf {
            paste::paste! {
                $(
                fn [<try_get_ $type>](&mut self) -> Result<$type, OutOfBytes> {
                    self.ensure_remaining(std::mem::size_of::<$type>())?;
                    Ok(self.[<get_ $type>]())
                }
                )*
            }

            fn ensure_remaining(&self, wanted: usize) -> Result<(), OutOfBytes> {
                if self.remaining() >= wanted {
                    Ok(())
                } else {
                    Err(OutOfBytes {
                        wanted,
                        remaining: self.remaining(),
                    })
                }
            }

            /// Splits the next `len` bytes off the buffer.
            fn try_get_bytes(&mut self, len: usize) -> Result<bytes::Bytes, OutOfBytes> {
                self.ensure_remaining(len)?;
                Ok(self.copy_to_bytes(len))
            }
        }

        impl<T: bytes::Buf> SafeBuf for T { }
    }
}

impl_safebuf!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);
