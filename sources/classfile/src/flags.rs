//! Access flags for classes, fields and methods.
//! Unknown bits are kept so that a read-then-write cycle reproduces the input exactly.

use bitflags::bitflags;
use tracing::warn;

macro_rules! impl_flags {
    ( $flag_type:ident ) => {
        impl $flag_type {
            pub fn read(raw: u16) -> Self {
                if <$flag_type>::from_bits(raw).is_none() {
                    warn!("unrecognised bits {:b} for {}", raw, stringify!($flag_type));
                }

                <$flag_type>::from_bits_retain(raw)
            }

            pub fn has(&self, other: $flag_type) -> bool {
                self.contains(other)
            }
        }
    };
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassAccessFlags: u16 {
         const PUBLIC = 0x0001;
         const FINAL = 0x0010;
         const SUPER = 0x0020;
         const INTERFACE = 0x0200;
         const ABSTRACT = 0x0400;
         const SYNTHETIC = 0x1000;
         const ANNOTATION = 0x2000;
         const ENUM = 0x4000;
         const MODULE = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAccessFlags: u16 {
         const PUBLIC = 0x0001;
         const PRIVATE = 0x0002;
         const PROTECTED = 0x0004;
         const STATIC = 0x0008;
         const FINAL = 0x0010;
         const SYNCHRONIZED = 0x0020;
         const BRIDGE = 0x0040;
         const VARARGS = 0x0080;
         const NATIVE = 0x0100;
         const ABSTRACT = 0x0400;
         const STRICT_FP = 0x0800;
         const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldAccessFlags: u16 {
         const PUBLIC = 0x0001;
         const PRIVATE = 0x0002;
         const PROTECTED = 0x0004;
         const STATIC = 0x0008;
         const FINAL = 0x0010;
         const VOLATILE = 0x0040;
         const TRANSIENT = 0x0080;
         const SYNTHETIC = 0x1000;
         const ENUM = 0x4000;
    }
}

impl_flags!(ClassAccessFlags);
impl_flags!(MethodAccessFlags);
impl_flags!(FieldAccessFlags);

#[cfg(test)]
mod tests {
    use super::{ClassAccessFlags, FieldAccessFlags};

    #[test]
    fn it_keeps_unknown_bits() {
        let flags = ClassAccessFlags::read(0x0021 | 0x0100);
        assert!(flags.has(ClassAccessFlags::PUBLIC));
        assert_eq!(flags.bits(), 0x0121);
    }

    #[test]
    fn it_reads_known_field_bits() {
        let flags = FieldAccessFlags::read(0x000A);
        assert!(flags.has(FieldAccessFlags::PRIVATE));
        assert!(flags.has(FieldAccessFlags::STATIC));
        assert!(!flags.has(FieldAccessFlags::PUBLIC));
    }
}
