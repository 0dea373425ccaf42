use std::collections::HashMap;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use enum_as_inner::EnumAsInner;
use support::bytes_ext::SafeBuf;
use support::encoding::{decode_modified_utf8, decode_modified_utf8_lossy, encode_modified_utf8};
use tracing::trace;

use crate::equality::{compare, compare_seq, Mismatch, StructuralEq};
use crate::error::{ClassFileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantTag {
    Class,
    Field,
    Method,
    InterfaceMethod,
    String,
    Integer,
    Float,
    Long,
    Double,
    NameAndType,
    Utf8,
    MethodHandle,
    MethodType,
    Dynamic,
    InvokeDynamic,
    Module,
    Package,
}

impl ConstantTag {
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            1 => ConstantTag::Utf8,
            3 => ConstantTag::Integer,
            4 => ConstantTag::Float,
            5 => ConstantTag::Long,
            6 => ConstantTag::Double,
            7 => ConstantTag::Class,
            8 => ConstantTag::String,
            9 => ConstantTag::Field,
            10 => ConstantTag::Method,
            11 => ConstantTag::InterfaceMethod,
            12 => ConstantTag::NameAndType,
            15 => ConstantTag::MethodHandle,
            16 => ConstantTag::MethodType,
            17 => ConstantTag::Dynamic,
            18 => ConstantTag::InvokeDynamic,
            19 => ConstantTag::Module,
            20 => ConstantTag::Package,
            _ => {
                return Err(ClassFileError::malformed(format!(
                    "{tag} is an unknown constant pool tag"
                )))
            }
        })
    }

    pub fn tag(&self) -> u8 {
        match self {
            ConstantTag::Utf8 => 1,
            ConstantTag::Integer => 3,
            ConstantTag::Float => 4,
            ConstantTag::Long => 5,
            ConstantTag::Double => 6,
            ConstantTag::Class => 7,
            ConstantTag::String => 8,
            ConstantTag::Field => 9,
            ConstantTag::Method => 10,
            ConstantTag::InterfaceMethod => 11,
            ConstantTag::NameAndType => 12,
            ConstantTag::MethodHandle => 15,
            ConstantTag::MethodType => 16,
            ConstantTag::Dynamic => 17,
            ConstantTag::InvokeDynamic => 18,
            ConstantTag::Module => 19,
            ConstantTag::Package => 20,
        }
    }
}

/// Raw modified UTF-8 bytes. Kept undecoded so that any input round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantUtf8 {
    pub bytes: Vec<u8>,
}

impl ConstantUtf8 {
    pub fn try_string(&self) -> Result<String> {
        decode_modified_utf8(&self.bytes)
            .map_err(|e| ClassFileError::malformed(format!("bad modified utf8: {e}")))
    }

    pub fn lossy(&self) -> String {
        decode_modified_utf8_lossy(&self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantInteger {
    pub bytes: u32,
}

/// Stored as raw bits so that equality and hashing are exact (NaN payloads included).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantFloat {
    pub bits: u32,
}

impl ConstantFloat {
    pub fn value(&self) -> f32 {
        f32::from_bits(self.bits)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantLong {
    pub bytes: u64,
}

impl ConstantLong {
    pub fn value(&self) -> i64 {
        self.bytes as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantDouble {
    pub bits: u64,
}

impl ConstantDouble {
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantClass {
    pub name: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantString {
    pub string: u16,
}

/// Shared layout of field, method and interface method references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantMemberRef {
    pub class: u16,
    pub name_and_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantNameAndType {
    pub name: u16,
    pub descriptor: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantMethodHandle {
    pub kind: u8,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantMethodType {
    pub descriptor: u16,
}

/// Shared layout of `CONSTANT_Dynamic` and `CONSTANT_InvokeDynamic`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantDynamic {
    pub bootstrap_method: u16,
    pub name_and_type: u16,
}

/// Shared layout of `CONSTANT_Module` and `CONSTANT_Package`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantNamed {
    pub name: u16,
}

#[derive(EnumAsInner, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantEntry {
    Class(ConstantClass),
    Field(ConstantMemberRef),
    Method(ConstantMemberRef),
    InterfaceMethod(ConstantMemberRef),
    String(ConstantString),
    Integer(ConstantInteger),
    Float(ConstantFloat),
    Long(ConstantLong),
    Double(ConstantDouble),
    NameAndType(ConstantNameAndType),
    Utf8(ConstantUtf8),
    MethodHandle(ConstantMethodHandle),
    MethodType(ConstantMethodType),
    Dynamic(ConstantDynamic),
    InvokeDynamic(ConstantDynamic),
    Module(ConstantNamed),
    Package(ConstantNamed),
    /// Slot 0, and the slot following every long or double.
    Reserved,
}

impl ConstantEntry {
    pub fn tag(&self) -> Option<ConstantTag> {
        Some(match self {
            ConstantEntry::Class(_) => ConstantTag::Class,
            ConstantEntry::Field(_) => ConstantTag::Field,
            ConstantEntry::Method(_) => ConstantTag::Method,
            ConstantEntry::InterfaceMethod(_) => ConstantTag::InterfaceMethod,
            ConstantEntry::String(_) => ConstantTag::String,
            ConstantEntry::Integer(_) => ConstantTag::Integer,
            ConstantEntry::Float(_) => ConstantTag::Float,
            ConstantEntry::Long(_) => ConstantTag::Long,
            ConstantEntry::Double(_) => ConstantTag::Double,
            ConstantEntry::NameAndType(_) => ConstantTag::NameAndType,
            ConstantEntry::Utf8(_) => ConstantTag::Utf8,
            ConstantEntry::MethodHandle(_) => ConstantTag::MethodHandle,
            ConstantEntry::MethodType(_) => ConstantTag::MethodType,
            ConstantEntry::Dynamic(_) => ConstantTag::Dynamic,
            ConstantEntry::InvokeDynamic(_) => ConstantTag::InvokeDynamic,
            ConstantEntry::Module(_) => ConstantTag::Module,
            ConstantEntry::Package(_) => ConstantTag::Package,
            ConstantEntry::Reserved => return None,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConstantEntry::Class(_) => "Class",
            ConstantEntry::Field(_) => "Fieldref",
            ConstantEntry::Method(_) => "Methodref",
            ConstantEntry::InterfaceMethod(_) => "InterfaceMethodref",
            ConstantEntry::String(_) => "String",
            ConstantEntry::Integer(_) => "Integer",
            ConstantEntry::Float(_) => "Float",
            ConstantEntry::Long(_) => "Long",
            ConstantEntry::Double(_) => "Double",
            ConstantEntry::NameAndType(_) => "NameAndType",
            ConstantEntry::Utf8(_) => "Utf8",
            ConstantEntry::MethodHandle(_) => "MethodHandle",
            ConstantEntry::MethodType(_) => "MethodType",
            ConstantEntry::Dynamic(_) => "Dynamic",
            ConstantEntry::InvokeDynamic(_) => "InvokeDynamic",
            ConstantEntry::Module(_) => "Module",
            ConstantEntry::Package(_) => "Package",
            ConstantEntry::Reserved => "Reserved",
        }
    }

    /// Longs and doubles take up two slots.
    pub fn width(&self) -> usize {
        match self {
            ConstantEntry::Long(_) | ConstantEntry::Double(_) => 2,
            _ => 1,
        }
    }

    fn read(bytes: &mut Bytes, tag: ConstantTag) -> Result<Self> {
        let member = |bytes: &mut Bytes| -> Result<ConstantMemberRef> {
            Ok(ConstantMemberRef {
                class: bytes.try_get_u16()?,
                name_and_type: bytes.try_get_u16()?,
            })
        };
        let dynamic = |bytes: &mut Bytes| -> Result<ConstantDynamic> {
            Ok(ConstantDynamic {
                bootstrap_method: bytes.try_get_u16()?,
                name_and_type: bytes.try_get_u16()?,
            })
        };

        Ok(match tag {
            ConstantTag::Class => ConstantEntry::Class(ConstantClass {
                name: bytes.try_get_u16()?,
            }),
            ConstantTag::Field => ConstantEntry::Field(member(bytes)?),
            ConstantTag::Method => ConstantEntry::Method(member(bytes)?),
            ConstantTag::InterfaceMethod => ConstantEntry::InterfaceMethod(member(bytes)?),
            ConstantTag::String => ConstantEntry::String(ConstantString {
                string: bytes.try_get_u16()?,
            }),
            ConstantTag::Integer => ConstantEntry::Integer(ConstantInteger {
                bytes: bytes.try_get_u32()?,
            }),
            ConstantTag::Float => ConstantEntry::Float(ConstantFloat {
                bits: bytes.try_get_u32()?,
            }),
            ConstantTag::Long => ConstantEntry::Long(ConstantLong {
                bytes: bytes.try_get_u64()?,
            }),
            ConstantTag::Double => ConstantEntry::Double(ConstantDouble {
                bits: bytes.try_get_u64()?,
            }),
            ConstantTag::NameAndType => ConstantEntry::NameAndType(ConstantNameAndType {
                name: bytes.try_get_u16()?,
                descriptor: bytes.try_get_u16()?,
            }),
            ConstantTag::Utf8 => {
                let length = bytes.try_get_u16()?;
                let data = bytes.try_get_bytes(length.into())?;

                ConstantEntry::Utf8(ConstantUtf8 {
                    bytes: data.to_vec(),
                })
            }
            ConstantTag::MethodHandle => ConstantEntry::MethodHandle(ConstantMethodHandle {
                kind: bytes.try_get_u8()?,
                index: bytes.try_get_u16()?,
            }),
            ConstantTag::MethodType => ConstantEntry::MethodType(ConstantMethodType {
                descriptor: bytes.try_get_u16()?,
            }),
            ConstantTag::Dynamic => ConstantEntry::Dynamic(dynamic(bytes)?),
            ConstantTag::InvokeDynamic => ConstantEntry::InvokeDynamic(dynamic(bytes)?),
            ConstantTag::Module => ConstantEntry::Module(ConstantNamed {
                name: bytes.try_get_u16()?,
            }),
            ConstantTag::Package => ConstantEntry::Package(ConstantNamed {
                name: bytes.try_get_u16()?,
            }),
        })
    }

    fn write(&self, out: &mut BytesMut) {
        let Some(tag) = self.tag() else {
            return;
        };
        out.put_u8(tag.tag());

        match self {
            ConstantEntry::Class(data) => out.put_u16(data.name),
            ConstantEntry::Field(data)
            | ConstantEntry::Method(data)
            | ConstantEntry::InterfaceMethod(data) => {
                out.put_u16(data.class);
                out.put_u16(data.name_and_type);
            }
            ConstantEntry::String(data) => out.put_u16(data.string),
            ConstantEntry::Integer(data) => out.put_u32(data.bytes),
            ConstantEntry::Float(data) => out.put_u32(data.bits),
            ConstantEntry::Long(data) => out.put_u64(data.bytes),
            ConstantEntry::Double(data) => out.put_u64(data.bits),
            ConstantEntry::NameAndType(data) => {
                out.put_u16(data.name);
                out.put_u16(data.descriptor);
            }
            ConstantEntry::Utf8(data) => {
                // push refuses anything longer
                debug_assert!(data.bytes.len() <= u16::MAX as usize);
                out.put_u16(data.bytes.len() as u16);
                out.put_slice(&data.bytes);
            }
            ConstantEntry::MethodHandle(data) => {
                out.put_u8(data.kind);
                out.put_u16(data.index);
            }
            ConstantEntry::MethodType(data) => out.put_u16(data.descriptor),
            ConstantEntry::Dynamic(data) | ConstantEntry::InvokeDynamic(data) => {
                out.put_u16(data.bootstrap_method);
                out.put_u16(data.name_and_type);
            }
            ConstantEntry::Module(data) | ConstantEntry::Package(data) => out.put_u16(data.name),
            ConstantEntry::Reserved => {}
        }
    }
}

impl StructuralEq for ConstantEntry {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare(self.kind(), self, other)
    }
}

/// A field, method or interface method reference with every index resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor)
    }
}

/// A point the pool can be rolled back to when a multi-step mutation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot(usize);

/// An append-only arena of constants, addressed by 1-based `u16` indices.
///
/// Entries are never removed or rewritten once handed out, so an index stays valid
/// for the life of the pool. Interning deduplicates by content; a pool read from a
/// class file keeps every entry it contained, duplicates included, and the first
/// occurrence of a value becomes the index handed out by later interning.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<ConstantEntry>,
    lookup: HashMap<ConstantEntry, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! typed_lookup {
    ( $( $fn:ident => $variant:ident : $type:ty ),* ) => {
        $(
        pub fn $fn(&self, index: u16) -> Result<&$type> {
            match self.get(index)? {
                ConstantEntry::$variant(data) => Ok(data),
                other => Err(ClassFileError::ConstantKindMismatch {
                    index,
                    expected: stringify!($variant),
                    found: other.kind(),
                }),
            }
        }
        )*
    };
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![ConstantEntry::Reserved],
            lookup: HashMap::new(),
        }
    }

    /// The number of slots, including slot 0. This is the `constant_pool_count` of the file.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Every usable entry with its index, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !matches!(entry, ConstantEntry::Reserved))
            .map(|(index, entry)| (index as u16, entry))
    }

    pub fn get(&self, index: u16) -> Result<&ConstantEntry> {
        match self.entries.get(index as usize) {
            Some(ConstantEntry::Reserved) | None => Err(ClassFileError::IndexOutOfRange {
                index,
                size: self.entries.len(),
            }),
            Some(entry) => Ok(entry),
        }
    }

    /// Look up the index of an entry with this content, without adding it.
    pub fn find(&self, entry: &ConstantEntry) -> Option<u16> {
        self.lookup.get(entry).copied()
    }

    /// Return the index of an equal entry, appending `entry` if there is none.
    pub fn intern(&mut self, entry: ConstantEntry) -> Result<u16> {
        if let Some(index) = self.lookup.get(&entry) {
            return Ok(*index);
        }

        self.push(entry)
    }

    /// Append without deduplicating. Used when reading so that indices match the file.
    fn push(&mut self, entry: ConstantEntry) -> Result<u16> {
        if matches!(entry, ConstantEntry::Reserved) {
            return Err(ClassFileError::malformed("cannot add a reserved slot"));
        }

        if let ConstantEntry::Utf8(data) = &entry {
            if data.bytes.len() > u16::MAX as usize {
                return Err(ClassFileError::ConstantTooLong(data.bytes.len()));
            }
        }

        let width = entry.width();
        if self.entries.len() + width > u16::MAX as usize {
            return Err(ClassFileError::PoolOverflow);
        }

        let index = self.entries.len() as u16;
        self.lookup.entry(entry.clone()).or_insert(index);
        self.entries.push(entry);

        // 64 bit types take up 2 slots, the second one is unusable
        if width == 2 {
            self.entries.push(ConstantEntry::Reserved);
        }

        Ok(index)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot(self.entries.len())
    }

    /// Drop every entry added after `snapshot` was taken.
    pub fn rollback(&mut self, snapshot: PoolSnapshot) {
        let PoolSnapshot(len) = snapshot;
        if len >= self.entries.len() {
            return;
        }

        self.entries.truncate(len);
        self.lookup.retain(|_, index| (*index as usize) < len);
    }

    typed_lookup!(
        utf8 => Utf8: ConstantUtf8,
        class => Class: ConstantClass,
        name_and_type_entry => NameAndType: ConstantNameAndType,
        integer => Integer: ConstantInteger,
        float => Float: ConstantFloat,
        long => Long: ConstantLong,
        double => Double: ConstantDouble
    );

    /// Decode the Utf8 entry at `index`.
    pub fn text(&self, index: u16) -> Result<String> {
        self.utf8(index)?.try_string()
    }

    /// Compare the Utf8 entry at `index` against `value` without decoding it.
    pub fn utf8_eq(&self, index: u16, value: &str) -> Result<bool> {
        Ok(self.utf8(index)?.bytes == encode_modified_utf8(value))
    }

    pub fn class_name(&self, index: u16) -> Result<String> {
        self.text(self.class(index)?.name)
    }

    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        let entry = self.name_and_type_entry(index)?;
        Ok((self.text(entry.name)?, self.text(entry.descriptor)?))
    }

    /// Resolve a field, method or interface method reference.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        let data = match self.get(index)? {
            ConstantEntry::Field(data)
            | ConstantEntry::Method(data)
            | ConstantEntry::InterfaceMethod(data) => data,
            other => {
                return Err(ClassFileError::ConstantKindMismatch {
                    index,
                    expected: "Fieldref, Methodref or InterfaceMethodref",
                    found: other.kind(),
                })
            }
        };

        let (name, descriptor) = self.name_and_type(data.name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(data.class)?,
            name,
            descriptor,
        })
    }

    pub fn intern_utf8(&mut self, value: &str) -> Result<u16> {
        self.intern(ConstantEntry::Utf8(ConstantUtf8 {
            bytes: encode_modified_utf8(value),
        }))
    }

    pub fn intern_class(&mut self, name: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        self.intern(ConstantEntry::Class(ConstantClass { name }))
    }

    pub fn intern_string(&mut self, value: &str) -> Result<u16> {
        let string = self.intern_utf8(value)?;
        self.intern(ConstantEntry::String(ConstantString { string }))
    }

    pub fn intern_integer(&mut self, value: i32) -> Result<u16> {
        self.intern(ConstantEntry::Integer(ConstantInteger {
            bytes: value as u32,
        }))
    }

    pub fn intern_float(&mut self, value: f32) -> Result<u16> {
        self.intern(ConstantEntry::Float(ConstantFloat {
            bits: value.to_bits(),
        }))
    }

    pub fn intern_long(&mut self, value: i64) -> Result<u16> {
        self.intern(ConstantEntry::Long(ConstantLong {
            bytes: value as u64,
        }))
    }

    pub fn intern_double(&mut self, value: f64) -> Result<u16> {
        self.intern(ConstantEntry::Double(ConstantDouble {
            bits: value.to_bits(),
        }))
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(ConstantEntry::NameAndType(ConstantNameAndType { name, descriptor }))
    }

    fn intern_member(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<ConstantMemberRef> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        Ok(ConstantMemberRef {
            class,
            name_and_type,
        })
    }

    pub fn intern_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let member = self.intern_member(owner, name, descriptor)?;
        self.intern(ConstantEntry::Field(member))
    }

    pub fn intern_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let member = self.intern_member(owner, name, descriptor)?;
        self.intern(ConstantEntry::Method(member))
    }

    pub fn intern_interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let member = self.intern_member(owner, name, descriptor)?;
        self.intern(ConstantEntry::InterfaceMethod(member))
    }

    pub fn read(bytes: &mut Bytes) -> Result<Self> {
        let count = bytes.try_get_u16()? as usize;
        if count == 0 {
            return Err(ClassFileError::malformed("constant pool count of 0"));
        }

        let mut pool = ConstantPool::new();

        while pool.entries.len() < count {
            let tag = ConstantTag::from_tag(bytes.try_get_u8()?)?;
            let entry = ConstantEntry::read(bytes, tag)?;
            trace!("constant pool entry {} is {:?}", pool.entries.len(), entry);

            if pool.entries.len() + entry.width() > count {
                return Err(ClassFileError::malformed(format!(
                    "{} constant in the last slot of a pool of {count}",
                    entry.kind()
                )));
            }

            pool.push(entry)?;
        }

        pool.check_references()?;
        Ok(pool)
    }

    /// Every index stored inside an entry must point at an entry of the right kind.
    pub(crate) fn check_references(&self) -> Result<()> {
        for entry in self.entries.iter() {
            match entry {
                ConstantEntry::Class(data) => {
                    self.utf8(data.name)?;
                }
                ConstantEntry::Field(data)
                | ConstantEntry::Method(data)
                | ConstantEntry::InterfaceMethod(data) => {
                    self.class(data.class)?;
                    self.name_and_type_entry(data.name_and_type)?;
                }
                ConstantEntry::String(data) => {
                    self.utf8(data.string)?;
                }
                ConstantEntry::NameAndType(data) => {
                    self.utf8(data.name)?;
                    self.utf8(data.descriptor)?;
                }
                ConstantEntry::MethodHandle(data) => {
                    self.get(data.index)?;
                }
                ConstantEntry::MethodType(data) => {
                    self.utf8(data.descriptor)?;
                }
                ConstantEntry::Dynamic(data) | ConstantEntry::InvokeDynamic(data) => {
                    // The bootstrap index points into the BootstrapMethods attribute, not the pool
                    self.name_and_type_entry(data.name_and_type)?;
                }
                ConstantEntry::Module(data) | ConstantEntry::Package(data) => {
                    self.utf8(data.name)?;
                }
                ConstantEntry::Integer(_)
                | ConstantEntry::Float(_)
                | ConstantEntry::Long(_)
                | ConstantEntry::Double(_)
                | ConstantEntry::Utf8(_)
                | ConstantEntry::Reserved => {}
            }
        }
        Ok(())
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_u16(self.entries.len() as u16);
        for entry in &self.entries {
            entry.write(out);
        }
    }

    /// A short human readable rendering of the entry at `index`. Never fails.
    pub fn describe(&self, index: u16) -> String {
        let entry = match self.get(index) {
            Ok(entry) => entry,
            Err(_) => return format!("<invalid #{index}>"),
        };

        match entry {
            ConstantEntry::Utf8(data) => data.lossy(),
            ConstantEntry::Class(data) => self.describe(data.name),
            ConstantEntry::String(data) => format!("\"{}\"", self.describe(data.string)),
            ConstantEntry::Integer(data) => (data.bytes as i32).to_string(),
            ConstantEntry::Float(data) => format!("{}f", f32::from_bits(data.bits)),
            ConstantEntry::Long(data) => format!("{}L", data.bytes as i64),
            ConstantEntry::Double(data) => format!("{}d", f64::from_bits(data.bits)),
            ConstantEntry::Field(data)
            | ConstantEntry::Method(data)
            | ConstantEntry::InterfaceMethod(data) => format!(
                "{}.{}",
                self.describe(data.class),
                self.describe(data.name_and_type)
            ),
            ConstantEntry::NameAndType(data) => format!(
                "{}:{}",
                self.describe(data.name),
                self.describe(data.descriptor)
            ),
            ConstantEntry::MethodHandle(data) => {
                format!("kind {} {}", data.kind, self.describe(data.index))
            }
            ConstantEntry::MethodType(data) => self.describe(data.descriptor),
            ConstantEntry::Dynamic(data) | ConstantEntry::InvokeDynamic(data) => format!(
                "bootstrap {} {}",
                data.bootstrap_method,
                self.describe(data.name_and_type)
            ),
            ConstantEntry::Module(data) | ConstantEntry::Package(data) => {
                self.describe(data.name)
            }
            ConstantEntry::Reserved => String::new(),
        }
    }

    pub fn print(&self, out: &mut dyn fmt::Write, indent: usize) -> fmt::Result {
        writeln!(out, "{:indent$}Constant Pool ({} slots):", "", self.entries.len())?;
        for (index, entry) in self.iter() {
            writeln!(
                out,
                "{:width$}#{index} = {} {}",
                "",
                entry.kind(),
                self.describe(index),
                width = indent + 2
            )?;
        }
        Ok(())
    }
}

impl StructuralEq for ConstantPool {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare_seq("entries", &self.entries, &other.entries)
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::{ConstantEntry, ConstantPool, ConstantUtf8};
    use crate::error::{ClassFileError, Result};

    #[test]
    fn it_interns_each_value_once() -> Result<()> {
        let mut pool = ConstantPool::new();

        let first = pool.intern_utf8("x$rc")?;
        let second = pool.intern_utf8("x$rc")?;
        let other = pool.intern_utf8("x")?;

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(pool.text(first)?, "x$rc");

        Ok(())
    }

    #[test]
    fn it_starts_indices_at_one() -> Result<()> {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.intern_integer(7)?, 1);

        assert!(matches!(
            pool.get(0),
            Err(ClassFileError::IndexOutOfRange { index: 0, .. })
        ));
        assert!(matches!(
            pool.get(2),
            Err(ClassFileError::IndexOutOfRange { index: 2, .. })
        ));

        Ok(())
    }

    #[test]
    fn it_reserves_the_slot_after_wide_constants() -> Result<()> {
        let mut pool = ConstantPool::new();

        let long = pool.intern_long(1 << 40)?;
        let next = pool.intern_integer(3)?;

        assert_eq!(long, 1);
        assert_eq!(next, 3);
        assert!(pool.get(2).is_err());
        assert_eq!(pool.len(), 4);

        Ok(())
    }

    #[test]
    fn it_interns_dependencies_first() -> Result<()> {
        let mut pool = ConstantPool::new();
        let method = pool.intern_method_ref("Counter", "bump", "()I")?;

        let member = pool.member_ref(method)?;
        assert_eq!(member.owner, "Counter");
        assert_eq!(member.name, "bump");
        assert_eq!(member.descriptor, "()I");

        // utf8 Counter, class, utf8 bump, utf8 ()I, name and type, method ref
        assert_eq!(method, 6);
        Ok(())
    }

    #[test]
    fn it_resolves_interned_values() -> Result<()> {
        let mut pool = ConstantPool::new();
        let values = [
            ConstantEntry::Utf8(ConstantUtf8 {
                bytes: b"value".to_vec(),
            }),
            ConstantEntry::Integer(super::ConstantInteger { bytes: 0xFFFF_FFFF }),
            ConstantEntry::Float(super::ConstantFloat {
                bits: f32::NAN.to_bits(),
            }),
            ConstantEntry::Double(super::ConstantDouble {
                bits: (-0.0f64).to_bits(),
            }),
        ];

        for value in values {
            let index = pool.intern(value.clone())?;
            assert_eq!(pool.get(index)?, &value);
        }

        Ok(())
    }

    #[test]
    fn it_interns_numbers_by_their_bits() -> Result<()> {
        let mut pool = ConstantPool::new();

        let long = pool.intern_long(i64::MIN)?;
        assert_eq!(pool.long(long)?.value(), i64::MIN);
        assert_eq!(pool.intern_long(i64::MIN)?, long);

        let nan = pool.intern_float(f32::NAN)?;
        assert!(pool.float(nan)?.value().is_nan());
        assert_eq!(pool.intern_float(f32::NAN)?, nan);

        // 0.0 and -0.0 compare equal as numbers but are distinct constants
        let zero = pool.intern_float(0.0)?;
        let negative_zero = pool.intern_float(-0.0)?;
        assert_ne!(zero, negative_zero);
        assert!(pool.float(negative_zero)?.value().is_sign_negative());

        let double = pool.intern_double(-0.0)?;
        assert_eq!(pool.double(double)?.value().to_bits(), (-0.0f64).to_bits());
        assert_ne!(pool.intern_double(0.0)?, double);
        assert_eq!(pool.intern_double(-0.0)?, double);

        let double_nan = pool.intern_double(f64::NAN)?;
        assert!(pool.double(double_nan)?.value().is_nan());
        assert_eq!(pool.intern_double(f64::NAN)?, double_nan);

        assert!(matches!(pool.long(nan), Err(ClassFileError::ConstantKindMismatch { .. })));
        Ok(())
    }

    #[test]
    fn it_refuses_oversized_utf8() -> Result<()> {
        let mut pool = ConstantPool::new();
        let before = pool.len();

        assert!(matches!(
            pool.intern_utf8(&"a".repeat(70_000)),
            Err(ClassFileError::ConstantTooLong(70_000))
        ));
        assert!(matches!(
            pool.intern_string(&"a".repeat(u16::MAX as usize + 1)),
            Err(ClassFileError::ConstantTooLong(_))
        ));
        assert_eq!(pool.len(), before);

        // Exactly at the limit is fine and survives a round trip
        let longest = pool.intern_utf8(&"a".repeat(u16::MAX as usize))?;
        let mut out = BytesMut::new();
        pool.write(&mut out);
        let reread = ConstantPool::read(&mut out.freeze())?;
        assert_eq!(reread.text(longest)?.len(), u16::MAX as usize);
        Ok(())
    }

    #[test]
    fn it_reports_kind_mismatches() -> Result<()> {
        let mut pool = ConstantPool::new();
        let index = pool.intern_integer(1)?;

        assert!(matches!(
            pool.class_name(index),
            Err(ClassFileError::ConstantKindMismatch {
                expected: "Class",
                found: "Integer",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn it_rolls_back_to_a_snapshot() -> Result<()> {
        let mut pool = ConstantPool::new();
        pool.intern_utf8("kept")?;

        let snapshot = pool.snapshot();
        pool.intern_class("Dropped")?;
        pool.rollback(snapshot);

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.intern_utf8("Dropped")?, 2);
        Ok(())
    }

    #[test]
    fn it_keeps_duplicates_when_reading() -> Result<()> {
        // count 4: utf8 "a", utf8 "a", class #2
        let data: &[u8] = &[0, 4, 1, 0, 1, b'a', 1, 0, 1, b'a', 7, 0, 2];
        let mut bytes = Bytes::copy_from_slice(data);
        let mut pool = ConstantPool::read(&mut bytes)?;

        assert_eq!(pool.len(), 4);
        assert_eq!(pool.intern_utf8("a")?, 1);

        let mut out = BytesMut::new();
        pool.write(&mut out);
        assert_eq!(&out[..], data);
        Ok(())
    }

    #[test]
    fn it_rejects_dangling_references() {
        // count 2: class pointing at #5
        let mut bytes = Bytes::from_static(&[0, 2, 7, 0, 5]);
        assert!(matches!(
            ConstantPool::read(&mut bytes),
            Err(ClassFileError::IndexOutOfRange { index: 5, .. })
        ));
    }

    #[test]
    fn it_rejects_truncated_pools() {
        let mut bytes = Bytes::from_static(&[0, 3, 1, 0, 4, b'a']);
        assert!(matches!(
            ConstantPool::read(&mut bytes),
            Err(ClassFileError::TruncatedInput(_))
        ));
    }
}
