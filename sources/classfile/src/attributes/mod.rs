//! Named metadata blocks attached to classes, fields, methods and code bodies.
//!
//! Every attribute is `[name u16][length u32][body]` on disk. The kinds this crate
//! understands are decoded into typed values; everything else is kept as raw bytes
//! and written back untouched.

pub mod debug;
pub mod stack_map;

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use enum_as_inner::EnumAsInner;
use support::bytes_ext::SafeBuf;
use tracing::trace;

use self::debug::{LineNumberTable, LocalVariableTable};
use self::stack_map::StackMapTable;
use crate::code::CodeAttribute;
use crate::constants::attribute_names as names;
use crate::equality::{compare, compare_seq, Mismatch, StructuralEq};
use crate::error::{ClassFileError, Result};
use crate::pool::ConstantPool;

/// The checked exceptions a method declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionsAttribute {
    pub classes: Vec<u16>,
}

#[derive(EnumAsInner, Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    Code(CodeAttribute),
    Exceptions(ExceptionsAttribute),
    LineNumberTable(LineNumberTable),
    LocalVariableTable(LocalVariableTable),
    LocalVariableTypeTable(LocalVariableTable),
    StackMapTable(StackMapTable),
    SourceFile(u16),
    ConstantValue(u16),
    Synthetic,
    Deprecated,
    Raw(Bytes),
}

impl AttributeInfo {
    /// The attribute name this kind is stored under, `None` for raw attributes.
    pub fn name(&self) -> Option<&'static str> {
        Some(match self {
            AttributeInfo::Code(_) => names::CODE,
            AttributeInfo::Exceptions(_) => names::EXCEPTIONS,
            AttributeInfo::LineNumberTable(_) => names::LINE_NUMBER_TABLE,
            AttributeInfo::LocalVariableTable(_) => names::LOCAL_VARIABLE_TABLE,
            AttributeInfo::LocalVariableTypeTable(_) => names::LOCAL_VARIABLE_TYPE_TABLE,
            AttributeInfo::StackMapTable(_) => names::STACK_MAP_TABLE,
            AttributeInfo::SourceFile(_) => names::SOURCE_FILE,
            AttributeInfo::ConstantValue(_) => names::CONSTANT_VALUE,
            AttributeInfo::Synthetic => names::SYNTHETIC,
            AttributeInfo::Deprecated => names::DEPRECATED,
            AttributeInfo::Raw(_) => return None,
        })
    }

    pub fn kind(&self) -> &'static str {
        self.name().unwrap_or("Raw")
    }

    fn read(name: &str, body: &mut Bytes, pool: &ConstantPool) -> Result<Self> {
        Ok(match name {
            names::CODE => AttributeInfo::Code(CodeAttribute::read(body, pool)?),
            names::EXCEPTIONS => {
                let count = body.try_get_u16()?;
                let mut classes = Vec::with_capacity(count.into());
                for _ in 0..count {
                    classes.push(body.try_get_u16()?);
                }
                AttributeInfo::Exceptions(ExceptionsAttribute { classes })
            }
            names::LINE_NUMBER_TABLE => AttributeInfo::LineNumberTable(LineNumberTable::read(body)?),
            names::LOCAL_VARIABLE_TABLE => {
                AttributeInfo::LocalVariableTable(LocalVariableTable::read(body)?)
            }
            names::LOCAL_VARIABLE_TYPE_TABLE => {
                AttributeInfo::LocalVariableTypeTable(LocalVariableTable::read(body)?)
            }
            names::STACK_MAP_TABLE => AttributeInfo::StackMapTable(StackMapTable::read(body)?),
            names::SOURCE_FILE => AttributeInfo::SourceFile(body.try_get_u16()?),
            names::CONSTANT_VALUE => AttributeInfo::ConstantValue(body.try_get_u16()?),
            names::SYNTHETIC => AttributeInfo::Synthetic,
            names::DEPRECATED => AttributeInfo::Deprecated,
            _ => AttributeInfo::Raw(std::mem::take(body)),
        })
    }

    fn write(&self, out: &mut BytesMut) {
        match self {
            AttributeInfo::Code(code) => code.write(out),
            AttributeInfo::Exceptions(exceptions) => {
                out.put_u16(exceptions.classes.len() as u16);
                for class in &exceptions.classes {
                    out.put_u16(*class);
                }
            }
            AttributeInfo::LineNumberTable(table) => table.write(out),
            AttributeInfo::LocalVariableTable(table) | AttributeInfo::LocalVariableTypeTable(table) => {
                table.write(out)
            }
            AttributeInfo::StackMapTable(table) => table.write(out),
            AttributeInfo::SourceFile(index) | AttributeInfo::ConstantValue(index) => out.put_u16(*index),
            AttributeInfo::Synthetic | AttributeInfo::Deprecated => {}
            AttributeInfo::Raw(bytes) => out.put_slice(bytes),
        }
    }
}

impl StructuralEq for AttributeInfo {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        let diff = match (self, other) {
            (AttributeInfo::Code(l), AttributeInfo::Code(r)) => l.structural_diff(r),
            (AttributeInfo::Exceptions(l), AttributeInfo::Exceptions(r)) => {
                compare("classes", &l.classes, &r.classes)
            }
            (AttributeInfo::LineNumberTable(l), AttributeInfo::LineNumberTable(r)) => l.structural_diff(r),
            (AttributeInfo::LocalVariableTable(l), AttributeInfo::LocalVariableTable(r))
            | (AttributeInfo::LocalVariableTypeTable(l), AttributeInfo::LocalVariableTypeTable(r)) => {
                l.structural_diff(r)
            }
            (AttributeInfo::StackMapTable(l), AttributeInfo::StackMapTable(r)) => l.structural_diff(r),
            (AttributeInfo::SourceFile(l), AttributeInfo::SourceFile(r))
            | (AttributeInfo::ConstantValue(l), AttributeInfo::ConstantValue(r)) => compare("index", l, r),
            (AttributeInfo::Synthetic, AttributeInfo::Synthetic)
            | (AttributeInfo::Deprecated, AttributeInfo::Deprecated) => Ok(()),
            (AttributeInfo::Raw(l), AttributeInfo::Raw(r)) => compare("bytes", l, r),
            _ => return Err(Mismatch::new(self.kind(), other.kind()).within("kind")),
        };

        diff.map_err(|m| m.within(self.kind()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: u16,
    pub info: AttributeInfo,
}

impl Attribute {
    /// Create an attribute of a known kind, interning its name.
    pub fn new(pool: &mut ConstantPool, info: AttributeInfo) -> Result<Self> {
        let name = info.name().ok_or_else(|| {
            ClassFileError::malformed("raw attributes need an explicit name, use Attribute::raw")
        })?;

        Ok(Self {
            name: pool.intern_utf8(name)?,
            info,
        })
    }

    pub fn raw(pool: &mut ConstantPool, name: &str, bytes: impl Into<Bytes>) -> Result<Self> {
        Ok(Self {
            name: pool.intern_utf8(name)?,
            info: AttributeInfo::Raw(bytes.into()),
        })
    }

    pub fn read(bytes: &mut Bytes, pool: &ConstantPool) -> Result<Self> {
        let name = bytes.try_get_u16()?;
        let length = bytes.try_get_u32()?;
        let mut body = bytes.try_get_bytes(length as usize)?;

        let kind = pool.text(name)?;
        trace!("attribute {} ({} bytes)", kind, length);

        let info = AttributeInfo::read(&kind, &mut body, pool).map_err(|e| match e {
            ClassFileError::TruncatedInput(_) => {
                ClassFileError::malformed(format!("{kind} attribute is shorter than its contents"))
            }
            other => other,
        })?;

        if !body.is_empty() {
            return Err(ClassFileError::malformed(format!(
                "{kind} attribute has {} unread bytes",
                body.len()
            )));
        }

        Ok(Self { name, info })
    }

    pub fn write(&self, out: &mut BytesMut) {
        let mut body = BytesMut::new();
        self.info.write(&mut body);

        out.put_u16(self.name);
        out.put_u32(body.len() as u32);
        out.put_slice(&body);
    }

    pub fn print(&self, out: &mut dyn fmt::Write, indent: usize, pool: &ConstantPool) -> fmt::Result {
        match &self.info {
            AttributeInfo::Code(code) => code.print(out, indent, pool),
            AttributeInfo::Exceptions(exceptions) => {
                let classes: Vec<_> = exceptions.classes.iter().map(|c| pool.describe(*c)).collect();
                writeln!(out, "{:indent$}Exceptions: {}", "", classes.join(", "))
            }
            AttributeInfo::LineNumberTable(table) => table.print(out, indent),
            AttributeInfo::LocalVariableTable(table) => {
                table.print(out, indent, pool, names::LOCAL_VARIABLE_TABLE)
            }
            AttributeInfo::LocalVariableTypeTable(table) => {
                table.print(out, indent, pool, names::LOCAL_VARIABLE_TYPE_TABLE)
            }
            AttributeInfo::StackMapTable(table) => table.print(out, indent, pool),
            AttributeInfo::SourceFile(index) => {
                writeln!(out, "{:indent$}SourceFile: {}", "", pool.describe(*index))
            }
            AttributeInfo::ConstantValue(index) => {
                writeln!(out, "{:indent$}ConstantValue: {}", "", pool.describe(*index))
            }
            AttributeInfo::Synthetic | AttributeInfo::Deprecated => {
                writeln!(out, "{:indent$}{}", "", self.info.kind())
            }
            AttributeInfo::Raw(bytes) => writeln!(
                out,
                "{:indent$}{} ({} bytes, not decoded)",
                "",
                pool.describe(self.name),
                bytes.len()
            ),
        }
    }
}

impl StructuralEq for Attribute {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare("name", &self.name, &other.name)?;
        self.info.structural_diff(&other.info)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    pub values: Vec<Attribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(bytes: &mut Bytes, pool: &ConstantPool) -> Result<Self> {
        let count = bytes.try_get_u16()?;
        let mut values = Vec::with_capacity(count.into());

        for _ in 0..count {
            values.push(Attribute::read(bytes, pool)?);
        }

        Ok(Self { values })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_u16(self.values.len() as u16);
        for attribute in &self.values {
            attribute.write(out);
        }
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.values.push(attribute);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.values.iter()
    }

    /// Find an attribute by its name, whether or not the kind is understood.
    pub fn find(&self, pool: &ConstantPool, name: &str) -> Option<&Attribute> {
        self.values
            .iter()
            .find(|a| pool.utf8_eq(a.name, name).unwrap_or(false))
    }

    pub fn code(&self) -> Option<&CodeAttribute> {
        self.values.iter().find_map(|a| a.info.as_code())
    }

    pub fn code_mut(&mut self) -> Option<&mut CodeAttribute> {
        self.values.iter_mut().find_map(|a| a.info.as_code_mut())
    }

    pub fn stack_map(&self) -> Option<&StackMapTable> {
        self.values.iter().find_map(|a| a.info.as_stack_map_table())
    }

    pub fn print(&self, out: &mut dyn fmt::Write, indent: usize, pool: &ConstantPool) -> fmt::Result {
        for attribute in &self.values {
            attribute.print(out, indent, pool)?;
        }
        Ok(())
    }
}

impl StructuralEq for Attributes {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare_seq("attributes", &self.values, &other.values)
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::{Attribute, AttributeInfo, Attributes};
    use crate::equality::StructuralEq;
    use crate::error::{ClassFileError, Result};
    use crate::pool::ConstantPool;

    fn encode(attributes: &Attributes) -> Bytes {
        let mut out = BytesMut::new();
        attributes.write(&mut out);
        out.freeze()
    }

    #[test]
    fn it_keeps_unknown_attributes_verbatim() -> Result<()> {
        let mut pool = ConstantPool::new();
        let mut attributes = Attributes::new();
        attributes.push(Attribute::raw(&mut pool, "com.example.Custom", vec![0xde, 0xad, 0xbe, 0xef])?);
        attributes.push(Attribute::new(&mut pool, AttributeInfo::Deprecated)?);

        let bytes = encode(&attributes);
        let read = Attributes::read(&mut bytes.clone(), &pool)?;

        assert_eq!(read, attributes);
        assert!(read.find(&pool, "com.example.Custom").is_some());
        assert!(matches!(read.values[1].info, AttributeInfo::Deprecated));
        assert_eq!(encode(&read), bytes);
        Ok(())
    }

    #[test]
    fn it_rejects_bodies_that_are_not_consumed() -> Result<()> {
        let mut pool = ConstantPool::new();
        let name = pool.intern_utf8("SourceFile")?;

        // SourceFile with a 3 byte body
        let mut bytes = Bytes::from(vec![0, 1, (name >> 8) as u8, name as u8, 0, 0, 0, 3, 0, 1, 9]);
        assert!(matches!(
            Attributes::read(&mut bytes, &pool),
            Err(ClassFileError::MalformedClassFile(_))
        ));

        // ...and with a 1 byte body
        let mut bytes = Bytes::from(vec![0, 1, (name >> 8) as u8, name as u8, 0, 0, 0, 1, 0]);
        assert!(matches!(
            Attributes::read(&mut bytes, &pool),
            Err(ClassFileError::MalformedClassFile(_))
        ));
        Ok(())
    }

    #[test]
    fn it_reports_kind_mismatches() -> Result<()> {
        let mut pool = ConstantPool::new();
        let left = Attribute {
            name: 1,
            info: AttributeInfo::Synthetic,
        };
        let right = Attribute {
            name: 1,
            info: AttributeInfo::Deprecated,
        };
        let mismatch = left.structural_diff(&right).unwrap_err();
        assert_eq!(mismatch.path(), "kind");

        let source = pool.intern_utf8("A.java")?;
        let left = Attribute::new(&mut pool, AttributeInfo::SourceFile(source))?;
        let mut right = left.clone();
        right.info = AttributeInfo::SourceFile(source + 1);
        assert_eq!(left.structural_diff(&right).unwrap_err().path(), "SourceFile.index");
        Ok(())
    }
}
