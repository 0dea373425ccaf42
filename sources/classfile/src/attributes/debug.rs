//! Debug information tables carried by a `Code` attribute.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use support::bytes_ext::SafeBuf;

use crate::code::relocate::OffsetMap;
use crate::equality::{compare, compare_seq, Mismatch, StructuralEq};
use crate::error::Result;
use crate::pool::ConstantPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

impl StructuralEq for LineNumber {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare("start_pc", &self.start_pc, &other.start_pc)?;
        compare("line_number", &self.line_number, &other.line_number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineNumberTable {
    pub entries: Vec<LineNumber>,
}

impl LineNumberTable {
    pub fn read(bytes: &mut Bytes) -> Result<Self> {
        let count = bytes.try_get_u16()?;
        let mut entries = Vec::with_capacity(count.into());

        for _ in 0..count {
            entries.push(LineNumber {
                start_pc: bytes.try_get_u16()?,
                line_number: bytes.try_get_u16()?,
            });
        }

        Ok(Self { entries })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_u16(self.entries.len() as u16);
        for entry in &self.entries {
            out.put_u16(entry.start_pc);
            out.put_u16(entry.line_number);
        }
    }

    /// The source line of the instruction at `pc`, if the table covers it.
    pub fn line_at(&self, pc: u16) -> Option<u16> {
        self.entries
            .iter()
            .filter(|e| e.start_pc <= pc)
            .max_by_key(|e| e.start_pc)
            .map(|e| e.line_number)
    }

    pub fn remap(&mut self, map: &OffsetMap) -> Result<()> {
        for entry in self.entries.iter_mut() {
            entry.start_pc = map.map(entry.start_pc.into(), "line number entry")? as u16;
        }
        Ok(())
    }

    pub fn print(&self, out: &mut dyn fmt::Write, indent: usize) -> fmt::Result {
        writeln!(out, "{:indent$}LineNumberTable:", "")?;
        for entry in &self.entries {
            writeln!(
                out,
                "{:width$}line {}: {}",
                "",
                entry.line_number,
                entry.start_pc,
                width = indent + 2
            )?;
        }
        Ok(())
    }
}

impl StructuralEq for LineNumberTable {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare_seq("entries", &self.entries, &other.entries)
    }
}

/// An entry of a `LocalVariableTable` or `LocalVariableTypeTable`. In the latter
/// `descriptor` holds a generic signature instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: u16,
    pub descriptor: u16,
    pub index: u16,
}

impl StructuralEq for LocalVariable {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare("start_pc", &self.start_pc, &other.start_pc)?;
        compare("length", &self.length, &other.length)?;
        compare("name", &self.name, &other.name)?;
        compare("descriptor", &self.descriptor, &other.descriptor)?;
        compare("index", &self.index, &other.index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalVariableTable {
    pub entries: Vec<LocalVariable>,
}

impl LocalVariableTable {
    pub fn read(bytes: &mut Bytes) -> Result<Self> {
        let count = bytes.try_get_u16()?;
        let mut entries = Vec::with_capacity(count.into());

        for _ in 0..count {
            entries.push(LocalVariable {
                start_pc: bytes.try_get_u16()?,
                length: bytes.try_get_u16()?,
                name: bytes.try_get_u16()?,
                descriptor: bytes.try_get_u16()?,
                index: bytes.try_get_u16()?,
            });
        }

        Ok(Self { entries })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_u16(self.entries.len() as u16);
        for entry in &self.entries {
            out.put_u16(entry.start_pc);
            out.put_u16(entry.length);
            out.put_u16(entry.name);
            out.put_u16(entry.descriptor);
            out.put_u16(entry.index);
        }
    }

    /// Both ends of every range move; the end is exclusive and may be the end of code.
    pub fn remap(&mut self, map: &OffsetMap) -> Result<()> {
        for entry in self.entries.iter_mut() {
            let start = map.map(entry.start_pc.into(), "local variable start")?;
            let end = map.map(entry.start_pc as u32 + entry.length as u32, "local variable end")?;

            entry.start_pc = start as u16;
            entry.length = (end - start) as u16;
        }
        Ok(())
    }

    pub fn print(&self, out: &mut dyn fmt::Write, indent: usize, pool: &ConstantPool, kind: &str) -> fmt::Result {
        writeln!(out, "{:indent$}{kind}:", "")?;
        for entry in &self.entries {
            writeln!(
                out,
                "{:width$}slot {} {} {} [{}, {})",
                "",
                entry.index,
                pool.describe(entry.name),
                pool.describe(entry.descriptor),
                entry.start_pc,
                entry.start_pc as u32 + entry.length as u32,
                width = indent + 2
            )?;
        }
        Ok(())
    }
}

impl StructuralEq for LocalVariableTable {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare_seq("entries", &self.entries, &other.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::{LineNumber, LineNumberTable, LocalVariable, LocalVariableTable};
    use crate::code::opcodes::*;
    use crate::code::relocate::{relocate, CodeEdit};
    use crate::error::Result;

    // 0: iconst_0, 1: istore_1, 2: iload_1, 3: ireturn
    const CODE: [u8; 4] = [ICONST_0, ISTORE_1, ILOAD_1, IRETURN];

    #[test]
    fn it_finds_lines_by_pc() {
        let table = LineNumberTable {
            entries: vec![
                LineNumber { start_pc: 0, line_number: 10 },
                LineNumber { start_pc: 2, line_number: 11 },
            ],
        };

        assert_eq!(table.line_at(1), Some(10));
        assert_eq!(table.line_at(3), Some(11));
    }

    #[test]
    fn it_shifts_line_numbers_after_the_insert() -> Result<()> {
        let relocated = relocate(&CODE, &[CodeEdit::Insert { at: 2, code: vec![NOP; 4] }], true)?;

        let mut table = LineNumberTable {
            entries: vec![
                LineNumber { start_pc: 0, line_number: 10 },
                LineNumber { start_pc: 2, line_number: 11 },
            ],
        };
        table.remap(&relocated.map)?;

        assert_eq!(table.entries[0].start_pc, 0);
        assert_eq!(table.entries[1].start_pc, 6);
        Ok(())
    }

    #[test]
    fn it_grows_ranges_that_span_the_insert() -> Result<()> {
        let relocated = relocate(&CODE, &[CodeEdit::Insert { at: 2, code: vec![NOP; 4] }], true)?;

        let mut table = LocalVariableTable {
            entries: vec![
                LocalVariable {
                    start_pc: 2,
                    length: 2,
                    name: 1,
                    descriptor: 2,
                    index: 1,
                },
                LocalVariable {
                    start_pc: 0,
                    length: 4,
                    name: 3,
                    descriptor: 4,
                    index: 0,
                },
            ],
        };
        table.remap(&relocated.map)?;

        assert_eq!((table.entries[0].start_pc, table.entries[0].length), (6, 2));
        assert_eq!((table.entries[1].start_pc, table.entries[1].length), (0, 8));
        Ok(())
    }
}
