pub mod builder;
pub mod instruction;
pub mod opcodes;
pub mod relocate;

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use support::bytes_ext::SafeBuf;
use tracing::{debug, warn};

use self::instruction::{decode, Instruction};
use self::relocate::{relocate, CodeEdit, OffsetMap};
use crate::attributes::stack_map::StackMapTable;
use crate::attributes::{AttributeInfo, Attributes};
use crate::constants::MAX_CODE_LENGTH;
use crate::equality::{compare, Mismatch, StructuralEq};
use crate::error::{ClassFileError, Result};
use crate::exceptions::ExceptionTable;
use crate::pool::ConstantPool;

/// The body of a method: its instructions plus everything that refers to them by offset.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: ExceptionTable,
    pub attributes: Attributes,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            code,
            exception_table: ExceptionTable::new(),
            attributes: Attributes::new(),
        }
    }

    pub fn read(bytes: &mut Bytes, pool: &ConstantPool) -> Result<Self> {
        let max_stack = bytes.try_get_u16()?;
        let max_locals = bytes.try_get_u16()?;

        let code_length = bytes.try_get_u32()? as usize;
        if code_length > MAX_CODE_LENGTH {
            return Err(ClassFileError::malformed(format!(
                "code length {code_length} is above the limit of {MAX_CODE_LENGTH}"
            )));
        }
        let code = bytes.try_get_bytes(code_length)?.to_vec();

        let exception_table = ExceptionTable::read(bytes)?;
        let attributes = Attributes::read(bytes, pool)?;

        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_u16(self.max_stack);
        out.put_u16(self.max_locals);
        out.put_u32(self.code.len() as u32);
        out.put_slice(&self.code);
        self.exception_table.write(out);
        self.attributes.write(out);
    }

    pub fn instructions(&self) -> Result<Vec<Instruction>> {
        decode(&self.code)
    }

    pub fn stack_map(&self) -> Option<&StackMapTable> {
        self.attributes.stack_map()
    }

    /// Apply `edits` and move every offset recorded in this attribute to match.
    ///
    /// Branch operands, exception ranges, line numbers, local variable ranges and
    /// stack map frames are all rewritten. On error nothing is changed.
    pub fn apply_edits(&mut self, edits: &[CodeEdit]) -> Result<OffsetMap> {
        let requires_frames = self.stack_map().is_some();
        let relocated = relocate(&self.code, edits, !requires_frames)?;
        let map = &relocated.map;

        let mut exception_table = self.exception_table.clone();
        for range in exception_table.handlers_mut() {
            range.start_pc = map.map(range.start_pc.into(), "exception range start")? as u16;
            range.end_pc = map.map(range.end_pc.into(), "exception range end")? as u16;
            range.handler_pc = map.map(range.handler_pc.into(), "exception handler")? as u16;
        }

        let mut attributes = self.attributes.clone();
        for attribute in attributes.values.iter_mut() {
            match &mut attribute.info {
                AttributeInfo::LineNumberTable(table) => table.remap(map)?,
                AttributeInfo::LocalVariableTable(table)
                | AttributeInfo::LocalVariableTypeTable(table) => table.remap(map)?,
                AttributeInfo::StackMapTable(table) => table.remap(map)?,
                _ if map.is_identity() => {}
                other => warn!(
                    "{} attribute (name #{}) kept verbatim while its code moved",
                    other.kind(),
                    attribute.name
                ),
            }
        }

        debug!(
            "relocated code from {} to {} bytes ({} promotions)",
            map.old_len(),
            map.new_len(),
            relocated.promotions
        );

        self.code = relocated.code;
        self.exception_table = exception_table;
        self.attributes = attributes;
        Ok(relocated.map)
    }

    pub fn print(&self, out: &mut dyn fmt::Write, indent: usize, pool: &ConstantPool) -> fmt::Result {
        writeln!(
            out,
            "{:indent$}Code: max_stack={} max_locals={} length={}",
            "",
            self.max_stack,
            self.max_locals,
            self.code.len()
        )?;

        match self.instructions() {
            Ok(instructions) => {
                for instruction in &instructions {
                    writeln!(
                        out,
                        "{:width$}{:>5}: {}",
                        "",
                        instruction.offset,
                        instruction.display(pool),
                        width = indent + 2
                    )?;
                }
            }
            Err(e) => writeln!(out, "{:width$}<undecodable: {e}>", "", width = indent + 2)?,
        }

        if !self.exception_table.is_empty() {
            self.exception_table.print(out, indent + 2, pool)?;
        }
        self.attributes.print(out, indent + 2, pool)
    }
}

impl StructuralEq for CodeAttribute {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare("max_stack", &self.max_stack, &other.max_stack)?;
        compare("max_locals", &self.max_locals, &other.max_locals)?;
        compare("code", &self.code, &other.code)?;
        self.exception_table
            .structural_diff(&other.exception_table)
            .map_err(|m| m.within("exception_table"))?;
        self.attributes.structural_diff(&other.attributes)
    }
}
