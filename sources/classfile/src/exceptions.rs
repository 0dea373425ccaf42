use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use support::bytes_ext::SafeBuf;

use crate::equality::{compare, compare_seq, Mismatch, StructuralEq};
use crate::error::Result;
use crate::pool::ConstantPool;

/// One protected region of a method body and the handler that guards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionRange {
    pub start_pc: u16,
    /// Exclusive.
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Index of a `CONSTANT_Class`. `None` catches everything (`finally` blocks).
    pub catch_type: Option<u16>,
}

impl ExceptionRange {
    pub fn new(start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: Option<u16>) -> Self {
        Self {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        }
    }

    pub fn covers(&self, pc: u16) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }

    fn read(bytes: &mut Bytes) -> Result<Self> {
        Ok(Self {
            start_pc: bytes.try_get_u16()?,
            end_pc: bytes.try_get_u16()?,
            handler_pc: bytes.try_get_u16()?,
            catch_type: match bytes.try_get_u16()? {
                0 => None,
                index => Some(index),
            },
        })
    }

    fn write(&self, out: &mut BytesMut) {
        out.put_u16(self.start_pc);
        out.put_u16(self.end_pc);
        out.put_u16(self.handler_pc);
        out.put_u16(self.catch_type.unwrap_or(0));
    }
}

impl StructuralEq for ExceptionRange {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare("start_pc", &self.start_pc, &other.start_pc)?;
        compare("end_pc", &self.end_pc, &other.end_pc)?;
        compare("handler_pc", &self.handler_pc, &other.handler_pc)?;
        compare("catch_type", &self.catch_type, &other.catch_type)
    }
}

/// The handlers of a method body, in match priority order.
///
/// The runtime tries handlers in table order and the first one whose range covers
/// the faulting pc and whose catch type accepts the thrown exception wins, so the
/// order is part of the meaning of the table and is never changed here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionTable {
    handlers: Vec<ExceptionRange>,
}

impl ExceptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate the handlers in table order. Each call starts from the first handler.
    pub fn handlers(&self) -> impl Iterator<Item = &ExceptionRange> {
        self.handlers.iter()
    }

    pub(crate) fn handlers_mut(&mut self) -> impl Iterator<Item = &mut ExceptionRange> {
        self.handlers.iter_mut()
    }

    /// Append a handler. It will be tried after every handler already present.
    pub fn add(&mut self, range: ExceptionRange) {
        self.handlers.push(range);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Find the handler the runtime would dispatch to for an exception of class
    /// `thrown` raised at `pc`. `is_assignable(thrown, catch_type)` answers the
    /// class hierarchy question, which the table cannot answer by itself.
    pub fn find_handler<F>(
        &self,
        pc: u16,
        thrown: &str,
        pool: &ConstantPool,
        is_assignable: F,
    ) -> Result<Option<&ExceptionRange>>
    where
        F: Fn(&str, &str) -> bool,
    {
        for range in self.handlers.iter().filter(|r| r.covers(pc)) {
            match range.catch_type {
                None => return Ok(Some(range)),
                Some(index) => {
                    let catch_type = pool.class_name(index)?;
                    if catch_type == thrown || is_assignable(thrown, &catch_type) {
                        return Ok(Some(range));
                    }
                }
            }
        }

        Ok(None)
    }

    pub fn read(bytes: &mut Bytes) -> Result<Self> {
        let count = bytes.try_get_u16()?;
        let mut handlers = Vec::with_capacity(count.into());

        for _ in 0..count {
            handlers.push(ExceptionRange::read(bytes)?);
        }

        Ok(Self { handlers })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_u16(self.handlers.len() as u16);
        for range in &self.handlers {
            range.write(out);
        }
    }

    pub fn print(&self, out: &mut dyn fmt::Write, indent: usize, pool: &ConstantPool) -> fmt::Result {
        writeln!(out, "{:indent$}Exception Table:", "")?;
        for range in &self.handlers {
            let catch_type = match range.catch_type {
                Some(index) => pool.describe(index),
                None => "any".to_string(),
            };

            writeln!(
                out,
                "{:width$}[{}, {}) -> {} {}",
                "",
                range.start_pc,
                range.end_pc,
                range.handler_pc,
                catch_type,
                width = indent + 2
            )?;
        }
        Ok(())
    }
}

impl StructuralEq for ExceptionTable {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare_seq("handlers", &self.handlers, &other.handlers)
    }
}
