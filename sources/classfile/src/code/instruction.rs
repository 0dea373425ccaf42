use std::fmt;

use bytes::Bytes;
use support::bytes_ext::SafeBuf;

use super::opcodes::{self, mnemonic, operand_len};
use crate::error::{ClassFileError, Result};
use crate::pool::ConstantPool;

/// What follows the opcode byte. Branch and switch targets are stored as absolute
/// offsets into the code array so that they survive relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operands {
    /// Fixed operand bytes, copied verbatim. Covers the `wide` forms too, where the
    /// bytes start with the widened opcode.
    Plain(Vec<u8>),
    /// `if*`, `goto`, `jsr` and their 32 bit forms.
    Branch { target: u32 },
    TableSwitch {
        default: u32,
        low: i32,
        high: i32,
        targets: Vec<u32>,
    },
    LookupSwitch { default: u32, pairs: Vec<(i32, u32)> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: u8,
    pub operands: Operands,
}

/// Bytes of zero padding after a switch opcode at `offset`, so that the operands
/// start on a 4 byte boundary relative to the start of the code.
pub fn switch_padding(offset: u32) -> u32 {
    (4 - (offset + 1) % 4) % 4
}

impl Instruction {
    /// The encoded size of this instruction if it were placed at `offset`.
    pub fn len_at(&self, offset: u32) -> u32 {
        match &self.operands {
            Operands::Plain(bytes) => 1 + bytes.len() as u32,
            Operands::Branch { .. } => match self.opcode {
                opcodes::GOTO_W | opcodes::JSR_W => 5,
                _ => 3,
            },
            Operands::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * targets.len() as u32
            }
            Operands::LookupSwitch { pairs, .. } => {
                1 + switch_padding(offset) + 8 + 8 * pairs.len() as u32
            }
        }
    }

    pub fn len(&self) -> u32 {
        self.len_at(self.offset)
    }

    /// Every offset this instruction may transfer control to, besides falling through.
    pub fn targets(&self) -> Vec<u32> {
        match &self.operands {
            Operands::Plain(_) => vec![],
            Operands::Branch { target } => vec![*target],
            Operands::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Operands::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
        }
    }

    pub fn is_branch_free(&self) -> bool {
        matches!(self.operands, Operands::Plain(_))
    }

    /// The constant pool index operand, for instructions that carry one.
    pub fn pool_index(&self) -> Option<u16> {
        let Operands::Plain(bytes) = &self.operands else {
            return None;
        };

        match self.opcode {
            opcodes::LDC => bytes.first().map(|b| *b as u16),
            opcodes::LDC_W
            | opcodes::LDC2_W
            | opcodes::GETSTATIC..=opcodes::INVOKEDYNAMIC
            | opcodes::NEW
            | opcodes::ANEWARRAY
            | opcodes::CHECKCAST
            | opcodes::INSTANCEOF
            | opcodes::MULTIANEWARRAY => Some(u16::from_be_bytes([*bytes.first()?, *bytes.get(1)?])),
            _ => None,
        }
    }

    /// Render the instruction for a disassembly listing.
    pub fn display<'a>(&'a self, pool: &'a ConstantPool) -> impl fmt::Display + 'a {
        InstructionDisplay {
            instruction: self,
            pool,
        }
    }
}

struct InstructionDisplay<'a> {
    instruction: &'a Instruction,
    pool: &'a ConstantPool,
}

impl fmt::Display for InstructionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instruction = self.instruction;
        let name = mnemonic(instruction.opcode).unwrap_or("???");
        write!(f, "{name}")?;

        if let Some(index) = instruction.pool_index() {
            return write!(f, " #{index} // {}", self.pool.describe(index));
        }

        match &instruction.operands {
            Operands::Plain(bytes) if instruction.opcode == opcodes::WIDE => {
                let widened = bytes.first().copied().unwrap_or_default();
                write!(f, " {}", mnemonic(widened).unwrap_or("???"))?;
                for pair in bytes[1..].chunks_exact(2) {
                    write!(f, " {}", i16::from_be_bytes([pair[0], pair[1]]))?;
                }
                Ok(())
            }
            Operands::Plain(bytes) => {
                for byte in bytes {
                    write!(f, " {byte}")?;
                }
                Ok(())
            }
            Operands::Branch { target } => write!(f, " {target}"),
            Operands::TableSwitch {
                default,
                low,
                targets,
                ..
            } => {
                write!(f, " {{")?;
                for (i, target) in targets.iter().enumerate() {
                    write!(f, " {}: {target},", *low as i64 + i as i64)?;
                }
                write!(f, " default: {default} }}")
            }
            Operands::LookupSwitch { default, pairs } => {
                write!(f, " {{")?;
                for (key, target) in pairs {
                    write!(f, " {key}: {target},")?;
                }
                write!(f, " default: {default} }}")
            }
        }
    }
}

fn absolute(offset: u32, relative: i64, code_len: usize) -> Result<u32> {
    let target = offset as i64 + relative;
    if target < 0 || target >= code_len as i64 {
        return Err(ClassFileError::invalid_offset(
            target.max(0) as u32,
            format!("branch target of the instruction at {offset} is outside the code"),
        ));
    }
    Ok(target as u32)
}

fn is_widenable(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET | opcodes::IINC
    )
}

fn decode_one(bytes: &mut Bytes, offset: u32, code_len: usize) -> Result<Instruction> {
    let opcode = bytes.try_get_u8()?;

    let operands = match opcode {
        _ if opcodes::is_short_branch(opcode) => Operands::Branch {
            target: absolute(offset, bytes.try_get_i16()? as i64, code_len)?,
        },
        opcodes::GOTO_W | opcodes::JSR_W => Operands::Branch {
            target: absolute(offset, bytes.try_get_i32()? as i64, code_len)?,
        },
        opcodes::TABLESWITCH => {
            bytes.try_get_bytes(switch_padding(offset) as usize)?;
            let default = absolute(offset, bytes.try_get_i32()? as i64, code_len)?;
            let low = bytes.try_get_i32()?;
            let high = bytes.try_get_i32()?;
            if low > high {
                return Err(ClassFileError::malformed(format!(
                    "tableswitch at {offset} has low {low} above high {high}"
                )));
            }

            let count = (high as i64 - low as i64 + 1) as usize;
            bytes.ensure_remaining(count.saturating_mul(4))?;
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(absolute(offset, bytes.try_get_i32()? as i64, code_len)?);
            }

            Operands::TableSwitch {
                default,
                low,
                high,
                targets,
            }
        }
        opcodes::LOOKUPSWITCH => {
            bytes.try_get_bytes(switch_padding(offset) as usize)?;
            let default = absolute(offset, bytes.try_get_i32()? as i64, code_len)?;
            let count = bytes.try_get_i32()?;
            if count < 0 {
                return Err(ClassFileError::malformed(format!(
                    "lookupswitch at {offset} has a negative pair count"
                )));
            }

            bytes.ensure_remaining((count as usize).saturating_mul(8))?;
            let mut pairs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = bytes.try_get_i32()?;
                pairs.push((key, absolute(offset, bytes.try_get_i32()? as i64, code_len)?));
            }

            Operands::LookupSwitch { default, pairs }
        }
        opcodes::WIDE => {
            let widened = bytes.try_get_u8()?;
            if !is_widenable(widened) {
                return Err(ClassFileError::InvalidOpcode {
                    opcode: widened,
                    offset: offset + 1,
                });
            }

            // index, plus a 16 bit constant for iinc
            let len = if widened == opcodes::IINC { 4 } else { 2 };
            let mut operands = vec![widened];
            operands.extend_from_slice(&bytes.try_get_bytes(len)?);
            Operands::Plain(operands)
        }
        _ => {
            let len = operand_len(opcode).ok_or(ClassFileError::InvalidOpcode { opcode, offset })?;
            Operands::Plain(bytes.try_get_bytes(len)?.to_vec())
        }
    };

    Ok(Instruction {
        offset,
        opcode,
        operands,
    })
}

/// Decode a complete code array.
///
/// Every branch and switch target must land on the start of a decoded instruction,
/// otherwise the result is an `InvalidOffset` error.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut bytes = Bytes::copy_from_slice(code);
    let mut instructions = Vec::new();

    while !bytes.is_empty() {
        let offset = (code.len() - bytes.len()) as u32;
        let instruction = decode_one(&mut bytes, offset, code.len()).map_err(|e| match e {
            ClassFileError::TruncatedInput(_) => ClassFileError::malformed(format!(
                "instruction at {offset} runs past the end of the code"
            )),
            other => other,
        })?;
        instructions.push(instruction);
    }

    for instruction in &instructions {
        for target in instruction.targets() {
            if instructions
                .binary_search_by_key(&target, |i| i.offset)
                .is_err()
            {
                return Err(ClassFileError::invalid_offset(
                    target,
                    format!("branch target of the instruction at {}", instruction.offset),
                ));
            }
        }
    }

    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::{decode, switch_padding, Operands};
    use crate::code::opcodes::*;
    use crate::error::{ClassFileError, Result};
    use crate::pool::ConstantPool;

    #[test]
    fn it_decodes_simple_instructions() -> Result<()> {
        let code = [ALOAD_0, GETFIELD, 0, 7, ICONST_1, IADD, IRETURN];
        let instructions = decode(&code)?;

        let offsets: Vec<_> = instructions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, [0, 1, 4, 5, 6]);
        assert_eq!(instructions[1].pool_index(), Some(7));
        Ok(())
    }

    #[test]
    fn it_resolves_branch_targets() -> Result<()> {
        // 0: iload_1, 1: ifeq 8, 4: iconst_1, 5: goto 9, 8: iconst_0, 9: ireturn
        let code = [ILOAD_1, IFEQ, 0, 7, ICONST_1, GOTO, 0, 4, ICONST_0, IRETURN];
        let instructions = decode(&code)?;

        assert_eq!(instructions[1].operands, Operands::Branch { target: 8 });
        assert_eq!(instructions[3].operands, Operands::Branch { target: 9 });
        Ok(())
    }

    #[test]
    fn it_pads_switches() -> Result<()> {
        assert_eq!(switch_padding(0), 3);
        assert_eq!(switch_padding(3), 0);

        // 0: iload_1, 1: tableswitch, 2 bytes padding, default, low 0, high 1, two targets
        let mut code = vec![ILOAD_1, TABLESWITCH, 0, 0];
        code.extend_from_slice(&27i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&25i32.to_be_bytes());
        // 24: iconst_0, ireturn, iconst_1, ireturn, iconst_m1, ireturn
        code.extend_from_slice(&[ICONST_0, IRETURN, ICONST_1, IRETURN, ICONST_M1, IRETURN]);

        let instructions = decode(&code)?;
        assert_eq!(instructions[1].len(), 23);
        assert_eq!(
            instructions[1].operands,
            Operands::TableSwitch {
                default: 28,
                low: 0,
                high: 1,
                targets: vec![24, 26]
            }
        );
        Ok(())
    }

    #[test]
    fn it_decodes_wide_forms() -> Result<()> {
        let code = [WIDE, ILOAD, 1, 0, WIDE, IINC, 1, 0, 0xff, 0xff, RETURN];
        let instructions = decode(&code)?;

        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[0].len(), 4);
        assert_eq!(instructions[1].len(), 6);

        let pool = ConstantPool::new();
        assert_eq!(instructions[0].display(&pool).to_string(), "wide iload 256");
        assert_eq!(instructions[1].display(&pool).to_string(), "wide iinc 256 -1");
        Ok(())
    }

    #[test]
    fn it_rejects_unknown_opcodes() {
        assert!(matches!(
            decode(&[NOP, 0xca]),
            Err(ClassFileError::InvalidOpcode {
                opcode: 0xca,
                offset: 1
            })
        ));
        assert!(matches!(
            decode(&[WIDE, NOP]),
            Err(ClassFileError::InvalidOpcode { opcode: 0, offset: 1 })
        ));
    }

    #[test]
    fn it_rejects_targets_inside_instructions() {
        // goto +2 lands on the second operand byte of sipush
        let code = [GOTO, 0, 4, SIPUSH, 0, 1, RETURN];
        assert!(matches!(
            decode(&code),
            Err(ClassFileError::InvalidOffset { offset: 4, .. })
        ));
    }

    #[test]
    fn it_rejects_truncated_code() {
        assert!(matches!(
            decode(&[SIPUSH, 0]),
            Err(ClassFileError::MalformedClassFile(_))
        ));
    }
}
