//! Code edits and the offset fixup pass.
//!
//! Edits are applied by laying the method body out again from scratch. Every original
//! instruction keeps its old offset as an anchor; inserted code has none. The layout
//! is repeated until every 16 bit branch fits its displacement, promoting the ones
//! that don't to their 32 bit forms. Promotions are never undone, so the loop ends.

use bytes::{BufMut, BytesMut};
use tracing::debug;

use super::instruction::{decode, switch_padding, Instruction, Operands};
use super::opcodes;
use crate::constants::MAX_CODE_LENGTH;
use crate::error::{ClassFileError, Result};

/// A change to a method body, addressed by offsets in the unedited code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeEdit {
    /// Place `code` before the instruction at `at`. Everything recorded at or after
    /// `at` moves forward. `at` may also be the end of the code.
    Insert { at: u32, code: Vec<u8> },
    /// Replace the instruction at `at`. References to `at` land on the replacement.
    Replace { at: u32, code: Vec<u8> },
}

impl CodeEdit {
    pub fn at(&self) -> u32 {
        match self {
            CodeEdit::Insert { at, .. } | CodeEdit::Replace { at, .. } => *at,
        }
    }

    fn code(&self) -> &[u8] {
        match self {
            CodeEdit::Insert { code, .. } | CodeEdit::Replace { code, .. } => code,
        }
    }
}

/// Old offset to new offset, for every instruction boundary of the unedited code
/// plus its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetMap {
    entries: Vec<(u32, u32)>,
}

impl OffsetMap {
    pub fn get(&self, old: u32) -> Option<u32> {
        self.entries
            .binary_search_by_key(&old, |(from, _)| *from)
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// Map `old`, failing if it was not an instruction boundary.
    pub fn map(&self, old: u32, context: &str) -> Result<u32> {
        self.get(old)
            .ok_or_else(|| ClassFileError::invalid_offset(old, context))
    }

    pub fn is_identity(&self) -> bool {
        self.entries.iter().all(|(old, new)| old == new)
    }

    pub fn old_len(&self) -> u32 {
        self.entries.last().map(|(old, _)| *old).unwrap_or(0)
    }

    pub fn new_len(&self) -> u32 {
        self.entries.last().map(|(_, new)| *new).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.entries.iter().copied()
    }
}

#[derive(Debug)]
pub struct Relocated {
    pub code: Vec<u8>,
    pub map: OffsetMap,
    /// How many 16 bit branches had to be promoted.
    pub promotions: usize,
}

#[derive(Debug)]
enum Body {
    Original(Instruction),
    Inline(Vec<u8>),
}

#[derive(Debug)]
struct Slot {
    anchor: Option<u32>,
    body: Body,
    promoted: bool,
    offset: u32,
}

impl Slot {
    fn len_at(&self, offset: u32) -> u32 {
        match &self.body {
            Body::Inline(code) => code.len() as u32,
            Body::Original(instruction) if self.promoted => {
                if opcodes::is_conditional_branch(instruction.opcode) {
                    // inverted if* over a goto_w
                    8
                } else {
                    5
                }
            }
            Body::Original(instruction) => instruction.len_at(offset),
        }
    }
}

fn check_edits(boundaries: &[u32], code_len: u32, edits: &[CodeEdit]) -> Result<()> {
    let mut replaced = vec![];

    for edit in edits {
        let at = edit.at();
        let on_boundary = boundaries.binary_search(&at).is_ok();

        match edit {
            CodeEdit::Insert { .. } if on_boundary || at == code_len => {}
            CodeEdit::Replace { .. } if on_boundary => {
                if replaced.contains(&at) {
                    return Err(ClassFileError::UnsupportedEdit(format!(
                        "the instruction at {at} is replaced twice"
                    )));
                }
                replaced.push(at);
            }
            _ => return Err(ClassFileError::invalid_offset(at, "edit position")),
        }

        let inline = decode(edit.code()).map_err(|e| {
            ClassFileError::UnsupportedEdit(format!("code for the edit at {at} does not decode: {e}"))
        })?;
        if let Some(branch) = inline.iter().find(|i| !i.is_branch_free()) {
            return Err(ClassFileError::UnsupportedEdit(format!(
                "code for the edit at {at} contains a branch at {}",
                branch.offset
            )));
        }
    }

    Ok(())
}

fn build_slots(instructions: Vec<Instruction>, code_len: u32, edits: &[CodeEdit]) -> Vec<Slot> {
    let mut edits: Vec<&CodeEdit> = edits.iter().collect();
    // Stable, so edits at the same offset keep the order they were given in
    edits.sort_by_key(|e| e.at());

    let slot = |anchor, body| Slot {
        anchor,
        body,
        promoted: false,
        offset: 0,
    };

    let mut slots = Vec::with_capacity(instructions.len() + edits.len());
    let mut pending = edits.into_iter().peekable();

    for instruction in instructions {
        let at = instruction.offset;
        let mut replacement = None;

        while let Some(edit) = pending.next_if(|e| e.at() == at) {
            match edit {
                CodeEdit::Insert { code, .. } => slots.push(slot(None, Body::Inline(code.clone()))),
                CodeEdit::Replace { code, .. } => replacement = Some(code.clone()),
            }
        }

        match replacement {
            Some(code) => slots.push(slot(Some(at), Body::Inline(code))),
            None => slots.push(slot(Some(at), Body::Original(instruction))),
        }
    }

    // Whatever remains targets the end of the code
    for edit in pending {
        slots.push(slot(None, Body::Inline(edit.code().to_vec())));
    }

    debug!("laid out {} slots for {} bytes of code", slots.len(), code_len);
    slots
}

fn offset_map(slots: &[Slot], old_len: u32, new_len: u32) -> OffsetMap {
    let mut entries: Vec<(u32, u32)> = slots
        .iter()
        .filter_map(|s| s.anchor.map(|anchor| (anchor, s.offset)))
        .collect();
    entries.push((old_len, new_len));

    OffsetMap { entries }
}

/// Apply `edits` to `code`, promoting any branch whose displacement no longer fits.
///
/// Conditional branches promote into an inverted branch over a `goto_w`. That adds a
/// new branch target, so callers whose method needs a frame at every target pass
/// `allow_conditional_promotion = false` and get `UnsupportedEdit` instead.
pub fn relocate(code: &[u8], edits: &[CodeEdit], allow_conditional_promotion: bool) -> Result<Relocated> {
    let instructions = decode(code)?;
    let boundaries: Vec<u32> = instructions.iter().map(|i| i.offset).collect();
    let old_len = code.len() as u32;

    check_edits(&boundaries, old_len, edits)?;
    let mut slots = build_slots(instructions, old_len, edits);
    let mut promotions = 0;

    let (map, new_len) = loop {
        let mut position = 0u32;
        for slot in slots.iter_mut() {
            slot.offset = position;
            position += slot.len_at(position);
        }

        if position as usize > MAX_CODE_LENGTH {
            return Err(ClassFileError::CodeTooLarge(position as usize));
        }

        let map = offset_map(&slots, old_len, position);
        let mut promoted_this_pass = 0;

        for slot in slots.iter_mut().filter(|s| !s.promoted) {
            let Body::Original(instruction) = &slot.body else {
                continue;
            };
            let Operands::Branch { target } = instruction.operands else {
                continue;
            };
            if !opcodes::is_short_branch(instruction.opcode) {
                continue;
            }

            let displacement = map.map(target, "branch target")? as i64 - slot.offset as i64;
            if i16::try_from(displacement).is_ok() {
                continue;
            }

            if opcodes::is_conditional_branch(instruction.opcode) && !allow_conditional_promotion {
                return Err(ClassFileError::UnsupportedEdit(format!(
                    "the conditional branch at {} needs promotion, which requires a new stack map frame",
                    instruction.offset
                )));
            }

            debug!(
                "promoting {} at {} (displacement {displacement})",
                opcodes::mnemonic(instruction.opcode).unwrap_or("???"),
                instruction.offset
            );
            slot.promoted = true;
            promoted_this_pass += 1;
        }

        if promoted_this_pass == 0 {
            break (map, position);
        }
        promotions += promoted_this_pass;
    };

    let mut out = BytesMut::with_capacity(new_len as usize);
    for slot in &slots {
        emit(slot, &map, &mut out)?;
    }

    Ok(Relocated {
        code: out.to_vec(),
        map,
        promotions,
    })
}

fn emit(slot: &Slot, map: &OffsetMap, out: &mut BytesMut) -> Result<()> {
    let instruction = match &slot.body {
        Body::Inline(code) => {
            out.put_slice(code);
            return Ok(());
        }
        Body::Original(instruction) => instruction,
    };

    let at = slot.offset as i64;
    let relative = |target: u32| -> Result<i64> { Ok(map.map(target, "branch target")? as i64 - at) };

    match &instruction.operands {
        Operands::Plain(bytes) => {
            out.put_u8(instruction.opcode);
            out.put_slice(bytes);
        }
        Operands::Branch { target } if slot.promoted => {
            if let Some(inverse) = opcodes::invert_conditional(instruction.opcode) {
                out.put_u8(inverse);
                // skip over the goto_w that follows
                out.put_i16(8);
                out.put_u8(opcodes::GOTO_W);
                out.put_i32((relative(*target)? - 3) as i32);
            } else {
                let wide = if instruction.opcode == opcodes::JSR {
                    opcodes::JSR_W
                } else {
                    opcodes::GOTO_W
                };
                out.put_u8(wide);
                out.put_i32(relative(*target)? as i32);
            }
        }
        Operands::Branch { target } => {
            out.put_u8(instruction.opcode);
            match instruction.opcode {
                opcodes::GOTO_W | opcodes::JSR_W => out.put_i32(relative(*target)? as i32),
                _ => out.put_i16(relative(*target)? as i16),
            }
        }
        Operands::TableSwitch {
            default,
            low,
            high,
            targets,
        } => {
            out.put_u8(instruction.opcode);
            out.put_bytes(0, switch_padding(slot.offset) as usize);
            out.put_i32(relative(*default)? as i32);
            out.put_i32(*low);
            out.put_i32(*high);
            for target in targets {
                out.put_i32(relative(*target)? as i32);
            }
        }
        Operands::LookupSwitch { default, pairs } => {
            out.put_u8(instruction.opcode);
            out.put_bytes(0, switch_padding(slot.offset) as usize);
            out.put_i32(relative(*default)? as i32);
            out.put_i32(pairs.len() as i32);
            for (key, target) in pairs {
                out.put_i32(*key);
                out.put_i32(relative(*target)? as i32);
            }
        }
    }

    Ok(())
}
