use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use support::bytes_ext::SafeBuf;

use crate::code::relocate::OffsetMap;
use crate::equality::{compare, Mismatch, StructuralEq};
use crate::error::{ClassFileError, Result};
use crate::pool::ConstantPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object { class: u16 },
    /// `offset` is the `new` instruction that created the value.
    Uninitialized { offset: u16 },
}

impl VerificationType {
    fn read(bytes: &mut Bytes) -> Result<Self> {
        Ok(match bytes.try_get_u8()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object {
                class: bytes.try_get_u16()?,
            },
            8 => VerificationType::Uninitialized {
                offset: bytes.try_get_u16()?,
            },
            tag => {
                return Err(ClassFileError::malformed(format!(
                    "unknown verification type tag {tag}"
                )))
            }
        })
    }

    fn write(&self, out: &mut BytesMut) {
        match self {
            VerificationType::Top => out.put_u8(0),
            VerificationType::Integer => out.put_u8(1),
            VerificationType::Float => out.put_u8(2),
            VerificationType::Double => out.put_u8(3),
            VerificationType::Long => out.put_u8(4),
            VerificationType::Null => out.put_u8(5),
            VerificationType::UninitializedThis => out.put_u8(6),
            VerificationType::Object { class } => {
                out.put_u8(7);
                out.put_u16(*class);
            }
            VerificationType::Uninitialized { offset } => {
                out.put_u8(8);
                out.put_u16(*offset);
            }
        }
    }

    fn remap(&mut self, map: &OffsetMap) -> Result<()> {
        if let VerificationType::Uninitialized { offset } = self {
            *offset = map.map(*offset as u32, "uninitialized verification type")? as u16;
        }
        Ok(())
    }

    fn describe(&self, pool: &ConstantPool) -> String {
        match self {
            VerificationType::Object { class } => pool.describe(*class),
            VerificationType::Uninitialized { offset } => format!("uninitialized({offset})"),
            other => format!("{other:?}").to_lowercase(),
        }
    }
}

/// One frame of a `StackMapTable`. The variant is the on-disk frame form, which is
/// kept so that unedited tables are written back byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    Same {
        offset_delta: u16,
    },
    SameLocals1StackItem {
        offset_delta: u16,
        stack: VerificationType,
    },
    SameLocals1StackItemExtended {
        offset_delta: u16,
        stack: VerificationType,
    },
    Chop {
        offset_delta: u16,
        k: u8,
    },
    SameExtended {
        offset_delta: u16,
    },
    Append {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

fn read_types(bytes: &mut Bytes, count: usize) -> Result<Vec<VerificationType>> {
    let mut types = Vec::with_capacity(count);
    for _ in 0..count {
        types.push(VerificationType::read(bytes)?);
    }
    Ok(types)
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameLocals1StackItem { offset_delta, .. }
            | StackMapFrame::SameLocals1StackItemExtended { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::SameExtended { offset_delta }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    /// Change the delta, switching to the extended form where the compact one can't hold it.
    fn set_offset_delta(&mut self, delta: u16) {
        *self = match std::mem::replace(self, StackMapFrame::Same { offset_delta: 0 }) {
            StackMapFrame::Same { .. } if delta >= 64 => StackMapFrame::SameExtended { offset_delta: delta },
            StackMapFrame::Same { .. } => StackMapFrame::Same { offset_delta: delta },
            StackMapFrame::SameLocals1StackItem { stack, .. } if delta >= 64 => {
                StackMapFrame::SameLocals1StackItemExtended {
                    offset_delta: delta,
                    stack,
                }
            }
            StackMapFrame::SameLocals1StackItem { stack, .. } => StackMapFrame::SameLocals1StackItem {
                offset_delta: delta,
                stack,
            },
            StackMapFrame::SameLocals1StackItemExtended { stack, .. } => {
                StackMapFrame::SameLocals1StackItemExtended {
                    offset_delta: delta,
                    stack,
                }
            }
            StackMapFrame::Chop { k, .. } => StackMapFrame::Chop {
                offset_delta: delta,
                k,
            },
            StackMapFrame::SameExtended { .. } => StackMapFrame::SameExtended { offset_delta: delta },
            StackMapFrame::Append { locals, .. } => StackMapFrame::Append {
                offset_delta: delta,
                locals,
            },
            StackMapFrame::Full { locals, stack, .. } => StackMapFrame::Full {
                offset_delta: delta,
                locals,
                stack,
            },
        };
    }

    fn types_mut(&mut self) -> Vec<&mut VerificationType> {
        match self {
            StackMapFrame::Same { .. } | StackMapFrame::Chop { .. } | StackMapFrame::SameExtended { .. } => {
                vec![]
            }
            StackMapFrame::SameLocals1StackItem { stack, .. }
            | StackMapFrame::SameLocals1StackItemExtended { stack, .. } => vec![stack],
            StackMapFrame::Append { locals, .. } => locals.iter_mut().collect(),
            StackMapFrame::Full { locals, stack, .. } => locals.iter_mut().chain(stack.iter_mut()).collect(),
        }
    }

    fn read(bytes: &mut Bytes) -> Result<Self> {
        let frame_type = bytes.try_get_u8()?;

        Ok(match frame_type {
            0..=63 => StackMapFrame::Same {
                offset_delta: frame_type as u16,
            },
            64..=127 => StackMapFrame::SameLocals1StackItem {
                offset_delta: (frame_type - 64) as u16,
                stack: VerificationType::read(bytes)?,
            },
            247 => StackMapFrame::SameLocals1StackItemExtended {
                offset_delta: bytes.try_get_u16()?,
                stack: VerificationType::read(bytes)?,
            },
            248..=250 => StackMapFrame::Chop {
                offset_delta: bytes.try_get_u16()?,
                k: 251 - frame_type,
            },
            251 => StackMapFrame::SameExtended {
                offset_delta: bytes.try_get_u16()?,
            },
            252..=254 => {
                let offset_delta = bytes.try_get_u16()?;
                StackMapFrame::Append {
                    offset_delta,
                    locals: read_types(bytes, (frame_type - 251) as usize)?,
                }
            }
            255 => {
                let offset_delta = bytes.try_get_u16()?;
                let locals_count = bytes.try_get_u16()? as usize;
                let locals = read_types(bytes, locals_count)?;
                let stack_count = bytes.try_get_u16()? as usize;
                let stack = read_types(bytes, stack_count)?;

                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
            _ => {
                return Err(ClassFileError::malformed(format!(
                    "reserved stack map frame type {frame_type}"
                )))
            }
        })
    }

    fn write(&self, out: &mut BytesMut) {
        match self {
            StackMapFrame::Same { offset_delta } => out.put_u8(*offset_delta as u8),
            StackMapFrame::SameLocals1StackItem { offset_delta, stack } => {
                out.put_u8(64 + *offset_delta as u8);
                stack.write(out);
            }
            StackMapFrame::SameLocals1StackItemExtended { offset_delta, stack } => {
                out.put_u8(247);
                out.put_u16(*offset_delta);
                stack.write(out);
            }
            StackMapFrame::Chop { offset_delta, k } => {
                out.put_u8(251 - k);
                out.put_u16(*offset_delta);
            }
            StackMapFrame::SameExtended { offset_delta } => {
                out.put_u8(251);
                out.put_u16(*offset_delta);
            }
            StackMapFrame::Append { offset_delta, locals } => {
                out.put_u8(251 + locals.len() as u8);
                out.put_u16(*offset_delta);
                locals.iter().for_each(|t| t.write(out));
            }
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                out.put_u8(255);
                out.put_u16(*offset_delta);
                out.put_u16(locals.len() as u16);
                locals.iter().for_each(|t| t.write(out));
                out.put_u16(stack.len() as u16);
                stack.iter().for_each(|t| t.write(out));
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackMapTable {
    pub frames: Vec<StackMapFrame>,
}

impl StackMapTable {
    /// The code offset each frame applies to. The first frame is at its delta, every
    /// later frame at `previous + delta + 1`.
    pub fn offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.frames.len());
        let mut previous: Option<u32> = None;

        for frame in &self.frames {
            let delta = frame.offset_delta() as u32;
            let offset = match previous {
                None => delta,
                Some(previous) => previous + delta + 1,
            };
            offsets.push(offset);
            previous = Some(offset);
        }

        offsets
    }

    /// Move every frame and every `Uninitialized` offset through `map`.
    pub fn remap(&mut self, map: &OffsetMap) -> Result<()> {
        let offsets = self.offsets();
        let mut previous: Option<u32> = None;

        for (frame, old) in self.frames.iter_mut().zip(offsets) {
            let new = map.map(old, "stack map frame")?;
            let delta = match previous {
                None => new,
                Some(previous) => new - previous - 1,
            };

            frame.set_offset_delta(delta as u16);
            for verification_type in frame.types_mut() {
                verification_type.remap(map)?;
            }
            previous = Some(new);
        }

        Ok(())
    }

    pub fn read(bytes: &mut Bytes) -> Result<Self> {
        let count = bytes.try_get_u16()?;
        let mut frames = Vec::with_capacity(count.into());
        for _ in 0..count {
            frames.push(StackMapFrame::read(bytes)?);
        }
        Ok(Self { frames })
    }

    pub fn write(&self, out: &mut BytesMut) {
        out.put_u16(self.frames.len() as u16);
        for frame in &self.frames {
            frame.write(out);
        }
    }

    pub fn print(&self, out: &mut dyn fmt::Write, indent: usize, pool: &ConstantPool) -> fmt::Result {
        writeln!(out, "{:indent$}StackMapTable: {} frames", "", self.frames.len())?;

        for (frame, offset) in self.frames.iter().zip(self.offsets()) {
            let describe = |types: &[VerificationType]| {
                types
                    .iter()
                    .map(|t| t.describe(pool))
                    .collect::<Vec<_>>()
                    .join(", ")
            };

            let detail = match frame {
                StackMapFrame::Same { .. } | StackMapFrame::SameExtended { .. } => "same".to_string(),
                StackMapFrame::SameLocals1StackItem { stack, .. }
                | StackMapFrame::SameLocals1StackItemExtended { stack, .. } => {
                    format!("same locals, stack [{}]", stack.describe(pool))
                }
                StackMapFrame::Chop { k, .. } => format!("chop {k}"),
                StackMapFrame::Append { locals, .. } => format!("append [{}]", describe(locals)),
                StackMapFrame::Full { locals, stack, .. } => {
                    format!("full locals [{}] stack [{}]", describe(locals), describe(stack))
                }
            };

            writeln!(out, "{:width$}{offset}: {detail}", "", width = indent + 2)?;
        }
        Ok(())
    }
}

impl StructuralEq for StackMapTable {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare("frames.len()", &self.frames.len(), &other.frames.len())?;
        for (i, (left, right)) in self.frames.iter().zip(&other.frames).enumerate() {
            compare(&format!("frames[{i}]"), left, right)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::{StackMapFrame, StackMapTable, VerificationType};
    use crate::code::relocate::{relocate, CodeEdit};
    use crate::code::opcodes::*;
    use crate::error::Result;

    #[test]
    fn it_reads_every_frame_form() -> Result<()> {
        let data: &[u8] = &[
            0, 6, // six frames
            3, // same
            64 + 2, 1, // same locals 1 stack item, int
            247, 0, 100, 7, 0, 9, // extended, object #9
            249, 0, 4, // chop 2
            252, 0, 1, 4, // append long
            255, 0, 0, 0, 1, 8, 0, 12, 0, 0, // full, locals [uninitialized(12)]
        ];
        let mut bytes = Bytes::copy_from_slice(data);
        let table = StackMapTable::read(&mut bytes)?;

        assert!(bytes.is_empty());
        assert_eq!(table.frames[3], StackMapFrame::Chop { offset_delta: 4, k: 2 });
        assert_eq!(table.offsets(), [3, 6, 107, 112, 114, 115]);

        let mut out = BytesMut::new();
        table.write(&mut out);
        assert_eq!(&out[..], data);
        Ok(())
    }

    #[test]
    fn it_widens_frames_pushed_past_the_compact_range() -> Result<()> {
        // 0: iload_1, 1: ifeq 6, 4: iconst_1, 5: ireturn, 6: iconst_0, 7: ireturn
        let code = [ILOAD_1, IFEQ, 0, 5, ICONST_1, IRETURN, ICONST_0, IRETURN];
        let relocated = relocate(
            &code,
            &[CodeEdit::Insert {
                at: 4,
                code: vec![NOP; 70],
            }],
            false,
        )?;

        let mut table = StackMapTable {
            frames: vec![
                StackMapFrame::Same { offset_delta: 6 },
                StackMapFrame::SameLocals1StackItem {
                    offset_delta: 0,
                    stack: VerificationType::Uninitialized { offset: 4 },
                },
            ],
        };
        table.remap(&relocated.map)?;

        assert_eq!(table.frames[0], StackMapFrame::SameExtended { offset_delta: 76 });
        assert_eq!(
            table.frames[1],
            StackMapFrame::SameLocals1StackItem {
                offset_delta: 0,
                stack: VerificationType::Uninitialized { offset: 74 }
            }
        );
        Ok(())
    }
}
