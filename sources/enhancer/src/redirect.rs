//! Locating the field access sites that get routed through accessors.

use classfile::code::instruction::Instruction;
use classfile::code::opcodes::{GETFIELD, GETSTATIC, PUTFIELD, PUTSTATIC};
use classfile::pool::ConstantPool;
use classfile::Result;
use support::descriptor::{BaseType, FieldType, MethodType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A field after resolution against the class and the ancestry the caller supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    /// The class that declares the field, and that holds its accessors.
    pub owner: String,
    pub name: String,
    pub ty: FieldType,
    pub is_static: bool,
    pub owner_is_interface: bool,
}

impl ResolvedField {
    pub fn descriptor(&self) -> String {
        self.ty.to_string()
    }

    /// `(LOwner;)T` for instance fields, `()T` for static ones.
    pub fn getter_type(&self) -> MethodType {
        MethodType::new(self.receiver(), self.ty.clone())
    }

    /// `(LOwner;T)V` for instance fields, `(T)V` for static ones.
    pub fn setter_type(&self) -> MethodType {
        let mut parameters = self.receiver();
        parameters.push(self.ty.clone());
        MethodType::new(parameters, FieldType::Base(BaseType::Void))
    }

    fn receiver(&self) -> Vec<FieldType> {
        if self.is_static {
            vec![]
        } else {
            vec![FieldType::object(self.owner.as_str())]
        }
    }

    /// Whether `opcode` accesses a field shaped like this one, and in which direction.
    fn access(&self, opcode: u8) -> Option<Access> {
        match (opcode, self.is_static) {
            (GETFIELD, false) | (GETSTATIC, true) => Some(Access::Read),
            (PUTFIELD, false) | (PUTSTATIC, true) => Some(Access::Write),
            _ => None,
        }
    }
}

/// Offsets of every instruction in `instructions` that touches `field`, either
/// through `accessing_class` or through the declaring class.
pub fn find_sites(
    instructions: &[Instruction],
    pool: &ConstantPool,
    field: &ResolvedField,
    accessing_class: &str,
) -> Result<Vec<(u32, Access)>> {
    let descriptor = field.descriptor();
    let mut sites = vec![];

    for instruction in instructions {
        let Some(access) = field.access(instruction.opcode) else {
            continue;
        };
        let Some(index) = instruction.pool_index() else {
            continue;
        };

        let reference = pool.member_ref(index)?;
        let owner_matches = reference.owner == accessing_class || reference.owner == field.owner;
        if owner_matches && reference.name == field.name && reference.descriptor == descriptor {
            sites.push((instruction.offset, access));
        }
    }

    Ok(sites)
}
