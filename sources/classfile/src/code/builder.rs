use bytes::{BufMut, BytesMut};
use support::descriptor::{BaseType, FieldType, MethodType};

use super::opcodes::*;
use super::CodeAttribute;
use crate::error::Result;
use crate::pool::ConstantPool;

/// Emits straight-line method bodies, tracking operand stack depth as it goes.
///
/// Every emitter interns the constants it needs into the pool it was created with.
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantPool,
    code: BytesMut,
    stack: u16,
    max_stack: u16,
    max_locals: u16,
}

fn type_class(ty: &FieldType) -> usize {
    match ty {
        FieldType::Base(BaseType::Long) => 1,
        FieldType::Base(BaseType::Float) => 2,
        FieldType::Base(BaseType::Double) => 3,
        FieldType::Object(_) | FieldType::Array(_) => 4,
        // boolean, byte, char, short and int all use the int instructions
        _ => 0,
    }
}

impl<'a> CodeBuilder<'a> {
    pub fn new(pool: &'a mut ConstantPool, max_locals: u16) -> Self {
        Self {
            pool,
            code: BytesMut::new(),
            stack: 0,
            max_stack: 0,
            max_locals,
        }
    }

    /// A builder whose locals start out holding `this` (unless static) and the parameters.
    pub fn for_method(pool: &'a mut ConstantPool, is_static: bool, method: &MethodType) -> Self {
        let this = if is_static { 0 } else { 1 };
        Self::new(pool, method.parameter_slots().saturating_add(this))
    }

    pub fn pool(&mut self) -> &mut ConstantPool {
        self.pool
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    fn emit(&mut self, opcode: u8, operands: &[u8], pops: u16, pushes: u16) -> &mut Self {
        self.code.put_u8(opcode);
        self.code.put_slice(operands);

        self.stack = self.stack.saturating_sub(pops).saturating_add(pushes);
        self.max_stack = self.max_stack.max(self.stack);
        self
    }

    /// Emit pre-encoded instructions with a known stack effect.
    pub fn raw(&mut self, code: &[u8], pops: u16, pushes: u16) -> &mut Self {
        self.code.put_slice(code);
        self.stack = self.stack.saturating_sub(pops).saturating_add(pushes);
        self.max_stack = self.max_stack.max(self.stack);
        self
    }

    fn local(&mut self, shortcut: u8, general: u8, slot: u16, size: u16, pops: u16, pushes: u16) -> &mut Self {
        self.max_locals = self.max_locals.max(slot.saturating_add(size));

        match slot {
            0..=3 => self.emit(shortcut + slot as u8, &[], pops, pushes),
            4..=255 => self.emit(general, &[slot as u8], pops, pushes),
            _ => {
                let [high, low] = slot.to_be_bytes();
                self.emit(WIDE, &[general, high, low], pops, pushes)
            }
        }
    }

    pub fn load(&mut self, ty: &FieldType, slot: u16) -> &mut Self {
        let class = type_class(ty) as u8;
        let size = ty.slots();
        self.local(ILOAD_0 + class * 4, ILOAD + class, slot, size, 0, size)
    }

    pub fn store(&mut self, ty: &FieldType, slot: u16) -> &mut Self {
        let class = type_class(ty) as u8;
        let size = ty.slots();
        self.local(ISTORE_0 + class * 4, ISTORE + class, slot, size, size, 0)
    }

    pub fn load_this(&mut self) -> &mut Self {
        self.emit(ALOAD_0, &[], 0, 1)
    }

    /// Push every parameter of `method`, in order.
    pub fn load_parameters(&mut self, is_static: bool, method: &MethodType) -> &mut Self {
        let mut slot = if is_static { 0 } else { 1 };
        for parameter in &method.parameters {
            self.load(parameter, slot);
            slot = slot.saturating_add(parameter.slots());
        }
        self
    }

    pub fn push_int(&mut self, value: i32) -> Result<&mut Self> {
        Ok(match value {
            -1..=5 => self.emit((ICONST_0 as i32 + value) as u8, &[], 0, 1),
            -128..=127 => self.emit(BIPUSH, &[value as i8 as u8], 0, 1),
            -32768..=32767 => self.emit(SIPUSH, &(value as i16).to_be_bytes(), 0, 1),
            _ => {
                let index = self.pool.intern_integer(value)?;
                self.ldc(index)
            }
        })
    }

    pub fn push_string(&mut self, value: &str) -> Result<&mut Self> {
        let index = self.pool.intern_string(value)?;
        Ok(self.ldc(index))
    }

    pub fn push_null(&mut self) -> &mut Self {
        self.emit(ACONST_NULL, &[], 0, 1)
    }

    fn ldc(&mut self, index: u16) -> &mut Self {
        match u8::try_from(index) {
            Ok(index) => self.emit(LDC, &[index], 0, 1),
            Err(_) => self.emit(LDC_W, &index.to_be_bytes(), 0, 1),
        }
    }

    /// Allocate an uninitialised instance of `class`.
    pub fn new_instance(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.pool.intern_class(class)?;
        Ok(self.emit(NEW, &index.to_be_bytes(), 0, 1))
    }

    pub fn dup(&mut self) -> &mut Self {
        self.emit(DUP, &[], 1, 2)
    }

    pub fn pop(&mut self, ty: &FieldType) -> &mut Self {
        match ty.slots() {
            0 => self,
            1 => self.emit(POP, &[], 1, 0),
            _ => self.emit(POP2, &[], 2, 0),
        }
    }

    fn field(&mut self, opcode: u8, owner: &str, name: &str, ty: &FieldType) -> Result<&mut Self> {
        let index = self.pool.intern_field_ref(owner, name, &ty.to_string())?;
        let size = ty.slots();

        let (pops, pushes) = match opcode {
            GETSTATIC => (0, size),
            PUTSTATIC => (size, 0),
            GETFIELD => (1, size),
            _ => (1 + size, 0),
        };
        Ok(self.emit(opcode, &index.to_be_bytes(), pops, pushes))
    }

    pub fn get_field(&mut self, owner: &str, name: &str, ty: &FieldType) -> Result<&mut Self> {
        self.field(GETFIELD, owner, name, ty)
    }

    pub fn put_field(&mut self, owner: &str, name: &str, ty: &FieldType) -> Result<&mut Self> {
        self.field(PUTFIELD, owner, name, ty)
    }

    pub fn get_static(&mut self, owner: &str, name: &str, ty: &FieldType) -> Result<&mut Self> {
        self.field(GETSTATIC, owner, name, ty)
    }

    pub fn put_static(&mut self, owner: &str, name: &str, ty: &FieldType) -> Result<&mut Self> {
        self.field(PUTSTATIC, owner, name, ty)
    }

    fn invoke(&mut self, opcode: u8, owner: &str, name: &str, method: &MethodType) -> Result<&mut Self> {
        let descriptor = method.to_string();
        let index = match opcode {
            INVOKEINTERFACE => self.pool.intern_interface_method_ref(owner, name, &descriptor)?,
            _ => self.pool.intern_method_ref(owner, name, &descriptor)?,
        };

        let receiver = if opcode == INVOKESTATIC { 0 } else { 1 };
        let pops = receiver + method.parameter_slots();
        let pushes = method.return_type.slots();

        let [high, low] = index.to_be_bytes();
        Ok(match opcode {
            INVOKEINTERFACE => self.emit(opcode, &[high, low, pops as u8, 0], pops, pushes),
            _ => self.emit(opcode, &[high, low], pops, pushes),
        })
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, method: &MethodType) -> Result<&mut Self> {
        self.invoke(INVOKEVIRTUAL, owner, name, method)
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, method: &MethodType) -> Result<&mut Self> {
        self.invoke(INVOKESPECIAL, owner, name, method)
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, method: &MethodType) -> Result<&mut Self> {
        self.invoke(INVOKESTATIC, owner, name, method)
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, method: &MethodType) -> Result<&mut Self> {
        self.invoke(INVOKEINTERFACE, owner, name, method)
    }

    /// Return a value of type `ty`, or nothing for `V`.
    pub fn return_value(&mut self, ty: &FieldType) -> &mut Self {
        if ty.is_void() {
            return self.emit(RETURN, &[], 0, 0);
        }
        let size = ty.slots();
        self.emit(IRETURN + type_class(ty) as u8, &[], size, 0)
    }

    pub fn build(self) -> CodeAttribute {
        CodeAttribute::new(self.max_stack, self.max_locals, self.code.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use support::descriptor::{FieldType, MethodType};

    use super::CodeBuilder;
    use crate::code::instruction::decode;
    use crate::code::opcodes::*;
    use crate::error::Result;
    use crate::pool::ConstantPool;

    #[test]
    fn it_builds_a_static_getter() -> Result<()> {
        let mut pool = ConstantPool::new();
        let owner = FieldType::object("Counter");
        let getter = MethodType::new(vec![owner], FieldType::parse("J").unwrap());

        let mut builder = CodeBuilder::for_method(&mut pool, true, &getter);
        builder.load(&getter.parameters[0], 0);
        builder.get_field("Counter", "total", &getter.return_type)?;
        builder.return_value(&getter.return_type);
        let code = builder.build();

        assert_eq!(code.max_stack, 2);
        assert_eq!(code.max_locals, 1);
        assert_eq!(code.code[0], ALOAD_0);
        assert_eq!(code.code[1], GETFIELD);
        assert_eq!(code.code[4], LRETURN);

        let field = pool.member_ref(u16::from_be_bytes([code.code[2], code.code[3]]))?;
        assert_eq!(field.to_string(), "Counter.total:J");
        Ok(())
    }

    #[test]
    fn it_caps_locals_at_the_last_slot() -> Result<()> {
        let mut pool = ConstantPool::new();
        let long = FieldType::parse("J").unwrap();

        let mut builder = CodeBuilder::new(&mut pool, 0);
        builder.push_int(0)?;
        builder.raw(&[I2L], 1, 2);
        builder.store(&long, u16::MAX);
        let code = builder.build();

        assert_eq!(code.max_locals, u16::MAX);
        assert_eq!(code.code[2..], [WIDE, LSTORE, 0xff, 0xff]);
        Ok(())
    }

    #[test]
    fn it_picks_the_shortest_encodings() -> Result<()> {
        let mut pool = ConstantPool::new();
        let int = FieldType::parse("I").unwrap();

        let mut builder = CodeBuilder::new(&mut pool, 0);
        builder.push_int(3)?.push_int(100)?.push_int(1000)?.push_int(100_000)?;
        builder.store(&int, 2).store(&int, 7).store(&int, 300);
        builder.load(&FieldType::parse("D").unwrap(), 5);
        let code = builder.build();

        let opcodes: Vec<_> = decode(&code.code)?.iter().map(|i| i.opcode).collect();
        assert_eq!(opcodes, [ICONST_3, BIPUSH, SIPUSH, LDC, ISTORE_2, ISTORE, WIDE, DLOAD]);
        assert_eq!(code.max_stack, 4);
        assert_eq!(code.max_locals, 301);
        Ok(())
    }

    #[test]
    fn it_counts_interface_arguments() -> Result<()> {
        let mut pool = ConstantPool::new();
        let method = MethodType::parse("(JLjava/lang/Object;)V").unwrap();

        let mut builder = CodeBuilder::new(&mut pool, 4);
        builder.load_this();
        builder.load_parameters(false, &method);
        builder.invoke_interface("Managed", "touch", &method)?;
        builder.return_value(&method.return_type);

        let code = builder.build();
        let instructions = decode(&code.code)?;
        let call = instructions.iter().find(|i| i.opcode == INVOKEINTERFACE).unwrap();
        assert_eq!(call.len(), 5);
        assert_eq!(code.code[call.offset as usize + 3], 4);
        assert_eq!(code.max_stack, 4);
        Ok(())
    }
}
