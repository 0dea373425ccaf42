use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::attributes::Attributes;
use crate::classfile::ClassFile;
use crate::constants::MAGIC;

/// Serializes a class file into one buffer. Nothing is handed back until the whole
/// file has been written, and every count and length is recomputed from the model.
pub struct Writer {
    bytes: BytesMut,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    pub fn new() -> Self {
        Self {
            bytes: BytesMut::new(),
        }
    }

    fn write_member(&mut self, flags: u16, name: u16, descriptor: u16, attributes: &Attributes) {
        self.bytes.put_u16(flags);
        self.bytes.put_u16(name);
        self.bytes.put_u16(descriptor);
        attributes.write(&mut self.bytes);
    }

    pub fn write(mut self, class: &ClassFile) -> Vec<u8> {
        self.bytes.put_u32(MAGIC);
        self.bytes.put_u16(class.meta_data.minor_version);
        self.bytes.put_u16(class.meta_data.major_version);

        class.constant_pool.write(&mut self.bytes);

        self.bytes.put_u16(class.access_flags.bits());
        self.bytes.put_u16(class.this_class);
        self.bytes.put_u16(class.super_class.unwrap_or(0));

        self.bytes.put_u16(class.interfaces.len() as u16);
        for interface in class.interfaces.iter() {
            self.bytes.put_u16(*interface);
        }

        self.bytes.put_u16(class.fields.len() as u16);
        for field in class.fields.iter() {
            self.write_member(field.flags.bits(), field.name, field.descriptor, &field.attributes);
        }

        self.bytes.put_u16(class.methods.len() as u16);
        for method in class.methods.iter() {
            self.write_member(method.flags.bits(), method.name, method.descriptor, &method.attributes);
        }

        class.attributes.write(&mut self.bytes);

        debug!("wrote {} bytes", self.bytes.len());
        self.bytes.to_vec()
    }
}
