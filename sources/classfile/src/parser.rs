use bytes::Bytes;
use support::bytes_ext::SafeBuf;
use tracing::{debug, trace};

use crate::attributes::{AttributeInfo, Attributes};
use crate::classfile::{ClassFile, Field, Fields, Interfaces, MetaData, Method, Methods};
use crate::constants::{MAGIC, MAX_SUPPORTED_MAJOR, MIN_SUPPORTED_MAJOR};
use crate::error::{ClassFileError, Result};
use crate::flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::pool::ConstantPool;

pub struct Parser {
    bytes: Bytes,
}

impl Parser {
    pub fn new(data: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(data),
        }
    }

    fn parse_interfaces(&mut self, pool: &ConstantPool) -> Result<Interfaces> {
        let length = self.bytes.try_get_u16()?;
        let mut interfaces = Interfaces {
            values: Vec::with_capacity(length.into()),
        };

        for _ in 0..length {
            let index = self.bytes.try_get_u16()?;
            pool.class(index)?;
            interfaces.values.push(index);
        }

        Ok(interfaces)
    }

    /// Name and descriptor of a field or method, both of which must be Utf8 entries.
    fn parse_member_header(&mut self, pool: &ConstantPool) -> Result<(u16, u16, u16)> {
        let flags = self.bytes.try_get_u16()?;
        let name = self.bytes.try_get_u16()?;
        let descriptor = self.bytes.try_get_u16()?;

        pool.utf8(name)?;
        pool.utf8(descriptor)?;
        Ok((flags, name, descriptor))
    }

    fn parse_fields(&mut self, pool: &ConstantPool) -> Result<Fields> {
        let length = self.bytes.try_get_u16()?;
        let mut fields = Fields {
            values: Vec::with_capacity(length.into()),
        };

        for _ in 0..length {
            let (flags, name, descriptor) = self.parse_member_header(pool)?;
            trace!("field {}", pool.describe(name));

            fields.values.push(Field {
                flags: FieldAccessFlags::read(flags),
                name,
                descriptor,
                attributes: Attributes::read(&mut self.bytes, pool)?,
            });
        }

        Ok(fields)
    }

    fn parse_methods(&mut self, pool: &ConstantPool) -> Result<Methods> {
        let length = self.bytes.try_get_u16()?;
        let mut methods = Methods {
            values: Vec::with_capacity(length.into()),
        };

        for _ in 0..length {
            let (flags, name, descriptor) = self.parse_member_header(pool)?;
            trace!("method {}{}", pool.describe(name), pool.describe(descriptor));

            let method = Method {
                flags: MethodAccessFlags::read(flags),
                name,
                descriptor,
                attributes: Attributes::read(&mut self.bytes, pool)?,
            };

            let bodies = method
                .attributes
                .iter()
                .filter(|a| matches!(a.info, AttributeInfo::Code(_)))
                .count();
            if bodies > 1 {
                return Err(ClassFileError::malformed(format!(
                    "method {} has {bodies} Code attributes",
                    pool.describe(name)
                )));
            }

            methods.values.push(method);
        }

        Ok(methods)
    }

    pub fn parse(&mut self) -> Result<ClassFile> {
        let magic = self.bytes.try_get_u32()?;

        // Format checking: The first four bytes must contain the right magic number
        if magic != MAGIC {
            return Err(ClassFileError::malformed(format!(
                "invalid magic value {magic:#010x}"
            )));
        }

        let minor = self.bytes.try_get_u16()?;
        let major = self.bytes.try_get_u16()?;

        if !(MIN_SUPPORTED_MAJOR..=MAX_SUPPORTED_MAJOR).contains(&major) {
            return Err(ClassFileError::malformed(format!(
                "unsupported class file version {major}.{minor}"
            )));
        }

        let meta_data = MetaData {
            minor_version: minor,
            major_version: major,
        };
        debug!("parsing class file version {}.{}", major, minor);

        // Format checking: every index inside the pool must point at an entry of the right kind
        let constant_pool = ConstantPool::read(&mut self.bytes)?;
        debug!("constant pool has {} slots", constant_pool.len());

        let access_flags = ClassAccessFlags::read(self.bytes.try_get_u16()?);
        let this_class = self.bytes.try_get_u16()?;
        constant_pool.class(this_class)?;

        let super_class = match self.bytes.try_get_u16()? {
            0 => None,
            index => {
                constant_pool.class(index)?;
                Some(index)
            }
        };

        let interfaces = self.parse_interfaces(&constant_pool)?;
        let fields = self.parse_fields(&constant_pool)?;
        let methods = self.parse_methods(&constant_pool)?;
        let attributes = Attributes::read(&mut self.bytes, &constant_pool)?;

        // Format checking: The class file must not be truncated or have extra bytes at the end
        if !self.bytes.is_empty() {
            return Err(ClassFileError::malformed(format!(
                "classfile has {} extra bytes at the end",
                self.bytes.len()
            )));
        }

        debug!(
            "parsed {} ({} fields, {} methods)",
            constant_pool.describe(this_class),
            fields.len(),
            methods.len()
        );

        Ok(ClassFile {
            meta_data,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}
