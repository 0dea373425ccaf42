pub mod attributes;
pub mod classfile;
pub mod code;
pub mod constants;
pub mod equality;
pub mod error;
pub mod exceptions;
pub mod flags;
pub mod parser;
pub mod pool;
pub mod writer;

pub use crate::classfile::ClassFile;
pub use crate::equality::{Mismatch, StructuralEq};
pub use crate::error::{ClassFileError, Result};

extern crate bytes;
extern crate enum_as_inner;
extern crate support;

#[cfg(test)]
mod tests {
    use crate::classfile::{ClassFile, Method};
    use crate::code::builder::CodeBuilder;
    use crate::constants::MAGIC;
    use crate::equality::StructuralEq;
    use crate::error::{ClassFileError, Result};
    use crate::flags::{ClassAccessFlags, MethodAccessFlags};
    use crate::pool::ConstantPool;
    use crate::attributes::{Attribute, AttributeInfo};
    use support::descriptor::MethodType;

    fn minimal() -> Result<Vec<u8>> {
        let mut pool = ConstantPool::new();
        let this_class = pool.intern_class("Minimal")?;
        let super_class = pool.intern_class("java/lang/Object")?;

        let run = MethodType::parse("()I").unwrap();
        let mut builder = CodeBuilder::for_method(&mut pool, true, &run);
        builder.push_int(42)?.return_value(&run.return_type);
        let code = builder.build();

        let mut method = Method::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            pool.intern_utf8("run")?,
            pool.intern_utf8("()I")?,
        );
        method.attributes.push(Attribute::new(&mut pool, AttributeInfo::Code(code))?);

        let mut class = ClassFile {
            meta_data: crate::classfile::MetaData {
                minor_version: 0,
                major_version: 49,
            },
            constant_pool: pool,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class: Some(super_class),
            interfaces: Default::default(),
            fields: Default::default(),
            methods: Default::default(),
            attributes: Default::default(),
        };
        class.methods.push(method);

        Ok(class.write())
    }

    #[test]
    fn it_round_trips_a_minimal_class() -> Result<()> {
        let bytes = minimal()?;
        assert_eq!(&bytes[..4], &MAGIC.to_be_bytes());

        let class = ClassFile::read(&bytes)?;
        assert_eq!(class.name()?, "Minimal");
        assert_eq!(class.super_name()?.as_deref(), Some("java/lang/Object"));
        assert_eq!(class.write(), bytes);

        let again = ClassFile::read(&class.write())?;
        assert!(again.structurally_eq(&class));
        Ok(())
    }

    #[test]
    fn it_rejects_bad_headers() -> Result<()> {
        let mut bytes = minimal()?;
        bytes[0] = 0xCB;
        assert!(matches!(
            ClassFile::read(&bytes),
            Err(ClassFileError::MalformedClassFile(_))
        ));

        let mut bytes = minimal()?;
        bytes[7] = 70;
        assert!(matches!(
            ClassFile::read(&bytes),
            Err(ClassFileError::MalformedClassFile(_))
        ));
        Ok(())
    }

    #[test]
    fn it_rejects_truncated_and_padded_input() -> Result<()> {
        let bytes = minimal()?;

        for len in [3, 9, bytes.len() / 2, bytes.len() - 1] {
            assert!(
                matches!(
                    ClassFile::read(&bytes[..len]),
                    Err(ClassFileError::TruncatedInput(_))
                ),
                "{len} bytes"
            );
        }

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(
            ClassFile::read(&padded),
            Err(ClassFileError::MalformedClassFile(_))
        ));
        Ok(())
    }
}
