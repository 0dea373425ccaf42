use std::fmt::{self, Write as _};

use crate::attributes::Attributes;
use crate::code::CodeAttribute;
use crate::equality::{compare, compare_seq, Mismatch, StructuralEq};
use crate::error::Result;
use crate::flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::parser::Parser;
use crate::pool::ConstantPool;
use crate::writer::Writer;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub meta_data: MetaData,
    pub constant_pool: ConstantPool,

    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: Option<u16>,

    pub interfaces: Interfaces,
    pub fields: Fields,
    pub methods: Methods,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub flags: FieldAccessFlags,
    pub name: u16,
    pub descriptor: u16,
    pub attributes: Attributes,
}

impl Field {
    pub fn new(flags: FieldAccessFlags, name: u16, descriptor: u16) -> Self {
        Self {
            flags,
            name,
            descriptor,
            attributes: Attributes::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags.has(FieldAccessFlags::STATIC)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    pub(crate) values: Vec<Field>,
}

impl Fields {
    /// Find a field by name, and by descriptor too when one is given.
    pub fn locate(&self, pool: &ConstantPool, name: &str, descriptor: Option<&str>) -> Option<&Field> {
        self.values.iter().find(|f| member_matches(pool, f.name, f.descriptor, name, descriptor))
    }

    pub fn push(&mut self, field: Field) {
        self.values.push(field);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub flags: MethodAccessFlags,
    pub name: u16,
    pub descriptor: u16,
    pub attributes: Attributes,
}

impl Method {
    pub fn new(flags: MethodAccessFlags, name: u16, descriptor: u16) -> Self {
        Self {
            flags,
            name,
            descriptor,
            attributes: Attributes::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags.has(MethodAccessFlags::STATIC)
    }

    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.code()
    }

    pub fn code_mut(&mut self) -> Option<&mut CodeAttribute> {
        self.attributes.code_mut()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Methods {
    pub(crate) values: Vec<Method>,
}

impl Methods {
    pub fn locate(&self, pool: &ConstantPool, name: &str, descriptor: &str) -> Option<&Method> {
        self.values
            .iter()
            .find(|m| member_matches(pool, m.name, m.descriptor, name, Some(descriptor)))
    }

    pub fn locate_mut(&mut self, pool: &ConstantPool, name: &str, descriptor: &str) -> Option<&mut Method> {
        self.values
            .iter_mut()
            .find(|m| member_matches(pool, m.name, m.descriptor, name, Some(descriptor)))
    }

    pub fn push(&mut self, method: Method) {
        self.values.push(method);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Method> {
        self.values.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn member_matches(pool: &ConstantPool, name: u16, descriptor: u16, want_name: &str, want_descriptor: Option<&str>) -> bool {
    let name_matches = pool.utf8_eq(name, want_name).unwrap_or(false);
    let descriptor_matches = match want_descriptor {
        Some(want) => pool.utf8_eq(descriptor, want).unwrap_or(false),
        None => true,
    };
    name_matches && descriptor_matches
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interfaces {
    pub(crate) values: Vec<u16>,
}

impl Interfaces {
    pub fn push(&mut self, class: u16) {
        self.values.push(class);
    }

    pub fn iter(&self) -> impl Iterator<Item = &u16> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaData {
    pub minor_version: u16,
    pub major_version: u16,
}

impl ClassFile {
    /// An empty public class with no members.
    pub fn new(major_version: u16, name: &str, super_name: Option<&str>) -> Result<Self> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.intern_class(name)?;
        let super_class = super_name
            .map(|name| constant_pool.intern_class(name))
            .transpose()?;

        Ok(Self {
            meta_data: MetaData {
                minor_version: 0,
                major_version,
            },
            constant_pool,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: Interfaces::default(),
            fields: Fields::default(),
            methods: Methods::default(),
            attributes: Attributes::new(),
        })
    }

    pub fn read(data: &[u8]) -> Result<Self> {
        Parser::new(data).parse()
    }

    /// Serialize, recomputing every count and length.
    pub fn write(&self) -> Vec<u8> {
        Writer::new().write(self)
    }

    pub fn name(&self) -> Result<String> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<String>> {
        self.super_class
            .map(|index| self.constant_pool.class_name(index))
            .transpose()
    }

    pub fn interface_names(&self) -> Result<Vec<String>> {
        self.interfaces
            .iter()
            .map(|index| self.constant_pool.class_name(*index))
            .collect()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.has(ClassAccessFlags::INTERFACE)
    }

    pub fn print(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let pool = &self.constant_pool;

        write!(out, "class {}", pool.describe(self.this_class))?;
        if let Some(super_class) = self.super_class {
            write!(out, " extends {}", pool.describe(super_class))?;
        }
        if !self.interfaces.is_empty() {
            let names: Vec<_> = self.interfaces.iter().map(|i| pool.describe(*i)).collect();
            write!(out, " implements {}", names.join(", "))?;
        }
        writeln!(out)?;

        writeln!(
            out,
            "  version {}.{}, flags {:?}",
            self.meta_data.major_version, self.meta_data.minor_version, self.access_flags
        )?;
        pool.print(out, 2)?;

        writeln!(out, "  Fields ({}):", self.fields.len())?;
        for field in self.fields.iter() {
            writeln!(
                out,
                "    {}:{} {:?}",
                pool.describe(field.name),
                pool.describe(field.descriptor),
                field.flags
            )?;
            field.attributes.print(out, 6, pool)?;
        }

        writeln!(out, "  Methods ({}):", self.methods.len())?;
        for method in self.methods.iter() {
            writeln!(
                out,
                "    {}{} {:?}",
                pool.describe(method.name),
                pool.describe(method.descriptor),
                method.flags
            )?;
            method.attributes.print(out, 6, pool)?;
        }

        self.attributes.print(out, 2, pool)
    }

    /// The human readable listing produced by `print`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.print(&mut out);
        out
    }
}

impl StructuralEq for Field {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare("flags", &self.flags, &other.flags)?;
        compare("name", &self.name, &other.name)?;
        compare("descriptor", &self.descriptor, &other.descriptor)?;
        self.attributes.structural_diff(&other.attributes)
    }
}

impl StructuralEq for Method {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare("flags", &self.flags, &other.flags)?;
        compare("name", &self.name, &other.name)?;
        compare("descriptor", &self.descriptor, &other.descriptor)?;
        self.attributes.structural_diff(&other.attributes)
    }
}

impl StructuralEq for ClassFile {
    fn structural_diff(&self, other: &Self) -> Result<(), Mismatch> {
        compare("meta_data", &self.meta_data, &other.meta_data)?;
        self.constant_pool
            .structural_diff(&other.constant_pool)
            .map_err(|m| m.within("constant_pool"))?;
        compare("access_flags", &self.access_flags, &other.access_flags)?;
        compare("this_class", &self.this_class, &other.this_class)?;
        compare("super_class", &self.super_class, &other.super_class)?;
        compare("interfaces", &self.interfaces.values, &other.interfaces.values)?;
        compare_seq("fields", &self.fields.values, &other.fields.values)?;
        compare_seq("methods", &self.methods.values, &other.methods.values)?;
        self.attributes.structural_diff(&other.attributes)
    }
}
