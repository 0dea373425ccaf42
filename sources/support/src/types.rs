use std::fmt;

use anyhow::Result;

use crate::descriptor::{FieldType, MethodType};

/// A class member named by its simple name and parsed descriptor.
///
/// Two members of one class may share a name as long as their descriptors
/// differ, so the pair is what identifies them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey<T> {
    name: String,
    ty: T,
}

pub type MethodKey = MemberKey<MethodType>;
pub type FieldKey = MemberKey<FieldType>;

impl<T> MemberKey<T> {
    pub fn new(name: impl Into<String>, ty: T) -> Self {
        Self { name: name.into(), ty }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &T {
        &self.ty
    }
}

impl MethodKey {
    pub fn parse(name: &str, descriptor: &str) -> Result<Self> {
        Ok(Self::new(name, MethodType::parse(descriptor)?))
    }

    /// `<init>` and `<clinit>`, which the verifier treats specially.
    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }
}

impl FieldKey {
    pub fn parse(name: &str, descriptor: &str) -> Result<Self> {
        Ok(Self::new(name, FieldType::parse(descriptor)?))
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.ty)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}
