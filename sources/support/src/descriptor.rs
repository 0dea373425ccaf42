use std::{fmt, iter::Peekable, str::Chars};

use anyhow::{anyhow, Result};
use enum_as_inner::EnumAsInner;

/// <BaseType> ::= 'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z'
#[derive(EnumAsInner, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum BaseType {
    Boolean, // Z
    Char,    // C
    Float,   // F
    Double,  // D
    Byte,    // B
    Short,   // S
    Int,     // I
    Long,    // J
    Void,    // V
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            BaseType::Boolean => 'Z',
            BaseType::Char => 'C',
            BaseType::Float => 'F',
            BaseType::Double => 'D',
            BaseType::Byte => 'B',
            BaseType::Short => 'S',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Void => 'V',
        };
        write!(f, "{c}")
    }
}

/// <ObjectType> ::= 'L' <ClassName> ';'
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ObjectType {
    pub class_name: String,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{};", self.class_name)
    }
}

/// <ArrayType> ::= '[' <FieldType>
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ArrayType {
    pub field_type: Box<FieldType>,
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.field_type)
    }
}

#[derive(EnumAsInner, Debug, PartialEq, Eq, Hash, Clone)]
pub enum FieldType {
    Base(BaseType),
    Object(ObjectType),
    Array(ArrayType),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => base.fmt(f),
            FieldType::Object(object) => object.fmt(f),
            FieldType::Array(array) => array.fmt(f),
        }
    }
}

impl FieldType {
    pub fn object(class_name: impl Into<String>) -> Self {
        FieldType::Object(ObjectType {
            class_name: class_name.into(),
        })
    }

    /// Number of local variable / operand stack slots a value of this type takes.
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Base(BaseType::Void) => 0,
            FieldType::Base(BaseType::Long) | FieldType::Base(BaseType::Double) => 2,
            _ => 1,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, FieldType::Base(BaseType::Void))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    fn parse_from_iterator(chars: &mut Peekable<Chars>) -> Result<Self> {
        let first = chars.next().ok_or(anyhow!("no more chars"))?;

        Ok(match first {
            'B' => FieldType::Base(BaseType::Byte),
            'C' => FieldType::Base(BaseType::Char),
            'D' => FieldType::Base(BaseType::Double),
            'F' => FieldType::Base(BaseType::Float),
            'I' => FieldType::Base(BaseType::Int),
            'J' => FieldType::Base(BaseType::Long),
            'S' => FieldType::Base(BaseType::Short),
            'Z' => FieldType::Base(BaseType::Boolean),
            'V' => FieldType::Base(BaseType::Void),
            '[' => {
                let field_type = FieldType::parse_from_iterator(chars)?;
                if field_type.is_void() {
                    return Err(anyhow!("array of void"));
                }

                FieldType::Array(ArrayType {
                    field_type: Box::new(field_type),
                })
            }
            'L' => {
                let mut class_name = String::new();
                loop {
                    match chars.next() {
                        Some(';') => break,
                        Some(c) => class_name.push(c),
                        None => return Err(anyhow!("unterminated class name {class_name}")),
                    }
                }

                if class_name.is_empty() {
                    return Err(anyhow!("empty class name"));
                }

                FieldType::Object(ObjectType { class_name })
            }
            _ => return Err(anyhow!("unknown type {first}")),
        })
    }

    pub fn parse(str: &str) -> Result<Self> {
        let mut chars = str.chars().peekable();
        let ty = FieldType::parse_from_iterator(&mut chars)?;

        if ty.is_void() {
            return Err(anyhow!("void is not a field type"));
        }

        if chars.next().is_some() {
            return Err(anyhow!("trailing characters in field descriptor {str}"));
        }

        Ok(ty)
    }
}

/// <MethodType> ::= '(' { <FieldType> } ')' <FieldType>
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct MethodType {
    pub parameters: Vec<FieldType>,
    pub return_type: FieldType,
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for parameter in &self.parameters {
            parameter.fmt(f)?;
        }
        write!(f, "){}", self.return_type)
    }
}

impl MethodType {
    pub fn new(parameters: Vec<FieldType>, return_type: FieldType) -> Self {
        Self {
            parameters,
            return_type,
        }
    }

    /// Slots taken by the parameters, excluding any receiver.
    pub fn parameter_slots(&self) -> u16 {
        self.parameters.iter().map(FieldType::slots).sum()
    }

    pub fn parse(str: &str) -> Result<Self> {
        let mut chars = str.chars().peekable();
        if chars.next() != Some('(') {
            return Err(anyhow!("descriptor did not start with ("));
        }

        let mut parameters = Vec::new();

        while chars.peek() != Some(&')') {
            if chars.peek().is_none() {
                return Err(anyhow!("descriptor {str} has no closing )"));
            }
            let parameter = FieldType::parse_from_iterator(&mut chars)?;
            if parameter.is_void() {
                return Err(anyhow!("void parameter in {str}"));
            }
            parameters.push(parameter);
        }

        // Skip )
        chars.next();

        let return_type = FieldType::parse_from_iterator(&mut chars)?;

        if chars.next().is_some() {
            return Err(anyhow!("trailing characters in method descriptor {str}"));
        }

        Ok(MethodType {
            parameters,
            return_type,
        })
    }
}
