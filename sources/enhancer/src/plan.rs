use std::collections::HashMap;

use classfile::flags::FieldAccessFlags;
use support::types::FieldKey;

/// The static methods that stand in for direct accesses to one field.
/// A missing accessor leaves that direction of access untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAccessors {
    pub getter: Option<String>,
    pub setter: Option<String>,
}

impl FieldAccessors {
    pub fn new(getter: impl Into<String>, setter: impl Into<String>) -> Self {
        Self {
            getter: Some(getter.into()),
            setter: Some(setter.into()),
        }
    }

    /// `x$get` and `x$set` for a field named `x`.
    pub fn conventional(field: &str) -> Self {
        Self::new(format!("{field}$get"), format!("{field}$set"))
    }

    pub fn read_only(getter: impl Into<String>) -> Self {
        Self {
            getter: Some(getter.into()),
            setter: None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.getter.iter().chain(self.setter.iter()).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedField {
    pub name: String,
    pub descriptor: String,
    pub flags: FieldAccessFlags,
}

/// A field whose accesses are routed through accessor methods.
///
/// Without a descriptor the first field with a matching name is managed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedField {
    pub name: String,
    pub descriptor: Option<String>,
    pub accessors: FieldAccessors,
}

impl ManagedField {
    pub fn new(name: impl Into<String>, accessors: FieldAccessors) -> Self {
        Self {
            name: name.into(),
            descriptor: None,
            accessors,
        }
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = Some(descriptor.into());
        self
    }

    pub fn descriptor(&self) -> Option<&str> {
        self.descriptor.as_deref()
    }
}

/// A field declared by a superclass. Its accessors are expected to live on `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritedField {
    pub owner: String,
    pub field: FieldKey,
    pub is_static: bool,
}

/// Everything to do to one class, in the order it is applied: interfaces, added
/// fields, accessors for the managed fields, then redirection of their accesses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnhancementPlan {
    pub interfaces: Vec<String>,
    pub added_fields: Vec<AddedField>,
    pub managed_fields: Vec<ManagedField>,
    pub inherited_fields: Vec<InheritedField>,
}

impl EnhancementPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, descriptor: impl Into<String>, flags: FieldAccessFlags) -> Self {
        self.added_fields.push(AddedField {
            name: name.into(),
            descriptor: descriptor.into(),
            flags,
        });
        self
    }

    pub fn managing(self, name: impl Into<String>, accessors: FieldAccessors) -> Self {
        self.managing_field(ManagedField::new(name, accessors))
    }

    pub fn managing_field(mut self, field: ManagedField) -> Self {
        self.managed_fields.push(field);
        self
    }

    pub fn inheriting(mut self, field: InheritedField) -> Self {
        self.inherited_fields.push(field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty() && self.added_fields.is_empty() && self.managed_fields.is_empty()
    }

    /// True if `method` is one of the accessors this plan routes fields through.
    pub fn is_accessor(&self, method: &str) -> bool {
        self.managed_fields
            .iter()
            .any(|field| field.accessors.names().any(|name| name == method))
    }
}

/// The runtime type model's view of persistence: which classes are enhanced, and how.
pub trait PersistenceModel {
    /// The plan for `class_name`, or `None` if the class is not persistence capable.
    fn plan_for(&self, class_name: &str) -> Option<EnhancementPlan>;

    fn managed_fields(&self, class_name: &str) -> Vec<String> {
        self.plan_for(class_name)
            .map(|plan| plan.managed_fields.into_iter().map(|f| f.name).collect())
            .unwrap_or_default()
    }
}

impl PersistenceModel for HashMap<String, EnhancementPlan> {
    fn plan_for(&self, class_name: &str) -> Option<EnhancementPlan> {
        self.get(class_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use classfile::flags::FieldAccessFlags;

    use super::{EnhancementPlan, FieldAccessors, PersistenceModel};

    #[test]
    fn it_knows_its_accessors() {
        let plan = EnhancementPlan::new()
            .with_field("x$rc", "I", FieldAccessFlags::PRIVATE)
            .managing("x", FieldAccessors::conventional("x"))
            .managing("name", FieldAccessors::read_only("readName"));

        assert!(plan.is_accessor("x$get"));
        assert!(plan.is_accessor("x$set"));
        assert!(plan.is_accessor("readName"));
        assert!(!plan.is_accessor("name$set"));
        assert!(!plan.is_empty());
        assert!(EnhancementPlan::new().is_empty());
    }

    #[test]
    fn it_answers_from_a_map() {
        let mut model = HashMap::new();
        model.insert(
            "app/Person".to_string(),
            EnhancementPlan::new().managing("age", FieldAccessors::conventional("age")),
        );

        assert_eq!(model.managed_fields("app/Person"), vec!["age".to_string()]);
        assert!(model.plan_for("app/Other").is_none());
        assert!(model.managed_fields("app/Other").is_empty());
    }
}
