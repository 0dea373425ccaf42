pub mod controller;
pub mod plan;
pub mod redirect;

use classfile::{ClassFile, Result};
use tracing::debug;

pub use crate::controller::ClassEnhancer;
pub use crate::plan::{AddedField, EnhancementPlan, FieldAccessors, InheritedField, ManagedField, PersistenceModel};

/// Enhance a compiled class according to `plan`, returning the new class file.
/// Nothing is returned unless every step of the plan succeeded.
pub fn enhance(bytes: &[u8], plan: &EnhancementPlan) -> Result<Vec<u8>> {
    let mut enhancer = ClassEnhancer::read(bytes)?;
    enhancer.apply(plan)?;
    Ok(enhancer.write())
}

/// Enhance a compiled class with whatever plan `model` has for it. Classes the
/// model does not know are passed through untouched.
pub fn enhance_with(bytes: &[u8], model: &dyn PersistenceModel) -> Result<Vec<u8>> {
    let class = ClassFile::read(bytes)?;
    let name = class.name()?;

    let Some(plan) = model.plan_for(&name) else {
        debug!("{} is not persistence capable", name);
        return Ok(bytes.to_vec());
    };

    let mut enhancer = ClassEnhancer::new(class);
    enhancer.apply(&plan)?;
    Ok(enhancer.write())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use classfile::flags::{FieldAccessFlags, MethodAccessFlags};
    use classfile::{ClassFile, ClassFileError, Result};
    use support::descriptor::FieldType;

    use super::{enhance, enhance_with, ClassEnhancer, EnhancementPlan, FieldAccessors};

    fn point() -> Result<Vec<u8>> {
        let int = FieldType::parse("I").unwrap();
        let mut enhancer = ClassEnhancer::new(ClassFile::new(52, "Point", Some("java/lang/Object"))?);
        enhancer.add_field("x", "I", FieldAccessFlags::PUBLIC)?;
        enhancer.add_method("x", "()I", MethodAccessFlags::PUBLIC, |code| {
            code.load_this().get_field("Point", "x", &int)?;
            code.return_value(&int);
            Ok(())
        })?;
        Ok(enhancer.write())
    }

    #[test]
    fn it_enhances_from_a_plan() -> Result<()> {
        let bytes = point()?;
        let plan = EnhancementPlan::new().managing("x", FieldAccessors::conventional("x"));

        let enhanced = ClassFile::read(&enhance(&bytes, &plan)?)?;
        let pool = &enhanced.constant_pool;
        assert!(enhanced.methods.locate(pool, "x$get", "(LPoint;)I").is_some());
        assert!(enhanced.methods.locate(pool, "x$set", "(LPoint;I)V").is_some());
        Ok(())
    }

    #[test]
    fn it_passes_unknown_classes_through() -> Result<()> {
        let bytes = point()?;
        let model: HashMap<String, EnhancementPlan> = HashMap::new();
        assert_eq!(enhance_with(&bytes, &model)?, bytes);
        Ok(())
    }

    #[test]
    fn it_asks_the_model_for_a_plan() -> Result<()> {
        let bytes = point()?;
        let mut model = HashMap::new();
        model.insert(
            "Point".to_string(),
            EnhancementPlan::new().with_interface("app/Persistent"),
        );

        let enhanced = ClassFile::read(&enhance_with(&bytes, &model)?)?;
        assert_eq!(enhanced.interface_names()?, vec!["app/Persistent".to_string()]);
        Ok(())
    }

    #[test]
    fn it_fails_without_partial_output() {
        let plan = EnhancementPlan::new().managing("missing", FieldAccessors::conventional("missing"));
        let result = point().and_then(|bytes| enhance(&bytes, &plan));
        assert!(matches!(result, Err(ClassFileError::FieldNotFound(_))));
    }
}
