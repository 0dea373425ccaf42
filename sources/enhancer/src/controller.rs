use classfile::attributes::{Attribute, AttributeInfo};
use classfile::classfile::{Field, Method};
use classfile::code::builder::CodeBuilder;
use classfile::code::opcodes::INVOKESTATIC;
use classfile::code::relocate::CodeEdit;
use classfile::flags::{FieldAccessFlags, MethodAccessFlags};
use classfile::pool::ConstantPool;
use classfile::{ClassFile, ClassFileError, Result};
use support::descriptor::{FieldType, MethodType};
use support::types::MethodKey;
use tracing::{debug, info};

use crate::plan::{EnhancementPlan, InheritedField, ManagedField};
use crate::redirect::{find_sites, Access, ResolvedField};

fn field_type(descriptor: &str) -> Result<FieldType> {
    FieldType::parse(descriptor).map_err(|e| ClassFileError::InvalidDescriptor {
        descriptor: descriptor.to_string(),
        reason: e.to_string(),
    })
}

fn method_type(descriptor: &str) -> Result<MethodType> {
    MethodType::parse(descriptor).map_err(|e| ClassFileError::InvalidDescriptor {
        descriptor: descriptor.to_string(),
        reason: e.to_string(),
    })
}

/// Applies persistence mutations to one class.
///
/// Every operation either succeeds completely or leaves the class as it was,
/// constant pool included.
#[derive(Debug, Clone)]
pub struct ClassEnhancer {
    class: ClassFile,
    inherited: Vec<InheritedField>,
}

impl ClassEnhancer {
    pub fn new(class: ClassFile) -> Self {
        Self {
            class,
            inherited: vec![],
        }
    }

    pub fn read(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(ClassFile::read(bytes)?))
    }

    /// Fields declared by superclasses that redirection may target.
    pub fn with_inherited_fields(mut self, fields: impl IntoIterator<Item = InheritedField>) -> Self {
        self.inherited.extend(fields);
        self
    }

    pub fn class(&self) -> &ClassFile {
        &self.class
    }

    pub fn into_class(self) -> ClassFile {
        self.class
    }

    pub fn write(&self) -> Vec<u8> {
        self.class.write()
    }

    /// Run `mutation`, restoring the constant pool if it fails. Mutations only touch
    /// the rest of the class once nothing else can go wrong.
    fn atomically<T>(&mut self, mutation: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.class.constant_pool.snapshot();
        let result = mutation(self);
        if result.is_err() {
            self.class.constant_pool.rollback(snapshot);
        }
        result
    }

    fn has_method(&self, name: &str, descriptor: &str) -> bool {
        self.class
            .methods
            .locate(&self.class.constant_pool, name, descriptor)
            .is_some()
    }

    fn ensure_new_method(&self, name: &str, descriptor: &str) -> Result<()> {
        if self.has_method(name, descriptor) {
            return Err(ClassFileError::DuplicateMember {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            });
        }
        Ok(())
    }

    /// Implement `name`. Returns false if the class already implements it.
    pub fn add_interface(&mut self, name: &str) -> Result<bool> {
        if self.class.interface_names()?.iter().any(|i| i == name) {
            debug!("{} already implements {}", self.class.name()?, name);
            return Ok(false);
        }

        let index = self.class.constant_pool.intern_class(name)?;
        self.class.interfaces.push(index);
        info!("added interface {}", name);
        Ok(true)
    }

    pub fn add_field(&mut self, name: &str, descriptor: &str, flags: FieldAccessFlags) -> Result<()> {
        field_type(descriptor)?;

        let pool = &self.class.constant_pool;
        if self.class.fields.locate(pool, name, Some(descriptor)).is_some() {
            return Err(ClassFileError::DuplicateMember {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            });
        }

        self.atomically(|this| {
            let pool = &mut this.class.constant_pool;
            let field = Field::new(flags, pool.intern_utf8(name)?, pool.intern_utf8(descriptor)?);
            this.class.fields.push(field);
            Ok(())
        })?;

        info!("added field {}:{} {:?}", name, descriptor, flags);
        Ok(())
    }

    /// Add a method whose body is emitted by `body`. The builder starts with `this`
    /// (for instance methods) and the parameters in their local slots.
    pub fn add_method<F>(&mut self, name: &str, descriptor: &str, flags: MethodAccessFlags, body: F) -> Result<()>
    where
        F: FnOnce(&mut CodeBuilder) -> Result<()>,
    {
        let ty = method_type(descriptor)?;
        self.ensure_new_method(name, descriptor)?;

        self.atomically(|this| {
            let method = build_method(&mut this.class.constant_pool, name, &ty, flags, body)?;
            this.class.methods.push(method);
            Ok(())
        })?;

        info!("added method {}{} {:?}", name, descriptor, flags);
        Ok(())
    }

    /// Add a method with no body. `ABSTRACT` is added to `flags`.
    pub fn add_abstract_method(&mut self, name: &str, descriptor: &str, flags: MethodAccessFlags) -> Result<()> {
        method_type(descriptor)?;
        self.ensure_new_method(name, descriptor)?;

        let flags = flags | MethodAccessFlags::ABSTRACT;
        self.atomically(|this| {
            let pool = &mut this.class.constant_pool;
            let method = Method::new(flags, pool.intern_utf8(name)?, pool.intern_utf8(descriptor)?);
            this.class.methods.push(method);
            Ok(())
        })?;

        info!("added abstract method {}{}", name, descriptor);
        Ok(())
    }

    /// Resolve `name` against the declared fields first, then the inherited ones.
    /// A `descriptor` narrows the match to fields of that type.
    pub fn resolve_field(&self, name: &str, descriptor: Option<&str>) -> Result<ResolvedField> {
        let pool = &self.class.constant_pool;
        let not_found = || match descriptor {
            Some(descriptor) => ClassFileError::FieldNotFound(format!("{name}:{descriptor}")),
            None => ClassFileError::FieldNotFound(name.to_string()),
        };

        if let Some(field) = self.class.fields.locate(pool, name, descriptor) {
            return Ok(ResolvedField {
                owner: self.class.name()?,
                name: name.to_string(),
                ty: field_type(&pool.text(field.descriptor)?)?,
                is_static: field.is_static(),
                owner_is_interface: self.class.is_interface(),
            });
        }

        self.inherited
            .iter()
            .find(|inherited| {
                inherited.field.name() == name
                    && descriptor.map_or(true, |d| inherited.field.ty().to_string() == d)
            })
            .map(|inherited| ResolvedField {
                owner: inherited.owner.clone(),
                name: name.to_string(),
                ty: inherited.field.ty().clone(),
                is_static: inherited.is_static,
                owner_is_interface: false,
            })
            .ok_or_else(not_found)
    }

    /// Generate static accessors for a field declared by this class. Each accessor
    /// gets the field's visibility and is `static final synthetic`.
    pub fn add_accessors(&mut self, managed: &ManagedField) -> Result<()> {
        let accessors = &managed.accessors;
        let pool = &self.class.constant_pool;
        let field = self
            .class
            .fields
            .locate(pool, &managed.name, managed.descriptor())
            .ok_or_else(|| ClassFileError::FieldNotFound(managed.name.clone()))?;

        let visibility = MethodAccessFlags::from_bits_truncate(
            (field.flags & (FieldAccessFlags::PUBLIC | FieldAccessFlags::PRIVATE | FieldAccessFlags::PROTECTED)).bits(),
        );
        let mut flags = visibility | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC;
        // Interface methods may not be final
        if !self.class.is_interface() {
            flags |= MethodAccessFlags::FINAL;
        }

        let resolved = self.resolve_field(&managed.name, managed.descriptor())?;
        let getter_type = resolved.getter_type();
        let setter_type = resolved.setter_type();

        if let Some(getter) = &accessors.getter {
            self.ensure_new_method(getter, &getter_type.to_string())?;
        }
        if let Some(setter) = &accessors.setter {
            self.ensure_new_method(setter, &setter_type.to_string())?;
        }

        self.atomically(|this| {
            let pool = &mut this.class.constant_pool;
            let mut methods = vec![];

            if let Some(getter) = &accessors.getter {
                methods.push(build_method(pool, getter, &getter_type, flags, |code| {
                    if resolved.is_static {
                        code.get_static(&resolved.owner, &resolved.name, &resolved.ty)?;
                    } else {
                        code.load(&getter_type.parameters[0], 0);
                        code.get_field(&resolved.owner, &resolved.name, &resolved.ty)?;
                    }
                    code.return_value(&resolved.ty);
                    Ok(())
                })?);
            }

            if let Some(setter) = &accessors.setter {
                methods.push(build_method(pool, setter, &setter_type, flags, |code| {
                    code.load_parameters(true, &setter_type);
                    if resolved.is_static {
                        code.put_static(&resolved.owner, &resolved.name, &resolved.ty)?;
                    } else {
                        code.put_field(&resolved.owner, &resolved.name, &resolved.ty)?;
                    }
                    code.return_value(&setter_type.return_type);
                    Ok(())
                })?);
            }

            for method in methods {
                this.class.methods.push(method);
            }
            Ok(())
        })?;

        info!("added accessors for {} ({:?})", managed.name, accessors);
        Ok(())
    }

    /// Route every direct access to the managed field inside one method through
    /// its static accessors. Returns how many instructions were rewritten.
    pub fn redirect_field_access(
        &mut self,
        method_name: &str,
        method_descriptor: &str,
        managed: &ManagedField,
    ) -> Result<usize> {
        let accessors = &managed.accessors;
        let not_found = || ClassFileError::MethodNotFound {
            name: method_name.to_string(),
            descriptor: method_descriptor.to_string(),
        };

        let field = self.resolve_field(&managed.name, managed.descriptor())?;
        let class_name = self.class.name()?;
        let pool = &self.class.constant_pool;

        let code = self
            .class
            .methods
            .locate(pool, method_name, method_descriptor)
            .and_then(Method::code)
            .ok_or_else(not_found)?;

        let sites: Vec<_> = find_sites(&code.instructions()?, pool, &field, &class_name)?
            .into_iter()
            .filter_map(|(offset, access)| {
                let (name, ty) = match access {
                    Access::Read => (accessors.getter.as_ref()?, field.getter_type()),
                    Access::Write => (accessors.setter.as_ref()?, field.setter_type()),
                };
                Some((offset, name.clone(), ty))
            })
            .collect();

        if sites.is_empty() {
            return Ok(0);
        }

        let count = self.atomically(|this| {
            let pool = &mut this.class.constant_pool;
            let mut edits = Vec::with_capacity(sites.len());

            for (offset, name, ty) in &sites {
                let descriptor = ty.to_string();
                let index = if field.owner_is_interface {
                    pool.intern_interface_method_ref(&field.owner, name, &descriptor)?
                } else {
                    pool.intern_method_ref(&field.owner, name, &descriptor)?
                };

                let [high, low] = index.to_be_bytes();
                edits.push(CodeEdit::Replace {
                    at: *offset,
                    code: vec![INVOKESTATIC, high, low],
                });
            }

            let code = this
                .class
                .methods
                .locate_mut(&this.class.constant_pool, method_name, method_descriptor)
                .and_then(Method::code_mut)
                .ok_or_else(not_found)?;
            code.apply_edits(&edits)?;
            Ok(edits.len())
        })?;

        info!(
            "redirected {} accesses of {} in {}{}",
            count, managed.name, method_name, method_descriptor
        );
        Ok(count)
    }

    /// Apply a whole plan. Constructors, static initialisers and the accessors
    /// themselves keep their direct field accesses. Returns the number of
    /// rewritten access sites.
    ///
    /// If any step fails the class is restored to its state before the call.
    pub fn apply(&mut self, plan: &EnhancementPlan) -> Result<usize> {
        let class = self.class.clone();
        let inherited = self.inherited.len();

        let result = self.apply_steps(plan);
        if result.is_err() {
            self.class = class;
            self.inherited.truncate(inherited);
        }
        result
    }

    fn apply_steps(&mut self, plan: &EnhancementPlan) -> Result<usize> {
        self.inherited.extend(plan.inherited_fields.iter().cloned());

        for interface in &plan.interfaces {
            self.add_interface(interface)?;
        }

        for field in &plan.added_fields {
            self.add_field(&field.name, &field.descriptor, field.flags)?;
        }

        for managed in &plan.managed_fields {
            let declared = self
                .class
                .fields
                .locate(&self.class.constant_pool, &managed.name, managed.descriptor())
                .is_some();
            if declared {
                self.add_accessors(managed)?;
            }
        }

        let pool = &self.class.constant_pool;
        let targets = self
            .class
            .methods
            .iter()
            .filter(|method| method.code().is_some())
            .map(|method| {
                MethodKey::parse(&pool.text(method.name)?, &pool.text(method.descriptor)?).map_err(|e| {
                    ClassFileError::InvalidDescriptor {
                        descriptor: pool.describe(method.descriptor),
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut total = 0;
        for target in targets {
            if target.is_initializer() || plan.is_accessor(target.name()) {
                continue;
            }

            let descriptor = target.ty().to_string();
            for managed in &plan.managed_fields {
                total += self.redirect_field_access(target.name(), &descriptor, managed)?;
            }
        }

        info!("enhanced {} ({} access sites rewritten)", self.class.name()?, total);
        Ok(total)
    }
}

fn build_method<F>(pool: &mut ConstantPool, name: &str, ty: &MethodType, flags: MethodAccessFlags, body: F) -> Result<Method>
where
    F: FnOnce(&mut CodeBuilder) -> Result<()>,
{
    let is_static = flags.contains(MethodAccessFlags::STATIC);

    let mut builder = CodeBuilder::for_method(pool, is_static, ty);
    body(&mut builder)?;
    let code = builder.build();

    let mut method = Method::new(flags, pool.intern_utf8(name)?, pool.intern_utf8(&ty.to_string())?);
    method.attributes.push(Attribute::new(pool, AttributeInfo::Code(code))?);
    Ok(method)
}
