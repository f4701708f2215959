use crate::jvm::{
    BaseType, BinaryName, FieldType, MethodDescriptor, RenderDescriptor, UnqualifiedName,
};
use std::fmt;
use std::fmt::Debug;

/// Reference to a field, as it appears in `getfield`/`putfield`/`getstatic`/`putstatic`
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Reference to a method, as it appears in the `invoke*` instructions
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,

    /// Is the method declared on an interface?
    pub is_interface: bool,
}

impl MethodRef {
    /// Static factory on a primitive wrapper class, like `java/lang/Integer.valueOf(I)`
    pub fn boxing(base_type: BaseType) -> MethodRef {
        let class = base_type.boxed_class();
        MethodRef {
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::Base(base_type)],
                return_type: Some(FieldType::object(class.clone())),
            },
            class,
            name: UnqualifiedName::VALUEOF,
            is_interface: false,
        }
    }

    /// Instance accessor on a primitive wrapper class, like `java/lang/Integer.intValue()`
    pub fn unboxing(base_type: BaseType) -> MethodRef {
        MethodRef {
            class: base_type.boxed_class(),
            name: base_type.unboxing_method(),
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::Base(base_type)),
            },
            is_interface: false,
        }
    }
}

impl Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.as_ref(),
            self.name.as_ref(),
            self.descriptor.render(),
        ))
    }
}

impl Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.as_ref(),
            self.name.as_ref(),
            self.descriptor.render(),
        ))
    }
}
