use super::{BinaryName, FieldAccessFlags, FieldType, RenderDescriptor, UnqualifiedName};
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod assignable;
mod java_classes;

pub use java_classes::*;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        ClassGraphArenas::new()
    }
}

/// Tracks the relationships between classes/interfaces and the fields on those classes
///
/// Weaving only ever reads from the graph: it answers type-assignability queries for bindings and
/// common super type queries when frames merge at a join point. Populating it (with the classes
/// the instrumented method and its advice mention) is up to the caller. A class missing from the
/// graph is only known to be a subtype of `java/lang/Object`.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<BinaryName, &'g ClassData<'g>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            classes: FrozenMap::new(),
        }
    }

    pub fn lookup_class(&self, name: &BinaryName) -> Option<&ClassData<'g>> {
        self.classes.get(name)
    }

    /// Add a new class to the class graph
    pub fn add_class(&self, data: ClassData<'g>) -> &'g ClassData<'g> {
        let data: &'g ClassData<'g> = self.arenas.class_arena.alloc(data);
        self.classes.insert(data.name.clone(), data);
        data
    }

    /// Add a field to the class graph and to its class
    pub fn add_field(&self, field: FieldData<'g>) -> &'g FieldData<'g> {
        let data: &'g FieldData<'g> = self.arenas.field_arena.alloc(field);
        data.class.fields.push(data);
        data
    }

    /// Find a field by name, searching the class and then its superclasses
    pub fn lookup_field(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
    ) -> Option<&FieldData<'g>> {
        let mut next_class: Option<&ClassData<'g>> = self.lookup_class(class);
        while let Some(class_data) = next_class {
            for field in &class_data.fields {
                if &field.name == name {
                    return Some(field);
                }
            }
            next_class = class_data.superclass;
        }
        None
    }

    /// Is the class a (known) interface?
    pub fn is_interface(&self, name: &BinaryName) -> bool {
        self.lookup_class(name)
            .map(|class| class.is_interface)
            .unwrap_or(false)
    }

    /// Is this object type throwable?
    pub fn is_throwable(&self, name: &BinaryName) -> bool {
        let mut next_class: Option<&ClassData<'g>> = self.lookup_class(name);
        while let Some(class) = next_class {
            if class.name == BinaryName::THROWABLE {
                return true;
            }
            next_class = class.superclass;
        }

        false
    }

    /// Add standard types to the class graph
    pub fn insert_java_library_types(&self) -> JavaClasses<'g> {
        JavaClasses::add_to_graph(self)
    }
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<&'g ClassData<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: FrozenVec<&'g ClassData<'g>>,

    /// Is this an interface?
    pub is_interface: bool,

    /// Fields
    pub fields: FrozenVec<&'g FieldData<'g>>,
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: &'g ClassData<'g>,
        is_interface: bool,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces: FrozenVec::new(),
            is_interface,
            fields: FrozenVec::new(),
        }
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_ref())
    }
}

pub struct FieldData<'g> {
    /// Class
    ///
    /// Note: this is a pointer back to the class (so don't derive `Debug`)
    pub class: &'g ClassData<'g>,

    /// Name of the field
    pub name: UnqualifiedName,

    /// Type of the field
    pub descriptor: FieldType,

    pub access_flags: FieldAccessFlags,
}

impl<'g> FieldData<'g> {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_ref(),
            self.name.as_ref(),
            self.descriptor.render(),
        ))
    }
}
