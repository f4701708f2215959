use crate::jvm::class_graph::ClassGraph;
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    /// Unusable local variable slot (never on the stack)
    Top,

    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(RefType),

    /// State of an object after `new` has been called by `<init>` has not been called
    Uninitialized(UninitializedRefType),

    /// Pushed by `jsr`, consumed by `astore` and then `ret`
    ReturnAddress,
}

/// Object between its `new` and its `<init>` call
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct UninitializedRefType {
    /// Once the type is initialized, what will it be?
    pub class: BinaryName,

    /// Position of the `new` instruction in the instruction buffer
    pub new_index: usize,
}

impl VerificationType {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long
            | VerificationType::ReturnAddress => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    /// Check if one verification type is assignable to another
    ///
    /// Like the JVM verifier, any reference is considered assignable to an interface type.
    pub fn is_assignable(class_graph: &ClassGraph, sub_type: &Self, super_type: &Self) -> bool {
        match (sub_type, super_type) {
            (_, Self::Top) => true,
            (Self::Null, Self::Object(_)) => true,
            (Self::Object(t1), Self::Object(t2)) => {
                class_graph.is_java_assignable(t1, t2)
                    || matches!(t2, RefType::Object(cls) if class_graph.is_interface(cls))
            }
            (t1, t2) => t1 == t2,
        }
    }

    /// Most specific type to which both types are assignable, if there is one besides `Top`
    pub fn merge(class_graph: &ClassGraph, type1: &Self, type2: &Self) -> Option<Self> {
        match (type1, type2) {
            (t1, t2) if t1 == t2 => Some(t1.clone()),
            (Self::Null, Self::Object(t)) | (Self::Object(t), Self::Null) => {
                Some(Self::Object(t.clone()))
            }
            (Self::Object(t1), Self::Object(t2)) => {
                Some(Self::Object(class_graph.common_super_type(t1, t2)))
            }
            _ => None,
        }
    }

    /// Resolve the type into the form written in a stack map table
    ///
    /// `byte_offsets` are the offsets of the instruction buffer entries.
    pub fn into_serializable(&self, byte_offsets: &[usize]) -> StackMapType {
        match self {
            VerificationType::Top | VerificationType::ReturnAddress => StackMapType::Top,
            VerificationType::Integer => StackMapType::Integer,
            VerificationType::Float => StackMapType::Float,
            VerificationType::Long => StackMapType::Long,
            VerificationType::Double => StackMapType::Double,
            VerificationType::Null => StackMapType::Null,
            VerificationType::UninitializedThis => StackMapType::UninitializedThis,
            VerificationType::Object(ref_type) => StackMapType::Object(ref_type.clone()),
            VerificationType::Uninitialized(uninitialized) => {
                StackMapType::Uninitialized(byte_offsets[uninitialized.new_index] as u16)
            }
        }
    }
}

impl From<FieldType> for VerificationType {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl Width for VerificationType {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

/// Verification type as it is written in a `StackMapTable`
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum StackMapType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(RefType),

    /// Byte offset of the `new` instruction which created the object
    Uninitialized(u16),
}

impl Width for StackMapType {
    fn width(&self) -> usize {
        match self {
            StackMapType::Double | StackMapType::Long => 2,
            _ => 1,
        }
    }
}
