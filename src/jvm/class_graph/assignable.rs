use super::{ClassData, ClassGraph};
use crate::jvm::{ArrayType, BinaryName, RefType};
use std::cmp::Ordering;
use std::collections::HashSet;

impl<'g> ClassGraph<'g> {
    /// Query if one type is assignable to another
    ///
    /// This matches the semantics of the prolog predicate `isJavaAssignable(sub_type, super_type)`
    /// in the JVM verifier specification.
    pub fn is_java_assignable(&self, sub_type: &RefType, super_type: &RefType) -> bool {
        match (sub_type, super_type) {
            // Special superclass and interfaces of all arrays
            (
                RefType::PrimitiveArray(_) | RefType::ObjectArray(_),
                RefType::Object(object_type),
            ) => is_array_type_assignable(object_type),

            // Primitive arrays must match in dimension and type
            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            // Higher dimensional primitive arrays can be subtypes of object arrays
            (RefType::PrimitiveArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less | Ordering::Equal => false,
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type),
                }
            }

            // Cursed (unsound) covariance of arrays
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less => false,
                    Ordering::Equal => {
                        self.is_class_assignable(&arr1.element_type, &arr2.element_type)
                    }
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type),
                }
            }

            // Object-to-object assignability holds if there is a path through super type edges
            (RefType::Object(cls1), RefType::Object(cls2)) => self.is_class_assignable(cls1, cls2),

            _ => false,
        }
    }

    /// Class to class assignability
    ///
    /// This does a search up the superclasses and superinterfaces looking for the super type.
    pub fn is_class_assignable(&self, sub_type: &BinaryName, super_type: &BinaryName) -> bool {
        if sub_type == super_type || super_type == &BinaryName::OBJECT {
            return true;
        }
        let sub_class = match self.lookup_class(sub_type) {
            Some(class) => class,
            None => return false,
        };

        let mut supertypes_to_visit: Vec<&ClassData<'g>> = vec![sub_class];
        let mut dont_revisit: HashSet<&BinaryName> = HashSet::new();
        dont_revisit.insert(&sub_class.name);

        // Optimization: if the super type is a class, then skip visiting interfaces
        let super_is_class: bool = !self.is_interface(super_type);

        while let Some(class_data) = supertypes_to_visit.pop() {
            if &class_data.name == super_type {
                return true;
            }

            // Enqueue next types to visit
            if let Some(superclass) = class_data.superclass {
                if dont_revisit.insert(&superclass.name) {
                    supertypes_to_visit.push(superclass);
                }
            }
            if !super_is_class {
                for interface in &class_data.interfaces {
                    if dont_revisit.insert(&interface.name) {
                        supertypes_to_visit.push(interface);
                    }
                }
            }
        }

        false
    }

    /// Most specific type to which both types are assignable
    ///
    /// Interfaces do not take part: like the JVM verifier, two classes which share an interface
    /// but no superclass other than `java/lang/Object` generalize to `java/lang/Object`.
    pub fn common_super_type(&self, type1: &RefType, type2: &RefType) -> RefType {
        if self.is_java_assignable(type1, type2) {
            return type2.clone();
        }
        if self.is_java_assignable(type2, type1) {
            return type1.clone();
        }
        match (type1, type2) {
            (RefType::Object(cls1), RefType::Object(cls2)) => {
                RefType::Object(self.common_superclass(cls1, cls2))
            }
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
                if arr1.additional_dimensions == arr2.additional_dimensions =>
            {
                RefType::ObjectArray(ArrayType {
                    additional_dimensions: arr1.additional_dimensions,
                    element_type: self.common_superclass(&arr1.element_type, &arr2.element_type),
                })
            }
            _ => RefType::OBJECT,
        }
    }

    fn common_superclass(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName {
        if self.is_interface(class1) || self.is_interface(class2) {
            return BinaryName::OBJECT;
        }

        let mut ancestors: HashSet<&BinaryName> = HashSet::new();
        let mut next_class: Option<&ClassData<'g>> = self.lookup_class(class1);
        while let Some(class) = next_class {
            ancestors.insert(&class.name);
            next_class = class.superclass;
        }

        let mut next_class: Option<&ClassData<'g>> = self.lookup_class(class2);
        while let Some(class) = next_class {
            if ancestors.contains(&class.name) {
                return class.name.clone();
            }
            next_class = class.superclass;
        }

        BinaryName::OBJECT
    }
}

/// Check if arrays can be assigned to a super type
///
/// This bakes in knowledge of the small, finite set of super types arrays have.
fn is_array_type_assignable(super_type: &BinaryName) -> bool {
    super_type == &BinaryName::OBJECT
        || super_type == &BinaryName::CLONEABLE
        || super_type == &BinaryName::SERIALIZABLE
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{ClassData, ClassGraph, ClassGraphArenas};
    use crate::jvm::{BinaryName, FieldType, Name, RefType};

    #[test]
    fn simple_classes() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let object_cls = &RefType::OBJECT;
        let string_cls = &RefType::STRING;

        assert!(
            class_graph.is_java_assignable(object_cls, object_cls),
            "java.lang.Object <: java.lang.Object"
        );
        assert!(
            class_graph.is_java_assignable(string_cls, object_cls),
            "java.lang.String <: java.lang.Object"
        );
        assert!(
            !class_graph.is_java_assignable(object_cls, string_cls),
            "java.lang.Object </: java.lang.String"
        );
    }

    #[test]
    fn transitive_classes_and_interfaces() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let integer = &RefType::Object(BinaryName::INTEGER);
        let number = &RefType::Object(BinaryName::NUMBER);
        let serializable = &RefType::Object(BinaryName::SERIALIZABLE);
        let char_sequence = &RefType::Object(BinaryName::CHARSEQUENCE);

        assert!(class_graph.is_java_assignable(integer, number));
        assert!(!class_graph.is_java_assignable(number, integer));
        assert!(class_graph.is_java_assignable(integer, serializable));
        assert!(class_graph.is_java_assignable(&RefType::STRING, char_sequence));
        assert!(!class_graph.is_java_assignable(char_sequence, &RefType::STRING));
    }

    #[test]
    fn unknown_classes() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let unknown = &RefType::Object(BinaryName::from_str("com/example/Unknown").unwrap());
        assert!(class_graph.is_java_assignable(unknown, unknown));
        assert!(class_graph.is_java_assignable(unknown, &RefType::OBJECT));
        assert!(!class_graph.is_java_assignable(unknown, &RefType::STRING));
    }

    #[test]
    fn arrays() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let int_array = &RefType::array(FieldType::int());
        let long_array = &RefType::array(FieldType::long());
        let integer_array = &RefType::array(FieldType::object(BinaryName::INTEGER));
        let number_array = &RefType::array(FieldType::object(BinaryName::NUMBER));
        let object_array = &RefType::array(FieldType::object(BinaryName::OBJECT));
        let nested_int_array = &RefType::array(FieldType::array(FieldType::int()));

        assert!(class_graph.is_java_assignable(int_array, &RefType::OBJECT));
        assert!(!class_graph.is_java_assignable(int_array, long_array));
        assert!(class_graph.is_java_assignable(integer_array, number_array));
        assert!(!class_graph.is_java_assignable(number_array, integer_array));
        assert!(class_graph.is_java_assignable(nested_int_array, object_array));
        assert!(!class_graph.is_java_assignable(int_array, object_array));
    }

    #[test]
    fn common_super_types() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types();

        let integer = RefType::Object(BinaryName::INTEGER);
        let long = RefType::Object(BinaryName::LONG);
        let number = RefType::Object(BinaryName::NUMBER);
        assert_eq!(class_graph.common_super_type(&integer, &long), number);
        assert_eq!(class_graph.common_super_type(&integer, &number), number);
        assert_eq!(
            class_graph.common_super_type(&integer, &RefType::STRING),
            RefType::OBJECT
        );

        let base = class_graph.add_class(ClassData::new(
            BinaryName::from_str("Base").unwrap(),
            java.lang.object,
            false,
        ));
        let left = class_graph.add_class(ClassData::new(
            BinaryName::from_str("Left").unwrap(),
            base,
            false,
        ));
        let right = class_graph.add_class(ClassData::new(
            BinaryName::from_str("Right").unwrap(),
            base,
            false,
        ));
        assert_eq!(
            class_graph.common_super_type(
                &RefType::array(FieldType::object(left.name.clone())),
                &RefType::array(FieldType::object(right.name.clone())),
            ),
            RefType::array(FieldType::object(base.name.clone()))
        );
        assert_eq!(
            class_graph.common_super_type(
                &RefType::array(FieldType::int()),
                &RefType::array(FieldType::long()),
            ),
            RefType::OBJECT
        );
    }
}
