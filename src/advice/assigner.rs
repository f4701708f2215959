use super::Typing;
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{Instruction, InvokeType};
use crate::jvm::model::MethodRef;
use crate::jvm::{BaseType, FieldType, RefType};
use crate::util::Width;

/// Produces the conversions between the type of a value and the type it is bound to
///
/// `None` types stand for `void`. Reading from `void` produces the default value of the target
/// type and assigning to `void` discards the value.
pub struct Assigner<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
}

impl<'a, 'g> Assigner<'a, 'g> {
    pub fn new(class_graph: &'a ClassGraph<'g>) -> Assigner<'a, 'g> {
        Assigner { class_graph }
    }

    /// Instructions turning a value of type `source` on top of the stack into one of type
    /// `target`, or `None` if the assignment is illegal under the typing
    pub fn assign(
        &self,
        source: Option<&FieldType>,
        target: Option<&FieldType>,
        typing: Typing,
    ) -> Option<Vec<Instruction>> {
        match (source, target) {
            (None, None) => Some(vec![]),
            (None, Some(target)) => Some(vec![Instruction::push_default(target)]),
            (Some(source), None) => Some(vec![Instruction::pop_width(source.width())]),
            (Some(source), Some(target)) => self.assign_value(source, target, typing),
        }
    }

    fn assign_value(
        &self,
        source: &FieldType,
        target: &FieldType,
        typing: Typing,
    ) -> Option<Vec<Instruction>> {
        match (source, target) {
            (FieldType::Base(from), FieldType::Base(to)) => widen(*from, *to),

            (FieldType::Base(from), FieldType::Ref(to)) => {
                let wrapper = RefType::Object(from.boxed_class());
                let mut code = vec![box_value(*from)];
                code.extend(self.assign_reference(&wrapper, to, typing)?);
                Some(code)
            }

            (FieldType::Ref(from), FieldType::Base(to)) => {
                let unboxed = match from {
                    RefType::Object(class) => BaseType::unboxed_from(class),
                    _ => None,
                };
                match unboxed {
                    Some(unboxed) => {
                        let mut code = vec![unbox_value(unboxed)];
                        code.extend(widen(unboxed, *to)?);
                        Some(code)
                    }
                    None if typing == Typing::Dynamic => Some(vec![
                        Instruction::CheckCast(RefType::Object(to.boxed_class())),
                        unbox_value(*to),
                    ]),
                    None => None,
                }
            }

            (FieldType::Ref(from), FieldType::Ref(to)) => self.assign_reference(from, to, typing),
        }
    }

    fn assign_reference(
        &self,
        source: &RefType,
        target: &RefType,
        typing: Typing,
    ) -> Option<Vec<Instruction>> {
        if self.class_graph.is_java_assignable(source, target) {
            Some(vec![])
        } else if typing == Typing::Dynamic {
            Some(vec![Instruction::CheckCast(target.clone())])
        } else {
            None
        }
    }
}

/// Widening primitive conversion
fn widen(from: BaseType, to: BaseType) -> Option<Vec<Instruction>> {
    use BaseType::*;

    if from == to {
        return Some(vec![]);
    }
    let conversion = match (from, to) {
        (Byte, Short) | (Byte, Int) | (Short, Int) | (Char, Int) => return Some(vec![]),
        (Byte | Short | Char | Int, Long) => Instruction::I2L,
        (Byte | Short | Char | Int, Float) => Instruction::I2F,
        (Byte | Short | Char | Int, Double) => Instruction::I2D,
        (Long, Float) => Instruction::L2F,
        (Long, Double) => Instruction::L2D,
        (Float, Double) => Instruction::F2D,
        _ => return None,
    };
    Some(vec![conversion])
}

/// Box the primitive on top of the stack
pub fn box_value(base_type: BaseType) -> Instruction {
    Instruction::Invoke(InvokeType::Static, MethodRef::boxing(base_type))
}

/// Unbox the wrapper on top of the stack (which must already have the wrapper type)
pub fn unbox_value(base_type: BaseType) -> Instruction {
    Instruction::Invoke(InvokeType::Virtual, MethodRef::unboxing(base_type))
}
