use super::{AdviceSet, BindingRequest, Error, ErrorKind};
use crate::jvm::code::{InstructionBuffer, LocalShift};
use crate::jvm::model::Method;
use crate::jvm::{FieldType, RefType};
use crate::util::Width;

/// Local variable slot holding a value shared between parts of the woven method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedSlot {
    pub slot: u16,
    pub value_type: FieldType,
}

/// Local variables of a woven method
///
/// ```text
/// | receiver and parameters | reserved | original locals (shifted) | advice locals |
/// ```
///
/// The reserved slots come right after the parameters (so the slots of parameters never move)
/// in this order: the value returned by the entry advice, named locals, the value returned by the
/// target body, the exception thrown by the target body, the value returned by the exit advice,
/// and the copies of the arguments the body works on. Each advice gets its own copy of its parameters and locals starting at
/// `private_base`. Entry and exit advice never run at the same time, so they share that region.
#[derive(Debug, Clone)]
pub struct SlotLayout {
    /// Size of the receiver and parameters
    pub parameters_length: u16,

    pub enter: Option<ReservedSlot>,
    pub locals: Vec<(String, ReservedSlot)>,
    pub returned: Option<ReservedSlot>,
    pub thrown: Option<ReservedSlot>,
    pub exit: Option<ReservedSlot>,

    /// Slot of each argument paired with the copy the body uses instead
    pub argument_copies: Vec<(u16, ReservedSlot)>,

    /// Total width of the reserved slots (by which original locals are shifted)
    pub reserved: u16,

    /// First slot of the advice locals
    pub private_base: u16,
}

impl SlotLayout {
    pub fn new(
        target: &Method,
        body: &InstructionBuffer,
        advice: &AdviceSet,
    ) -> Result<SlotLayout, Error> {
        let parameters_length = target.parameters_length();
        let mut next_slot = parameters_length;
        let mut reserve = |value_type: FieldType| -> ReservedSlot {
            let slot = next_slot;
            next_slot += value_type.width();
            ReservedSlot {
                slot: slot as u16,
                value_type,
            }
        };

        let enter = advice
            .entry
            .as_ref()
            .and_then(|entry| entry.advice.method.return_type().cloned())
            .map(&mut reserve);

        let mut local_types: Vec<(String, FieldType)> = vec![];
        let declared = advice
            .entry
            .iter()
            .map(|entry| &entry.advice)
            .chain(advice.exit.iter().map(|exit| &exit.advice));
        for declaring_advice in declared {
            let parameter_types = &declaring_advice.method.descriptor.parameters;
            let declared = declaring_advice.parameters.iter().zip(parameter_types);
            for (requests, parameter_type) in declared {
                for request in requests {
                    let name = match request {
                        BindingRequest::Local { name } => name,
                        _ => continue,
                    };
                    match local_types.iter().find(|(existing, _)| existing == name) {
                        None => local_types.push((name.clone(), parameter_type.clone())),
                        Some((_, existing_type)) if existing_type == parameter_type => (),
                        Some((_, existing_type)) => {
                            return Err(Error::new(
                                ErrorKind::IllegalTypeAssignment,
                                format!(
                                    "local `{}` is declared as both {} and {} (in {})",
                                    name,
                                    existing_type.java_name(),
                                    parameter_type.java_name(),
                                    declaring_advice.name(),
                                ),
                            ))
                        }
                    }
                }
            }
        }
        let locals = local_types
            .into_iter()
            .map(|(name, value_type)| (name, reserve(value_type)))
            .collect();

        let mut returned = None;
        let mut thrown = None;
        let mut exit = None;
        let mut argument_copies = vec![];
        if let Some(exit_advice) = &advice.exit {
            returned = target.return_type().cloned().map(&mut reserve);
            if exit_advice.on_throwable.is_some() {
                thrown = Some(reserve(FieldType::Ref(RefType::THROWABLE)));
            }
            exit = exit_advice.advice.method.return_type().cloned().map(&mut reserve);
            if exit_advice.backup_arguments {
                for (index, argument_type) in target.descriptor.parameters.iter().enumerate() {
                    let slot = target.parameter_offset(index).unwrap_or_default();
                    argument_copies.push((slot, reserve(argument_type.clone())));
                }
            }
        }

        let reserved = next_slot - parameters_length;
        let private_base = parameters_length.max(body.max_local_extent()) + reserved;
        let too_many = |size: usize| {
            Error::new(
                ErrorKind::InternalStackInconsistency,
                format!("{} local slots needed by {}", size, target.signature()),
            )
        };

        Ok(SlotLayout {
            parameters_length: u16::try_from(parameters_length)
                .map_err(|_| too_many(parameters_length))?,
            enter,
            locals,
            returned,
            thrown,
            exit,
            argument_copies,
            reserved: u16::try_from(reserved).map_err(|_| too_many(reserved))?,
            private_base: u16::try_from(private_base).map_err(|_| too_many(private_base))?,
        })
    }

    /// Reserved slots, in slot order
    pub fn reserved_slots(&self) -> impl Iterator<Item = &ReservedSlot> {
        self.enter
            .iter()
            .chain(self.locals.iter().map(|(_, slot)| slot))
            .chain(self.returned.iter())
            .chain(self.thrown.iter())
            .chain(self.exit.iter())
            .chain(self.argument_copies.iter().map(|(_, copy)| copy))
    }

    /// Slot mapping for the original body
    ///
    /// Its locals move above the reserved slots and its arguments onto their copies.
    pub fn body_shift(&self) -> LocalShift {
        let shift = LocalShift::above(self.parameters_length, self.reserved);
        match self.argument_copies.first() {
            Some((first, copy)) => shift.redirecting(*first, copy.slot),
            None => shift,
        }
    }

    pub fn local(&self, name: &str) -> Option<&ReservedSlot> {
        self.locals
            .iter()
            .find(|(local_name, _)| local_name == name)
            .map(|(_, slot)| slot)
    }
}
