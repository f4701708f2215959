use super::{
    Advice, AssignTarget, Assigner, Assignment, BindingRequest, Error, ErrorKind, ReservedSlot,
    SlotLayout, Typing,
};
use crate::advice::assigner::box_value;
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{Constant, Instruction};
use crate::jvm::model::{FieldRef, Method};
use crate::jvm::{BinaryName, FieldType, RefType, RenderDescriptor, UnqualifiedName};
use crate::util::Width;

/// Which part of the woven method advice is spliced into
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdviceRole {
    Entry,
    Exit,
}

/// Code pushing the bound value, converted to the advice parameter type
#[derive(Debug, Clone, PartialEq)]
pub struct Reader(pub Vec<Instruction>);

/// Code consuming a value of the advice parameter type and storing it into the bound value
#[derive(Debug, Clone, PartialEq)]
pub struct Writer(pub Vec<Instruction>);

/// Advice parameter with its binding resolved against a target method
#[derive(Debug, Clone)]
pub struct ResolvedBinding {
    /// Index of the parameter in the advice method
    pub parameter: usize,
    pub parameter_type: FieldType,
    pub request: BindingRequest,
    pub reader: Reader,

    /// Only present when the value written to the parameter goes somewhere
    pub writer: Option<Writer>,
}

/// Assignment of the value returned by advice, resolved against a target method
#[derive(Debug, Clone)]
pub struct ResolvedAssignment {
    /// Element of the returned array (the whole value when absent)
    pub element: Option<usize>,

    /// Type of the assigned value
    pub value_type: FieldType,

    pub writer: Writer,
}

/// Resolves binding requests of advice woven into a given target
pub struct BindingResolver<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
    assigner: Assigner<'a, 'g>,
    target: &'a Method,
    layout: &'a SlotLayout,
}

/// Value of the advice being resolved (for conversions and messages)
struct Site<'b> {
    advice: &'b Advice,
    role: AdviceRole,
    position: Position,
    parameter_type: &'b FieldType,
}

#[derive(Debug, Copy, Clone)]
enum Position {
    Parameter(usize),

    /// Value returned by the advice, or one element of it
    Returned(Option<usize>),
}

impl<'a, 'g> BindingResolver<'a, 'g> {
    pub fn new(
        class_graph: &'a ClassGraph<'g>,
        target: &'a Method,
        layout: &'a SlotLayout,
    ) -> BindingResolver<'a, 'g> {
        BindingResolver {
            class_graph,
            assigner: Assigner::new(class_graph),
            target,
            layout,
        }
    }

    /// Resolve the bindings of every parameter of the advice method
    pub fn resolve_all(
        &self,
        advice: &Advice,
        role: AdviceRole,
    ) -> Result<Vec<ResolvedBinding>, Error> {
        let parameter_types = &advice.method.descriptor.parameters;
        if advice.parameters.len() != parameter_types.len() {
            return Err(Error::new(
                ErrorKind::DuplicateOrMissingBindingAnnotation,
                format!(
                    "{} has {} parameters but {} are bound",
                    advice.name(),
                    parameter_types.len(),
                    advice.parameters.len()
                ),
            ));
        }

        let mut bindings = vec![];
        for (parameter, (requests, parameter_type)) in
            advice.parameters.iter().zip(parameter_types).enumerate()
        {
            let site = Site {
                advice,
                role,
                position: Position::Parameter(parameter),
                parameter_type,
            };
            let request = match requests.as_slice() {
                [request] => request,
                _ => {
                    return Err(self.error(
                        &site,
                        ErrorKind::DuplicateOrMissingBindingAnnotation,
                        format!("{} bindings", requests.len()),
                    ))
                }
            };
            let (reader, writer) = self.resolve(&site, request)?;
            log::trace!(
                "Bound parameter {} of {} to {:?} (writable: {})",
                parameter,
                advice.name(),
                request,
                writer.is_some()
            );
            bindings.push(ResolvedBinding {
                parameter,
                parameter_type: parameter_type.clone(),
                request: request.clone(),
                reader,
                writer,
            });
        }
        Ok(bindings)
    }

    /// Resolve the assignments of the value returned by the advice
    pub fn resolve_assignments(
        &self,
        advice: &Advice,
        role: AdviceRole,
    ) -> Result<Vec<ResolvedAssignment>, Error> {
        let assignments = match &advice.assign_returned {
            Some(assign_returned) => &assign_returned.assignments,
            None => return Ok(vec![]),
        };

        let mut resolved = vec![];
        for assignment in assignments {
            let returned = advice.method.return_type().ok_or_else(|| {
                Error::new(
                    ErrorKind::IllegalTypeAssignment,
                    format!("{} returns no value to assign", advice.name()),
                )
            })?;
            let value_type = match assignment.element {
                None => returned.clone(),
                Some(index) => match element_type(returned) {
                    Some(element) if i32::try_from(index).is_ok() => element,
                    _ => {
                        return Err(Error::new(
                            ErrorKind::IllegalTypeAssignment,
                            format!(
                                "{} returns {}, which has no element {}",
                                advice.name(),
                                returned.java_name(),
                                index
                            ),
                        ))
                    }
                },
            };
            let site = Site {
                advice,
                role,
                position: Position::Returned(assignment.element),
                parameter_type: &value_type,
            };
            let writer = self.assignment_writer(&site, assignment)?;
            log::trace!(
                "Assigning {:?} returned by {} to {:?}",
                site.position,
                advice.name(),
                assignment.target
            );
            resolved.push(ResolvedAssignment {
                element: assignment.element,
                value_type: value_type.clone(),
                writer,
            });
        }
        Ok(resolved)
    }

    fn assignment_writer(&self, site: &Site, assignment: &Assignment) -> Result<Writer, Error> {
        let typing = assignment.typing;
        let exit_only = matches!(assignment.target, AssignTarget::Returned | AssignTarget::Thrown);
        if exit_only && site.role == AdviceRole::Entry {
            return Err(self.error(
                site,
                ErrorKind::UnresolvedBinding,
                format!("{:?} is only available to exit advice", assignment.target),
            ));
        }

        match &assignment.target {
            AssignTarget::Argument { index } => {
                match self.target.descriptor.parameters.get(*index) {
                    Some(argument_type) => {
                        let slot = self.target.parameter_offset(*index).unwrap_or_default();
                        self.slot_writer(site, slot, argument_type, typing)
                    }
                    None => Err(self.error(
                        site,
                        ErrorKind::UnresolvedBinding,
                        format!("no argument at index {}", index),
                    )),
                }
            }
            AssignTarget::AllArguments => self.all_arguments_writer(site, typing),
            AssignTarget::This => {
                if self.target.is_static() {
                    return Err(self.error(
                        site,
                        ErrorKind::UnresolvedBinding,
                        "static method has no receiver",
                    ));
                }
                if self.target.is_constructor() {
                    return Err(self.error(
                        site,
                        ErrorKind::IllegalOnConstructor,
                        "receiver of a constructor can't be replaced",
                    ));
                }
                let receiver = FieldType::Ref(self.target.receiver_type());
                self.slot_writer(site, 0, &receiver, typing)
            }
            AssignTarget::Field {
                name,
                declaring_class,
            } => {
                let (field, is_static) = self.lookup_field(site, name, declaring_class.as_ref())?;
                self.field_writer(site, field, is_static, typing)
            }
            AssignTarget::Returned => match &self.layout.returned {
                Some(returned) => {
                    self.slot_writer(site, returned.slot, &returned.value_type, typing)
                }
                None => Ok(Writer(self.convert(site, Some(site.parameter_type), None, typing)?)),
            },
            AssignTarget::Thrown => {
                let thrown = self.reserved(site, self.layout.thrown.as_ref(), "thrown exception")?;
                self.slot_writer(site, thrown.slot, &thrown.value_type, typing)
            }
        }
    }

    fn resolve(
        &self,
        site: &Site,
        request: &BindingRequest,
    ) -> Result<(Reader, Option<Writer>), Error> {
        if request.is_exit_only() && site.role == AdviceRole::Entry {
            return Err(self.error(
                site,
                ErrorKind::UnresolvedBinding,
                format!("{:?} is only available to exit advice", request),
            ));
        }

        match request {
            BindingRequest::Argument {
                index,
                read_only,
                typing,
                optional,
            } => match self.target.descriptor.parameters.get(*index) {
                Some(argument_type) => {
                    let slot = self.target.parameter_offset(*index).unwrap_or_default();
                    self.slot_binding(site, slot, argument_type, *read_only, *typing)
                }
                None if *optional => Ok(self.default_binding(site, *read_only)),
                None => Err(self.error(
                    site,
                    ErrorKind::UnresolvedBinding,
                    format!("no argument at index {}", index),
                )),
            },

            BindingRequest::AllArguments { read_only, typing } => {
                self.all_arguments(site, *read_only, *typing)
            }

            BindingRequest::This {
                read_only,
                typing,
                optional,
            } => {
                if self.target.is_static() {
                    if !*optional {
                        return Err(self.error(
                            site,
                            ErrorKind::UnresolvedBinding,
                            "static method has no receiver",
                        ));
                    }
                    if site.parameter_type.is_primitive() {
                        return Err(self.error(
                            site,
                            ErrorKind::IllegalTypeAssignment,
                            "missing receiver bound to a primitive",
                        ));
                    }
                    return Ok(self.default_binding(site, *read_only));
                }
                if self.target.is_constructor() && site.role == AdviceRole::Entry {
                    return Err(self.error(
                        site,
                        ErrorKind::IllegalOnConstructor,
                        "receiver is uninitialized",
                    ));
                }
                let receiver = FieldType::Ref(self.target.receiver_type());
                self.slot_binding(site, 0, &receiver, *read_only, *typing)
            }

            BindingRequest::FieldValue {
                name,
                declaring_class,
                read_only,
                typing,
            } => {
                let (field, is_static) = self.lookup_field(site, name, declaring_class.as_ref())?;
                self.field_binding(site, field, is_static, *read_only, *typing)
            }

            BindingRequest::Origin { pattern } => {
                let constant = if site.parameter_type == &FieldType::Ref(RefType::CLASS) {
                    Constant::Class(self.target.receiver_type())
                } else if site.parameter_type == &FieldType::Ref(RefType::STRING) {
                    let rendered = render_origin(pattern, self.target).map_err(|message| {
                        self.error(site, ErrorKind::UnresolvedBinding, message)
                    })?;
                    Constant::String(rendered)
                } else {
                    return Err(self.error(
                        site,
                        ErrorKind::IllegalTypeAssignment,
                        "origin is bound to a `String` or a `Class`",
                    ));
                };
                Ok((Reader(vec![Instruction::Ldc(constant)]), None))
            }

            BindingRequest::Enter { read_only, typing } => {
                let enter = self.reserved(site, self.layout.enter.as_ref(), "entry advice value")?;
                self.slot_binding(site, enter.slot, &enter.value_type, *read_only, *typing)
            }

            BindingRequest::Exit { read_only, typing } => {
                let exit = self.reserved(site, self.layout.exit.as_ref(), "exit advice value")?;
                self.slot_binding(site, exit.slot, &exit.value_type, *read_only, *typing)
            }

            BindingRequest::Return { read_only, typing } => match &self.layout.returned {
                Some(returned) => self.slot_binding(
                    site,
                    returned.slot,
                    &returned.value_type,
                    *read_only,
                    *typing,
                ),
                None => {
                    let reader = self.convert(site, None, Some(site.parameter_type), *typing)?;
                    let writer = if *read_only {
                        None
                    } else {
                        Some(Writer(self.convert(site, Some(site.parameter_type), None, *typing)?))
                    };
                    Ok((Reader(reader), writer))
                }
            },

            BindingRequest::BoxedReturn { read_only } => self.boxed_return(site, *read_only),

            BindingRequest::Thrown { read_only, typing } => {
                let thrown = self.reserved(site, self.layout.thrown.as_ref(), "thrown exception")?;
                self.slot_binding(site, thrown.slot, &thrown.value_type, *read_only, *typing)
            }

            BindingRequest::Local { name } => {
                let local = self.reserved(site, self.layout.local(name), "local")?;
                if &local.value_type != site.parameter_type {
                    return Err(self.error(
                        site,
                        ErrorKind::IllegalTypeAssignment,
                        format!("local `{}` has type {}", name, local.value_type.java_name()),
                    ));
                }
                Ok((
                    Reader(vec![Instruction::load(&local.value_type, local.slot)]),
                    Some(Writer(vec![Instruction::store(&local.value_type, local.slot)])),
                ))
            }

            BindingRequest::StubValue => {
                if site.parameter_type != &FieldType::Ref(RefType::OBJECT) {
                    return Err(self.error(
                        site,
                        ErrorKind::IllegalTypeAssignment,
                        "stub value is bound to an `Object`",
                    ));
                }
                let reader = match self.target.return_type() {
                    Some(FieldType::Base(base_type)) => vec![
                        Instruction::push_default(&FieldType::Base(*base_type)),
                        box_value(*base_type),
                    ],
                    _ => vec![Instruction::AConstNull],
                };
                Ok((Reader(reader), None))
            }

            BindingRequest::Unused => Ok((
                Reader(vec![Instruction::push_default(site.parameter_type)]),
                Some(Writer(vec![Instruction::pop_width(site.parameter_type.width())])),
            )),
        }
    }

    /// Value stored in a local variable of the target
    fn slot_binding(
        &self,
        site: &Site,
        slot: u16,
        value_type: &FieldType,
        read_only: bool,
        typing: Typing,
    ) -> Result<(Reader, Option<Writer>), Error> {
        let mut reader = vec![Instruction::load(value_type, slot)];
        reader.extend(self.convert(site, Some(value_type), Some(site.parameter_type), typing)?);

        let writer = if read_only {
            None
        } else {
            Some(self.slot_writer(site, slot, value_type, typing)?)
        };
        Ok((Reader(reader), writer))
    }

    fn slot_writer(
        &self,
        site: &Site,
        slot: u16,
        value_type: &FieldType,
        typing: Typing,
    ) -> Result<Writer, Error> {
        let mut writer = self.convert(site, Some(site.parameter_type), Some(value_type), typing)?;
        writer.push(Instruction::store(value_type, slot));
        Ok(Writer(writer))
    }

    /// Value which doesn't exist for this target: reads see the default and writes vanish
    fn default_binding(&self, site: &Site, read_only: bool) -> (Reader, Option<Writer>) {
        let reader = Reader(vec![Instruction::push_default(site.parameter_type)]);
        let writer = if read_only {
            None
        } else {
            Some(Writer(vec![Instruction::pop_width(site.parameter_type.width())]))
        };
        (reader, writer)
    }

    /// Slot and type of each argument of the target
    fn arguments(&self) -> Vec<(u16, &'a FieldType)> {
        self.target
            .descriptor
            .parameters
            .iter()
            .enumerate()
            .map(|(index, argument_type)| {
                let slot = self.target.parameter_offset(index).unwrap_or_default();
                (slot, argument_type)
            })
            .collect()
    }

    fn all_arguments(
        &self,
        site: &Site,
        read_only: bool,
        typing: Typing,
    ) -> Result<(Reader, Option<Writer>), Error> {
        let array_type = FieldType::array(FieldType::Ref(RefType::OBJECT));
        let arguments = self.arguments();

        let mut reader = vec![
            Instruction::push_int(arguments.len() as i32),
            Instruction::ANewArray(RefType::OBJECT),
        ];
        for (index, (slot, argument_type)) in arguments.iter().enumerate() {
            reader.push(Instruction::Dup);
            reader.push(Instruction::push_int(index as i32));
            reader.push(Instruction::load(argument_type, *slot));
            if let FieldType::Base(base_type) = argument_type {
                reader.push(box_value(*base_type));
            }
            reader.push(Instruction::AAStore);
        }
        reader.extend(self.convert(site, Some(&array_type), Some(site.parameter_type), typing)?);

        if read_only {
            return Ok((Reader(reader), None));
        }
        Ok((Reader(reader), Some(self.all_arguments_writer(site, typing)?)))
    }

    /// Unpacks an `Object[]` into the arguments
    fn all_arguments_writer(&self, site: &Site, typing: Typing) -> Result<Writer, Error> {
        let object = FieldType::Ref(RefType::OBJECT);
        let array_type = FieldType::array(object.clone());
        let mut writer = self.convert(site, Some(site.parameter_type), Some(&array_type), typing)?;
        for (index, (slot, argument_type)) in self.arguments().into_iter().enumerate() {
            writer.push(Instruction::Dup);
            writer.push(Instruction::push_int(index as i32));
            writer.push(Instruction::AALoad);
            writer.extend(self.convert(site, Some(&object), Some(argument_type), Typing::Dynamic)?);
            writer.push(Instruction::store(argument_type, slot));
        }
        writer.push(Instruction::Pop);
        Ok(Writer(writer))
    }

    /// Field visible from the target, and whether it is static
    fn lookup_field(
        &self,
        site: &Site,
        name: &UnqualifiedName,
        declaring_class: Option<&BinaryName>,
    ) -> Result<(FieldRef, bool), Error> {
        let class = declaring_class.unwrap_or(&self.target.class);
        let field = self.class_graph.lookup_field(class, name).ok_or_else(|| {
            self.error(
                site,
                ErrorKind::UnresolvedBinding,
                format!("no field `{}` visible from {}", name, class),
            )
        })?;
        let field_ref = FieldRef {
            class: field.class.name.clone(),
            name: field.name.clone(),
            descriptor: field.descriptor.clone(),
        };
        let is_static = field.is_static();
        if !is_static && self.target.is_static() {
            return Err(self.error(
                site,
                ErrorKind::UnresolvedBinding,
                format!("instance field {:?} used from a static method", field_ref),
            ));
        }
        if !is_static && self.target.is_constructor() && site.role == AdviceRole::Entry {
            return Err(self.error(
                site,
                ErrorKind::IllegalOnConstructor,
                format!("instance field {:?} of an uninitialized receiver", field_ref),
            ));
        }
        Ok((field_ref, is_static))
    }

    fn field_binding(
        &self,
        site: &Site,
        field: FieldRef,
        is_static: bool,
        read_only: bool,
        typing: Typing,
    ) -> Result<(Reader, Option<Writer>), Error> {
        let field_type = field.descriptor.clone();

        let mut reader = if is_static {
            vec![Instruction::GetStatic(field.clone())]
        } else {
            vec![Instruction::ALoad(0), Instruction::GetField(field.clone())]
        };
        reader.extend(self.convert(site, Some(&field_type), Some(site.parameter_type), typing)?);

        if read_only {
            return Ok((Reader(reader), None));
        }
        Ok((Reader(reader), Some(self.field_writer(site, field, is_static, typing)?)))
    }

    fn field_writer(
        &self,
        site: &Site,
        field: FieldRef,
        is_static: bool,
        typing: Typing,
    ) -> Result<Writer, Error> {
        let field_type = field.descriptor.clone();
        let mut writer = self.convert(site, Some(site.parameter_type), Some(&field_type), typing)?;
        if is_static {
            writer.push(Instruction::PutStatic(field));
        } else if field_type.width() == 2 {
            writer.extend([
                Instruction::ALoad(0),
                Instruction::DupX2,
                Instruction::Pop,
                Instruction::PutField(field),
            ]);
        } else {
            writer.extend([
                Instruction::ALoad(0),
                Instruction::Swap,
                Instruction::PutField(field),
            ]);
        }
        Ok(Writer(writer))
    }

    fn boxed_return(
        &self,
        site: &Site,
        read_only: bool,
    ) -> Result<(Reader, Option<Writer>), Error> {
        let (mut reader, boxed_type) = match &self.layout.returned {
            None => (vec![Instruction::AConstNull], FieldType::Ref(RefType::OBJECT)),
            Some(ReservedSlot {
                slot,
                value_type: value_type @ FieldType::Base(base_type),
            }) => (
                vec![Instruction::load(value_type, *slot), box_value(*base_type)],
                FieldType::object(base_type.boxed_class()),
            ),
            Some(ReservedSlot { slot, value_type }) => {
                (vec![Instruction::load(value_type, *slot)], value_type.clone())
            }
        };
        reader.extend(self.convert(
            site,
            Some(&boxed_type),
            Some(site.parameter_type),
            Typing::Static,
        )?);

        if read_only {
            return Ok((Reader(reader), None));
        }
        let writer = match &self.layout.returned {
            None => vec![Instruction::pop_width(site.parameter_type.width())],
            Some(returned) => {
                let mut writer = self.convert(
                    site,
                    Some(site.parameter_type),
                    Some(&returned.value_type),
                    Typing::Dynamic,
                )?;
                writer.push(Instruction::store(&returned.value_type, returned.slot));
                writer
            }
        };
        Ok((Reader(reader), Some(Writer(writer))))
    }

    fn reserved<'r>(
        &self,
        site: &Site,
        slot: Option<&'r ReservedSlot>,
        what: &str,
    ) -> Result<&'r ReservedSlot, Error> {
        slot.ok_or_else(|| {
            self.error(
                site,
                ErrorKind::UnresolvedBinding,
                format!("there is no {}", what),
            )
        })
    }

    fn convert(
        &self,
        site: &Site,
        source: Option<&FieldType>,
        target: Option<&FieldType>,
        typing: Typing,
    ) -> Result<Vec<Instruction>, Error> {
        self.assigner.assign(source, target, typing).ok_or_else(|| {
            let render = |field_type: Option<&FieldType>| {
                field_type
                    .map(FieldType::java_name)
                    .unwrap_or_else(|| String::from("void"))
            };
            self.error(
                site,
                ErrorKind::IllegalTypeAssignment,
                format!(
                    "cannot assign {} to {} ({:?} typing)",
                    render(source),
                    render(target),
                    typing
                ),
            )
        })
    }

    fn error(&self, site: &Site, kind: ErrorKind, message: impl AsRef<str>) -> Error {
        let value = match site.position {
            Position::Parameter(parameter) => format!("parameter {}", parameter),
            Position::Returned(None) => String::from("value returned"),
            Position::Returned(Some(index)) => format!("element {} of the value returned", index),
        };
        let error = Error::new(
            kind,
            format!(
                "{} ({}) of {} woven into {}.{}: {}",
                value,
                site.parameter_type.java_name(),
                site.advice.name(),
                self.target.class,
                self.target.signature(),
                message.as_ref()
            ),
        );
        log::error!("{}", error);
        error
    }
}

/// Type of the elements of an array type
pub fn element_type(field_type: &FieldType) -> Option<FieldType> {
    match field_type {
        FieldType::Ref(ref_type) => ref_type.element_type(),
        FieldType::Base(_) => None,
    }
}

/// Render an origin pattern for a method
pub fn render_origin(pattern: &str, method: &Method) -> Result<String, String> {
    if pattern.is_empty() {
        return Ok(method.java_string());
    }

    let mut rendered = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.clone().next() {
                Some(escaped @ ('#' | '\\')) => {
                    chars.next();
                    rendered.push(escaped);
                }
                _ => rendered.push('\\'),
            },
            '#' => match chars.next() {
                Some('t') => rendered.push_str(&method.class.java_name()),
                Some('m') => rendered.push_str(method.name.as_ref()),
                Some('d') => rendered.push_str(&method.descriptor.render()),
                Some('r') => match method.return_type() {
                    None => rendered.push_str("void"),
                    Some(return_type) => rendered.push_str(&return_type.java_name()),
                },
                Some('p') => {
                    let parameters: Vec<String> = method
                        .descriptor
                        .parameters
                        .iter()
                        .map(FieldType::java_name)
                        .collect();
                    rendered.push_str(&parameters.join(","));
                }
                Some(other) => {
                    return Err(format!("unknown origin sort `#{}` in {:?}", other, pattern))
                }
                None => return Err(format!("dangling `#` in {:?}", pattern)),
            },
            other => rendered.push(other),
        }
    }
    Ok(rendered)
}

/// Does a write of `width` slots at `slot` touch the parameter at `offset`?
pub fn overlaps_parameter(
    slot: u16,
    width: usize,
    offset: u16,
    parameter_type: &FieldType,
) -> bool {
    let (slot, offset) = (slot as usize, offset as usize);
    slot < offset + parameter_type.width() && offset < slot + width
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{
        BinaryName, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
    };

    #[test]
    fn origin_patterns() {
        let method = Method::new(
            BinaryName::from_str("com/example/Sample").unwrap(),
            UnqualifiedName::from_str("foo").unwrap(),
            MethodDescriptor::parse("(ILjava/lang/String;)J").unwrap(),
            MethodAccessFlags::PUBLIC,
        );

        assert_eq!(
            render_origin("#t.#m#d", &method).unwrap(),
            "com.example.Sample.foo(ILjava/lang/String;)J"
        );
        assert_eq!(render_origin("#r (#p)", &method).unwrap(), "long (int,java.lang.String)");
        assert_eq!(render_origin("\\#m is #m", &method).unwrap(), "#m is foo");
        assert_eq!(render_origin("a\\\\b", &method).unwrap(), "a\\b");
        assert_eq!(
            render_origin("", &method).unwrap(),
            "public long com.example.Sample.foo(int,java.lang.String)"
        );
        assert!(render_origin("#q", &method).is_err());
        assert!(render_origin("trailing #", &method).is_err());
    }

    #[test]
    fn parameter_overlap() {
        let long = FieldType::long();
        assert!(overlaps_parameter(3, 1, 2, &long));
        assert!(!overlaps_parameter(4, 1, 2, &long));
        assert!(overlaps_parameter(1, 2, 2, &FieldType::int()));
        assert!(!overlaps_parameter(0, 2, 2, &FieldType::int()));
    }
}
