#[macro_use]
mod common;

use common::*;
use jvm_advice::advice::{
    Advice, AdviceSet, AssignReturned, AssignTarget, Assignment, BindingRequest, ControlPredicate,
    EntryAdvice, Error, ErrorKind, ExitAdvice, Typing,
};
use jvm_advice::jvm::class_graph::{ClassGraph, ClassGraphArenas};
use jvm_advice::jvm::code::{BranchInstruction, Instruction};
use jvm_advice::jvm::model::Method;
use jvm_advice::jvm::{
    BinaryName, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, RefType,
    UnqualifiedName,
};

/// `identity(I)I`
fn identity() -> Method {
    target(
        "identity",
        "(I)I",
        insns![Instruction::ILoad(0), BranchInstruction::IReturn],
    )
}

/// Static advice which does nothing
fn noop(descriptor: &str) -> Method {
    let return_type = MethodDescriptor::parse(descriptor).unwrap().return_type;
    let code = match return_type {
        None => insns![BranchInstruction::Return],
        Some(return_type) => insns![
            Instruction::push_default(&return_type),
            BranchInstruction::return_for(Some(&return_type)),
        ],
    };
    advice_method("noop", descriptor, code)
}

fn weave_error(class_graph: &ClassGraph, target: &Method, advice: AdviceSet) -> Error {
    match weaver(class_graph).weave(target, &advice) {
        Ok(woven) => panic!("expected an error, but wove {:?}", woven.method),
        Err(error) => error,
    }
}

fn entry(advice: Advice) -> AdviceSet {
    AdviceSet::new().with_entry(EntryAdvice::new(advice))
}

fn exit(advice: Advice) -> AdviceSet {
    AdviceSet::new().with_exit(ExitAdvice::new(advice))
}

#[test]
fn every_parameter_needs_exactly_one_binding() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let missing = entry(Advice::new(noop("(I)V")));
    let error = weave_error(&class_graph, &identity(), missing);
    assert_eq!(error.kind, ErrorKind::DuplicateOrMissingBindingAnnotation);

    let duplicate = entry(
        Advice::new(noop("(I)V"))
            .bind(0, BindingRequest::argument(0))
            .bind(0, BindingRequest::Unused),
    );
    let error = weave_error(&class_graph, &identity(), duplicate);
    assert_eq!(error.kind, ErrorKind::DuplicateOrMissingBindingAnnotation);

    let too_many = entry(
        Advice::new(noop("(I)V"))
            .bind(0, BindingRequest::argument(0))
            .bind(1, BindingRequest::argument(0)),
    );
    let error = weave_error(&class_graph, &identity(), too_many);
    assert_eq!(error.kind, ErrorKind::DuplicateOrMissingBindingAnnotation);
}

#[test]
fn illegal_type_assignments() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    // Narrowing
    let narrowing = entry(Advice::new(noop("(S)V")).bind(0, BindingRequest::argument(0)));
    let error = weave_error(&class_graph, &identity(), narrowing);
    assert_eq!(error.kind, ErrorKind::IllegalTypeAssignment);

    // Downcast needs dynamic typing
    let takes_object = target(
        "takesObject",
        "(Ljava/lang/Object;)V",
        insns![BranchInstruction::Return],
    );
    let downcast = |typing| {
        entry(Advice::new(noop("(Ljava/lang/String;)V")).bind(
            0,
            BindingRequest::Argument {
                index: 0,
                read_only: true,
                typing,
                optional: false,
            },
        ))
    };
    let error = weave_error(&class_graph, &takes_object, downcast(Typing::Static));
    assert_eq!(error.kind, ErrorKind::IllegalTypeAssignment);
    weaver(&class_graph)
        .weave(&takes_object, &downcast(Typing::Dynamic))
        .unwrap();

    // Origin only fits `String` and `Class`
    let origin = entry(Advice::new(noop("(Ljava/lang/Object;)V")).bind(
        0,
        BindingRequest::Origin {
            pattern: String::from("#m"),
        },
    ));
    let error = weave_error(&class_graph, &identity(), origin);
    assert_eq!(error.kind, ErrorKind::IllegalTypeAssignment);

    // Locals must have the same type everywhere
    let local = |name: &str| BindingRequest::Local {
        name: name.to_owned(),
    };
    let mismatched = AdviceSet::new()
        .with_entry(EntryAdvice::new(Advice::new(noop("(I)V")).bind(0, local("shared"))))
        .with_exit(ExitAdvice::new(Advice::new(noop("(J)V")).bind(0, local("shared"))));
    let error = weave_error(&class_graph, &identity(), mismatched);
    assert_eq!(error.kind, ErrorKind::IllegalTypeAssignment);
}

#[test]
fn control_values_must_be_testable() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let primitive_instance_of = AdviceSet::new().with_entry(
        EntryAdvice::new(Advice::new(noop("()I")))
            .skip_on(ControlPredicate::InstanceOf(RefType::STRING)),
    );
    let error = weave_error(&class_graph, &identity(), primitive_instance_of);
    assert_eq!(error.kind, ErrorKind::IllegalPrimitiveControlValue);

    let void_repeat = AdviceSet::new().with_exit(
        ExitAdvice::new(Advice::new(noop("()V"))).repeat_on(ControlPredicate::DefaultValue),
    );
    let error = weave_error(&class_graph, &identity(), void_repeat);
    assert_eq!(error.kind, ErrorKind::IllegalPrimitiveControlValue);

    // Primitive values can still be compared to their default
    let primitive_default = AdviceSet::new().with_entry(
        EntryAdvice::new(Advice::new(noop("()Z"))).skip_on(ControlPredicate::DefaultValue),
    );
    weaver(&class_graph)
        .weave(&identity(), &primitive_default)
        .unwrap();
}

#[test]
fn constructors_limit_advice() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let constructor = sample_constructor(vec![]);
    let this = BindingRequest::This {
        read_only: true,
        typing: Typing::Static,
        optional: false,
    };

    let skip = AdviceSet::new().with_entry(
        EntryAdvice::new(Advice::new(noop("()Z"))).skip_on(ControlPredicate::NonDefaultValue),
    );
    let repeat = AdviceSet::new().with_exit(
        ExitAdvice::new(Advice::new(noop("()Z"))).repeat_on(ControlPredicate::NonDefaultValue),
    );
    let catching = AdviceSet::new()
        .with_exit(ExitAdvice::new(Advice::new(noop("()V"))).on_throwable(BinaryName::THROWABLE));
    let uninitialized_this =
        entry(Advice::new(noop("(Lcom/example/Sample;)V")).bind(0, this.clone()));
    let uninitialized_field = entry(Advice::new(noop("(I)V")).bind(
        0,
        BindingRequest::FieldValue {
            name: UnqualifiedName::from_str("value").unwrap(),
            declaring_class: None,
            read_only: true,
            typing: Typing::Static,
        },
    ));

    for advice in [skip, repeat, catching, uninitialized_this, uninitialized_field] {
        let error = weave_error(&class_graph, &constructor, advice);
        assert_eq!(error.kind, ErrorKind::IllegalOnConstructor, "{}", error);
    }

    // The receiver is fine once the constructor is done
    let initialized_this = exit(Advice::new(noop("(Lcom/example/Sample;)V")).bind(0, this));
    weaver(&class_graph)
        .weave(&constructor, &initialized_this)
        .unwrap();
}

#[test]
fn unresolved_bindings() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let read_only = |request| entry(Advice::new(noop("(I)V")).bind(0, request));
    let cases = vec![
        read_only(BindingRequest::argument(3)),
        read_only(BindingRequest::Return {
            read_only: true,
            typing: Typing::Static,
        }),
        read_only(BindingRequest::FieldValue {
            name: UnqualifiedName::from_str("missing").unwrap(),
            declaring_class: None,
            read_only: true,
            typing: Typing::Static,
        }),
        // Instance field from a static method
        read_only(BindingRequest::FieldValue {
            name: UnqualifiedName::from_str("value").unwrap(),
            declaring_class: None,
            read_only: true,
            typing: Typing::Static,
        }),
        // No `on_throwable`, so nothing is caught
        exit(Advice::new(noop("(Ljava/lang/Throwable;)V")).bind(
            0,
            BindingRequest::Thrown {
                read_only: true,
                typing: Typing::Static,
            },
        )),
        // No entry advice
        exit(Advice::new(noop("(I)V")).bind(
            0,
            BindingRequest::Enter {
                read_only: true,
                typing: Typing::Static,
            },
        )),
        entry(Advice::new(noop("(Ljava/lang/Object;)V")).bind(
            0,
            BindingRequest::This {
                read_only: true,
                typing: Typing::Static,
                optional: false,
            },
        )),
        entry(Advice::new(noop("(Ljava/lang/String;)V")).bind(
            0,
            BindingRequest::Origin {
                pattern: String::from("#x"),
            },
        )),
    ];
    for advice in cases {
        let error = weave_error(&class_graph, &identity(), advice);
        assert_eq!(error.kind, ErrorKind::UnresolvedBinding, "{}", error);
    }

    // Optional bindings fall back to defaults instead
    let optional = entry(
        Advice::new(noop("(ILjava/lang/Object;)V"))
            .bind(
                0,
                BindingRequest::Argument {
                    index: 3,
                    read_only: true,
                    typing: Typing::Static,
                    optional: true,
                },
            )
            .bind(
                1,
                BindingRequest::This {
                    read_only: true,
                    typing: Typing::Static,
                    optional: true,
                },
            ),
    );
    weaver(&class_graph).weave(&identity(), &optional).unwrap();
}

#[test]
fn writes_must_be_declared() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let increment = advice_method(
        "increment",
        "(I)V",
        insns![Instruction::IInc(0, 1), BranchInstruction::Return],
    );
    let read_only = entry(Advice::new(increment.clone()).bind(0, BindingRequest::argument(0)));
    let error = weave_error(&class_graph, &identity(), read_only);
    assert_eq!(error.kind, ErrorKind::IllegalWriteToReadOnly);

    let origin_overwrite = advice_method(
        "overwrite",
        "(Ljava/lang/String;)V",
        insns![
            Instruction::AConstNull,
            Instruction::AStore(0),
            BranchInstruction::Return,
        ],
    );
    let origin = entry(Advice::new(origin_overwrite).bind(
        0,
        BindingRequest::Origin {
            pattern: String::from("#m"),
        },
    ));
    let error = weave_error(&class_graph, &identity(), origin);
    assert_eq!(error.kind, ErrorKind::IllegalWriteToReadOnly);

    // Writes to unused parameters are discarded
    let unused = entry(Advice::new(increment).bind(0, BindingRequest::Unused));
    weaver(&class_graph).weave(&identity(), &unused).unwrap();
}

#[test]
fn delegation_only_reads() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let writable = entry(
        Advice::new(noop("(I)V"))
            .bind(0, BindingRequest::argument_mut(0))
            .delegated(),
    );
    let error = weave_error(&class_graph, &identity(), writable);
    assert_eq!(error.kind, ErrorKind::WritableInDelegation);

    let read_only = entry(
        Advice::new(noop("(I)V"))
            .bind(0, BindingRequest::argument(0))
            .delegated(),
    );
    weaver(&class_graph).weave(&identity(), &read_only).unwrap();
}

#[test]
fn methods_need_code_and_advice_must_be_static() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let instance_advice = method(
        ADVICE,
        "instanceAdvice",
        "()V",
        MethodAccessFlags::PUBLIC,
        insns![BranchInstruction::Return],
    );
    let error = weave_error(&class_graph, &identity(), entry(Advice::new(instance_advice)));
    assert_eq!(error.kind, ErrorKind::NonStaticAdvice);

    let abstract_target = Method::new(
        binary_name(SAMPLE),
        UnqualifiedName::from_str("abstractTarget").unwrap(),
        MethodDescriptor::parse("()V").unwrap(),
        MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
    );
    let error = weave_error(&class_graph, &abstract_target, entry(Advice::new(noop("()V"))));
    assert_eq!(error.kind, ErrorKind::AbstractOrNative);

    let native_advice = Method::new(
        binary_name(ADVICE),
        UnqualifiedName::from_str("nativeAdvice").unwrap(),
        MethodDescriptor::parse("()V").unwrap(),
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE,
    );
    let error = weave_error(&class_graph, &identity(), entry(Advice::new(native_advice.clone())));
    assert_eq!(error.kind, ErrorKind::AbstractOrNative);

    // Native advice can still be called
    let delegated = entry(Advice::new(native_advice).delegated());
    weaver(&class_graph).weave(&identity(), &delegated).unwrap();
}

#[test]
fn broken_code_is_rejected() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let underflow = target(
        "underflow",
        "()I",
        insns![Instruction::IAdd, BranchInstruction::IReturn],
    );
    let error = weave_error(&class_graph, &underflow, entry(Advice::new(noop("()V"))));
    assert_eq!(error.kind, ErrorKind::InvalidTargetCode);
    assert!(error.cause.is_some());
    assert!(error.to_string().contains("underflow"), "{}", error);

    let falls_off = advice_method("fallsOff", "()V", insns![Instruction::Nop]);
    let error = weave_error(&class_graph, &identity(), entry(Advice::new(falls_off)));
    assert_eq!(error.kind, ErrorKind::InvalidTargetCode);
}

#[test]
fn errors_leave_target_untouched() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let target = identity();
    let before = target.code.as_ref().unwrap().insns().to_vec();
    let advice = AdviceSet::new()
        .with_entry(EntryAdvice::new(Advice::new(noop("()V"))))
        .with_exit(ExitAdvice::new(Advice::new(noop("(S)V")).bind(
            0,
            BindingRequest::Return {
                read_only: true,
                typing: Typing::Static,
            },
        )));
    let error = weave_error(&class_graph, &target, advice);
    assert_eq!(error.kind, ErrorKind::IllegalTypeAssignment);
    assert_eq!(target.code.as_ref().unwrap().insns(), before.as_slice());
}

#[test]
fn skip_on_index_needs_an_array() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let not_an_array = EntryAdvice::new(Advice::new(noop("()I")))
        .skip_on(ControlPredicate::NonDefaultValue)
        .skip_on_index(0);
    let error = weave_error(&class_graph, &identity(), AdviceSet::new().with_entry(not_an_array));
    assert_eq!(error.kind, ErrorKind::IllegalPrimitiveControlValue);

    let primitive_elements = EntryAdvice::new(Advice::new(noop("()[I")))
        .skip_on(ControlPredicate::InstanceOf(RefType::STRING))
        .skip_on_index(0);
    let error = weave_error(
        &class_graph,
        &identity(),
        AdviceSet::new().with_entry(primitive_elements),
    );
    assert_eq!(error.kind, ErrorKind::IllegalPrimitiveControlValue);
}

#[test]
fn assignments_must_resolve() {
    init_logging();
    let arenas = ClassGraphArenas::new();
    let class_graph = class_graph(&arenas);

    let assigning = |descriptor: &str, assignment: Assignment| {
        Advice::new(noop(descriptor)).assigning(AssignReturned::new().to(assignment))
    };
    let field = |name: &str| AssignTarget::Field {
        name: UnqualifiedName::from_str(name).unwrap(),
        declaring_class: None,
    };
    let scalar = Assignment::scalar;
    let cases = vec![
        (
            entry(assigning("()I", scalar(AssignTarget::Argument { index: 3 }))),
            identity(),
            ErrorKind::UnresolvedBinding,
        ),
        (
            entry(assigning("()Ljava/lang/String;", scalar(AssignTarget::Argument { index: 0 }))),
            identity(),
            ErrorKind::IllegalTypeAssignment,
        ),
        (
            entry(assigning("()Ljava/lang/Object;", scalar(AssignTarget::This))),
            identity(),
            ErrorKind::UnresolvedBinding,
        ),
        (
            exit(assigning("()Ljava/lang/Object;", scalar(AssignTarget::This))),
            sample_constructor(vec![]),
            ErrorKind::IllegalOnConstructor,
        ),
        (
            entry(assigning("()I", scalar(field("missing")))),
            identity(),
            ErrorKind::UnresolvedBinding,
        ),
        (
            entry(assigning("()I", scalar(field("value")))),
            identity(),
            ErrorKind::UnresolvedBinding,
        ),
        (
            entry(assigning("()I", scalar(AssignTarget::Returned))),
            identity(),
            ErrorKind::UnresolvedBinding,
        ),
        (
            exit(assigning("()I", Assignment::element(0, AssignTarget::Returned))),
            identity(),
            ErrorKind::IllegalTypeAssignment,
        ),
        (
            exit(assigning("()V", scalar(AssignTarget::Returned))),
            identity(),
            ErrorKind::IllegalTypeAssignment,
        ),
        (
            exit(assigning("()Ljava/lang/Throwable;", scalar(AssignTarget::Thrown))),
            identity(),
            ErrorKind::UnresolvedBinding,
        ),
    ];
    for (advice, target, kind) in cases {
        let error = weave_error(&class_graph, &target, advice);
        assert_eq!(error.kind, kind, "{}", error);
    }
}
