use crate::jvm::model::{FieldRef, Method};
use crate::jvm::{BinaryName, RefType, UnqualifiedName};

/// How strictly a value must match the advice parameter type it is bound to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Typing {
    /// Only identity, widening primitive conversions, boxing/unboxing, and upcasts are allowed
    Static,

    /// Downcasts are allowed too (with a `checkcast`)
    Dynamic,
}

/// Value an advice parameter is bound to
///
/// Exactly one of these must be given for every parameter of an advice method.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingRequest {
    /// Argument of the target method
    ///
    /// When `optional` is set and the target has too few parameters, the advice parameter is
    /// the default value of its type instead.
    Argument {
        index: usize,
        read_only: bool,
        typing: Typing,
        optional: bool,
    },

    /// All arguments of the target method, boxed into an `Object[]`
    AllArguments { read_only: bool, typing: Typing },

    /// Receiver of the target method
    ///
    /// When `optional` is set and the target is static, the advice parameter is `null`.
    This {
        read_only: bool,
        typing: Typing,
        optional: bool,
    },

    /// Field visible from the target method
    ///
    /// The field is looked up from `declaring_class` (or the class of the target method) through
    /// its superclasses.
    FieldValue {
        name: UnqualifiedName,
        declaring_class: Option<BinaryName>,
        read_only: bool,
        typing: Typing,
    },

    /// Description of the target method, bound to a `String` or a `Class`
    ///
    /// The pattern can contain `#t` (declaring type), `#m` (method name), `#d` (descriptor),
    /// `#r` (return type), and `#p` (parameter types). `\#` is a literal `#`. An empty pattern
    /// describes the method the way `java.lang.reflect.Method#toString` would.
    Origin { pattern: String },

    /// Value returned by the entry advice (exit advice only)
    Enter { read_only: bool, typing: Typing },

    /// Value returned by the exit advice the last time it ran (exit advice only)
    ///
    /// This is the default value of the type before the exit advice first runs.
    Exit { read_only: bool, typing: Typing },

    /// Value returned by the target method (exit advice only)
    Return { read_only: bool, typing: Typing },

    /// Value returned by the target method, boxed (exit advice only)
    BoxedReturn { read_only: bool },

    /// Exception thrown by the target method, or `null` (exit advice only)
    Thrown { read_only: bool, typing: Typing },

    /// Named local variable shared between entry and exit advice
    Local { name: String },

    /// Boxed default value of the return type of the target method
    StubValue,

    /// Default value of the parameter type (writes are discarded)
    Unused,
}

impl BindingRequest {
    /// Read-only binding to an argument
    pub fn argument(index: usize) -> BindingRequest {
        BindingRequest::Argument {
            index,
            read_only: true,
            typing: Typing::Static,
            optional: false,
        }
    }

    /// Writable binding to an argument
    pub fn argument_mut(index: usize) -> BindingRequest {
        BindingRequest::Argument {
            index,
            read_only: false,
            typing: Typing::Static,
            optional: false,
        }
    }

    /// Does the binding ask for written values to be stored back?
    pub fn is_writable(&self) -> bool {
        match self {
            BindingRequest::Argument { read_only, .. }
            | BindingRequest::AllArguments { read_only, .. }
            | BindingRequest::This { read_only, .. }
            | BindingRequest::FieldValue { read_only, .. }
            | BindingRequest::Enter { read_only, .. }
            | BindingRequest::Exit { read_only, .. }
            | BindingRequest::Return { read_only, .. }
            | BindingRequest::BoxedReturn { read_only }
            | BindingRequest::Thrown { read_only, .. } => !read_only,
            BindingRequest::Origin { .. }
            | BindingRequest::Local { .. }
            | BindingRequest::StubValue
            | BindingRequest::Unused => false,
        }
    }

    /// Does the binding only make sense once the target body has run?
    pub fn is_exit_only(&self) -> bool {
        matches!(
            self,
            BindingRequest::Enter { .. }
                | BindingRequest::Exit { .. }
                | BindingRequest::Return { .. }
                | BindingRequest::BoxedReturn { .. }
                | BindingRequest::Thrown { .. }
        )
    }
}

/// Condition on the value returned by advice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPredicate {
    /// Value is `false`, `0`, `0.0`, or `null`
    DefaultValue,

    /// Value is not the default value of its type
    NonDefaultValue,

    /// Value is a (non-null) instance of the type
    InstanceOf(RefType),
}

/// Exceptions from advice code which are caught and discarded
#[derive(Debug, Clone, PartialEq)]
pub struct Suppression {
    /// Class of exceptions to catch
    pub exception: BinaryName,

    /// Static field into which caught exceptions are stored instead of being dropped
    pub backing_field: Option<FieldRef>,
}

/// Value of the target method which the value returned by advice can be assigned to
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Argument { index: usize },

    /// Every argument, from the elements of an `Object[]`
    AllArguments,

    This,

    /// Field visible from the target method, looked up like [`BindingRequest::FieldValue`]
    Field {
        name: UnqualifiedName,
        declaring_class: Option<BinaryName>,
    },

    /// Value the target method returns (exit advice only)
    Returned,

    /// Exception the target method throws, where `null` clears it (exit advice only)
    Thrown,
}

/// One assignment of the value returned by advice
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: AssignTarget,

    /// Element of the returned array to assign (the whole value when absent)
    pub element: Option<usize>,

    pub typing: Typing,
}

impl Assignment {
    /// Assign the whole returned value
    pub fn scalar(target: AssignTarget) -> Assignment {
        Assignment {
            target,
            element: None,
            typing: Typing::Static,
        }
    }

    /// Assign one element of the returned array
    pub fn element(index: usize, target: AssignTarget) -> Assignment {
        Assignment {
            target,
            element: Some(index),
            typing: Typing::Static,
        }
    }

    pub fn dynamic(mut self) -> Assignment {
        self.typing = Typing::Dynamic;
        self
    }
}

/// Assignments run right after the advice, using the value it returned
///
/// Element assignments are all skipped when the returned array is `null`. Whole value assignments
/// are skipped when the value is the default of its type, unless `skip_on_default_value` is off.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignReturned {
    pub assignments: Vec<Assignment>,
    pub skip_on_default_value: bool,

    /// Exceptions thrown while assigning (such as a failed cast) which are caught and discarded
    pub suppress: Option<BinaryName>,
}

impl Default for AssignReturned {
    fn default() -> AssignReturned {
        AssignReturned {
            assignments: vec![],
            skip_on_default_value: true,
            suppress: None,
        }
    }
}

impl AssignReturned {
    pub fn new() -> AssignReturned {
        AssignReturned::default()
    }

    pub fn to(mut self, assignment: Assignment) -> AssignReturned {
        self.assignments.push(assignment);
        self
    }

    /// Assign whole values even when they are the default of their type
    pub fn keep_default_values(mut self) -> AssignReturned {
        self.skip_on_default_value = false;
        self
    }

    pub fn suppressing(mut self, exception: BinaryName) -> AssignReturned {
        self.suppress = Some(exception);
        self
    }
}

/// Static method whose code is run at entry or at exit of a target method
#[derive(Debug, Clone)]
pub struct Advice {
    pub method: Method,

    /// Binding requests for each parameter of the method
    pub parameters: Vec<Vec<BindingRequest>>,

    pub suppress: Option<Suppression>,

    /// Copy the advice code into the target (otherwise it is called)
    pub inline: bool,

    pub assign_returned: Option<AssignReturned>,
}

impl Advice {
    /// Inline advice, with no bindings yet
    pub fn new(method: Method) -> Advice {
        let parameters = vec![vec![]; method.descriptor.parameters.len()];
        Advice {
            method,
            parameters,
            suppress: None,
            inline: true,
            assign_returned: None,
        }
    }

    /// Add a binding request for a parameter
    pub fn bind(mut self, parameter: usize, request: BindingRequest) -> Advice {
        if parameter >= self.parameters.len() {
            self.parameters.resize(parameter + 1, vec![]);
        }
        self.parameters[parameter].push(request);
        self
    }

    pub fn suppressing(mut self, suppress: Suppression) -> Advice {
        self.suppress = Some(suppress);
        self
    }

    /// Call the advice method instead of copying its code
    pub fn delegated(mut self) -> Advice {
        self.inline = false;
        self
    }

    pub fn assigning(mut self, assign_returned: AssignReturned) -> Advice {
        self.assign_returned = Some(assign_returned);
        self
    }

    /// `Class.method` for messages
    pub fn name(&self) -> String {
        format!("{}.{}", self.method.class, self.method.signature())
    }
}

/// Advice run before the body of the target method
#[derive(Debug, Clone)]
pub struct EntryAdvice {
    pub advice: Advice,

    /// Skip the target body when the value returned by the advice matches
    ///
    /// A skipped body behaves as if it had returned the default value of its return type.
    pub skip_on: Option<ControlPredicate>,

    /// Test this element of the returned array instead of the whole value
    ///
    /// A `null` array never skips.
    pub skip_on_index: Option<usize>,
}

impl EntryAdvice {
    pub fn new(advice: Advice) -> EntryAdvice {
        EntryAdvice {
            advice,
            skip_on: None,
            skip_on_index: None,
        }
    }

    pub fn skip_on(mut self, predicate: ControlPredicate) -> EntryAdvice {
        self.skip_on = Some(predicate);
        self
    }

    pub fn skip_on_index(mut self, index: usize) -> EntryAdvice {
        self.skip_on_index = Some(index);
        self
    }
}

/// Advice run after the body of the target method
#[derive(Debug, Clone)]
pub struct ExitAdvice {
    pub advice: Advice,

    /// Run the target body again when the value returned by the advice matches
    pub repeat_on: Option<ControlPredicate>,

    /// Also run the advice when the body throws an exception of this class
    pub on_throwable: Option<BinaryName>,

    /// Let the body work on copies of the arguments
    ///
    /// The exit advice (and the body when it is repeated) then sees the arguments as they were
    /// when the body started, whatever the body wrote to them.
    pub backup_arguments: bool,
}

impl ExitAdvice {
    pub fn new(advice: Advice) -> ExitAdvice {
        ExitAdvice {
            advice,
            repeat_on: None,
            on_throwable: None,
            backup_arguments: true,
        }
    }

    /// Let the body write straight into the argument slots
    pub fn without_argument_backup(mut self) -> ExitAdvice {
        self.backup_arguments = false;
        self
    }

    pub fn repeat_on(mut self, predicate: ControlPredicate) -> ExitAdvice {
        self.repeat_on = Some(predicate);
        self
    }

    pub fn on_throwable(mut self, exception: BinaryName) -> ExitAdvice {
        self.on_throwable = Some(exception);
        self
    }
}

/// Advice woven into a method at once
#[derive(Debug, Clone, Default)]
pub struct AdviceSet {
    pub entry: Option<EntryAdvice>,
    pub exit: Option<ExitAdvice>,
}

impl AdviceSet {
    pub fn new() -> AdviceSet {
        AdviceSet::default()
    }

    pub fn with_entry(mut self, entry: EntryAdvice) -> AdviceSet {
        self.entry = Some(entry);
        self
    }

    pub fn with_exit(mut self, exit: ExitAdvice) -> AdviceSet {
        self.exit = Some(exit);
        self
    }
}
