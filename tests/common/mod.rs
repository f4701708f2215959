//! Small bytecode interpreter for running woven methods
//!
//! It covers the instructions which show up in the test methods and advice, boxing through the
//! wrapper classes, and exception tables. Methods are found by name in a registry, and every
//! `<init>` of a class in `java/*` does nothing.
#![allow(dead_code)]

use jvm_advice::advice::{WeaveSettings, Weaver};
use jvm_advice::jvm::class_graph::{ClassData, ClassGraph, ClassGraphArenas, FieldData};
use jvm_advice::jvm::code::{
    BranchInstruction, CompareMode, Constant, EqComparison, Insn, Instruction, InstructionBuffer,
    InvokeType, Label, LabelGenerator, OrdComparison, SynLabelGenerator,
};
use jvm_advice::jvm::model::{FieldRef, Method, MethodRef};
use jvm_advice::jvm::{
    BaseType, BinaryName, FieldAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor, Name,
    ParseDescriptor, RefType, RenderDescriptor, UnqualifiedName,
};
use jvm_advice::util::Width;
use std::collections::HashMap;

/// Build a vector of instruction buffer entries from instructions, branches, and labels
macro_rules! insns {
    ($($insn:expr),* $(,)?) => {
        vec![$(jvm_advice::jvm::code::Insn::from($insn)),*]
    };
}

pub const SAMPLE: &str = "com/example/Sample";
pub const ADVICE: &str = "com/example/SampleAdvice";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn binary_name(name: &str) -> BinaryName {
    BinaryName::from_str(name).unwrap()
}

/// Class graph with the Java library types, the sample class and the advice class
///
/// `Sample` has instance fields `value: int` and `total: long` and a static `counter: int`.
/// `SampleAdvice` has static fields used by advice to record what it saw.
pub fn class_graph<'g>(arenas: &'g ClassGraphArenas<'g>) -> ClassGraph<'g> {
    let class_graph = ClassGraph::new(arenas);
    let java = class_graph.insert_java_library_types();

    let object = java.lang.object;
    let sample = class_graph.add_class(ClassData::new(binary_name(SAMPLE), object, false));
    let advice = class_graph.add_class(ClassData::new(binary_name(ADVICE), object, false));

    let fields = [
        (sample, "value", "I", FieldAccessFlags::PRIVATE),
        (sample, "total", "J", FieldAccessFlags::PRIVATE),
        (sample, "counter", "I", FieldAccessFlags::STATIC),
        (advice, "seen", "Ljava/lang/Object;", FieldAccessFlags::STATIC),
        (advice, "replacement", "Ljava/lang/Object;", FieldAccessFlags::STATIC),
        (advice, "seenInt", "I", FieldAccessFlags::STATIC),
        (advice, "seenLong", "J", FieldAccessFlags::STATIC),
        (advice, "seenString", "Ljava/lang/String;", FieldAccessFlags::STATIC),
        (advice, "seenClass", "Ljava/lang/Class;", FieldAccessFlags::STATIC),
        (advice, "suppressed", "Ljava/lang/Throwable;", FieldAccessFlags::STATIC),
    ];
    for (class, name, descriptor, access_flags) in fields {
        class_graph.add_field(FieldData {
            class,
            name: UnqualifiedName::from_str(name).unwrap(),
            descriptor: FieldType::parse(descriptor).unwrap(),
            access_flags,
        });
    }

    class_graph
}

/// Reference to one of the fields of `class_graph`
pub fn field(class: &str, name: &str, descriptor: &str) -> FieldRef {
    FieldRef {
        class: binary_name(class),
        name: UnqualifiedName::from_str(name).unwrap(),
        descriptor: FieldType::parse(descriptor).unwrap(),
    }
}

pub fn method(
    class: &str,
    name: &str,
    descriptor: &str,
    access_flags: MethodAccessFlags,
    code: Vec<Insn>,
) -> Method {
    Method::new(
        binary_name(class),
        UnqualifiedName::from_str(name).unwrap(),
        MethodDescriptor::parse(descriptor).unwrap(),
        access_flags,
    )
    .with_code(InstructionBuffer::from(code))
}

/// Public static method on `Sample`
pub fn target(name: &str, descriptor: &str, code: Vec<Insn>) -> Method {
    method(
        SAMPLE,
        name,
        descriptor,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        code,
    )
}

/// Public instance method on `Sample`
pub fn instance_target(name: &str, descriptor: &str, code: Vec<Insn>) -> Method {
    method(SAMPLE, name, descriptor, MethodAccessFlags::PUBLIC, code)
}

/// Static method on `SampleAdvice`
pub fn advice_method(name: &str, descriptor: &str, code: Vec<Insn>) -> Method {
    method(
        ADVICE,
        name,
        descriptor,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        code,
    )
}

/// Fresh labels, after skipping `skip` of them
pub fn labels_after<const N: usize>(skip: usize) -> [Label; N] {
    let mut generator = SynLabelGenerator::new();
    for _ in 0..skip {
        generator.fresh_label();
    }
    [(); N].map(|_| generator.fresh_label())
}

pub fn labels<const N: usize>() -> [Label; N] {
    labels_after(0)
}

/// `invokespecial class.<init>()V`
pub fn call_constructor(class: BinaryName) -> Instruction {
    let constructor = MethodRef {
        class,
        name: UnqualifiedName::INIT,
        descriptor: MethodDescriptor::parse("()V").unwrap(),
        is_interface: false,
    };
    Instruction::Invoke(InvokeType::Special, constructor)
}

/// `new class; dup; invokespecial class.<init>()V; athrow`
pub fn throw_new(class: BinaryName) -> Vec<Insn> {
    insns![
        Instruction::New(class.clone()),
        Instruction::Dup,
        call_constructor(class),
        BranchInstruction::AThrow,
    ]
}

/// `Sample.<init>()V` which only calls the `Object` constructor
pub fn sample_constructor(rest: Vec<Insn>) -> Method {
    let mut code = insns![Instruction::ALoad(0), call_constructor(BinaryName::OBJECT)];
    code.extend(rest);
    code.extend(insns![BranchInstruction::Return]);
    method(SAMPLE, "<init>", "()V", MethodAccessFlags::PUBLIC, code)
}

/// Static advice `()V` which appends a digit to `SampleAdvice.seenInt`
pub fn digit_advice(name: &str, digit: i32) -> Method {
    let seen_int = field(ADVICE, "seenInt", "I");
    advice_method(
        name,
        "()V",
        insns![
            Instruction::GetStatic(seen_int.clone()),
            Instruction::BiPush(10),
            Instruction::IMul,
            Instruction::push_int(digit),
            Instruction::IAdd,
            Instruction::PutStatic(seen_int),
            BranchInstruction::Return,
        ],
    )
}

pub fn weaver<'a, 'g>(class_graph: &'a ClassGraph<'g>) -> Weaver<'a, 'g> {
    Weaver::new(class_graph, WeaveSettings::default())
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Ref(usize),
    ReturnAddress(usize),
}

impl Value {
    fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn default_for(field_type: &FieldType) -> Value {
        match field_type {
            FieldType::Base(BaseType::Long) => Value::Long(0),
            FieldType::Base(BaseType::Float) => Value::Float(0.0),
            FieldType::Base(BaseType::Double) => Value::Double(0.0),
            FieldType::Base(_) => Value::Int(0),
            FieldType::Ref(_) => Value::Null,
        }
    }

    fn int(self) -> Result<i32, String> {
        match self {
            Value::Int(i) => Ok(i),
            other => Err(format!("expected int, found {:?}", other)),
        }
    }

    fn long(self) -> Result<i64, String> {
        match self {
            Value::Long(l) => Ok(l),
            other => Err(format!("expected long, found {:?}", other)),
        }
    }

    fn float(self) -> Result<f32, String> {
        match self {
            Value::Float(f) => Ok(f),
            other => Err(format!("expected float, found {:?}", other)),
        }
    }

    fn double(self) -> Result<f64, String> {
        match self {
            Value::Double(d) => Ok(d),
            other => Err(format!("expected double, found {:?}", other)),
        }
    }
}

/// Heap allocated objects
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Instance {
        class: BinaryName,
        fields: HashMap<String, Value>,
    },
    Boxed(BaseType, Value),
    Array(RefType, Vec<Value>),
    Str(String),
    Class(RefType),
}

/// How a method invocation completed
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Return(Option<Value>),
    Throw(Value),
}

impl Outcome {
    pub fn returned(&self) -> Option<Value> {
        match self {
            Outcome::Return(value) => *value,
            Outcome::Throw(exception) => {
                panic!("expected a return, but {:?} was thrown", exception)
            }
        }
    }
}

/// Interpreter state
pub struct Machine<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
    pub heap: Vec<Object>,

    /// Static fields, keyed by `class.name`
    pub statics: HashMap<String, Value>,

    /// Methods which can be invoked, keyed by `class.name(descriptor)`
    methods: HashMap<String, Method>,

    /// Number of times each method was invoked
    pub invocations: HashMap<String, usize>,

    /// Bound on the number of instructions executed
    fuel: usize,
}

impl<'a, 'g> Machine<'a, 'g> {
    pub fn new(class_graph: &'a ClassGraph<'g>) -> Machine<'a, 'g> {
        Machine {
            class_graph,
            heap: vec![],
            statics: HashMap::new(),
            methods: HashMap::new(),
            invocations: HashMap::new(),
            fuel: 1_000_000,
        }
    }

    fn method_key(
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> String {
        format!("{}.{}{}", class, name, descriptor.render())
    }

    /// Make a method callable
    pub fn register(&mut self, method: &Method) {
        let key = Self::method_key(&method.class, &method.name, &method.descriptor);
        self.methods.insert(key, method.clone());
    }

    /// Number of times a method was invoked (through `invoke` or from code)
    pub fn invocation_count(&self, method: &Method) -> usize {
        let key = Self::method_key(&method.class, &method.name, &method.descriptor);
        self.invocations.get(&key).copied().unwrap_or(0)
    }

    pub fn alloc(&mut self, object: Object) -> Value {
        self.heap.push(object);
        Value::Ref(self.heap.len() - 1)
    }

    pub fn new_instance(&mut self, class: &str) -> Value {
        self.alloc(Object::Instance {
            class: binary_name(class),
            fields: HashMap::new(),
        })
    }

    pub fn string(&mut self, string: &str) -> Value {
        self.alloc(Object::Str(string.to_owned()))
    }

    pub fn boxed(&mut self, base_type: BaseType, value: Value) -> Value {
        self.alloc(Object::Boxed(base_type, value))
    }

    pub fn object(&self, value: Value) -> Option<&Object> {
        match value {
            Value::Ref(idx) => self.heap.get(idx),
            _ => None,
        }
    }

    pub fn string_value(&self, value: Value) -> Option<&str> {
        match self.object(value) {
            Some(Object::Str(string)) => Some(string),
            _ => None,
        }
    }

    pub fn unboxed(&self, value: Value) -> Option<(BaseType, Value)> {
        match self.object(value) {
            Some(Object::Boxed(base_type, value)) => Some((*base_type, *value)),
            _ => None,
        }
    }

    pub fn set_static(&mut self, class: &str, name: &str, value: Value) {
        self.statics.insert(format!("{}.{}", class, name), value);
    }

    pub fn get_static(&self, class: &str, name: &str) -> Option<Value> {
        self.statics.get(&format!("{}.{}", class, name)).copied()
    }

    pub fn set_field(&mut self, object: Value, name: &str, value: Value) {
        if let Value::Ref(idx) = object {
            if let Some(Object::Instance { fields, .. }) = self.heap.get_mut(idx) {
                fields.insert(name.to_owned(), value);
            }
        }
    }

    pub fn get_field(&self, object: Value, name: &str) -> Option<Value> {
        match self.object(object) {
            Some(Object::Instance { fields, .. }) => fields.get(name).copied(),
            _ => None,
        }
    }

    /// Runtime type of a non-null reference
    pub fn type_of(&self, value: Value) -> Option<RefType> {
        Some(match self.object(value)? {
            Object::Instance { class, .. } => RefType::Object(class.clone()),
            Object::Boxed(base_type, _) => RefType::Object(base_type.boxed_class()),
            Object::Array(array_type, _) => array_type.clone(),
            Object::Str(_) => RefType::STRING,
            Object::Class(_) => RefType::CLASS,
        })
    }

    fn is_instance(&self, value: Value, ref_type: &RefType) -> bool {
        match self.type_of(value) {
            Some(runtime_type) => self.class_graph.is_java_assignable(&runtime_type, ref_type),
            None => false,
        }
    }

    /// Invoke a method with arguments (including the receiver first, for instance methods)
    pub fn invoke(&mut self, method: &Method, args: Vec<Value>) -> Result<Outcome, String> {
        let key = Self::method_key(&method.class, &method.name, &method.descriptor);
        *self.invocations.entry(key).or_insert(0) += 1;
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| format!("{} has no code", method.signature()))?;
        self.execute(method, code, args)
    }

    fn execute(
        &mut self,
        method: &Method,
        code: &InstructionBuffer,
        args: Vec<Value>,
    ) -> Result<Outcome, String> {
        let positions = code.label_positions().map_err(|err| format!("{:?}", err))?;
        let mut handlers = vec![];
        for block in code.try_catch_blocks() {
            handlers.push((
                positions[&block.start],
                positions[&block.end],
                positions[&block.handler],
                block.catch_type.clone(),
            ));
        }

        let mut locals: HashMap<u16, Value> = HashMap::new();
        let mut args = args.into_iter();
        let mut slot: u16 = 0;
        if !method.is_static() {
            locals.insert(0, args.next().ok_or("missing receiver")?);
            slot = 1;
        }
        for parameter in &method.descriptor.parameters {
            let arg = args.next().ok_or("missing argument")?;
            locals.insert(slot, arg);
            slot += parameter.width() as u16;
        }

        let insns = code.insns();
        let mut stack: Vec<Value> = vec![];
        let mut pc = 0;
        loop {
            if self.fuel == 0 {
                return Err(String::from("out of fuel"));
            }
            self.fuel -= 1;

            let thrown = match insns.get(pc) {
                None => return Err(format!("fell off the end of {}", method.signature())),
                Some(Insn::Label(_)) => {
                    pc += 1;
                    None
                }
                Some(Insn::Instruction(insn)) => {
                    let thrown = self.step(insn, &mut stack, &mut locals)?;
                    if thrown.is_none() {
                        pc += 1;
                    }
                    thrown
                }
                Some(Insn::Branch(branch)) => {
                    match self.branch(branch, pc, &mut stack, &mut locals)? {
                        Control::Next => {
                            pc += 1;
                            None
                        }
                        Control::Jump(label) => {
                            pc = positions[&label];
                            None
                        }
                        Control::Call(..) => return Err(String::from("unexpected subroutine call")),
                        Control::Resume(position) => {
                            pc = position;
                            None
                        }
                        Control::Return(value) => return Ok(Outcome::Return(value)),
                        Control::Throw(exception) => Some(exception),
                    }
                }
            };

            if let Some(exception) = thrown {
                let exception_type = self
                    .type_of(exception)
                    .ok_or_else(|| format!("thrown {:?} is not an object", exception))?;
                let handler = handlers.iter().find(|(start, end, _, catch_type)| {
                    *start <= pc
                        && pc < *end
                        && catch_type.as_ref().map_or(true, |catch_type| {
                            self.class_graph.is_java_assignable(
                                &exception_type,
                                &RefType::Object(catch_type.clone()),
                            )
                        })
                });
                match handler {
                    Some((_, _, handler, _)) => {
                        stack.clear();
                        stack.push(exception);
                        pc = *handler;
                    }
                    None => return Ok(Outcome::Throw(exception)),
                }
            }
        }
    }

    /// Execute a non-branching instruction, returning any exception thrown
    fn step(
        &mut self,
        insn: &Instruction,
        stack: &mut Vec<Value>,
        locals: &mut HashMap<u16, Value>,
    ) -> Result<Option<Value>, String> {
        use Instruction::*;

        macro_rules! pop {
            () => {
                stack.pop().ok_or("stack underflow")?
            };
        }
        macro_rules! binary {
            ($get:ident, $wrap:ident, $op:expr) => {{
                let rhs = pop!().$get()?;
                let lhs = pop!().$get()?;
                stack.push(Value::$wrap($op(lhs, rhs)));
            }};
        }

        match insn {
            Nop => (),
            AConstNull => stack.push(Value::Null),
            IConstM1 => stack.push(Value::Int(-1)),
            IConst0 => stack.push(Value::Int(0)),
            IConst1 => stack.push(Value::Int(1)),
            IConst2 => stack.push(Value::Int(2)),
            IConst3 => stack.push(Value::Int(3)),
            IConst4 => stack.push(Value::Int(4)),
            IConst5 => stack.push(Value::Int(5)),
            LConst0 => stack.push(Value::Long(0)),
            LConst1 => stack.push(Value::Long(1)),
            FConst0 => stack.push(Value::Float(0.0)),
            FConst1 => stack.push(Value::Float(1.0)),
            FConst2 => stack.push(Value::Float(2.0)),
            DConst0 => stack.push(Value::Double(0.0)),
            DConst1 => stack.push(Value::Double(1.0)),
            BiPush(b) => stack.push(Value::Int(*b as i32)),
            SiPush(s) => stack.push(Value::Int(*s as i32)),
            Ldc(constant) | Ldc2(constant) => {
                let value = match constant {
                    Constant::Integer(i) => Value::Int(*i),
                    Constant::Float(f) => Value::Float(*f),
                    Constant::Long(l) => Value::Long(*l),
                    Constant::Double(d) => Value::Double(*d),
                    Constant::String(s) => self.alloc(Object::Str(s.clone())),
                    Constant::Class(ref_type) => self.alloc(Object::Class(ref_type.clone())),
                };
                stack.push(value);
            }

            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) => {
                let value = locals
                    .get(idx)
                    .copied()
                    .ok_or_else(|| format!("local {} is unset", idx))?;
                stack.push(value);
            }
            IStore(idx) | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) => {
                let value = pop!();
                locals.insert(*idx, value);
            }
            IInc(idx, delta) => {
                let value = locals.get(idx).copied().ok_or("iinc of unset local")?.int()?;
                locals.insert(*idx, Value::Int(value.wrapping_add(*delta as i32)));
            }

            AALoad | IALoad | LALoad | FALoad | DALoad | BALoad | CALoad | SALoad => {
                let index = pop!().int()?;
                let array = pop!();
                match self.object(array) {
                    Some(Object::Array(_, values)) => {
                        let value = *values
                            .get(index as usize)
                            .ok_or("array index out of bounds")?;
                        stack.push(value);
                    }
                    _ => return Err(format!("{:?} is not an array", array)),
                }
            }
            AAStore | IAStore | LAStore | FAStore | DAStore | BAStore | CAStore | SAStore => {
                let value = pop!();
                let index = pop!().int()?;
                match pop!() {
                    Value::Ref(idx) => match self.heap.get_mut(idx) {
                        Some(Object::Array(_, values)) => {
                            let slot = values
                                .get_mut(index as usize)
                                .ok_or("array index out of bounds")?;
                            *slot = value;
                        }
                        _ => return Err(String::from("store into a non-array")),
                    },
                    other => return Err(format!("{:?} is not an array", other)),
                }
            }
            ANewArray(element_type) => {
                let length = pop!().int()?;
                let array_type = RefType::array(FieldType::Ref(element_type.clone()));
                let elements = vec![Value::Null; length as usize];
                let array = self.alloc(Object::Array(array_type, elements));
                stack.push(array);
            }
            NewArray(base_type) => {
                let length = pop!().int()?;
                let element = Value::default_for(&FieldType::Base(*base_type));
                let array_type = RefType::array(FieldType::Base(*base_type));
                let array = self.alloc(Object::Array(array_type, vec![element; length as usize]));
                stack.push(array);
            }
            ArrayLength => match self.object(pop!()) {
                Some(Object::Array(_, values)) => stack.push(Value::Int(values.len() as i32)),
                _ => return Err(String::from("arraylength of a non-array")),
            },

            Pop => {
                pop!();
            }
            Pop2 => {
                if !pop!().is_wide() {
                    pop!();
                }
            }
            Dup => {
                let value = *stack.last().ok_or("stack underflow")?;
                stack.push(value);
            }
            DupX1 => {
                let value1 = pop!();
                let value2 = pop!();
                stack.extend([value1, value2, value1]);
            }
            DupX2 => {
                let value1 = pop!();
                let value2 = pop!();
                if value2.is_wide() {
                    stack.extend([value1, value2, value1]);
                } else {
                    let value3 = pop!();
                    stack.extend([value1, value3, value2, value1]);
                }
            }
            Dup2 => {
                let value1 = pop!();
                if value1.is_wide() {
                    stack.extend([value1, value1]);
                } else {
                    let value2 = pop!();
                    stack.extend([value2, value1, value2, value1]);
                }
            }
            Swap => {
                let value1 = pop!();
                let value2 = pop!();
                stack.extend([value1, value2]);
            }

            IAdd => binary!(int, Int, |a: i32, b: i32| a.wrapping_add(b)),
            LAdd => binary!(long, Long, |a: i64, b: i64| a.wrapping_add(b)),
            FAdd => binary!(float, Float, |a: f32, b: f32| a + b),
            DAdd => binary!(double, Double, |a: f64, b: f64| a + b),
            ISub => binary!(int, Int, |a: i32, b: i32| a.wrapping_sub(b)),
            LSub => binary!(long, Long, |a: i64, b: i64| a.wrapping_sub(b)),
            IMul => binary!(int, Int, |a: i32, b: i32| a.wrapping_mul(b)),
            LMul => binary!(long, Long, |a: i64, b: i64| a.wrapping_mul(b)),
            DMul => binary!(double, Double, |a: f64, b: f64| a * b),
            INeg => {
                let value = pop!().int()?;
                stack.push(Value::Int(value.wrapping_neg()));
            }

            I2L => {
                let value = pop!().int()?;
                stack.push(Value::Long(value as i64));
            }
            I2F => {
                let value = pop!().int()?;
                stack.push(Value::Float(value as f32));
            }
            I2D => {
                let value = pop!().int()?;
                stack.push(Value::Double(value as f64));
            }
            L2I => {
                let value = pop!().long()?;
                stack.push(Value::Int(value as i32));
            }
            L2F => {
                let value = pop!().long()?;
                stack.push(Value::Float(value as f32));
            }
            L2D => {
                let value = pop!().long()?;
                stack.push(Value::Double(value as f64));
            }
            F2D => {
                let value = pop!().float()?;
                stack.push(Value::Double(value as f64));
            }

            LCmp => {
                let rhs = pop!().long()?;
                let lhs = pop!().long()?;
                stack.push(Value::Int(lhs.cmp(&rhs) as i32));
            }
            FCmp(mode) => {
                let rhs = pop!().float()?;
                let lhs = pop!().float()?;
                stack.push(Value::Int(float_compare(
                    lhs.partial_cmp(&rhs),
                    *mode,
                )));
            }
            DCmp(mode) => {
                let rhs = pop!().double()?;
                let lhs = pop!().double()?;
                stack.push(Value::Int(float_compare(
                    lhs.partial_cmp(&rhs),
                    *mode,
                )));
            }

            GetStatic(field) => {
                let value = self
                    .get_static(field.class.as_str(), field.name.as_str())
                    .unwrap_or_else(|| Value::default_for(&field.descriptor));
                stack.push(value);
            }
            PutStatic(field) => {
                let value = pop!();
                self.set_static(field.class.as_str(), field.name.as_str(), value);
            }
            GetField(field) => {
                let object = pop!();
                if object == Value::Null {
                    return Err(format!("null receiver for {:?}", field));
                }
                let value = self
                    .get_field(object, field.name.as_str())
                    .unwrap_or_else(|| Value::default_for(&field.descriptor));
                stack.push(value);
            }
            PutField(field) => {
                let value = pop!();
                let object = pop!();
                if object == Value::Null {
                    return Err(format!("null receiver for {:?}", field));
                }
                self.set_field(object, field.name.as_str(), value);
            }

            Invoke(invoke_type, method) => {
                return self.invoke_instruction(*invoke_type, method, stack)
            }
            New(class) => {
                let object = self.alloc(Object::Instance {
                    class: class.clone(),
                    fields: HashMap::new(),
                });
                stack.push(object);
            }
            CheckCast(ref_type) => {
                let value = *stack.last().ok_or("stack underflow")?;
                if value != Value::Null && !self.is_instance(value, ref_type) {
                    return Err(format!("{:?} is not a {:?}", self.type_of(value), ref_type));
                }
            }
            InstanceOf(ref_type) => {
                let value = pop!();
                let is_instance = value != Value::Null && self.is_instance(value, ref_type);
                stack.push(Value::Int(is_instance as i32));
            }

            other => return Err(format!("unsupported instruction {:?}", other)),
        }
        Ok(None)
    }

    fn invoke_instruction(
        &mut self,
        invoke_type: InvokeType,
        method: &MethodRef,
        stack: &mut Vec<Value>,
    ) -> Result<Option<Value>, String> {
        let mut args = vec![];
        for _ in &method.descriptor.parameters {
            args.push(stack.pop().ok_or("stack underflow")?);
        }
        if invoke_type != InvokeType::Static {
            args.push(stack.pop().ok_or("stack underflow")?);
        }
        args.reverse();

        // Boxing intrinsics
        if let Some(base_type) = BaseType::unboxed_from(&method.class) {
            if method.name == UnqualifiedName::VALUEOF && invoke_type == InvokeType::Static {
                let boxed = self.boxed(base_type, args[0]);
                stack.push(boxed);
                return Ok(None);
            }
            if method.name == base_type.unboxing_method() {
                match self.unboxed(args[0]) {
                    Some((found, value)) if found == base_type => stack.push(value),
                    _ => return Err(format!("cannot unbox {:?} as {:?}", args[0], base_type)),
                }
                return Ok(None);
            }
        }

        let key = Self::method_key(&method.class, &method.name, &method.descriptor);
        let callee = match self.methods.get(&key) {
            Some(callee) => callee.clone(),
            None if method.name == UnqualifiedName::INIT
                && method.class.as_str().starts_with("java/") =>
            {
                return Ok(None)
            }
            None => return Err(format!("unknown method {}", key)),
        };
        match self.invoke(&callee, args)? {
            Outcome::Return(Some(value)) => stack.push(value),
            Outcome::Return(None) => (),
            Outcome::Throw(exception) => return Ok(Some(exception)),
        }
        Ok(None)
    }

    fn branch(
        &mut self,
        branch: &BranchInstruction,
        pc: usize,
        stack: &mut Vec<Value>,
        locals: &mut HashMap<u16, Value>,
    ) -> Result<Control, String> {
        use BranchInstruction::*;

        let mut pop = || stack.pop().ok_or_else(|| String::from("stack underflow"));
        let control = match branch {
            If(comparison, label) => {
                let value = pop()?.int()?;
                jump_if(compare(*comparison, value, 0), *label)
            }
            IfICmp(comparison, label) => {
                let rhs = pop()?.int()?;
                let lhs = pop()?.int()?;
                jump_if(compare(*comparison, lhs, rhs), *label)
            }
            IfACmp(comparison, label) => {
                let rhs = pop()?;
                let lhs = pop()?;
                jump_if((lhs == rhs) == (*comparison == EqComparison::EQ), *label)
            }
            IfNull(comparison, label) => {
                let value = pop()?;
                jump_if((value == Value::Null) == (*comparison == EqComparison::EQ), *label)
            }
            Goto(label) => Control::Jump(*label),
            TableSwitch {
                default,
                low,
                targets,
            } => {
                let value = pop()?.int()?;
                let target = usize::try_from(value.wrapping_sub(*low))
                    .ok()
                    .and_then(|idx| targets.get(idx))
                    .unwrap_or(default);
                Control::Jump(*target)
            }
            LookupSwitch { default, targets } => {
                let value = pop()?.int()?;
                let target = targets
                    .iter()
                    .find(|(key, _)| *key == value)
                    .map(|(_, target)| target)
                    .unwrap_or(default);
                Control::Jump(*target)
            }
            IReturn | LReturn | FReturn | DReturn | AReturn => Control::Return(Some(pop()?)),
            Return => Control::Return(None),
            AThrow => {
                let exception = pop()?;
                if exception == Value::Null {
                    return Err(String::from("throwing null"));
                }
                Control::Throw(exception)
            }
            Jsr(label) => Control::Call(pc + 1, *label),
            Ret(idx) => match locals.get(idx) {
                Some(Value::ReturnAddress(position)) => Control::Resume(*position),
                other => return Err(format!("ret to {:?}", other)),
            },
        };
        if let Control::Call(return_position, label) = control {
            stack.push(Value::ReturnAddress(return_position));
            return Ok(Control::Jump(label));
        }
        Ok(control)
    }
}

/// What to do after a branch instruction
enum Control {
    Next,
    Jump(Label),
    Call(usize, Label),
    Resume(usize),
    Return(Option<Value>),
    Throw(Value),
}

fn jump_if(condition: bool, label: Label) -> Control {
    if condition {
        Control::Jump(label)
    } else {
        Control::Next
    }
}

fn compare(comparison: OrdComparison, lhs: i32, rhs: i32) -> bool {
    match comparison {
        OrdComparison::EQ => lhs == rhs,
        OrdComparison::NE => lhs != rhs,
        OrdComparison::LT => lhs < rhs,
        OrdComparison::LE => lhs <= rhs,
        OrdComparison::GT => lhs > rhs,
        OrdComparison::GE => lhs >= rhs,
    }
}

fn float_compare(ordering: Option<std::cmp::Ordering>, mode: CompareMode) -> i32 {
    match ordering {
        Some(ordering) => ordering as i32,
        None => match mode {
            CompareMode::L => -1,
            CompareMode::G => 1,
        },
    }
}
