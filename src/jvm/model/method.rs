use super::MethodRef;
use crate::jvm::code::InstructionBuffer;
use crate::jvm::{
    BinaryName, FieldType, MethodAccessFlags, MethodDescriptor, RefType, RenderDescriptor,
    UnqualifiedName,
};

/// Semantic representation of a method
#[derive(Clone, Debug)]
pub struct Method {
    /// Class declaring the method
    pub class: BinaryName,

    /// Name of the method
    pub name: UnqualifiedName,

    /// Type of the method
    pub descriptor: MethodDescriptor,

    pub access_flags: MethodAccessFlags,

    /// Which exceptions can this method throw?
    ///
    /// Note: this does not need to include `RuntimeException`, `Error`, or subclasses
    pub exceptions: Vec<BinaryName>,

    /// Method body (missing for `abstract` and `native` methods)
    pub code: Option<InstructionBuffer>,
}

impl Method {
    /// Create a new method without a body
    pub fn new(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        access_flags: MethodAccessFlags,
    ) -> Method {
        Method {
            class,
            name,
            descriptor,
            access_flags,
            exceptions: vec![],
            code: None,
        }
    }

    pub fn with_code(mut self, code: InstructionBuffer) -> Method {
        self.code = Some(code);
        self
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Is this an instance initializer (`<init>`)?
    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }

    pub fn return_type(&self) -> Option<&FieldType> {
        self.descriptor.return_type.as_ref()
    }

    /// Size of the local variables holding the receiver and the parameters on entry
    pub fn parameters_length(&self) -> usize {
        self.descriptor.parameter_length(!self.is_static())
    }

    /// Local variable holding the parameter at this index
    pub fn parameter_offset(&self, index: usize) -> Option<u16> {
        self.descriptor.parameter_offset(index, !self.is_static())
    }

    pub fn receiver_type(&self) -> RefType {
        RefType::Object(self.class.clone())
    }

    pub fn method_ref(&self, is_interface: bool) -> MethodRef {
        MethodRef {
            class: self.class.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            is_interface,
        }
    }

    /// Render the method the way `java.lang.reflect.Method#toString` (or `Constructor#toString`)
    /// does, for example `public static int com.example.Sample.foo(int,java.lang.String)`
    pub fn java_string(&self) -> String {
        let mut rendered = String::new();
        for modifier in self.access_flags.java_modifiers() {
            rendered.push_str(modifier);
            rendered.push(' ');
        }
        if !self.is_constructor() {
            match self.return_type() {
                None => rendered.push_str("void"),
                Some(return_type) => rendered.push_str(&return_type.java_name()),
            }
            rendered.push(' ');
        }
        rendered.push_str(&self.class.java_name());
        if !self.is_constructor() {
            rendered.push('.');
            rendered.push_str(self.name.as_ref());
        }
        rendered.push_str(&self.java_parameter_list());
        if !self.exceptions.is_empty() {
            let exceptions: Vec<String> =
                self.exceptions.iter().map(|exn| exn.java_name()).collect();
            rendered.push_str(" throws ");
            rendered.push_str(&exceptions.join(","));
        }
        rendered
    }

    /// Parameter types in Java source form, for example `(int,java.lang.String)`
    pub fn java_parameter_list(&self) -> String {
        let parameters: Vec<String> = self
            .descriptor
            .parameters
            .iter()
            .map(|parameter| parameter.java_name())
            .collect();
        format!("({})", parameters.join(","))
    }

    /// Method name and descriptor, for example `foo(ILjava/lang/String;)I`
    pub fn signature(&self) -> String {
        format!("{}{}", self.name.as_ref(), self.descriptor.render())
    }
}
