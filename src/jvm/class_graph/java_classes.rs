use super::{ClassData, ClassGraph};
use crate::jvm::BinaryName;
use elsa::FrozenVec;

/// Classes inside `java.*` which weaving refers to
pub struct JavaClasses<'g> {
    pub lang: LangClasses<'g>,
    pub io: IoClasses<'g>,
}

/// Classes inside `java.lang.*`
pub struct LangClasses<'g> {
    pub object: &'g ClassData<'g>,
    pub cloneable: &'g ClassData<'g>,
    pub char_sequence: &'g ClassData<'g>,
    pub comparable: &'g ClassData<'g>,
    pub string: &'g ClassData<'g>,
    pub class: &'g ClassData<'g>,
    pub number: &'g ClassData<'g>,
    pub boolean: &'g ClassData<'g>,
    pub byte: &'g ClassData<'g>,
    pub character: &'g ClassData<'g>,
    pub short: &'g ClassData<'g>,
    pub integer: &'g ClassData<'g>,
    pub long: &'g ClassData<'g>,
    pub float: &'g ClassData<'g>,
    pub double: &'g ClassData<'g>,
    pub throwable: &'g ClassData<'g>,
    pub error: &'g ClassData<'g>,
    pub exception: &'g ClassData<'g>,
    pub runtime_exception: &'g ClassData<'g>,
    pub illegal_state_exception: &'g ClassData<'g>,
}

/// Classes inside `java.io.*`
pub struct IoClasses<'g> {
    pub serializable: &'g ClassData<'g>,
}

impl<'g> JavaClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> JavaClasses<'g> {
        let object = class_graph.add_class(ClassData {
            name: BinaryName::OBJECT,
            superclass: None,
            interfaces: FrozenVec::new(),
            is_interface: false,
            fields: FrozenVec::new(),
        });
        let io = IoClasses::add_to_graph(class_graph, object);
        let lang = LangClasses::add_to_graph(class_graph, object, &io);

        JavaClasses { lang, io }
    }
}

impl<'g> IoClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>, object: &'g ClassData<'g>) -> IoClasses<'g> {
        let serializable =
            class_graph.add_class(ClassData::new(BinaryName::SERIALIZABLE, object, true));
        IoClasses { serializable }
    }
}

impl<'g> LangClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        object: &'g ClassData<'g>,
        io: &IoClasses<'g>,
    ) -> LangClasses<'g> {
        let serializable = io.serializable;
        let interface =
            |name: BinaryName| class_graph.add_class(ClassData::new(name, object, true));
        let cloneable = interface(BinaryName::CLONEABLE);
        let char_sequence = interface(BinaryName::CHARSEQUENCE);
        let comparable = interface(BinaryName::COMPARABLE);

        let class = |name: BinaryName, superclass: &'g ClassData<'g>| {
            class_graph.add_class(ClassData::new(name, superclass, false))
        };
        let string = class(BinaryName::STRING, object);
        let class_class = class(BinaryName::CLASS, object);
        let number = class(BinaryName::NUMBER, object);
        let boolean = class(BinaryName::BOOLEAN, object);
        let character = class(BinaryName::CHARACTER, object);
        let byte = class(BinaryName::BYTE, number);
        let short = class(BinaryName::SHORT, number);
        let integer = class(BinaryName::INTEGER, number);
        let long = class(BinaryName::LONG, number);
        let float = class(BinaryName::FLOAT, number);
        let double = class(BinaryName::DOUBLE, number);
        let throwable = class(BinaryName::THROWABLE, object);
        let error = class(BinaryName::ERROR, throwable);
        let exception = class(BinaryName::EXCEPTION, throwable);
        let runtime_exception = class(BinaryName::RUNTIMEEXCEPTION, exception);
        let illegal_state_exception = class(BinaryName::ILLEGALSTATEEXCEPTION, runtime_exception);

        string.interfaces.push(char_sequence);
        string.interfaces.push(comparable);
        string.interfaces.push(serializable);
        number.interfaces.push(serializable);
        throwable.interfaces.push(serializable);
        for boxed in [boolean, character, byte, short, integer, long, float, double] {
            boxed.interfaces.push(comparable);
        }
        boolean.interfaces.push(serializable);
        character.interfaces.push(serializable);

        LangClasses {
            object,
            cloneable,
            char_sequence,
            comparable,
            string,
            class: class_class,
            number,
            boolean,
            byte,
            character,
            short,
            integer,
            long,
            float,
            double,
            throwable,
            error,
            exception,
            runtime_exception,
            illegal_state_exception,
        }
    }
}
