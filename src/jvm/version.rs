/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 5
    pub const JAVA5: Version = Version {
        major_version: 49,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 6 (the first with `StackMapTable`)
    pub const JAVA6: Version = Version {
        major_version: 50,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        major_version: 52,
        minor_version: 0,
    };

    /// Does the `Code` attribute in this version carry a `StackMapTable`?
    pub fn has_stack_map_frames(&self) -> bool {
        self.major_version >= Version::JAVA6.major_version
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stack_map_versions() {
        assert!(!Version::JAVA5.has_stack_map_frames());
        assert!(Version::JAVA6.has_stack_map_frames());
        assert!(Version::JAVA8.has_stack_map_frames());
        assert!(Version::JAVA5 < Version::JAVA8);
    }
}
