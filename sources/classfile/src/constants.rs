pub const MAGIC: u32 = 0xCAFEBABE;

/// JDK 1.0.2
pub const MIN_SUPPORTED_MAJOR: u16 = 45;
/// JDK 25
pub const MAX_SUPPORTED_MAJOR: u16 = 69;

/// The largest code array a method may carry.
pub const MAX_CODE_LENGTH: usize = 65535;

pub mod attribute_names {
    pub const CODE: &str = "Code";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    pub const SYNTHETIC: &str = "Synthetic";
    pub const DEPRECATED: &str = "Deprecated";
}
