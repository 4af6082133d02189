//! Static types as seen by the generator, and the numeric-widening category
//! rules used to pick primitive lowering strategies.

use std::fmt;

use crate::consts;

/// A JVM-level static type.
///
/// `Class` carries an internal name (`java/lang/Integer`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JvmType {
    Void,
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Class(String),
    Array(Box<JvmType>),
}

impl JvmType {
    pub fn class(internal_name: impl Into<String>) -> Self {
        JvmType::Class(internal_name.into())
    }

    pub fn object() -> Self {
        JvmType::Class(consts::OBJECT.to_string())
    }

    pub fn string() -> Self {
        JvmType::Class(consts::STRING.to_string())
    }

    pub fn big_decimal() -> Self {
        JvmType::Class(consts::BIG_DECIMAL.to_string())
    }

    pub fn big_integer() -> Self {
        JvmType::Class(consts::BIG_INTEGER.to_string())
    }

    pub fn class_literal() -> Self {
        JvmType::Class(consts::CLASS.to_string())
    }

    pub fn array_of(component: JvmType) -> Self {
        JvmType::Array(Box::new(component))
    }

    /// Primitive value types; `void` is not one of them.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            JvmType::Boolean
                | JvmType::Char
                | JvmType::Byte
                | JvmType::Short
                | JvmType::Int
                | JvmType::Long
                | JvmType::Float
                | JvmType::Double
        )
    }

    pub fn is_void(&self) -> bool {
        matches!(self, JvmType::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Class(_) | JvmType::Array(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, JvmType::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JvmType::Class(name) if name == consts::OBJECT)
    }

    pub fn component(&self) -> Option<&JvmType> {
        match self {
            JvmType::Array(c) => Some(c),
            _ => None,
        }
    }

    /// Number of operand stack / local slots a value of this type occupies
    pub fn width(&self) -> u16 {
        match self {
            JvmType::Void => 0,
            JvmType::Long | JvmType::Double => 2,
            _ => 1,
        }
    }

    pub fn descriptor(&self) -> String {
        match self {
            JvmType::Void => "V".to_string(),
            JvmType::Boolean => "Z".to_string(),
            JvmType::Char => "C".to_string(),
            JvmType::Byte => "B".to_string(),
            JvmType::Short => "S".to_string(),
            JvmType::Int => "I".to_string(),
            JvmType::Long => "J".to_string(),
            JvmType::Float => "F".to_string(),
            JvmType::Double => "D".to_string(),
            JvmType::Class(name) => format!("L{};", name),
            JvmType::Array(c) => format!("[{}", c.descriptor()),
        }
    }

    /// Name used by CHECKCAST / ANEWARRAY / class constants: arrays use their
    /// descriptor, classes their internal name.
    pub fn internal_name(&self) -> String {
        match self {
            JvmType::Class(name) => name.clone(),
            other => other.descriptor(),
        }
    }

    /// Java source spelling of primitive types (`int`), used for `xxxValue`
    /// and `xxxUnbox` helper names.
    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            JvmType::Boolean => "boolean",
            JvmType::Char => "char",
            JvmType::Byte => "byte",
            JvmType::Short => "short",
            JvmType::Int => "int",
            JvmType::Long => "long",
            JvmType::Float => "float",
            JvmType::Double => "double",
            _ => return None,
        })
    }

    /// The boxed counterpart of a primitive; other types map to themselves.
    pub fn wrapper(&self) -> JvmType {
        let name = match self {
            JvmType::Boolean => "java/lang/Boolean",
            JvmType::Char => "java/lang/Character",
            JvmType::Byte => "java/lang/Byte",
            JvmType::Short => "java/lang/Short",
            JvmType::Int => "java/lang/Integer",
            JvmType::Long => "java/lang/Long",
            JvmType::Float => "java/lang/Float",
            JvmType::Double => "java/lang/Double",
            JvmType::Void => "java/lang/Void",
            other => return other.clone(),
        };
        JvmType::class(name)
    }

    /// The primitive counterpart of a wrapper; other types map to themselves.
    pub fn unwrapped(&self) -> JvmType {
        match self {
            JvmType::Class(name) => match name.as_str() {
                "java/lang/Boolean" => JvmType::Boolean,
                "java/lang/Character" => JvmType::Char,
                "java/lang/Byte" => JvmType::Byte,
                "java/lang/Short" => JvmType::Short,
                "java/lang/Integer" => JvmType::Int,
                "java/lang/Long" => JvmType::Long,
                "java/lang/Float" => JvmType::Float,
                "java/lang/Double" => JvmType::Double,
                _ => self.clone(),
            },
            _ => self.clone(),
        }
    }

    pub fn is_wrapper(&self) -> bool {
        self.is_reference() && self.unwrapped().is_primitive()
    }

    fn is_number_class(&self) -> bool {
        match self {
            JvmType::Class(name) => {
                name == consts::NUMBER
                    || name == consts::BIG_DECIMAL
                    || name == consts::BIG_INTEGER
                    || matches!(self.unwrapped(), t if t.is_primitive() && t != JvmType::Boolean && t != JvmType::Char)
            }
            _ => false,
        }
    }

    /// Conservative reference assignability: true only when the relation is
    /// known without loading classes. Unknown relations answer false, which
    /// costs a runtime cast but never an unverifiable store.
    pub fn is_assignable_to(&self, target: &JvmType) -> bool {
        if self == target {
            return true;
        }
        if self.is_primitive() || target.is_primitive() || self.is_void() || target.is_void() {
            return false;
        }
        if target.is_object() {
            return true;
        }
        match (self, target) {
            (JvmType::Class(_), JvmType::Class(t)) if t == consts::NUMBER => self.is_number_class(),
            (JvmType::Class(s), JvmType::Class(t))
                if s == consts::STRING && (t == "java/lang/CharSequence" || t == "java/lang/Comparable") =>
            {
                true
            }
            (JvmType::Array(_), JvmType::Class(t)) => t == "java/lang/Cloneable" || t == "java/io/Serializable",
            (JvmType::Array(s), JvmType::Array(t)) => {
                s.is_reference() && t.is_reference() && s.is_assignable_to(t)
            }
            _ => false,
        }
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JvmType::Void => write!(f, "void"),
            JvmType::Class(name) => write!(f, "{}", name.replace('/', ".")),
            JvmType::Array(c) => write!(f, "{}[]", c),
            prim => write!(f, "{}", prim.primitive_name().unwrap_or("?")),
        }
    }
}

// Numeric widening categories. Each category includes the narrower ones:
// int ⊂ long ⊂ BigInteger ⊂ BigDecimal ⊂ double. Only primitives enter the
// int and long categories; wrappers are not unboxed here.

pub fn is_int_category(ty: &JvmType) -> bool {
    matches!(ty, JvmType::Byte | JvmType::Char | JvmType::Int | JvmType::Short)
}

pub fn is_long_category(ty: &JvmType) -> bool {
    matches!(ty, JvmType::Long) || is_int_category(ty)
}

pub fn is_big_int_category(ty: &JvmType) -> bool {
    matches!(ty, JvmType::Class(n) if n == consts::BIG_INTEGER) || is_long_category(ty)
}

pub fn is_big_dec_category(ty: &JvmType) -> bool {
    matches!(ty, JvmType::Class(n) if n == consts::BIG_DECIMAL) || is_big_int_category(ty)
}

pub fn is_floating_category(ty: &JvmType) -> bool {
    matches!(ty, JvmType::Float | JvmType::Double)
}

pub fn is_double_category(ty: &JvmType) -> bool {
    is_floating_category(ty) || is_big_dec_category(ty)
}

/// Any numeric type, primitive or boxed
pub fn is_number_category(ty: &JvmType) -> bool {
    is_big_dec_category(ty) || is_floating_category(ty) || ty.is_number_class()
}

/// Operand category tag used to select a lowering strategy and to record
/// which primitive kinds a fast path depends on. The discriminants are the
/// strategy table indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperandKind {
    Object = 0,
    Int = 1,
    Long = 2,
    Double = 3,
    Char = 4,
    Byte = 5,
    Short = 6,
    Float = 7,
    Boolean = 8,
}

impl OperandKind {
    pub const ALL: [OperandKind; 9] = [
        OperandKind::Object,
        OperandKind::Int,
        OperandKind::Long,
        OperandKind::Double,
        OperandKind::Char,
        OperandKind::Byte,
        OperandKind::Short,
        OperandKind::Float,
        OperandKind::Boolean,
    ];

    /// Exact mapping of a static type; anything but a primitive is `Object`.
    pub fn of(ty: &JvmType) -> Self {
        match ty {
            JvmType::Int => OperandKind::Int,
            JvmType::Long => OperandKind::Long,
            JvmType::Double => OperandKind::Double,
            JvmType::Char => OperandKind::Char,
            JvmType::Byte => OperandKind::Byte,
            JvmType::Short => OperandKind::Short,
            JvmType::Float => OperandKind::Float,
            JvmType::Boolean => OperandKind::Boolean,
            _ => OperandKind::Object,
        }
    }

    /// The primitive type of this kind; `Object` maps to `java/lang/Object`.
    pub fn jvm_type(self) -> JvmType {
        match self {
            OperandKind::Object => JvmType::object(),
            OperandKind::Int => JvmType::Int,
            OperandKind::Long => JvmType::Long,
            OperandKind::Double => JvmType::Double,
            OperandKind::Char => JvmType::Char,
            OperandKind::Byte => JvmType::Byte,
            OperandKind::Short => JvmType::Short,
            OperandKind::Float => JvmType::Float,
            OperandKind::Boolean => JvmType::Boolean,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Category both operands of a binary operation can be converted to.
///
/// The order of the checks is significant: two BigDecimal-category operands
/// stay dynamic even though the double category also contains them.
pub fn operand_conversion_kind(left: &JvmType, right: &JvmType) -> OperandKind {
    if is_int_category(left) && is_int_category(right) {
        return OperandKind::Int;
    }
    if is_long_category(left) && is_long_category(right) {
        return OperandKind::Long;
    }
    if is_big_dec_category(left) && is_big_dec_category(right) {
        return OperandKind::Object;
    }
    if is_double_category(left) && is_double_category(right) {
        return OperandKind::Double;
    }
    OperandKind::Object
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors() {
        assert_eq!(JvmType::Int.descriptor(), "I");
        assert_eq!(JvmType::array_of(JvmType::Long).descriptor(), "[J");
        assert_eq!(JvmType::object().descriptor(), "Ljava/lang/Object;");
        assert_eq!(JvmType::array_of(JvmType::string()).internal_name(), "[Ljava/lang/String;");
        assert_eq!(JvmType::string().internal_name(), "java/lang/String");
    }

    #[test]
    fn wrapper_round_trip() {
        for prim in [JvmType::Int, JvmType::Long, JvmType::Double, JvmType::Boolean, JvmType::Char] {
            assert!(prim.wrapper().is_wrapper());
            assert_eq!(prim.wrapper().unwrapped(), prim);
        }
        assert_eq!(JvmType::object().wrapper(), JvmType::object());
    }

    #[test]
    fn categories_nest() {
        assert!(is_int_category(&JvmType::Char));
        assert!(!is_int_category(&JvmType::Long));
        assert!(is_long_category(&JvmType::Short));
        assert!(is_big_dec_category(&JvmType::big_integer()));
        assert!(is_double_category(&JvmType::Float));
        assert!(is_double_category(&JvmType::big_decimal()));
        assert!(!is_int_category(&JvmType::Int.wrapper()));
        assert!(!is_long_category(&JvmType::Boolean));
    }

    #[test]
    fn conversion_kind_table() {
        use OperandKind::*;
        let bd = JvmType::big_decimal();
        let bi = JvmType::big_integer();
        assert_eq!(operand_conversion_kind(&JvmType::Int, &JvmType::Short), Int);
        assert_eq!(operand_conversion_kind(&JvmType::Char, &JvmType::Byte), Int);
        assert_eq!(operand_conversion_kind(&JvmType::Int, &JvmType::Long), Long);
        assert_eq!(operand_conversion_kind(&JvmType::Int, &bi), Object);
        assert_eq!(operand_conversion_kind(&bd, &bd), Object);
        assert_eq!(operand_conversion_kind(&JvmType::Float, &JvmType::Float), Double);
        assert_eq!(operand_conversion_kind(&JvmType::Double, &JvmType::Int), Double);
        assert_eq!(operand_conversion_kind(&JvmType::Double, &bd), Double);
        assert_eq!(operand_conversion_kind(&JvmType::Boolean, &JvmType::Boolean), Object);
        assert_eq!(operand_conversion_kind(&JvmType::Int.wrapper(), &JvmType::Int), Object);
    }

    #[test]
    fn assignability_is_conservative() {
        assert!(JvmType::Int.wrapper().is_assignable_to(&JvmType::class(consts::NUMBER)));
        assert!(JvmType::string().is_assignable_to(&JvmType::object()));
        assert!(!JvmType::object().is_assignable_to(&JvmType::string()));
        assert!(!JvmType::class("demo/Foo").is_assignable_to(&JvmType::class("demo/Bar")));
        assert!(!JvmType::Int.is_assignable_to(&JvmType::object()));
    }
}
