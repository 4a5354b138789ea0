//! Catalog of the types scripts can name, grouped by namespace and library.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::parser::ast::PredefinedType;

/// A bundled library. A type is only visible to a script when its library
/// is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Library {
    CoreLib,
    Console,
    Linq,
    LinqExpressions,
    Cryptography,
    Process,
    CSharp,
    Host,
}

pub const ALL_LIBRARIES: [Library; 8] = [
    Library::CoreLib,
    Library::Console,
    Library::Linq,
    Library::LinqExpressions,
    Library::Cryptography,
    Library::Process,
    Library::CSharp,
    Library::Host,
];

impl Library {
    pub fn assembly_name(&self) -> &'static str {
        match self {
            Library::CoreLib => "System.Private.CoreLib",
            Library::Console => "System.Console",
            Library::Linq => "System.Linq",
            Library::LinqExpressions => "System.Linq.Expressions",
            Library::Cryptography => "System.Security.Cryptography",
            Library::Process => "System.Diagnostics.Process",
            Library::CSharp => "Microsoft.CSharp",
            Library::Host => "cseval",
        }
    }

    /// `Assembly.FullName` display text.
    pub fn display_name(&self) -> String {
        match self {
            Library::Host => "cseval, Version=0.1.0.0, Culture=neutral, PublicKeyToken=null".to_string(),
            _ => format!(
                "{}, Version=8.0.0.0, Culture=neutral, PublicKeyToken=7cec85d7bea7798e",
                self.assembly_name()
            ),
        }
    }

    /// `Module.FullyQualifiedName` text.
    pub fn module_path(&self) -> String {
        format!("/usr/lib/cseval/runtime/{}.dll", self.assembly_name())
    }

    /// Resolves a `#r` reference such as `System.Linq` or `System.Linq.dll`.
    pub fn from_reference(name: &str) -> Option<Library> {
        let trimmed = name.trim();
        let stem = trimmed
            .strip_suffix(".dll")
            .or_else(|| trimmed.strip_suffix(".DLL"))
            .unwrap_or(trimmed);
        ALL_LIBRARIES
            .iter()
            .copied()
            .find(|lib| lib.assembly_name().eq_ignore_ascii_case(stem))
            .or(match stem {
                s if s.eq_ignore_ascii_case("System.Runtime") => Some(Library::CoreLib),
                s if s.eq_ignore_ascii_case("System.Collections") => Some(Library::CoreLib),
                s if s.eq_ignore_ascii_case("System.IO.FileSystem") => Some(Library::CoreLib),
                s if s.eq_ignore_ascii_case("System.Runtime.Numerics") => Some(Library::CoreLib),
                _ => None,
            })
    }
}

/// Every built-in type, nameable or internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Object,
    Boolean,
    Byte,
    SByte,
    Int16,
    UInt16,
    Char,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    String,
    Int128,
    UInt128,
    Void,
    Array,
    Math,
    Convert,
    Console,
    Enumerable,
    Encoding,
    Utf8Encoding,
    Sha256,
    Directory,
    DirectoryInfo,
    ExpandoObject,
    Type,
    RuntimeType,
    Assembly,
    RuntimeAssembly,
    Module,
    RuntimeModule,
    RuntimeTypeHandle,
    List,
    Dictionary,
    KeyValuePair,
    RangeIterator,
    RepeatIterator,
    ReverseIterator,
    Globals,
    Exception,
    SystemException,
    ArithmeticException,
    InvalidOperationException,
    ArgumentException,
    ArgumentOutOfRangeException,
    ArgumentNullException,
    DivideByZeroException,
    OverflowException,
    IndexOutOfRangeException,
    NullReferenceException,
    InvalidCastException,
    FormatException,
    KeyNotFoundException,
    NotSupportedException,
    InsufficientExecutionStackException,
    OutOfMemoryException,
    DirectoryNotFoundException,
    RuntimeBinderException,
}

pub struct TypeInfo {
    pub namespace: &'static str,
    /// Metadata name, including the generic arity suffix (`List`1`).
    pub name: &'static str,
    pub library: Library,
    pub base: Option<TypeKind>,
    pub arity: usize,
    /// Internal types cannot be named in source.
    pub public: bool,
}

const fn info(
    namespace: &'static str,
    name: &'static str,
    library: Library,
    base: Option<TypeKind>,
) -> TypeInfo {
    TypeInfo {
        namespace,
        name,
        library,
        base,
        arity: 0,
        public: true,
    }
}

const fn generic(namespace: &'static str, name: &'static str, arity: usize) -> TypeInfo {
    TypeInfo {
        namespace,
        name,
        library: Library::CoreLib,
        base: Some(TypeKind::Object),
        arity,
        public: true,
    }
}

const fn internal(namespace: &'static str, name: &'static str, library: Library, base: TypeKind) -> TypeInfo {
    TypeInfo {
        namespace,
        name,
        library,
        base: Some(base),
        arity: 0,
        public: false,
    }
}

const SYSTEM: &str = "System";
const OBJ: Option<TypeKind> = Some(TypeKind::Object);

pub const ALL_TYPES: [TypeKind; 62] = [
    TypeKind::Object,
    TypeKind::Boolean,
    TypeKind::Byte,
    TypeKind::SByte,
    TypeKind::Int16,
    TypeKind::UInt16,
    TypeKind::Char,
    TypeKind::Int32,
    TypeKind::UInt32,
    TypeKind::Int64,
    TypeKind::UInt64,
    TypeKind::Single,
    TypeKind::Double,
    TypeKind::Decimal,
    TypeKind::String,
    TypeKind::Int128,
    TypeKind::UInt128,
    TypeKind::Void,
    TypeKind::Array,
    TypeKind::Math,
    TypeKind::Convert,
    TypeKind::Console,
    TypeKind::Enumerable,
    TypeKind::Encoding,
    TypeKind::Utf8Encoding,
    TypeKind::Sha256,
    TypeKind::Directory,
    TypeKind::DirectoryInfo,
    TypeKind::ExpandoObject,
    TypeKind::Type,
    TypeKind::RuntimeType,
    TypeKind::Assembly,
    TypeKind::RuntimeAssembly,
    TypeKind::Module,
    TypeKind::RuntimeModule,
    TypeKind::RuntimeTypeHandle,
    TypeKind::List,
    TypeKind::Dictionary,
    TypeKind::KeyValuePair,
    TypeKind::RangeIterator,
    TypeKind::RepeatIterator,
    TypeKind::ReverseIterator,
    TypeKind::Globals,
    TypeKind::Exception,
    TypeKind::SystemException,
    TypeKind::ArithmeticException,
    TypeKind::InvalidOperationException,
    TypeKind::ArgumentException,
    TypeKind::ArgumentOutOfRangeException,
    TypeKind::ArgumentNullException,
    TypeKind::DivideByZeroException,
    TypeKind::OverflowException,
    TypeKind::IndexOutOfRangeException,
    TypeKind::NullReferenceException,
    TypeKind::InvalidCastException,
    TypeKind::FormatException,
    TypeKind::KeyNotFoundException,
    TypeKind::NotSupportedException,
    TypeKind::InsufficientExecutionStackException,
    TypeKind::OutOfMemoryException,
    TypeKind::DirectoryNotFoundException,
    TypeKind::RuntimeBinderException,
];

impl TypeKind {
    pub fn info(&self) -> TypeInfo {
        use Library::*;
        use TypeKind as K;
        let value_type = Some(K::Object);
        match self {
            K::Object => info(SYSTEM, "Object", CoreLib, None),
            K::Boolean => info(SYSTEM, "Boolean", CoreLib, value_type),
            K::Byte => info(SYSTEM, "Byte", CoreLib, value_type),
            K::SByte => info(SYSTEM, "SByte", CoreLib, value_type),
            K::Int16 => info(SYSTEM, "Int16", CoreLib, value_type),
            K::UInt16 => info(SYSTEM, "UInt16", CoreLib, value_type),
            K::Char => info(SYSTEM, "Char", CoreLib, value_type),
            K::Int32 => info(SYSTEM, "Int32", CoreLib, value_type),
            K::UInt32 => info(SYSTEM, "UInt32", CoreLib, value_type),
            K::Int64 => info(SYSTEM, "Int64", CoreLib, value_type),
            K::UInt64 => info(SYSTEM, "UInt64", CoreLib, value_type),
            K::Single => info(SYSTEM, "Single", CoreLib, value_type),
            K::Double => info(SYSTEM, "Double", CoreLib, value_type),
            K::Decimal => info(SYSTEM, "Decimal", CoreLib, value_type),
            K::String => info(SYSTEM, "String", CoreLib, OBJ),
            K::Int128 => info(SYSTEM, "Int128", CoreLib, value_type),
            K::UInt128 => info(SYSTEM, "UInt128", CoreLib, value_type),
            K::Void => info(SYSTEM, "Void", CoreLib, value_type),
            K::Array => info(SYSTEM, "Array", CoreLib, OBJ),
            K::Math => info(SYSTEM, "Math", CoreLib, OBJ),
            K::Convert => info(SYSTEM, "Convert", CoreLib, OBJ),
            K::Console => info(SYSTEM, "Console", Console, OBJ),
            K::Enumerable => info("System.Linq", "Enumerable", Linq, OBJ),
            K::Encoding => info("System.Text", "Encoding", CoreLib, OBJ),
            K::Utf8Encoding => internal("System.Text", "UTF8EncodingSealed", CoreLib, K::Encoding),
            K::Sha256 => info("System.Security.Cryptography", "SHA256", Cryptography, OBJ),
            K::Directory => info("System.IO", "Directory", CoreLib, OBJ),
            K::DirectoryInfo => info("System.IO", "DirectoryInfo", CoreLib, OBJ),
            K::ExpandoObject => info("System.Dynamic", "ExpandoObject", LinqExpressions, OBJ),
            K::Type => info(SYSTEM, "Type", CoreLib, OBJ),
            K::RuntimeType => internal(SYSTEM, "RuntimeType", CoreLib, K::Type),
            K::Assembly => info("System.Reflection", "Assembly", CoreLib, OBJ),
            K::RuntimeAssembly => internal("System.Reflection", "RuntimeAssembly", CoreLib, K::Assembly),
            K::Module => info("System.Reflection", "Module", CoreLib, OBJ),
            K::RuntimeModule => internal("System.Reflection", "RuntimeModule", CoreLib, K::Module),
            K::RuntimeTypeHandle => info(SYSTEM, "RuntimeTypeHandle", CoreLib, value_type),
            K::List => generic("System.Collections.Generic", "List`1", 1),
            K::Dictionary => generic("System.Collections.Generic", "Dictionary`2", 2),
            K::KeyValuePair => generic("System.Collections.Generic", "KeyValuePair`2", 2),
            K::RangeIterator => internal("System.Linq", "RangeIterator", Linq, K::Object),
            K::RepeatIterator => TypeInfo {
                arity: 1,
                ..internal("System.Linq", "RepeatIterator`1", Linq, K::Object)
            },
            K::ReverseIterator => TypeInfo {
                arity: 1,
                ..internal("System.Linq", "ReverseIterator`1", Linq, K::Object)
            },
            K::Globals => info("Eval", "Globals", Host, OBJ),
            K::Exception => info(SYSTEM, "Exception", CoreLib, OBJ),
            K::SystemException => info(SYSTEM, "SystemException", CoreLib, Some(K::Exception)),
            K::ArithmeticException => {
                info(SYSTEM, "ArithmeticException", CoreLib, Some(K::SystemException))
            }
            K::InvalidOperationException => {
                info(SYSTEM, "InvalidOperationException", CoreLib, Some(K::SystemException))
            }
            K::ArgumentException => {
                info(SYSTEM, "ArgumentException", CoreLib, Some(K::SystemException))
            }
            K::ArgumentOutOfRangeException => {
                info(SYSTEM, "ArgumentOutOfRangeException", CoreLib, Some(K::ArgumentException))
            }
            K::ArgumentNullException => {
                info(SYSTEM, "ArgumentNullException", CoreLib, Some(K::ArgumentException))
            }
            K::DivideByZeroException => {
                info(SYSTEM, "DivideByZeroException", CoreLib, Some(K::ArithmeticException))
            }
            K::OverflowException => {
                info(SYSTEM, "OverflowException", CoreLib, Some(K::ArithmeticException))
            }
            K::IndexOutOfRangeException => {
                info(SYSTEM, "IndexOutOfRangeException", CoreLib, Some(K::SystemException))
            }
            K::NullReferenceException => {
                info(SYSTEM, "NullReferenceException", CoreLib, Some(K::SystemException))
            }
            K::InvalidCastException => {
                info(SYSTEM, "InvalidCastException", CoreLib, Some(K::SystemException))
            }
            K::FormatException => info(SYSTEM, "FormatException", CoreLib, Some(K::SystemException)),
            K::KeyNotFoundException => info(
                "System.Collections.Generic",
                "KeyNotFoundException",
                CoreLib,
                Some(K::SystemException),
            ),
            K::NotSupportedException => {
                info(SYSTEM, "NotSupportedException", CoreLib, Some(K::SystemException))
            }
            K::InsufficientExecutionStackException => info(
                SYSTEM,
                "InsufficientExecutionStackException",
                CoreLib,
                Some(K::SystemException),
            ),
            K::OutOfMemoryException => {
                info(SYSTEM, "OutOfMemoryException", CoreLib, Some(K::SystemException))
            }
            K::DirectoryNotFoundException => info(
                "System.IO",
                "DirectoryNotFoundException",
                CoreLib,
                Some(K::SystemException),
            ),
            K::RuntimeBinderException => info(
                "Microsoft.CSharp.RuntimeBinder",
                "RuntimeBinderException",
                CSharp,
                Some(K::Exception),
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        self.info().name
    }

    pub fn namespace(&self) -> &'static str {
        self.info().namespace
    }

    pub fn library(&self) -> Library {
        self.info().library
    }

    pub fn base(&self) -> Option<TypeKind> {
        self.info().base
    }

    pub fn is_exception(&self) -> bool {
        self.derives_from(TypeKind::Exception)
    }

    /// Walks the base chain.
    pub fn derives_from(&self, ancestor: TypeKind) -> bool {
        let mut current = Some(*self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.base();
        }
        false
    }

    /// Keyword alias used by friendly names.
    pub fn keyword(&self) -> Option<&'static str> {
        Some(match self {
            TypeKind::Boolean => "bool",
            TypeKind::Byte => "byte",
            TypeKind::Char => "char",
            TypeKind::Decimal => "decimal",
            TypeKind::Double => "double",
            TypeKind::Int16 => "short",
            TypeKind::Int32 => "int",
            TypeKind::Int64 => "long",
            TypeKind::SByte => "sbyte",
            TypeKind::Single => "float",
            TypeKind::String => "string",
            TypeKind::UInt16 => "ushort",
            TypeKind::UInt32 => "uint",
            TypeKind::UInt64 => "ulong",
            TypeKind::Object => "object",
            TypeKind::Void => "void",
            _ => return None,
        })
    }

    /// `HResult` reported for exception types.
    pub fn hresult(&self) -> i32 {
        match self {
            TypeKind::ArgumentException => -2147024809,
            TypeKind::ArgumentNullException | TypeKind::NullReferenceException => -2147467261,
            TypeKind::ArgumentOutOfRangeException => -2146233086,
            TypeKind::ArithmeticException => -2147024362,
            TypeKind::DivideByZeroException => -2147352558,
            TypeKind::FormatException => -2146233033,
            TypeKind::IndexOutOfRangeException => -2146233080,
            TypeKind::InsufficientExecutionStackException => -2146232968,
            TypeKind::InvalidCastException => -2147467262,
            TypeKind::InvalidOperationException => -2146233079,
            TypeKind::KeyNotFoundException => -2146232969,
            TypeKind::NotSupportedException => -2146233067,
            TypeKind::OutOfMemoryException => -2147024882,
            TypeKind::OverflowException => -2146233066,
            TypeKind::DirectoryNotFoundException => -2147024893,
            TypeKind::SystemException => -2146233087,
            _ => -2146233088,
        }
    }

    /// Message used when an exception is constructed without one.
    pub fn default_message(&self) -> String {
        match self {
            TypeKind::ArgumentException => "Value does not fall within the expected range.".into(),
            TypeKind::ArgumentNullException => "Value cannot be null.".into(),
            TypeKind::ArgumentOutOfRangeException => {
                "Specified argument was out of the range of valid values.".into()
            }
            TypeKind::ArithmeticException | TypeKind::OverflowException => {
                "Arithmetic operation resulted in an overflow.".into()
            }
            TypeKind::DivideByZeroException => "Attempted to divide by zero.".into(),
            TypeKind::IndexOutOfRangeException => {
                "Index was outside the bounds of the array.".into()
            }
            TypeKind::InvalidCastException => "Specified cast is not valid.".into(),
            TypeKind::InvalidOperationException => {
                "Operation is not valid due to the current state of the object.".into()
            }
            TypeKind::NotSupportedException => "Specified method is not supported.".into(),
            TypeKind::NullReferenceException => {
                "Object reference not set to an instance of an object.".into()
            }
            TypeKind::InsufficientExecutionStackException => {
                "Insufficient stack to continue executing the program safely. This can happen from having too many functions on the call stack or function on the stack using too much stack space.".into()
            }
            other => format!(
                "Exception of type '{}.{}' was thrown.",
                other.namespace(),
                other.name()
            ),
        }
    }
}

lazy_static! {
    /// Public types keyed by metadata name (`Console`, `List`1`).
    static ref TYPES_BY_NAME: HashMap<&'static str, Vec<TypeKind>> = {
        let mut map: HashMap<&'static str, Vec<TypeKind>> = HashMap::new();
        for kind in ALL_TYPES.iter() {
            let info = kind.info();
            if info.public {
                map.entry(info.name).or_default().push(*kind);
            }
        }
        map
    };

    /// Every namespace that contains at least one public type.
    static ref NAMESPACES: Vec<&'static str> = {
        let mut namespaces: Vec<&'static str> = ALL_TYPES
            .iter()
            .map(|k| k.info())
            .filter(|i| i.public)
            .map(|i| i.namespace)
            .collect();
        namespaces.sort_unstable();
        namespaces.dedup();
        namespaces
    };
}

/// Looks up public types by simple metadata name.
pub fn types_named(name: &str) -> &'static [TypeKind] {
    TYPES_BY_NAME.get(name).map(|v| v.as_slice()).unwrap_or(&[])
}

pub fn namespace_exists(namespace: &str) -> bool {
    NAMESPACES.iter().any(|ns| {
        *ns == namespace || (ns.starts_with(namespace) && ns[namespace.len()..].starts_with('.'))
    })
}

/// A runtime type: a catalog type with generic arguments, an array, or an
/// anonymous type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Named(TypeKind, Vec<TypeDesc>),
    Array(Box<TypeDesc>, usize),
    Anonymous {
        index: usize,
        members: Rc<[String]>,
        args: Vec<TypeDesc>,
    },
}

impl TypeDesc {
    pub fn of(kind: TypeKind) -> Self {
        TypeDesc::Named(kind, vec![])
    }

    pub fn object() -> Self {
        Self::of(TypeKind::Object)
    }

    pub fn array_of(element: TypeDesc, rank: usize) -> Self {
        TypeDesc::Array(Box::new(element), rank)
    }

    pub fn list_of(element: TypeDesc) -> Self {
        TypeDesc::Named(TypeKind::List, vec![element])
    }

    pub fn from_predefined(p: PredefinedType) -> Self {
        Self::of(match p {
            PredefinedType::Bool => TypeKind::Boolean,
            PredefinedType::Byte => TypeKind::Byte,
            PredefinedType::SByte => TypeKind::SByte,
            PredefinedType::Short => TypeKind::Int16,
            PredefinedType::UShort => TypeKind::UInt16,
            PredefinedType::Char => TypeKind::Char,
            PredefinedType::Int => TypeKind::Int32,
            PredefinedType::UInt => TypeKind::UInt32,
            PredefinedType::Long => TypeKind::Int64,
            PredefinedType::ULong => TypeKind::UInt64,
            PredefinedType::Float => TypeKind::Single,
            PredefinedType::Double => TypeKind::Double,
            PredefinedType::Decimal => TypeKind::Decimal,
            PredefinedType::String => TypeKind::String,
            PredefinedType::Object => TypeKind::Object,
            PredefinedType::Void => TypeKind::Void,
            PredefinedType::Int128 => TypeKind::Int128,
            PredefinedType::UInt128 => TypeKind::UInt128,
        })
    }

    pub fn kind(&self) -> Option<TypeKind> {
        match self {
            TypeDesc::Named(kind, _) => Some(*kind),
            _ => None,
        }
    }

    pub fn is(&self, kind: TypeKind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn args(&self) -> &[TypeDesc] {
        match self {
            TypeDesc::Named(_, args) => args,
            TypeDesc::Anonymous { args, .. } => args,
            TypeDesc::Array(..) => &[],
        }
    }

    pub fn element_type(&self) -> Option<&TypeDesc> {
        match self {
            TypeDesc::Array(element, _) => Some(element),
            _ => None,
        }
    }

    pub fn library(&self) -> Library {
        match self {
            TypeDesc::Named(kind, _) => kind.library(),
            TypeDesc::Array(element, _) => element.library(),
            TypeDesc::Anonymous { .. } => Library::Host,
        }
    }

    /// `Type.Name`.
    pub fn name(&self) -> String {
        match self {
            TypeDesc::Named(kind, _) => kind.name().to_string(),
            TypeDesc::Array(element, rank) => {
                format!("{}[{}]", element.name(), ",".repeat(rank - 1))
            }
            TypeDesc::Anonymous { index, args, .. } => {
                format!("<>f__AnonymousType{}`{}", index, args.len())
            }
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            TypeDesc::Named(kind, _) => kind.namespace(),
            TypeDesc::Array(element, _) => element.namespace(),
            TypeDesc::Anonymous { .. } => "",
        }
    }

    /// `Type.FullName`, with generic arguments in brackets.
    pub fn full_name(&self) -> String {
        match self {
            TypeDesc::Array(element, rank) => {
                format!("{}[{}]", element.full_name(), ",".repeat(rank - 1))
            }
            _ => {
                let namespace = self.namespace();
                let mut name = if namespace.is_empty() {
                    self.name()
                } else {
                    format!("{}.{}", namespace, self.name())
                };
                let args = self.args();
                if !args.is_empty() {
                    let args: Vec<String> = args.iter().map(|a| a.full_name()).collect();
                    name.push_str(&format!("[{}]", args.join(",")));
                }
                name
            }
        }
    }

    pub fn assembly_qualified_name(&self) -> String {
        format!("{}, {}", self.full_name(), self.library().display_name())
    }

    /// Short display name: keyword aliases, `List<int>`, `int[,]`.
    pub fn friendly_name(&self) -> String {
        match self {
            TypeDesc::Array(element, rank) => {
                format!("{}[{}]", element.friendly_name(), ",".repeat(rank - 1))
            }
            TypeDesc::Named(kind, args) if args.is_empty() => kind
                .keyword()
                .map(str::to_string)
                .unwrap_or_else(|| kind.name().to_string()),
            _ => {
                let name = self.name();
                let base = name.split('`').next().unwrap_or(&name).to_string();
                let args: Vec<String> = self.args().iter().map(|a| a.friendly_name()).collect();
                if args.is_empty() {
                    base
                } else {
                    format!("{}<{}>", base, args.join(", "))
                }
            }
        }
    }

    /// Reference conversion check used by `is`, `as` and `catch`.
    pub fn is_assignable_to(&self, target: &TypeDesc) -> bool {
        if self == target || target.is(TypeKind::Object) {
            return true;
        }
        match (self, target) {
            (TypeDesc::Named(kind, args), TypeDesc::Named(target_kind, target_args)) => {
                if args.is_empty() && target_args.is_empty() {
                    kind.derives_from(*target_kind)
                } else {
                    false
                }
            }
            (TypeDesc::Array(..), TypeDesc::Named(TypeKind::Array, _)) => true,
            _ => false,
        }
    }

    /// Stable 32-bit identifier surfaced through `RuntimeTypeHandle.Value`.
    pub fn handle_value(&self) -> i64 {
        let mut hash: u32 = 0x811c_9dc5;
        for byte in self.full_name().bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        hash as i64
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_names_follow_keyword_aliases() {
        assert_eq!(TypeDesc::of(TypeKind::Int32).friendly_name(), "int");
        assert_eq!(TypeDesc::list_of(TypeDesc::of(TypeKind::Int32)).friendly_name(), "List<int>");
        assert_eq!(
            TypeDesc::array_of(TypeDesc::of(TypeKind::Int32), 2).friendly_name(),
            "int[,]"
        );
        assert_eq!(
            TypeDesc::Named(
                TypeKind::Dictionary,
                vec![TypeDesc::of(TypeKind::String), TypeDesc::of(TypeKind::Int32)]
            )
            .friendly_name(),
            "Dictionary<string, int>"
        );
        assert_eq!(TypeDesc::of(TypeKind::Int128).friendly_name(), "Int128");
    }

    #[test]
    fn exception_hierarchy_walks_base_chain() {
        let dbz = TypeDesc::of(TypeKind::DivideByZeroException);
        assert!(dbz.is_assignable_to(&TypeDesc::of(TypeKind::ArithmeticException)));
        assert!(dbz.is_assignable_to(&TypeDesc::of(TypeKind::Exception)));
        assert!(!dbz.is_assignable_to(&TypeDesc::of(TypeKind::ArgumentException)));
    }

    #[test]
    fn references_resolve_with_or_without_extension() {
        assert_eq!(Library::from_reference("System.Linq"), Some(Library::Linq));
        assert_eq!(Library::from_reference("System.Linq.dll"), Some(Library::Linq));
        assert_eq!(Library::from_reference("Newtonsoft.Json"), None);
    }

    #[test]
    fn qualified_names() {
        let list = TypeDesc::list_of(TypeDesc::of(TypeKind::Int32));
        assert_eq!(list.full_name(), "System.Collections.Generic.List`1[System.Int32]");
        assert!(namespace_exists("System.Collections"));
        assert!(!namespace_exists("System.Coll"));
    }
}
