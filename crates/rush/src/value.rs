//! Runtime value model shared by the tree-walking evaluator and the VM.
//!
//! `Value` is a closed sum. Heap-backed variants (arrays, hashes, functions,
//! objects, domain values) use `Rc` shared ownership; the one structural
//! cycle class declarations create (class → defining scope → class binding)
//! is broken with a `Weak` back-edge on [`Class::env`]. Control-flow signals
//! are *not* values; they travel through [`crate::error::RunError`].

use std::{
    cell::RefCell,
    fmt::Write,
    rc::{Rc, Weak},
};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    ast::{Block, MethodDecl},
    builtins::Builtin,
    bytecode::CompiledFunction,
    env::Environment,
    error::{ErrorKind, RushError},
    modules::{FileValue, Namespace, TimeValue, TimeZoneValue},
};

/// Shared, mutable array storage.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
/// Shared hash storage. `IndexMap` preserves first-insertion key order across
/// updates, which is the language's observable hash ordering.
pub type HashRef = Rc<RefCell<IndexMap<HashKey, Value>>>;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// Immutable UTF-8 string; indexing is byte-oriented.
    Str(Rc<str>),
    Array(ArrayRef),
    Hash(HashRef),
    Function(Rc<Function>),
    Builtin(Builtin),
    /// Bytecode function produced by the compiler.
    CompiledFunction(Rc<CompiledFunction>),
    /// Bytecode function plus its captured free values.
    Closure(Rc<Closure>),
    Class(Rc<Class>),
    Object(Rc<Object>),
    /// A user method resolved on an instance, ready to call.
    BoundMethod(Rc<BoundMethod>),
    /// A builtin method resolved on a receiver (`arr.push`), ready to call.
    BuiltinMethod(Rc<BuiltinMethod>),
    /// An error value, as bound by `catch` or produced by a constructor.
    Error(Rc<RushError>),
    /// An error-kind constructor: `TypeError("msg")` builds an error value.
    ErrorCtor(ErrorKind),
    File(Rc<FileValue>),
    Directory(Rc<str>),
    Path(Rc<str>),
    Time(Rc<TimeValue>),
    /// Span of time in nanoseconds.
    Duration(i64),
    TimeZone(Rc<TimeZoneValue>),
    /// Builtin namespace (`JSON`, `Time`, ...) used as dispatch glue.
    Namespace(Namespace),
}

/// A user-defined function value: parameters, body and the captured scope.
#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Block,
    pub env: Rc<RefCell<Environment>>,
}

/// A method implementation: the AST form used by the tree-walking evaluator,
/// or the compiled form used by the VM.
#[derive(Debug, Clone)]
pub enum MethodBody {
    Ast(Rc<MethodDecl>),
    Compiled(Rc<Closure>),
}

/// A user-defined class. Methods do not capture the defining scope
/// themselves; it hangs off the class as a weak edge and is upgraded at call
/// time, which keeps class declarations cycle-free. The interior mutability
/// exists for the VM, whose `Inherit`/`Method` opcodes build a class value
/// incrementally on the stack.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub superclass: RefCell<Option<Rc<Class>>>,
    pub methods: RefCell<AHashMap<String, MethodBody>>,
    /// The scope the `class` statement executed in. Dangling for VM classes,
    /// whose methods capture through closures instead.
    pub env: Weak<RefCell<Environment>>,
}

impl Class {
    /// Resolves `name` along the single-inheritance chain starting at `cls`.
    /// Returns the defining class together with the method so `super` knows
    /// where to continue the walk.
    #[must_use]
    pub fn resolve_method(cls: &Rc<Self>, name: &str) -> Option<(Rc<Self>, MethodBody)> {
        let mut current = Rc::clone(cls);
        loop {
            if let Some(method) = current.methods.borrow().get(name) {
                return Some((Rc::clone(&current), method.clone()));
            }
            let next = current.superclass.borrow().as_ref().map(Rc::clone)?;
            current = next;
        }
    }
}

/// An instance of a user-defined class.
#[derive(Debug)]
pub struct Object {
    pub class: Rc<Class>,
    pub ivars: RefCell<AHashMap<String, Value>>,
}

/// A user method bound to a receiver.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Rc<Object>,
    /// The class the method was found on; `super` resumes the walk above it.
    pub defining_class: Rc<Class>,
    pub name: String,
    pub method: MethodBody,
}

/// A builtin method bound to a receiver value.
#[derive(Debug)]
pub struct BuiltinMethod {
    pub receiver: Value,
    pub name: String,
}

/// A compiled function plus the free values captured when the `Closure`
/// opcode ran.
#[derive(Debug)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// Canonicalized hash key: a (tag, primitive) pair. Only Integer, Float,
/// Boolean and String values are hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    /// Float key canonicalized through its bit pattern.
    Float(u64),
    Boolean(bool),
    Str(Rc<str>),
}

impl HashKey {
    /// Derives a key from a value, or `None` for unhashable values.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Some(Self::Integer(*n)),
            Value::Float(f) => Some(Self::Float(f.to_bits())),
            Value::Boolean(b) => Some(Self::Boolean(*b)),
            Value::Str(s) => Some(Self::Str(Rc::clone(s))),
            _ => None,
        }
    }

    /// Reconstructs the key's original value, used by `keys()`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(n) => Value::Integer(*n),
            Self::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Self::Boolean(b) => Value::Boolean(*b),
            Self::Str(s) => Value::Str(Rc::clone(s)),
        }
    }
}

impl Value {
    #[must_use]
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    #[must_use]
    pub fn array(values: Vec<Self>) -> Self {
        Self::Array(Rc::new(RefCell::new(values)))
    }

    #[must_use]
    pub fn hash(map: IndexMap<HashKey, Self>) -> Self {
        Self::Hash(Rc::new(RefCell::new(map)))
    }

    /// The printable type name returned by `type(v)`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Boolean(_) => "BOOLEAN",
            Self::Str(_) => "STRING",
            Self::Array(_) => "ARRAY",
            Self::Hash(_) => "HASH",
            Self::Function(_) | Self::CompiledFunction(_) | Self::Closure(_) | Self::BoundMethod(_) => "FUNCTION",
            Self::Builtin(_) | Self::BuiltinMethod(_) | Self::ErrorCtor(_) => "BUILTIN",
            Self::Class(_) => "CLASS",
            Self::Object(_) => "OBJECT",
            Self::Error(_) => "ERROR",
            Self::File(_) => "FILE",
            Self::Directory(_) => "DIRECTORY",
            Self::Path(_) => "PATH",
            Self::Time(_) => "TIME",
            Self::Duration(_) => "DURATION",
            Self::TimeZone(_) => "TIMEZONE",
            Self::Namespace(_) => "NAMESPACE",
        }
    }

    /// `null` and `false` are falsy; everything else (including `0`, `""`,
    /// `[]`, `{}`) is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Boolean(false))
    }

    /// Structural equality with numeric promotion.
    ///
    /// Primitives compare structurally; mixed Integer/Float comparisons
    /// promote to float; arrays and hashes compare element-wise; functions,
    /// classes and objects compare by identity; incompatible tags are never
    /// equal.
    #[must_use]
    pub fn value_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => (*a as f64) == *b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Self::Hash(a), Self::Hash(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| value.value_eq(other)))
            }
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            (Self::CompiledFunction(a), Self::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::ErrorCtor(a), Self::ErrorCtor(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Directory(a), Self::Directory(b)) | (Self::Path(a), Self::Path(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a.nanos == b.nanos,
            (Self::TimeZone(a), Self::TimeZone(b)) => a.name == b.name && a.offset_secs == b.offset_secs,
            (Self::Namespace(a), Self::Namespace(b)) => a == b,
            _ => false,
        }
    }

    /// Canonical printable representation. Tests compare this byte-for-byte.
    #[must_use]
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        self.inspect_into(&mut out);
        out
    }

    fn inspect_into(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Integer(n) => {
                let _ = write!(out, "{n}");
            }
            Self::Float(f) => out.push_str(&format_float(*f)),
            Self::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Str(s) => out.push_str(s),
            Self::Array(values) => {
                out.push('[');
                for (i, value) in values.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    value.inspect_into(out);
                }
                out.push(']');
            }
            Self::Hash(map) => {
                out.push('{');
                for (i, (key, value)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.to_value().inspect_into(out);
                    out.push_str(": ");
                    value.inspect_into(out);
                }
                out.push('}');
            }
            Self::Function(func) => {
                out.push_str("fn(");
                out.push_str(&func.params.join(", "));
                out.push_str(") { ... }");
            }
            Self::CompiledFunction(_) | Self::Closure(_) => out.push_str("fn(...) { ... }"),
            Self::Builtin(builtin) => {
                let _ = write!(out, "#<Builtin:{builtin}>");
            }
            Self::BuiltinMethod(method) => {
                let _ = write!(out, "#<Builtin:{}>", method.name);
            }
            Self::Class(class) => {
                let _ = write!(out, "#<Class:{}>", class.name);
            }
            Self::Object(object) => {
                let _ = write!(out, "#<Object:{}>", object.class.name);
            }
            Self::BoundMethod(bound) => {
                let _ = write!(out, "#<Method:{}.{}>", bound.receiver.class.name, bound.name);
            }
            Self::Error(err) => {
                let _ = write!(out, "ERROR: {}", err.message);
            }
            Self::ErrorCtor(kind) => {
                let _ = write!(out, "#<Builtin:{kind}>");
            }
            Self::File(file) => {
                let state = if file.is_open() { "open" } else { "closed" };
                let _ = write!(out, "#<File:{} ({state})>", file.path);
            }
            Self::Directory(path) => {
                let _ = write!(out, "#<Directory:{path}>");
            }
            Self::Path(value) => {
                let _ = write!(out, "#<Path:{value}>");
            }
            Self::Time(time) => {
                let _ = write!(out, "#<Time:{}>", time.rfc3339());
            }
            Self::Duration(nanos) => {
                let _ = write!(out, "#<Duration:{}>", crate::modules::format_duration(*nanos));
            }
            Self::TimeZone(zone) => {
                let _ = write!(out, "#<TimeZone:{}>", zone.name);
            }
            Self::Namespace(ns) => {
                let _ = write!(out, "#<Namespace:{ns}>");
            }
        }
    }
}

/// Formats a float the way Go's `%g` verb does: shortest round-tripping
/// digits, no trailing `.0`, scientific notation for decimal exponents
/// below -4 or at/above 21, exponent sign always present and zero-padded to
/// two digits.
#[must_use]
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f.is_sign_negative() { "-Inf" } else { "+Inf" }.to_string();
    }

    let mut buffer = ryu::Buffer::new();
    let shortest = buffer.format_finite(f);

    // Split the shortest representation into sign, digits and the decimal
    // exponent of the most significant digit.
    let (mantissa, exp) = match shortest.find(['e', 'E']) {
        Some(i) => (&shortest[..i], shortest[i + 1..].parse::<i32>().unwrap_or(0)),
        None => (shortest, 0),
    };
    let negative = mantissa.starts_with('-');
    let unsigned = mantissa.trim_start_matches('-');
    let mut point = unsigned.find('.').unwrap_or(unsigned.len()) as i32;
    let mut digits: Vec<u8> = unsigned.bytes().filter(u8::is_ascii_digit).collect();

    // Normalize: drop leading zeros (adjusting the point) and trailing zeros.
    while digits.len() > 1 && digits[0] == b'0' {
        digits.remove(0);
        point -= 1;
    }
    while digits.len() > 1 && *digits.last().unwrap() == b'0' {
        digits.pop();
    }

    let sign = if negative { "-" } else { "" };
    if digits == b"0" {
        return format!("{sign}0");
    }

    // Decimal exponent of the most significant digit.
    let msd_exp = point - 1 + exp;

    let digits = String::from_utf8(digits).expect("ascii digits");
    if (-4..21).contains(&msd_exp) {
        if msd_exp >= 0 {
            let int_len = (msd_exp + 1) as usize;
            if digits.len() <= int_len {
                format!("{sign}{digits}{}", "0".repeat(int_len - digits.len()))
            } else {
                format!("{sign}{}.{}", &digits[..int_len], &digits[int_len..])
            }
        } else {
            format!("{sign}0.{}{}", "0".repeat((-msd_exp - 1) as usize), digits)
        }
    } else {
        let mantissa = if digits.len() == 1 {
            digits
        } else {
            format!("{}.{}", &digits[..1], &digits[1..])
        };
        let (exp_sign, exp_abs) = if msd_exp < 0 { ('-', -msd_exp) } else { ('+', msd_exp) };
        format!("{sign}{mantissa}e{exp_sign}{exp_abs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formatting_matches_go_g() {
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(3.0), "3");
        assert_eq!(format_float(-3.0), "-3");
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(100_000.0), "100000");
        assert_eq!(format_float(1_000_000.0), "1000000");
        assert_eq!(format_float(1_234_567.0), "1234567");
        assert_eq!(format_float(1e20), "100000000000000000000");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(1e21), "1e+21");
        assert_eq!(format_float(1.0 / 3.0), "0.3333333333333333");
        assert_eq!(format_float(10.0 / 3.0), "3.3333333333333335");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
    }

    #[test]
    fn numeric_equality_promotes() {
        assert!(Value::Integer(1).value_eq(&Value::Float(1.0)));
        assert!(!Value::Integer(1).value_eq(&Value::string("1")));
    }

    #[test]
    fn hash_keys_canonicalize_by_tag() {
        let int_key = HashKey::from_value(&Value::Integer(1)).unwrap();
        let float_key = HashKey::from_value(&Value::Float(1.0)).unwrap();
        assert_ne!(int_key, float_key);
        assert!(HashKey::from_value(&Value::array(vec![])).is_none());
    }

    #[test]
    fn inspect_formats() {
        assert_eq!(Value::Integer(42).inspect(), "42");
        assert_eq!(Value::Null.inspect(), "null");
        assert_eq!(
            Value::array(vec![Value::Integer(1), Value::string("a")]).inspect(),
            "[1, a]"
        );
        let mut map = IndexMap::new();
        map.insert(HashKey::Str(Rc::from("a")), Value::Integer(1));
        map.insert(HashKey::Str(Rc::from("b")), Value::Integer(2));
        assert_eq!(Value::hash(map).inspect(), "{a: 1, b: 2}");
    }
}
