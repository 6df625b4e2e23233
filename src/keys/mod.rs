//! Key Generation Module
//!
//! Deterministic cache keys built from a subject identity, an operation
//! name and an ordered argument list:
//!
//! ```text
//! [@<identifier>/]<identity>/<operation>[/<fingerprint>]
//! ```
//!
//! The fingerprint is omitted when there are no arguments.

mod call_site;

use std::any::type_name;
use std::fmt::Write as _;

use serde::ser::{Impossible, Serializer};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::error::{CacheError, Result};

pub use call_site::CallSite;

/// Bytes of the SHA-256 digest kept in a fingerprint (128 bits).
const FINGERPRINT_BYTES: usize = 16;

// == Arg ==
/// One argument of a memoized call, in a form that can be fingerprinted.
///
/// Scalars convert with `From`; anything else goes through
/// [`Arg::composite`], which fails fast on values serde cannot render.
/// Types without a `Serialize` impl (handles, locks, closures) cannot be
/// passed at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    /// Sequences and maps, kept in their JSON shape
    Composite(Value),
}

impl Arg {
    /// Converts any serializable value, collapsing scalars to their own
    /// variants so `Arg::composite(&5)` equals `Arg::from(5)`.
    ///
    /// # Errors
    /// `InvalidArgument` if the value cannot be rendered (for example a
    /// map with non-string keys).
    pub fn composite<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        // JSON has no NaN or infinity, so floats skip the `Value` detour.
        if let Ok(Some(float)) = value.serialize(FloatScalar) {
            return Ok(Arg::Float(float));
        }

        let value = serde_json::to_value(value).map_err(|e| {
            CacheError::InvalidArgument(format!(
                "{} cannot be used as a memoization argument: {}",
                type_name::<T>(),
                e
            ))
        })?;
        Ok(Self::from_value(value))
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Arg::Null,
            Value::Bool(b) => Arg::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Arg::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Arg::UInt(u)
                } else {
                    Arg::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Arg::Str(s),
            other => Arg::Composite(other),
        }
    }

    /// Appends `_<tag>-<value>` for this argument.
    ///
    /// Strings and composites carry a length so that concatenated
    /// renderings stay unambiguous.
    fn render_into(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = match self {
            Arg::Null => write!(out, "_NULL-"),
            Arg::Bool(true) => write!(out, "_bool-t"),
            Arg::Bool(false) => write!(out, "_bool-f"),
            Arg::Int(i) => write!(out, "_integer-{}", i),
            Arg::UInt(u) => write!(out, "_integer-{}", u),
            Arg::Float(f) => write!(out, "_double-{:?}", f),
            Arg::Str(s) => write!(out, "_string-{}:{}", s.len(), s),
            Arg::Composite(v) => {
                let rendered = v.to_string();
                write!(out, "_array-{}:{}", rendered.len(), rendered)
            }
        };
    }
}

macro_rules! arg_from {
    ($variant:ident as $target:ty: $($t:ty),*) => {$(
        impl From<$t> for Arg {
            fn from(value: $t) -> Self {
                Arg::$variant(value as $target)
            }
        }
    )*};
}

arg_from!(Int as i64: i8, i16, i32, i64, isize, u8, u16, u32);
arg_from!(UInt as u64: u64, usize);
arg_from!(Float as f64: f32, f64);

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Str(value.clone())
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Null, Into::into)
    }
}

// == Fingerprint ==
/// Digest over the ordered, type-tagged rendering of `args`.
///
/// Returns 32 lowercase hex characters. Pure and deterministic: reordering
/// arguments or changing any argument's type or value changes the result.
pub fn fingerprint(args: &[Arg]) -> String {
    let mut rendered = String::new();
    for arg in args {
        arg.render_into(&mut rendered);
    }
    let digest = Sha256::digest(rendered.as_bytes());
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

// == Identity ==
/// Stable identity string for a type: its path with `::` turned into `/`.
pub fn identity_of<T: ?Sized>() -> String {
    normalize_separators(type_name::<T>())
}

/// Rewrites path separators (`::`, `\`) to the key separator `/`.
pub fn normalize_separators(name: &str) -> String {
    name.replace("::", "/").replace('\\', "/")
}

// == Key Generator ==
/// Builds cache keys, optionally under an `@<identifier>/` namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyGenerator {
    identifier: Option<String>,
}

impl KeyGenerator {
    /// Creates a generator without a namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator prefixing every key with `@<identifier>/`.
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
        }
    }

    /// The configured namespace, if any.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Builds the key for `operation` on `identity` with `args`.
    pub fn generate(&self, identity: &str, operation: &str, args: &[Arg]) -> String {
        let mut key = match &self.identifier {
            Some(identifier) => format!("@{}/{}/{}", identifier, identity, operation),
            None => format!("{}/{}", identity, operation),
        };
        if !args.is_empty() {
            key.push('/');
            key.push_str(&fingerprint(args));
        }

        let key = normalize_separators(&key);
        trace!(key = %key, "Generated cache key");
        key
    }

    /// Key for a call site used by the key-less `remember` form.
    pub fn for_call_site(&self, site: &CallSite) -> String {
        self.generate(&site.identity(), &site.operation(), &[])
    }
}

// == Float Detection ==
/// Serializer that answers whether a value is a bare float (possibly
/// wrapped in `Some` or a newtype). Anything else yields `None` or an
/// error and goes through `serde_json` as usual.
struct FloatScalar;

macro_rules! not_a_float {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(fn $method(self, _: $ty) -> std::result::Result<Self::Ok, Self::Error> {
            Ok(None)
        })*
    };
}

fn compound<T>() -> std::result::Result<T, serde_json::Error> {
    Err(serde::ser::Error::custom("compound value"))
}

impl Serializer for FloatScalar {
    type Ok = Option<f64>;
    type Error = serde_json::Error;
    type SerializeSeq = Impossible<Option<f64>, serde_json::Error>;
    type SerializeTuple = Impossible<Option<f64>, serde_json::Error>;
    type SerializeTupleStruct = Impossible<Option<f64>, serde_json::Error>;
    type SerializeTupleVariant = Impossible<Option<f64>, serde_json::Error>;
    type SerializeMap = Impossible<Option<f64>, serde_json::Error>;
    type SerializeStruct = Impossible<Option<f64>, serde_json::Error>;
    type SerializeStructVariant = Impossible<Option<f64>, serde_json::Error>;

    fn serialize_f32(self, v: f32) -> std::result::Result<Self::Ok, Self::Error> {
        Ok(Some(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> std::result::Result<Self::Ok, Self::Error> {
        Ok(Some(v))
    }

    not_a_float! {
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_char: char,
        serialize_str: &str,
        serialize_bytes: &[u8],
        serialize_unit_struct: &'static str,
    }

    fn serialize_none(self) -> std::result::Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_some<T: Serialize + ?Sized>(
        self,
        value: &T,
    ) -> std::result::Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> std::result::Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> std::result::Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> std::result::Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> std::result::Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_seq(self, _len: Option<usize>) -> std::result::Result<Self::SerializeSeq, Self::Error> {
        compound()
    }

    fn serialize_tuple(self, _len: usize) -> std::result::Result<Self::SerializeTuple, Self::Error> {
        compound()
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeTupleStruct, Self::Error> {
        compound()
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeTupleVariant, Self::Error> {
        compound()
    }

    fn serialize_map(self, _len: Option<usize>) -> std::result::Result<Self::SerializeMap, Self::Error> {
        compound()
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeStruct, Self::Error> {
        compound()
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeStructVariant, Self::Error> {
        compound()
    }
}
