//! Per-type operation tables and the data conversion table
//!
//! A [`ValueType`] bundles the operations a socket type needs: default
//! construction, JSON serialization, equality, cloning, and interpolation.
//! Entries are registered once through a profile and shared by `Arc` across
//! every socket of that type.

use std::fmt;
use std::sync::Arc;

use crate::error::ValueError;
use crate::value::Value;

/// Reserved type name for execution-flow sockets. Flow sockets carry no data.
pub const FLOW_TYPE: &str = "flow";

type CreateFn = dyn Fn() -> Value + Send + Sync;
type SerializeFn = dyn Fn(&Value) -> serde_json::Value + Send + Sync;
type DeserializeFn = dyn Fn(&serde_json::Value) -> Result<Value, ValueError> + Send + Sync;
type EqualsFn = dyn Fn(&Value, &Value) -> bool + Send + Sync;
type CloneFn = dyn Fn(&Value) -> Value + Send + Sync;
type LerpFn = dyn Fn(&Value, &Value, f64) -> Value + Send + Sync;
type ConvertFn = dyn Fn(&Value) -> Value + Send + Sync;

// ─────────────────────────────────────────────────────────────────────────────
// ValueType
// ─────────────────────────────────────────────────────────────────────────────

/// Named bundle of per-type operations over [`Value`]
///
/// Invariants every registration must uphold:
/// - `deserialize(serialize(v))` is value-equal to `v` under `equals`
/// - `clone_value` yields a value independent of the source under mutation
#[derive(Clone)]
pub struct ValueType {
    name: String,
    create: Arc<CreateFn>,
    serialize: Arc<SerializeFn>,
    deserialize: Arc<DeserializeFn>,
    equals: Arc<EqualsFn>,
    clone_value: Arc<CloneFn>,
    lerp: Arc<LerpFn>,
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueType").field("name", &self.name).finish()
    }
}

impl ValueType {
    /// Start building a value type with the given unique name
    pub fn builder(name: impl Into<String>) -> ValueTypeBuilder {
        ValueTypeBuilder::new(name)
    }

    /// Unique registry key for this type
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default-construct a value of this type
    pub fn create(&self) -> Value {
        (self.create)()
    }

    /// Serialize a value to its persisted JSON form
    pub fn serialize(&self, v: &Value) -> serde_json::Value {
        (self.serialize)(v)
    }

    /// Deserialize a value from its persisted JSON form
    pub fn deserialize(&self, json: &serde_json::Value) -> Result<Value, ValueError> {
        (self.deserialize)(json)
    }

    /// Value equality under this type's semantics
    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        (self.equals)(a, b)
    }

    /// Produce an aliasing-independent copy
    pub fn clone_value(&self, v: &Value) -> Value {
        (self.clone_value)(v)
    }

    /// Interpolate between two values at parameter `t` in [0, 1]
    pub fn lerp(&self, a: &Value, b: &Value, t: f64) -> Value {
        (self.lerp)(a, b, t)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`ValueType`] entries
///
/// `create` and `deserialize` must be supplied. The remaining operations
/// default to structural behavior: serialization through the `Value` JSON
/// interop, equality on the serialized form, a plain deep clone, and a
/// step interpolation that switches from `a` to `b` at `t >= 0.5`.
pub struct ValueTypeBuilder {
    name: String,
    create: Option<Arc<CreateFn>>,
    serialize: Option<Arc<SerializeFn>>,
    deserialize: Option<Arc<DeserializeFn>>,
    equals: Option<Arc<EqualsFn>>,
    clone_value: Option<Arc<CloneFn>>,
    lerp: Option<Arc<LerpFn>>,
}

impl ValueTypeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create: None,
            serialize: None,
            deserialize: None,
            equals: None,
            clone_value: None,
            lerp: None,
        }
    }

    /// Set the default constructor
    pub fn create(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.create = Some(Arc::new(f));
        self
    }

    /// Set the serializer
    pub fn serialize(
        mut self,
        f: impl Fn(&Value) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.serialize = Some(Arc::new(f));
        self
    }

    /// Set the deserializer
    pub fn deserialize(
        mut self,
        f: impl Fn(&serde_json::Value) -> Result<Value, ValueError> + Send + Sync + 'static,
    ) -> Self {
        self.deserialize = Some(Arc::new(f));
        self
    }

    /// Set the equality predicate
    pub fn equals(mut self, f: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static) -> Self {
        self.equals = Some(Arc::new(f));
        self
    }

    /// Set the clone operation
    pub fn clone_value(mut self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.clone_value = Some(Arc::new(f));
        self
    }

    /// Set the interpolation operation
    pub fn lerp(
        mut self,
        f: impl Fn(&Value, &Value, f64) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.lerp = Some(Arc::new(f));
        self
    }

    /// Finish building. Panics if `create` or `deserialize` is missing; value
    /// types are assembled at startup where a missing operation is a
    /// programming error, not a recoverable condition.
    pub fn build(self) -> ValueType {
        let name = self.name;
        let create = self
            .create
            .unwrap_or_else(|| panic!("value type {name} has no create operation"));
        let deserialize = self
            .deserialize
            .unwrap_or_else(|| panic!("value type {name} has no deserialize operation"));
        let serialize = self
            .serialize
            .unwrap_or_else(|| Arc::new(|v: &Value| serde_json::Value::from(v.clone())));
        let equals = self.equals.unwrap_or_else(|| {
            Arc::new(|a: &Value, b: &Value| {
                serde_json::Value::from(a.clone()) == serde_json::Value::from(b.clone())
            })
        });
        let clone_value = self
            .clone_value
            .unwrap_or_else(|| Arc::new(|v: &Value| v.clone()));
        let lerp = self.lerp.unwrap_or_else(|| {
            Arc::new(|a: &Value, b: &Value, t: f64| {
                if t < 0.5 { a.clone() } else { b.clone() }
            })
        });

        ValueType {
            name,
            create,
            serialize,
            deserialize,
            equals,
            clone_value,
            lerp,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion Table
// ─────────────────────────────────────────────────────────────────────────────

/// Explicit, one-directional data conversions between value types
///
/// Connections between data sockets of different types are only legal when
/// the exact `(source, target)` pair is registered here. Conversions are
/// never chained: registering integer→string does not imply
/// integer→float→string.
#[derive(Default, Clone)]
pub struct ConversionTable {
    entries: std::collections::HashMap<(String, String), Arc<ConvertFn>>,
}

impl fmt::Debug for ConversionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionTable")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConversionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conversion from `source` to `target`
    pub fn register(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        f: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) {
        self.entries
            .insert((source.into(), target.into()), Arc::new(f));
    }

    /// Check whether a directed conversion is registered
    pub fn contains(&self, source: &str, target: &str) -> bool {
        self.entries
            .contains_key(&(source.to_string(), target.to_string()))
    }

    /// Apply a registered conversion, or return the value untouched when
    /// source and target are the same type
    pub fn convert(&self, source: &str, target: &str, value: &Value) -> Option<Value> {
        if source == target {
            return Some(value.clone());
        }
        self.entries
            .get(&(source.to_string(), target.to_string()))
            .map(|f| f(value))
    }

    /// Whether two socket types may be connected source→target
    ///
    /// Flow sockets connect only to flow sockets; data sockets connect when
    /// the type names are equal or the pair is registered.
    pub fn compatible(&self, source: &str, target: &str) -> bool {
        match (source == FLOW_TYPE, target == FLOW_TYPE) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => source == target || self.contains(source, target),
        }
    }

    /// Iterate over registered `(source, target)` pairs
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .keys()
            .map(|(s, t)| (s.as_str(), t.as_str()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
