use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A value bound to a named placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

macro_rules! impl_from_value {
    ($variant:ident => $($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )+
    };
}

impl_from_value!(Bool => bool);
impl_from_value!(Int => i8, i16, i32, i64);
impl_from_value!(UInt => u8, u16, u32, u64);
impl_from_value!(Float => f32, f64);
impl_from_value!(Text => String, &str);
impl_from_value!(Bytes => Vec<u8>, &[u8]);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Named parameter set for a SQL template.
///
/// Keys are stored without the leading colon, so `"id"` and `":id"` address
/// the same placeholder.
///
/// ```
/// use sqlx_mtxn_mysql::{Params, Value};
///
/// let params = Params::new().bind("id", 1).bind(":name", "Dave");
/// assert_eq!(params.get("name"), Some(&Value::Text("Dave".into())));
/// assert_eq!(params.get(":id"), Some(&Value::Int(1)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: HashMap<String, Value>,
}

fn normalize(name: &str) -> &str {
    name.strip_prefix(':').unwrap_or(name)
}

impl Params {
    /// An empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value and returns the set, for chaining.
    pub fn bind(mut self, name: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a value, returning the previous one bound to the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<Value>) -> Option<Value> {
        self.values
            .insert(normalize(name.as_ref()).to_string(), value.into())
    }

    /// Looks up a value. A leading `:` on `name` is ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlx_mtxn_mysql::{Params, Value};
    ///
    /// let params = Params::new().bind(":id", 7);
    /// assert_eq!(params.get("id"), Some(&Value::Int(7)));
    /// assert_eq!(params.get(":id"), Some(&Value::Int(7)));
    /// ```
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(normalize(name))
    }

    /// Number of distinct names bound.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl<K: AsRef<str>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Where a task gets its parameters from.
///
/// A `Lazy` source is evaluated each time it is resolved, which for a task
/// means at execution time. Values captured by the closure may change between
/// task construction and execution.
#[derive(Clone)]
pub enum ParamSource {
    Static(Params),
    Lazy(Arc<dyn Fn() -> Params + Send + Sync>),
}

impl ParamSource {
    /// Wraps a closure evaluated on every [`resolve`](Self::resolve).
    pub fn lazy<F>(f: F) -> Self
    where
        F: Fn() -> Params + Send + Sync + 'static,
    {
        ParamSource::Lazy(Arc::new(f))
    }

    /// The parameters as of now.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlx_mtxn_mysql::{ParamSource, Params, Value};
    ///
    /// let source = ParamSource::lazy(|| Params::new().bind("n", 1));
    /// assert_eq!(source.resolve().get("n"), Some(&Value::Int(1)));
    /// ```
    pub fn resolve(&self) -> Params {
        match self {
            ParamSource::Static(params) => params.clone(),
            ParamSource::Lazy(f) => f(),
        }
    }
}

impl From<Params> for ParamSource {
    fn from(params: Params) -> Self {
        ParamSource::Static(params)
    }
}

impl fmt::Debug for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Static(params) => f.debug_tuple("Static").field(params).finish(),
            ParamSource::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}
