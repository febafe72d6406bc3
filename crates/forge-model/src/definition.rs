//! Per-model registry: naming, mass-assignment rules, casts, accessors,
//! mutators, scopes and relation resolvers.
//!
//! A `ModelDef` is built once per model type (typically in a `OnceLock`) and
//! consulted by every instance. Nothing is looked up by building method names
//! from strings: accessors, mutators and scopes are plain function pointers
//! registered by key.
//!
//! # Example
//!
//! ```ignore
//! ModelDef::<User>::new("User")
//!     .fillable(&["name", "email", "is_admin"])
//!     .hidden(&["password"])
//!     .cast("is_admin", Cast::Bool)
//!     .mutator("email", |v| Value::Text(v.to_key_string().to_lowercase()))
//!     .scope("admins", |q, _| q.where_("is_admin", true))
//!     .relation("posts", |u| Ok(Related::many(u.has_many::<Post>().get()?)))
//!     .timestamps(true)
//! ```

use chrono::DateTime;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use forge_core::inflect;
use forge_core::value::parse_datetime;
use forge_core::{Error, Result, Value};
use forge_query::QueryBuilder;

use crate::related::Related;

/// Attribute type casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    Int,
    Float,
    String,
    Bool,
    /// JSON array/object decoded from text.
    Array,
    Json,
    Object,
    Collection,
    DateTime,
}

impl Cast {
    /// Parse a cast name (`int`, `integer`, `float`, `double`, `string`,
    /// `bool`, `boolean`, `array`, `json`, `object`, `collection`,
    /// `datetime`, `date`, `timestamp`).
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(Cast::Int),
            "float" | "double" | "real" => Ok(Cast::Float),
            "string" => Ok(Cast::String),
            "bool" | "boolean" => Ok(Cast::Bool),
            "array" => Ok(Cast::Array),
            "json" => Ok(Cast::Json),
            "object" => Ok(Cast::Object),
            "collection" => Ok(Cast::Collection),
            "datetime" | "date" | "timestamp" => Ok(Cast::DateTime),
            other => Err(Error::configuration(format!("unknown cast `{other}`"))),
        }
    }

    /// Convert `value`; `Null` always stays `Null`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply(self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(value);
        }
        let fail = |value: &Value| {
            Error::Conversion(format!(
                "cannot cast {} `{}` to {self:?}",
                value.type_name(),
                value
            ))
        };
        match self {
            Cast::Int => match &value {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .or_else(|_| s.trim().parse::<f64>().map(|f| Value::Int(f.trunc() as i64)))
                    .map_err(|_| fail(&value)),
                _ => Err(fail(&value)),
            },
            Cast::Float => value.as_f64().map(Value::Float).ok_or_else(|| fail(&value)),
            Cast::String => match value {
                Value::Text(_) => Ok(value),
                Value::Bytes(b) => String::from_utf8(b)
                    .map(Value::Text)
                    .map_err(|e| Error::Conversion(e.to_string())),
                other => Ok(Value::Text(other.to_key_string())),
            },
            Cast::Bool => value.as_bool().map(Value::Bool).ok_or_else(|| fail(&value)),
            Cast::Array | Cast::Json | Cast::Object | Cast::Collection => match value {
                Value::Json(_) => Ok(value),
                Value::Text(ref s) => serde_json::from_str(s)
                    .map(Value::Json)
                    .map_err(|e| Error::Conversion(format!("invalid JSON attribute: {e}"))),
                other => Ok(Value::Json(other.to_json())),
            },
            Cast::DateTime => match &value {
                Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
                Value::Text(s) => parse_datetime(s)
                    .map(Value::DateTime)
                    .ok_or_else(|| fail(&value)),
                Value::Int(ts) => DateTime::from_timestamp(*ts, 0)
                    .map(|dt| Value::DateTime(dt.naive_utc()))
                    .ok_or_else(|| fail(&value)),
                _ => Err(fail(&value)),
            },
        }
    }
}

/// Computes an attribute on read. Receives the model and the stored value
/// (already cast), or `Null` for purely computed attributes.
pub type Accessor<M> = fn(&M, Value) -> Value;

/// Transforms a value on write. Its output is stored as-is.
pub type Mutator = fn(Value) -> Value;

/// Named query constraint. Receives the scope arguments.
pub type Scope = fn(QueryBuilder, &[Value]) -> QueryBuilder;

/// Loads a named relation for a model instance.
pub type RelationResolver<M> = fn(&M) -> Result<Related>;

/// Static description of a model type.
pub struct ModelDef<M> {
    name: String,
    table: String,
    primary_key: String,
    incrementing: bool,
    fillable: Vec<String>,
    guarded: Vec<String>,
    hidden: Vec<String>,
    appends: Vec<String>,
    casts: BTreeMap<String, Cast>,
    dates: Vec<String>,
    accessors: HashMap<String, Accessor<M>>,
    mutators: HashMap<String, Mutator>,
    scopes: HashMap<String, Scope>,
    relations: HashMap<String, RelationResolver<M>>,
    timestamps: bool,
    cached: bool,
}

impl<M> ModelDef<M> {
    /// Definition for the Rust type `name`; the table defaults to the
    /// snake-cased plural (`BlogPost` -> `blog_posts`).
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: inflect::table_name_for(name),
            primary_key: "id".to_string(),
            incrementing: true,
            fillable: Vec::new(),
            guarded: Vec::new(),
            hidden: Vec::new(),
            appends: Vec::new(),
            casts: BTreeMap::new(),
            dates: Vec::new(),
            accessors: HashMap::new(),
            mutators: HashMap::new(),
            scopes: HashMap::new(),
            relations: HashMap::new(),
            timestamps: false,
            cached: false,
        }
    }

    // ==================== Builders ====================

    /// Explicit table name.
    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// Primary key column (default `id`).
    pub fn primary_key(mut self, key: &str) -> Self {
        self.primary_key = key.to_string();
        self
    }

    /// Whether the key is generated by the database (default `true`).
    pub fn incrementing(mut self, incrementing: bool) -> Self {
        self.incrementing = incrementing;
        self
    }

    /// Mass-assignable attributes.
    pub fn fillable(mut self, keys: &[&str]) -> Self {
        self.fillable = keys.iter().map(|k| (*k).to_string()).collect();
        self
    }

    /// Attributes excluded from mass assignment. Wins over `fillable`.
    pub fn guarded(mut self, keys: &[&str]) -> Self {
        self.guarded = keys.iter().map(|k| (*k).to_string()).collect();
        self
    }

    /// Attributes left out of JSON.
    pub fn hidden(mut self, keys: &[&str]) -> Self {
        self.hidden = keys.iter().map(|k| (*k).to_string()).collect();
        self
    }

    /// Computed attributes added to JSON.
    pub fn appends(mut self, keys: &[&str]) -> Self {
        self.appends = keys.iter().map(|k| (*k).to_string()).collect();
        self
    }

    /// Cast `key` on read and write.
    pub fn cast(mut self, key: &str, cast: Cast) -> Self {
        self.casts.insert(key.to_string(), cast);
        self
    }

    /// Treat `keys` as date-times.
    pub fn dates(mut self, keys: &[&str]) -> Self {
        self.dates.extend(keys.iter().map(|k| (*k).to_string()));
        self
    }

    /// Register an accessor.
    pub fn accessor(mut self, key: &str, accessor: Accessor<M>) -> Self {
        self.accessors.insert(key.to_string(), accessor);
        self
    }

    /// Register a mutator.
    pub fn mutator(mut self, key: &str, mutator: Mutator) -> Self {
        self.mutators.insert(key.to_string(), mutator);
        self
    }

    /// Register a named scope.
    pub fn scope(mut self, name: &str, scope: Scope) -> Self {
        self.scopes.insert(name.to_string(), scope);
        self
    }

    /// Register a relation resolver reachable by attribute name.
    pub fn relation(mut self, name: &str, resolver: RelationResolver<M>) -> Self {
        self.relations.insert(name.to_string(), resolver);
        self
    }

    /// Maintain `created_at`/`updated_at` (default off).
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Opt into the read-through cache.
    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    // ==================== Accessors ====================

    /// Rust type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Primary key column.
    pub fn key_name(&self) -> &str {
        &self.primary_key
    }

    /// Whether the key is database generated.
    pub fn is_incrementing(&self) -> bool {
        self.incrementing
    }

    /// Whether timestamps are maintained.
    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Whether the model participates in the cache.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Hidden attributes.
    pub fn hidden_keys(&self) -> &[String] {
        &self.hidden
    }

    /// Appended attributes.
    pub fn appended_keys(&self) -> &[String] {
        &self.appends
    }

    /// Default foreign key pointing at this model (`users` -> `user_id`).
    pub fn foreign_key(&self) -> String {
        inflect::foreign_key_for(&self.table)
    }

    /// `table.column`.
    pub fn qualify(&self, column: &str) -> String {
        format!("{}.{column}", self.table)
    }

    /// Whether `key` may be mass assigned.
    ///
    /// A non-empty guarded list wins; otherwise a non-empty fillable list is a
    /// whitelist; otherwise everything except the primary key is allowed.
    pub fn is_fillable(&self, key: &str) -> bool {
        if !self.guarded.is_empty() {
            return !self.guarded.iter().any(|g| g == key || g == "*");
        }
        if !self.fillable.is_empty() {
            return self.fillable.iter().any(|f| f == key);
        }
        key != self.primary_key
    }

    /// Cast registered for `key`, with date keys counting as `DateTime`.
    pub fn cast_for(&self, key: &str) -> Option<Cast> {
        if self.dates.iter().any(|d| d == key) {
            return Some(Cast::DateTime);
        }
        if self.timestamps && (key == crate::model::CREATED_AT || key == crate::model::UPDATED_AT) {
            return Some(Cast::DateTime);
        }
        self.casts.get(key).copied()
    }

    /// Whether `key` is a declared date.
    pub fn is_date(&self, key: &str) -> bool {
        self.dates.iter().any(|d| d == key)
    }

    /// Declared cast, ignoring dates.
    pub fn declared_cast(&self, key: &str) -> Option<Cast> {
        self.casts.get(key).copied()
    }

    /// Accessor for `key`.
    pub fn accessor_for(&self, key: &str) -> Option<Accessor<M>> {
        self.accessors.get(key).copied()
    }

    /// Mutator for `key`.
    pub fn mutator_for(&self, key: &str) -> Option<Mutator> {
        self.mutators.get(key).copied()
    }

    /// Scope named `name`.
    pub fn scope_for(&self, name: &str) -> Result<Scope> {
        self.scopes.get(name).copied().ok_or_else(|| {
            Error::configuration(format!("scope `{name}` is not defined on {}", self.name))
        })
    }

    /// Resolver for relation `name`.
    pub fn relation_for(&self, name: &str) -> Option<RelationResolver<M>> {
        self.relations.get(name).copied()
    }
}

impl<M> fmt::Debug for ModelDef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("fillable", &self.fillable)
            .field("guarded", &self.guarded)
            .field("casts", &self.casts)
            .field("scopes", &self.scopes.keys().collect::<Vec<_>>())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("timestamps", &self.timestamps)
            .finish_non_exhaustive()
    }
}
