//! Loaded module surface and its swappable export slot.
//!
//! # Responsibility
//! - Represent the exported members of one loaded module as an ordered map.
//! - Share a single export slot between every holder of a `Module` handle.
//!
//! # Invariants
//! - Exports change only through `Module::commit`, which swaps the whole map.
//! - Member order is insertion order; overwriting a member keeps its slot.

use indexmap::IndexMap;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Ordered member name -> export mapping.
pub type ExportMap = IndexMap<String, Export>;

pub type CallResult = Result<Value, CallError>;

type CallFn = dyn Fn(&Invocation, &[Value]) -> CallResult + Send + Sync;

/// Receiver context passed to every callable in place of a `this` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Concrete path of the module that owns the member.
    pub module: PathBuf,
    /// Member name the call was dispatched through.
    pub member: String,
}

impl Invocation {
    pub fn new(module: impl Into<PathBuf>, member: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            member: member.into(),
        }
    }
}

/// Shared, cheaply clonable function slot.
#[derive(Clone)]
pub struct Callable(Arc<CallFn>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Invocation, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Callable that ignores its arguments and returns `null`.
    pub fn noop() -> Self {
        Self::new(|_, _| Ok(Value::Null))
    }

    pub fn call(&self, invocation: &Invocation, args: &[Value]) -> CallResult {
        (self.0)(invocation, args)
    }

    /// Returns true when both handles point at the same function.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Callable(..)")
    }
}

/// One exported member.
#[derive(Debug, Clone)]
pub enum Export {
    /// Plain data (strings, numbers, objects, ...).
    Value(Value),
    /// Free function or method.
    Function(Callable),
    /// Constructor-like callable.
    Class(Callable),
}

impl Export {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Invocation, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        Self::Function(Callable::new(f))
    }

    pub fn is_callable(&self) -> bool {
        !matches!(self, Self::Value(_))
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Self::Function(callable) | Self::Class(callable) => Some(callable),
            Self::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// Short label used in log lines.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Function(_) => "function",
            Self::Class(_) => "class",
        }
    }
}

impl From<Value> for Export {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Export {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Export {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<Callable> for Export {
    fn from(value: Callable) -> Self {
        Self::Function(value)
    }
}

/// Errors raised while invoking a module member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    MissingMember(String),
    NotCallable(String),
    Failed(String),
}

impl CallError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingMember(name) => write!(f, "module has no member `{name}`"),
            Self::NotCallable(name) => write!(f, "module member `{name}` is not callable"),
            Self::Failed(message) => write!(f, "call failed: {message}"),
        }
    }
}

impl Error for CallError {}

/// Handle to a loaded module.
///
/// Clones share one export slot, so a commit made through any handle is
/// visible to all of them.
#[derive(Clone)]
pub struct Module {
    path: PathBuf,
    exports: Arc<RwLock<ExportMap>>,
}

impl Module {
    pub fn new(path: impl Into<PathBuf>, exports: ExportMap) -> Self {
        Self {
            path: path.into(),
            exports: Arc::new(RwLock::new(exports)),
        }
    }

    pub fn builder(path: impl Into<PathBuf>) -> ModuleBuilder {
        ModuleBuilder {
            path: path.into(),
            exports: ExportMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies the current exports out of the slot.
    pub fn snapshot(&self) -> ExportMap {
        self.exports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, member: &str) -> Option<Export> {
        self.exports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(member)
            .cloned()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.exports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(member)
    }

    pub fn member_names(&self) -> Vec<String> {
        self.exports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Swaps in a fully composed export map.
    pub fn commit(&self, exports: ExportMap) {
        *self
            .exports
            .write()
            .unwrap_or_else(PoisonError::into_inner) = exports;
    }

    /// Invokes one callable member with an `Invocation` bound to this module.
    pub fn call(&self, member: &str, args: &[Value]) -> CallResult {
        let export = self
            .get(member)
            .ok_or_else(|| CallError::MissingMember(member.to_string()))?;
        let callable = export
            .as_callable()
            .ok_or_else(|| CallError::NotCallable(member.to_string()))?;
        callable.call(&Invocation::new(self.path.clone(), member), args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.exports, &other.exports)
    }
}

impl Debug for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.path)
            .field("members", &self.member_names())
            .finish()
    }
}

/// Fluent constructor for module export maps.
#[derive(Debug)]
pub struct ModuleBuilder {
    path: PathBuf,
    exports: ExportMap,
}

impl ModuleBuilder {
    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.exports.insert(name.into(), Export::Value(value.into()));
        self
    }

    pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Invocation, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        self.exports.insert(name.into(), Export::function(f));
        self
    }

    pub fn export(mut self, name: impl Into<String>, export: Export) -> Self {
        self.exports.insert(name.into(), export);
        self
    }

    pub fn into_exports(self) -> ExportMap {
        self.exports
    }

    pub fn build(self) -> Module {
        Module::new(self.path, self.exports)
    }
}
