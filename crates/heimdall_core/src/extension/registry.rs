//! In-process extension registry and initialization pass.

use crate::extension::kind::ExtensionKind;
use crate::module::{CallError, Callable, Invocation};
use async_trait::async_trait;
use indexmap::IndexMap;
use log::{debug, error, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

/// Named, independently initializable feature unit.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;
    fn kind(&self) -> ExtensionKind;
    async fn init(&self) -> Result<(), ExtensionError>;
}

/// Extension initialization failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    InitFailed(String),
    Call(CallError),
}

impl ExtensionError {
    pub fn init_failed(message: impl Into<String>) -> Self {
        Self::InitFailed(message.into())
    }
}

impl Display for ExtensionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitFailed(message) => write!(f, "extension init failed: {message}"),
            Self::Call(err) => write!(f, "extension init call failed: {err}"),
        }
    }
}

impl Error for ExtensionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Call(err) => Some(err),
            Self::InitFailed(_) => None,
        }
    }
}

/// Extension declared by a loaded module: a name, a kind, and an optional
/// `init` member.
#[derive(Debug, Clone)]
pub struct ModuleExtension {
    name: String,
    kind: ExtensionKind,
    init: Option<(PathBuf, Callable)>,
}

impl ModuleExtension {
    pub fn new(name: impl Into<String>, kind: ExtensionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            init: None,
        }
    }

    pub fn with_init(mut self, module: impl Into<PathBuf>, init: Callable) -> Self {
        self.init = Some((module.into(), init));
        self
    }
}

#[async_trait]
impl Extension for ModuleExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ExtensionKind {
        self.kind
    }

    async fn init(&self) -> Result<(), ExtensionError> {
        let Some((module, init)) = &self.init else {
            return Ok(());
        };
        init.call(&Invocation::new(module.clone(), "init"), &[])
            .map(|_| ())
            .map_err(ExtensionError::Call)
    }
}

/// Registration errors. Callers may ignore them; the registry already logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionRegistryError {
    InvalidName(String),
    DuplicateExtension(String),
}

impl Display for ExtensionRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(value) => write!(f, "extension name is invalid: `{value}`"),
            Self::DuplicateExtension(value) => {
                write!(f, "extension already registered: {value}")
            }
        }
    }
}

impl Error for ExtensionRegistryError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitFailure {
    pub name: String,
    pub error: ExtensionError,
}

/// Outcome of one `initialize_all` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub initialized: Vec<String>,
    pub failures: Vec<InitFailure>,
}

/// Name-keyed extensions in insertion order.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: IndexMap<String, Arc<dyn Extension>>,
    initialized: HashSet<String>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one extension. The first registration of a name wins.
    ///
    /// Blank names and names with surrounding whitespace are rejected, so the
    /// registry key always equals `Extension::name`.
    pub fn register(&mut self, extension: Arc<dyn Extension>) -> Result<(), ExtensionRegistryError> {
        let name = extension.name().to_string();
        if name.is_empty() || name.trim() != name {
            warn!(
                "event=extension_register module=extensions status=invalid name={:?} kind={}",
                name,
                extension.kind()
            );
            return Err(ExtensionRegistryError::InvalidName(name));
        }
        if self.entries.contains_key(name.as_str()) {
            warn!(
                "event=extension_register module=extensions status=duplicate name={} kind={}",
                name,
                extension.kind()
            );
            return Err(ExtensionRegistryError::DuplicateExtension(name));
        }

        debug!(
            "event=extension_register module=extensions status=ok name={} kind={}",
            name,
            extension.kind()
        );
        self.entries.insert(name, extension);
        Ok(())
    }

    /// Runs `init` for every extension not yet initialized, in insertion order.
    ///
    /// A failed extension stays eligible for the next pass.
    pub async fn initialize_all(&mut self) -> InitReport {
        let pending: Vec<(String, Arc<dyn Extension>)> = self
            .entries
            .iter()
            .filter(|(name, _)| !self.initialized.contains(name.as_str()))
            .map(|(name, extension)| (name.clone(), extension.clone()))
            .collect();

        let mut report = InitReport::default();
        for (name, extension) in pending {
            match extension.init().await {
                Ok(()) => {
                    debug!(
                        "event=extension_init module=extensions status=ok name={}",
                        name
                    );
                    self.initialized.insert(name.clone());
                    report.initialized.push(name);
                }
                Err(err) => {
                    error!(
                        "event=extension_init module=extensions status=error name={} error={}",
                        name, err
                    );
                    report.failures.push(InitFailure { name, error: err });
                }
            }
        }
        report
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.entries.get(name).cloned()
    }

    pub fn list(&self) -> Vec<Arc<dyn Extension>> {
        self.entries.values().cloned().collect()
    }

    pub fn list_by_kind(&self, kind: ExtensionKind) -> Vec<Arc<dyn Extension>> {
        self.entries
            .values()
            .filter(|extension| extension.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.initialized.contains(name)
    }
}

impl Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("entries", &self.names())
            .field("initialized", &self.initialized)
            .finish()
    }
}
