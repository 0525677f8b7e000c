//! Layering core for Heimdall.
//! Lets a downstream distribution override, inject into, patch, and extend a
//! vendored application without touching the vendor tree.

pub mod apply;
pub mod branding;
pub mod config;
pub mod context;
pub mod extension;
pub mod injector;
pub mod logging;
pub mod module;
pub mod patcher;
pub mod resolver;

pub use apply::{ApplyError, ApplyReport, TargetFailure, TargetState};
pub use config::{BrandingConfig, ConfigError, LayerLayout};
pub use context::LayerContext;
pub use extension::{
    Extension, ExtensionError, ExtensionKind, ExtensionRegistry, ExtensionRegistryError,
    ModuleExtension,
};
pub use injector::{CommandHost, CommandReport, DependencyInjector, Injectable, InjectionKind};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use module::{CallError, CallResult, Callable, Export, ExportMap, Invocation, Module};
pub use patcher::{Patch, PatchBody, PatchError, PatchKind, RuntimePatcher};
pub use resolver::{
    FsSourceTree, ImportMechanism, MemoizedImport, ModuleFormat, ModuleResolver, ResolveError,
    SourceRegistry, SourceTree,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
