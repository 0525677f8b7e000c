//! Layered module resolution and loading.
//!
//! # Responsibility
//! - Map logical module paths onto override, extension, or vendor targets.
//! - Load resolved targets through the import mechanism picked by extension.
//!
//! # Invariants
//! - Resolution order is override tree, then namespace lookup, then passthrough.
//! - Loading never caches; memoization belongs to an `ImportMechanism`.
//! - `resolve` returns passthrough paths unchanged; only `load` falls back to the
//!   vendor tree.
//! - Resolution only reads source trees.

mod memo;
pub mod source;
pub mod tree;

pub use memo::MemoizedImport;
pub use source::{ModuleFactory, SourceRegistry};
pub use tree::{walk_files, FsSourceTree, SourceTree, TreeEntry};

use crate::config::LayerLayout;
use crate::module::Module;
use async_trait::async_trait;
use log::{debug, error};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tree::with_appended_extension;

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Resolution and load failures. Always carries the attempted concrete path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NotFound { path: PathBuf },
    ImportFailed { path: PathBuf, message: String },
}

impl ResolveError {
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound { path } | Self::ImportFailed { path, .. } => path,
        }
    }
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "module not found: {}", path.display()),
            Self::ImportFailed { path, message } => {
                write!(f, "failed to import {}: {message}", path.display())
            }
        }
    }
}

impl Error for ResolveError {}

/// Turns a concrete path into a module.
#[async_trait]
pub trait ImportMechanism: Send + Sync {
    async fn import(&self, path: &Path) -> ResolveResult<Module>;

    /// Identity of the module `path` names. Paths that import the same
    /// module must map to the same value.
    fn canonical_path(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// Import mechanism family selected from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    EsModule,
    Legacy,
}

/// Override-aware resolver shared by the injector, patcher, and registry.
pub struct ModuleResolver {
    layout: LayerLayout,
    tree: Arc<dyn SourceTree>,
    es_modules: Arc<dyn ImportMechanism>,
    legacy: Arc<dyn ImportMechanism>,
}

impl ModuleResolver {
    /// Builds a resolver that uses one import mechanism for every format.
    pub fn new(
        layout: LayerLayout,
        tree: Arc<dyn SourceTree>,
        importer: Arc<dyn ImportMechanism>,
    ) -> Self {
        Self {
            layout,
            tree,
            es_modules: importer.clone(),
            legacy: importer,
        }
    }

    /// Resolver whose tree and imports both come from a static registry.
    pub fn from_registry(layout: LayerLayout, registry: SourceRegistry) -> Self {
        let registry = Arc::new(registry);
        Self::new(layout, registry.clone(), registry)
    }

    /// Registry-backed resolver whose imports are memoized per path, so
    /// every load of a target returns the same module handle.
    pub fn from_registry_memoized(layout: LayerLayout, registry: SourceRegistry) -> Self {
        let memoized = Arc::new(MemoizedImport::new(registry));
        Self::new(layout, memoized.clone(), memoized)
    }

    /// Replaces the per-format import mechanisms.
    pub fn with_import_mechanisms(
        mut self,
        es_modules: Arc<dyn ImportMechanism>,
        legacy: Arc<dyn ImportMechanism>,
    ) -> Self {
        self.es_modules = es_modules;
        self.legacy = legacy;
        self
    }

    pub fn layout(&self) -> &LayerLayout {
        &self.layout
    }

    pub fn tree(&self) -> &dyn SourceTree {
        self.tree.as_ref()
    }

    /// Maps a logical path to its load target.
    pub fn resolve(&self, logical: &str) -> PathBuf {
        if let Some(sub) = self.vendor_subpath(logical) {
            if let Some(found) = self.probe(&self.layout.overrides_root().join(&sub)) {
                debug!(
                    "event=override_hit module=resolver logical={} resolved={}",
                    logical,
                    found.display()
                );
                return found;
            }
        }

        if let Some(stripped) = logical.strip_prefix(self.layout.namespace_prefix.as_str()) {
            for base in [self.layout.overrides_root(), self.layout.extensions_root()] {
                if let Some(found) = self.probe(&base.join(stripped)) {
                    debug!(
                        "event=namespace_hit module=resolver logical={} resolved={}",
                        logical,
                        found.display()
                    );
                    return found;
                }
            }
        }

        PathBuf::from(logical)
    }

    /// Returns the resolved path only when resolution redirected `logical`.
    pub fn redirect(&self, logical: &str) -> Option<PathBuf> {
        let resolved = self.resolve(logical);
        (resolved.as_path() != Path::new(logical)).then_some(resolved)
    }

    /// Finds an existing file at `base`, `base<ext>`, or `base/index<ext>`.
    pub fn probe(&self, base: &Path) -> Option<PathBuf> {
        if self.tree.is_file(base) {
            return Some(base.to_path_buf());
        }
        for ext in &self.layout.probe_extensions {
            let candidate = with_appended_extension(base, ext);
            if self.tree.is_file(&candidate) {
                return Some(candidate);
            }
        }
        if self.tree.is_dir(base) {
            for ext in &self.layout.probe_extensions {
                let index = base.join(format!("index{ext}"));
                if self.tree.is_file(&index) {
                    return Some(index);
                }
            }
        }
        None
    }

    pub fn format_of(&self, path: &Path) -> ModuleFormat {
        let is_module = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.layout
                    .module_extensions
                    .iter()
                    .any(|candidate| candidate.trim_start_matches('.') == ext)
            })
            .unwrap_or(false);
        if is_module {
            ModuleFormat::EsModule
        } else {
            ModuleFormat::Legacy
        }
    }

    /// Imports an already concrete path.
    pub async fn import(&self, path: &Path) -> ResolveResult<Module> {
        let mechanism = match self.format_of(path) {
            ModuleFormat::EsModule => &self.es_modules,
            ModuleFormat::Legacy => &self.legacy,
        };
        mechanism.import(path).await.map_err(|err| {
            error!(
                "event=module_load module=resolver status=error path={} error={}",
                path.display(),
                err
            );
            err
        })
    }

    /// Resolves `logical` and imports the result.
    ///
    /// A passthrough path under the vendor tree gets the same extension and
    /// index lookup as an override, so `vendor/x` loads `vendor/x.ts` whether
    /// or not an override exists.
    pub async fn load(&self, logical: &str) -> ResolveResult<Module> {
        let resolved = self.resolve(logical);
        let target = if resolved.as_path() == Path::new(logical) {
            self.vendor_fallback(logical).unwrap_or(resolved)
        } else {
            resolved
        };
        self.import(&target).await
    }

    /// Loads `<extensions-root>/<sub>` with the usual probing rules.
    pub async fn load_extension(&self, sub: &str) -> ResolveResult<Module> {
        let base = self.layout.extensions_root().join(sub);
        let path = self
            .probe(&base)
            .ok_or(ResolveError::NotFound { path: base })?;
        self.import(&path).await
    }

    /// Lists override files relative to the override root.
    ///
    /// A missing override root yields an empty list.
    pub fn list_overrides(&self) -> Vec<PathBuf> {
        walk_files(self.tree.as_ref(), &self.layout.overrides_root()).unwrap_or_default()
    }

    fn vendor_fallback(&self, logical: &str) -> Option<PathBuf> {
        let sub = self.vendor_subpath(logical)?;
        self.probe(Path::new(logical))
            .or_else(|| self.probe(&self.layout.vendor_root().join(sub)))
    }

    fn vendor_subpath(&self, logical: &str) -> Option<PathBuf> {
        let path = Path::new(logical);
        let vendor_root = self.layout.vendor_root();
        path.strip_prefix(&vendor_root)
            .or_else(|_| path.strip_prefix(&self.layout.vendor_dir))
            .ok()
            .filter(|sub| !sub.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::{ModuleFormat, ModuleResolver, SourceRegistry};
    use crate::config::LayerLayout;
    use crate::module::Module;
    use std::path::{Path, PathBuf};

    fn resolver(paths: &[&str]) -> ModuleResolver {
        let mut registry = SourceRegistry::new("/app");
        for path in paths {
            registry.register_exports(path, Module::builder(*path).into_exports());
        }
        ModuleResolver::from_registry(LayerLayout::with_root("/app"), registry)
    }

    #[test]
    fn override_shadows_vendor_file() {
        let resolver = resolver(&[
            "vendor/opencode/src/cli/ui.ts",
            "src/overrides/opencode/src/cli/ui.ts",
        ]);
        assert_eq!(
            resolver.resolve("vendor/opencode/src/cli/ui.ts"),
            PathBuf::from("/app/src/overrides/opencode/src/cli/ui.ts")
        );
    }

    #[test]
    fn vendor_only_file_passes_through() {
        let resolver = resolver(&["vendor/opencode/src/cli/ui.ts"]);
        assert_eq!(
            resolver.resolve("vendor/opencode/src/cli/ui.ts"),
            PathBuf::from("vendor/opencode/src/cli/ui.ts")
        );
        assert!(resolver.redirect("vendor/opencode/src/cli/ui.ts").is_none());
    }

    #[test]
    fn probes_extensions_in_order_then_index_files() {
        let resolver = resolver(&[
            "src/overrides/opencode/a.js",
            "src/overrides/opencode/a.json",
            "src/overrides/opencode/pkg/index.mjs",
        ]);
        assert_eq!(
            resolver.resolve("vendor/opencode/a"),
            PathBuf::from("/app/src/overrides/opencode/a.js")
        );
        assert_eq!(
            resolver.resolve("vendor/opencode/pkg"),
            PathBuf::from("/app/src/overrides/opencode/pkg/index.mjs")
        );
    }

    #[test]
    fn namespace_prefers_overrides_then_extensions() {
        let resolver = resolver(&[
            "src/overrides/shared/util.ts",
            "src/extensions/shared/util.ts",
            "src/extensions/commands/info.ts",
        ]);
        assert_eq!(
            resolver.resolve("@heimdall/shared/util"),
            PathBuf::from("/app/src/overrides/shared/util.ts")
        );
        assert_eq!(
            resolver.resolve("@heimdall/commands/info"),
            PathBuf::from("/app/src/extensions/commands/info.ts")
        );
        assert_eq!(
            resolver.resolve("@heimdall/missing"),
            PathBuf::from("@heimdall/missing")
        );
    }

    #[test]
    fn picks_import_format_from_extension() {
        let resolver = resolver(&[]);
        assert_eq!(
            resolver.format_of(Path::new("a/b.ts")),
            ModuleFormat::EsModule
        );
        assert_eq!(
            resolver.format_of(Path::new("a/b.mjs")),
            ModuleFormat::EsModule
        );
        assert_eq!(resolver.format_of(Path::new("a/b.js")), ModuleFormat::Legacy);
        assert_eq!(resolver.format_of(Path::new("a/b")), ModuleFormat::Legacy);
    }

    #[test]
    fn lists_override_files() {
        let resolver = resolver(&[
            "vendor/opencode/x.ts",
            "src/overrides/opencode/x.ts",
            "src/overrides/opencode/nested/y.ts",
        ]);
        assert_eq!(
            resolver.list_overrides(),
            vec![
                PathBuf::from("opencode/nested/y.ts"),
                PathBuf::from("opencode/x.ts")
            ]
        );
    }
}
