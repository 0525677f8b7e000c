//! Static source registry.
//!
//! Maps concrete module paths to factories that produce the module's
//! exports. The registry also answers `SourceTree` queries from its own
//! manifest, so resolution against it never touches the filesystem.

use crate::module::{ExportMap, Module};
use crate::resolver::tree::{SourceTree, TreeEntry};
use crate::resolver::{ImportMechanism, ResolveError, ResolveResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use log::debug;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Produces a fresh export map on every import.
pub type ModuleFactory = Arc<dyn Fn() -> Result<ExportMap, String> + Send + Sync>;

/// Path-keyed module factories.
///
/// Keys are stored relative to `root`; absolute paths under `root` and
/// root-relative paths address the same entry.
pub struct SourceRegistry {
    root: PathBuf,
    factories: IndexMap<PathBuf, ModuleFactory>,
}

impl SourceRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            factories: IndexMap::new(),
        }
    }

    /// Registers a factory; returns true when an earlier entry was replaced.
    pub fn register<F>(&mut self, path: impl AsRef<Path>, factory: F) -> bool
    where
        F: Fn() -> Result<ExportMap, String> + Send + Sync + 'static,
    {
        let key = self.key(path.as_ref());
        debug!(
            "event=source_register module=source_registry path={}",
            key.display()
        );
        self.factories.insert(key, Arc::new(factory)).is_some()
    }

    /// Registers a fixed export map, cloned into a new module per import.
    pub fn register_exports(&mut self, path: impl AsRef<Path>, exports: ExportMap) -> bool {
        self.register(path, move || Ok(exports.clone()))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.factories.contains_key(&self.key(path))
    }

    /// Registered paths in registration order, relative to root.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.factories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    fn key(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .strip_prefix(".")
            .unwrap_or(relative)
            .to_path_buf()
    }
}

impl SourceTree for SourceRegistry {
    fn is_file(&self, path: &Path) -> bool {
        self.contains(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let key = self.key(path);
        self.factories
            .keys()
            .any(|candidate| candidate != &key && candidate.starts_with(&key))
    }

    fn entries(&self, dir: &Path) -> io::Result<Vec<TreeEntry>> {
        let key = self.key(dir);
        let mut children = BTreeMap::<PathBuf, bool>::new();
        for candidate in self.factories.keys() {
            let Ok(rest) = candidate.strip_prefix(&key) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };
            let is_dir = components.next().is_some();
            let child = children.entry(dir.join(first)).or_insert(false);
            *child |= is_dir;
        }
        if children.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no registered sources under `{}`", dir.display()),
            ));
        }
        Ok(children
            .into_iter()
            .map(|(path, is_dir)| TreeEntry { path, is_dir })
            .collect())
    }
}

#[async_trait]
impl ImportMechanism for SourceRegistry {
    async fn import(&self, path: &Path) -> ResolveResult<Module> {
        let factory = self
            .factories
            .get(&self.key(path))
            .ok_or_else(|| ResolveError::NotFound {
                path: path.to_path_buf(),
            })?;
        let exports = factory().map_err(|message| ResolveError::ImportFailed {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(Module::new(path, exports))
    }

    fn canonical_path(&self, path: &Path) -> PathBuf {
        self.root.join(self.key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::SourceRegistry;
    use crate::module::Module;
    use crate::resolver::tree::SourceTree;
    use crate::resolver::{ImportMechanism, ResolveError};
    use std::path::{Path, PathBuf};

    fn registry() -> SourceRegistry {
        let mut registry = SourceRegistry::new("/app");
        registry.register_exports(
            "vendor/pkg/src/index.ts",
            Module::builder("x").value("A", 1).into_exports(),
        );
        registry.register_exports(
            "src/extensions/commands/info.ts",
            Module::builder("x").value("command", "info").into_exports(),
        );
        registry
    }

    #[test]
    fn absolute_and_relative_paths_share_keys() {
        let registry = registry();
        assert!(registry.is_file(Path::new("/app/vendor/pkg/src/index.ts")));
        assert!(registry.is_file(Path::new("vendor/pkg/src/index.ts")));
        assert!(registry.is_dir(Path::new("/app/vendor/pkg")));
        assert!(!registry.is_dir(Path::new("/app/vendor/pkg/src/index.ts")));
    }

    #[test]
    fn lists_immediate_children() {
        let registry = registry();
        let entries = registry
            .entries(Path::new("/app/src/extensions"))
            .expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, PathBuf::from("/app/src/extensions/commands"));
        assert!(entries[0].is_dir);
        assert!(registry.entries(Path::new("/app/src/missing")).is_err());
    }

    #[tokio::test]
    async fn import_builds_a_fresh_module_per_call() {
        let registry = registry();
        let first = registry
            .import(Path::new("/app/vendor/pkg/src/index.ts"))
            .await
            .expect("first import");
        let second = registry
            .import(Path::new("/app/vendor/pkg/src/index.ts"))
            .await
            .expect("second import");
        assert!(!first.ptr_eq(&second));
    }

    #[test]
    fn canonical_path_is_rooted_for_every_spelling() {
        let registry = registry();
        let expected = PathBuf::from("/app/vendor/pkg/src/index.ts");
        for spelling in [
            "vendor/pkg/src/index.ts",
            "./vendor/pkg/src/index.ts",
            "/app/vendor/pkg/src/index.ts",
        ] {
            assert_eq!(registry.canonical_path(Path::new(spelling)), expected);
        }
    }

    #[tokio::test]
    async fn import_surfaces_factory_failure_with_path() {
        let mut registry = SourceRegistry::new("/app");
        registry.register("vendor/broken.js", || Err("syntax error".to_string()));
        let err = registry
            .import(Path::new("/app/vendor/broken.js"))
            .await
            .expect_err("factory failure");
        match err {
            ResolveError::ImportFailed { path, message } => {
                assert_eq!(path, PathBuf::from("/app/vendor/broken.js"));
                assert_eq!(message, "syntax error");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
