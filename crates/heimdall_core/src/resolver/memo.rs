//! Opt-in singleton semantics for an import mechanism.

use crate::module::Module;
use crate::resolver::tree::{SourceTree, TreeEntry};
use crate::resolver::{ImportMechanism, ResolveResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Wraps an import mechanism so each concrete path is imported once and
/// every later import returns the same module handle.
///
/// The cache is keyed by the inner mechanism's canonical path. Failed
/// imports are not cached.
pub struct MemoizedImport<I> {
    inner: I,
    cache: Mutex<HashMap<PathBuf, Module>>,
}

impl<I> MemoizedImport<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl<I: ImportMechanism> ImportMechanism for MemoizedImport<I> {
    async fn import(&self, path: &Path) -> ResolveResult<Module> {
        let key = self.inner.canonical_path(path);
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(module) = cached {
            return Ok(module);
        }

        let module = self.inner.import(path).await?;
        Ok(self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(module)
            .clone())
    }

    fn canonical_path(&self, path: &Path) -> PathBuf {
        self.inner.canonical_path(path)
    }
}

impl<I: SourceTree> SourceTree for MemoizedImport<I> {
    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn entries(&self, dir: &Path) -> io::Result<Vec<TreeEntry>> {
        self.inner.entries(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoizedImport;
    use crate::module::Module;
    use crate::resolver::{ImportMechanism, SourceRegistry};
    use std::path::Path;

    #[tokio::test]
    async fn returns_the_same_handle_for_repeated_imports() {
        let mut registry = SourceRegistry::new("/app");
        registry.register_exports("vendor/a.ts", Module::builder("a").into_exports());
        let memo = MemoizedImport::new(registry);

        let first = memo.import(Path::new("vendor/a.ts")).await.expect("import");
        let second = memo.import(Path::new("vendor/a.ts")).await.expect("import");
        assert!(first.ptr_eq(&second));
        assert_eq!(memo.cached_len(), 1);
    }

    #[tokio::test]
    async fn relative_and_absolute_names_share_one_handle() {
        let mut registry = SourceRegistry::new("/app");
        registry.register_exports("vendor/a.ts", Module::builder("a").into_exports());
        let memo = MemoizedImport::new(registry);

        let relative = memo.import(Path::new("vendor/a.ts")).await.expect("import");
        let absolute = memo
            .import(Path::new("/app/vendor/a.ts"))
            .await
            .expect("import");
        assert!(relative.ptr_eq(&absolute));
        assert_eq!(memo.cached_len(), 1);
    }

    #[tokio::test]
    async fn does_not_cache_failures() {
        let memo = MemoizedImport::new(SourceRegistry::new("/app"));
        assert!(memo.import(Path::new("vendor/none.ts")).await.is_err());
        assert_eq!(memo.cached_len(), 0);
    }
}
