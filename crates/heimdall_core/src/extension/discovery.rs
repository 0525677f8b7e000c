//! Best-effort extension auto-discovery.
//!
//! Scans each configured subdirectory of the extensions root, imports
//! module-like files, and registers every module whose `default` export
//! declares an extension.

use crate::extension::kind::{parse_extension_kind, ExtensionKind};
use crate::extension::registry::{Extension, ExtensionRegistry, ModuleExtension};
use crate::module::{Export, Module};
use crate::resolver::ModuleResolver;
use log::{debug, error};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

static MODULE_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^.].*\.(?:ts|js)$").expect("valid module file regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one discovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Newly registered extension names.
    pub registered: Vec<String>,
    /// Imported files that declared no extension or lost a name collision.
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<DiscoveryFailure>,
}

/// Returns true for file names treated as importable extension modules.
pub fn is_module_file(file_name: &str) -> bool {
    MODULE_FILE_RE.is_match(file_name)
}

/// Discovers and registers extensions under the resolver's extensions root.
///
/// Unreadable directories count as empty. Per-file failures are logged and
/// collected; the sweep always continues.
pub async fn auto_discover(
    registry: &mut ExtensionRegistry,
    resolver: &ModuleResolver,
) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    let root = resolver.layout().extensions_root();

    for dir in &resolver.layout().extension_subdirs {
        let dir_path = root.join(dir);
        let entries = match resolver.tree().entries(&dir_path) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(
                    "event=extension_discover module=extensions status=skip dir={} reason={}",
                    dir_path.display(),
                    err
                );
                continue;
            }
        };

        for entry in entries.into_iter().filter(|entry| !entry.is_dir) {
            let file_name = entry
                .path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            if !is_module_file(file_name) {
                continue;
            }

            let module = match resolver.import(&entry.path).await {
                Ok(module) => module,
                Err(err) => {
                    error!(
                        "event=extension_discover module=extensions status=error path={} error={}",
                        entry.path.display(),
                        err
                    );
                    report.failures.push(DiscoveryFailure {
                        path: entry.path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            match declared_extension(&module, dir) {
                Ok(Some(extension)) => {
                    let name = extension.name().to_string();
                    match registry.register(Arc::new(extension)) {
                        Ok(()) => report.registered.push(name),
                        Err(_) => report.skipped.push(entry.path),
                    }
                }
                Ok(None) => report.skipped.push(entry.path),
                Err(message) => {
                    error!(
                        "event=extension_discover module=extensions status=error path={} error={}",
                        entry.path.display(),
                        message
                    );
                    report.failures.push(DiscoveryFailure {
                        path: entry.path,
                        message,
                    });
                }
            }
        }
    }

    debug!(
        "event=extension_discover module=extensions status=ok registered={} skipped={} failed={}",
        report.registered.len(),
        report.skipped.len(),
        report.failures.len()
    );
    report
}

/// Reads the extension declaration carried by a module's `default` export.
///
/// `Ok(None)` means the module does not declare an extension.
fn declared_extension(module: &Module, dir: &str) -> Result<Option<ModuleExtension>, String> {
    let Some(Export::Value(Value::Object(declaration))) = module.get("default") else {
        return Ok(None);
    };
    let Some(name) = declaration.get("name").and_then(Value::as_str) else {
        return Ok(None);
    };

    let kind = match declaration.get("type").and_then(Value::as_str) {
        Some(raw) => parse_extension_kind(raw).map_err(|err| err.to_string())?,
        None => ExtensionKind::from_discovery_dir(dir)
            .ok_or_else(|| format!("cannot infer extension kind from directory `{dir}`"))?,
    };

    let mut extension = ModuleExtension::new(name, kind);
    if let Some(init) = module.get("init").as_ref().and_then(Export::as_callable) {
        extension = extension.with_init(module.path().to_path_buf(), init.clone());
    }
    Ok(Some(extension))
}
