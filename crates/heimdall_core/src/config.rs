//! Layer layout and branding configuration.
//!
//! # Responsibility
//! - Describe where the vendor, override, and extension trees live.
//! - Load the layout from `heimdall.toml` plus environment overrides.
//!
//! # Invariants
//! - Tree directories are relative to `root`.
//! - Probe and module extensions always start with `.`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Layout file name looked up in the layer root.
pub const LAYOUT_FILE_NAME: &str = "heimdall.toml";

pub const ENV_ROOT: &str = "HEIMDALL_ROOT";
pub const ENV_VERSION: &str = "HEIMDALL_VERSION";
pub const ENV_CONFIG_PATH: &str = "HEIMDALL_CONFIG_PATH";
pub const ENV_CACHE_PATH: &str = "HEIMDALL_CACHE_PATH";
pub const ENV_DEFAULT_MODEL: &str = "HEIMDALL_DEFAULT_MODEL";
pub const ENV_DEFAULT_PROVIDER: &str = "HEIMDALL_DEFAULT_PROVIDER";

const DEFAULT_VERSION: &str = "0.1.0";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        message: String,
    },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read layout `{}`: {source}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "failed to parse layout `{}`: {message}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid layout: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Filesystem layout of the layered application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerLayout {
    pub root: PathBuf,
    /// Pristine vendor tree.
    pub vendor_dir: PathBuf,
    /// Tree mirroring `vendor_dir` whose files shadow vendor files.
    pub overrides_dir: PathBuf,
    pub extensions_dir: PathBuf,
    /// Reserved import prefix, e.g. `@heimdall/`.
    pub namespace_prefix: String,
    /// Extensions appended during existence probing, in order.
    pub probe_extensions: Vec<String>,
    /// Extensions loaded through the ES-module import mechanism.
    pub module_extensions: Vec<String>,
    /// Extension subdirectories scanned by auto-discovery.
    pub extension_subdirs: Vec<String>,
}

impl Default for LayerLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            vendor_dir: PathBuf::from("vendor"),
            overrides_dir: PathBuf::from("src/overrides"),
            extensions_dir: PathBuf::from("src/extensions"),
            namespace_prefix: "@heimdall/".to_string(),
            probe_extensions: [".ts", ".js", ".mjs", ".json"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            module_extensions: vec![".ts".to_string(), ".mjs".to_string()],
            extension_subdirs: ["commands", "providers", "tools"]
                .iter()
                .map(|dir| dir.to_string())
                .collect(),
        }
    }
}

impl LayerLayout {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Parses a layout document. A relative `root` is anchored at `base`.
    pub fn from_toml_str(raw: &str, base: &Path) -> ConfigResult<Self> {
        let mut layout: Self = toml::from_str(raw).map_err(|err| ConfigError::Parse {
            path: base.join(LAYOUT_FILE_NAME),
            message: err.to_string(),
        })?;
        layout.root = anchor(base, &layout.root);
        layout.validate()?;
        Ok(layout)
    }

    /// Loads `<root>/heimdall.toml` when present, defaults otherwise.
    pub fn load(root: &Path) -> ConfigResult<Self> {
        let path = root.join(LAYOUT_FILE_NAME);
        if !path.is_file() {
            let layout = Self::with_root(root);
            layout.validate()?;
            return Ok(layout);
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&raw, root)
    }

    /// Loads the layout rooted at `HEIMDALL_ROOT`, falling back to `fallback_root`.
    pub fn from_env(fallback_root: &Path) -> ConfigResult<Self> {
        let root = std::env::var_os(ENV_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|| fallback_root.to_path_buf());
        Self::load(&root)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (label, dir) in [
            ("vendor_dir", &self.vendor_dir),
            ("overrides_dir", &self.overrides_dir),
            ("extensions_dir", &self.extensions_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("{label} must not be empty")));
            }
            if dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "{label} must be relative to root, got `{}`",
                    dir.display()
                )));
            }
        }
        if self.vendor_dir == self.overrides_dir {
            return Err(ConfigError::Invalid(
                "vendor_dir and overrides_dir must differ".to_string(),
            ));
        }
        if self.namespace_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "namespace_prefix must not be empty".to_string(),
            ));
        }
        for ext in self.probe_extensions.iter().chain(&self.module_extensions) {
            if !ext.starts_with('.') || ext.len() < 2 {
                return Err(ConfigError::Invalid(format!(
                    "file extension must look like `.ext`, got `{ext}`"
                )));
            }
        }
        if self.extension_subdirs.iter().any(|dir| dir.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "extension_subdirs must not contain empty names".to_string(),
            ));
        }
        Ok(())
    }

    pub fn vendor_root(&self) -> PathBuf {
        self.root.join(&self.vendor_dir)
    }

    pub fn overrides_root(&self) -> PathBuf {
        self.root.join(&self.overrides_dir)
    }

    pub fn extensions_root(&self) -> PathBuf {
        self.root.join(&self.extensions_dir)
    }
}

fn anchor(base: &Path, root: &Path) -> PathBuf {
    if root.is_absolute() {
        return root.to_path_buf();
    }
    if root.as_os_str().is_empty() || root == Path::new(".") {
        return base.to_path_buf();
    }
    base.join(root)
}

/// Branding values surfaced by the default injections and the info command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandingConfig {
    pub name: String,
    pub script_name: String,
    pub version: String,
    pub config_path: String,
    pub cache_path: String,
    pub default_model: String,
    pub default_provider: String,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl BrandingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds branding values from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            name: "Heimdall".to_string(),
            script_name: "heimdall".to_string(),
            version: non_empty(ENV_VERSION).unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            config_path: non_empty(ENV_CONFIG_PATH).unwrap_or_else(|| "~/.heimdall".to_string()),
            cache_path: non_empty(ENV_CACHE_PATH)
                .unwrap_or_else(|| "~/.heimdall/cache".to_string()),
            default_model: non_empty(ENV_DEFAULT_MODEL)
                .unwrap_or_else(|| "claude-3-5-sonnet-latest".to_string()),
            default_provider: non_empty(ENV_DEFAULT_PROVIDER)
                .unwrap_or_else(|| "anthropic".to_string()),
        }
    }

    /// Variables the vendored application reads, mapped from the branding values.
    pub fn vendor_env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("OPENCODE_CONFIG_PATH", self.config_path.clone()),
            ("OPENCODE_CACHE_PATH", self.cache_path.clone()),
            ("OPENCODE_DEFAULT_MODEL", self.default_model.clone()),
            ("OPENCODE_DEFAULT_PROVIDER", self.default_provider.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BrandingConfig, ConfigError, LayerLayout, ENV_DEFAULT_PROVIDER, ENV_VERSION,
        LAYOUT_FILE_NAME,
    };
    use std::path::{Path, PathBuf};

    #[test]
    fn default_layout_matches_stock_tree() {
        let layout = LayerLayout::with_root("/srv/heimdall");
        assert_eq!(layout.vendor_root(), PathBuf::from("/srv/heimdall/vendor"));
        assert_eq!(
            layout.overrides_root(),
            PathBuf::from("/srv/heimdall/src/overrides")
        );
        assert_eq!(layout.namespace_prefix, "@heimdall/");
        assert_eq!(layout.probe_extensions, vec![".ts", ".js", ".mjs", ".json"]);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn parses_partial_document_and_anchors_root() {
        let raw = r#"
            overrides_dir = "layers/overrides"
            namespace_prefix = "@acme/"
        "#;
        let layout =
            LayerLayout::from_toml_str(raw, Path::new("/opt/acme")).expect("layout parse");
        assert_eq!(layout.root, PathBuf::from("/opt/acme"));
        assert_eq!(
            layout.overrides_root(),
            PathBuf::from("/opt/acme/layers/overrides")
        );
        assert_eq!(layout.vendor_dir, PathBuf::from("vendor"));
        assert_eq!(layout.namespace_prefix, "@acme/");
    }

    #[test]
    fn rejects_invalid_probe_extension() {
        let raw = r#"probe_extensions = ["ts"]"#;
        let err = LayerLayout::from_toml_str(raw, Path::new("/opt/acme"))
            .expect_err("extension without dot must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_document() {
        let err = LayerLayout::from_toml_str("vendor_dir = [", Path::new("/opt/acme"))
            .expect_err("malformed toml must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn loads_layout_file_from_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(LAYOUT_FILE_NAME),
            "extensions_dir = \"plugins\"\n",
        )
        .expect("write layout");

        let layout = LayerLayout::load(dir.path()).expect("layout load");
        assert_eq!(layout.extensions_root(), dir.path().join("plugins"));
    }

    #[test]
    fn missing_layout_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = LayerLayout::load(dir.path()).expect("layout load");
        assert_eq!(layout, LayerLayout::with_root(dir.path()));
    }

    #[test]
    fn branding_reads_lookup_and_ignores_blank_values() {
        let branding = BrandingConfig::from_lookup(|key| match key {
            ENV_VERSION => Some("2.3.4".to_string()),
            _ => Some("  ".to_string()),
        });
        assert_eq!(branding.version, "2.3.4");
        assert_eq!(branding.config_path, "~/.heimdall");
        assert_eq!(branding.cache_path, "~/.heimdall/cache");
        assert_eq!(BrandingConfig::default().version, "0.1.0");
    }

    #[test]
    fn vendor_env_maps_branding_paths_and_defaults() {
        let branding = BrandingConfig::from_lookup(|key| match key {
            ENV_DEFAULT_PROVIDER => Some("openai".to_string()),
            _ => None,
        });
        let env = branding.vendor_env();
        assert!(env.contains(&("OPENCODE_CONFIG_PATH", "~/.heimdall".to_string())));
        assert!(env.contains(&("OPENCODE_DEFAULT_PROVIDER", "openai".to_string())));
        assert!(env.contains(&(
            "OPENCODE_DEFAULT_MODEL",
            "claude-3-5-sonnet-latest".to_string()
        )));
    }
}
