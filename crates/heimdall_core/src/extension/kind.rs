//! Extension kind declarations.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Feature family an extension belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtensionKind {
    Command,
    Provider,
    Tool,
    Middleware,
}

/// Declaration string for command extensions.
pub const EXTENSION_KIND_COMMAND: &str = "command";
/// Declaration string for provider extensions.
pub const EXTENSION_KIND_PROVIDER: &str = "provider";
/// Declaration string for tool extensions.
pub const EXTENSION_KIND_TOOL: &str = "tool";
/// Declaration string for middleware extensions.
pub const EXTENSION_KIND_MIDDLEWARE: &str = "middleware";

impl ExtensionKind {
    /// Stable string id used in module declarations.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => EXTENSION_KIND_COMMAND,
            Self::Provider => EXTENSION_KIND_PROVIDER,
            Self::Tool => EXTENSION_KIND_TOOL,
            Self::Middleware => EXTENSION_KIND_MIDDLEWARE,
        }
    }

    /// Kind implied by an auto-discovery subdirectory (`commands` -> command).
    pub fn from_discovery_dir(dir: &str) -> Option<Self> {
        match dir {
            "commands" => Some(Self::Command),
            "providers" => Some(Self::Provider),
            "tools" => Some(Self::Tool),
            "middleware" => Some(Self::Middleware),
            _ => None,
        }
    }
}

impl Display for ExtensionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses one kind from its declaration string.
pub fn parse_extension_kind(value: &str) -> Result<ExtensionKind, ExtensionKindError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(ExtensionKindError::EmptyKind);
    }

    match normalized {
        EXTENSION_KIND_COMMAND => Ok(ExtensionKind::Command),
        EXTENSION_KIND_PROVIDER => Ok(ExtensionKind::Provider),
        EXTENSION_KIND_TOOL => Ok(ExtensionKind::Tool),
        EXTENSION_KIND_MIDDLEWARE => Ok(ExtensionKind::Middleware),
        other => Err(ExtensionKindError::UnsupportedKind(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionKindError {
    EmptyKind,
    UnsupportedKind(String),
}

impl Display for ExtensionKindError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKind => write!(f, "extension kind must not be empty"),
            Self::UnsupportedKind(value) => write!(f, "extension kind is unsupported: {value}"),
        }
    }
}

impl Error for ExtensionKindError {}

#[cfg(test)]
mod tests {
    use super::{parse_extension_kind, ExtensionKind, ExtensionKindError};

    #[test]
    fn parses_every_declared_kind() {
        for kind in [
            ExtensionKind::Command,
            ExtensionKind::Provider,
            ExtensionKind::Tool,
            ExtensionKind::Middleware,
        ] {
            assert_eq!(
                parse_extension_kind(kind.as_str()).expect("kind parse"),
                kind
            );
        }
        assert_eq!(
            parse_extension_kind(" tool ").expect("trimmed kind"),
            ExtensionKind::Tool
        );
    }

    #[test]
    fn rejects_blank_and_unknown_kinds() {
        assert_eq!(
            parse_extension_kind("  ").expect_err("blank kind"),
            ExtensionKindError::EmptyKind
        );
        assert_eq!(
            parse_extension_kind("Command").expect_err("case sensitive"),
            ExtensionKindError::UnsupportedKind("Command".to_string())
        );
    }

    #[test]
    fn maps_discovery_directories() {
        assert_eq!(
            ExtensionKind::from_discovery_dir("commands"),
            Some(ExtensionKind::Command)
        );
        assert_eq!(ExtensionKind::from_discovery_dir("widgets"), None);
    }
}
