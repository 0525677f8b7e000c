//! Extension registry contracts.
//!
//! This module defines extension kinds, the name-keyed registry with its
//! retrying initialization pass, and best-effort discovery from the
//! extensions tree.

pub mod discovery;
pub mod kind;
pub mod registry;

pub use discovery::{auto_discover, is_module_file, DiscoveryFailure, DiscoveryReport};
pub use kind::{parse_extension_kind, ExtensionKind, ExtensionKindError};
pub use registry::{
    Extension, ExtensionError, ExtensionRegistry, ExtensionRegistryError, InitFailure,
    InitReport, ModuleExtension,
};
