//! Default Heimdall branding layer.
//!
//! # Responsibility
//! - Register the stock branding injections and patches against the vendor tree.
//! - Provide the built-in `heimdall-info` command module and extension.

use crate::config::{BrandingConfig, LayerLayout};
use crate::context::LayerContext;
use crate::extension::{Extension, ExtensionError, ExtensionKind};
use crate::injector::Injectable;
use crate::module::{Export, ExportMap, Module};
use crate::patcher::Patch;
use crate::resolver::SourceRegistry;
use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Branding targets, relative to the vendor root.
pub const INSTALLATION_MODULE: &str = "opencode/packages/opencode/src/installation.ts";
pub const ENTRY_MODULE: &str = "opencode/packages/opencode/src/index.ts";
pub const UI_MODULE: &str = "opencode/packages/opencode/src/cli/ui.ts";

pub const INFO_COMMAND: &str = "heimdall-info";
const VENDOR_BASE: &str = "opencode v0.4.45";

pub const BANNER: &str = r"
╦ ╦╔═╗╦╔╦╗╔╦╗╔═╗╦  ╦
╠═╣║╣ ║║║║ ║║╠═╣║  ║
╩ ╩╚═╝╩╩ ╩═╩╝╩ ╩╩═╝╩═╝
";

/// Logical path of a vendor module under the layout's vendor directory.
pub fn vendor_module(layout: &LayerLayout, subpath: &str) -> String {
    layout.vendor_dir.join(subpath).to_string_lossy().into_owned()
}

/// Registers the stock injections and patches.
pub fn register_branding(context: &mut LayerContext, branding: &BrandingConfig) {
    let layout = context.resolver().layout();
    let installation = vendor_module(layout, INSTALLATION_MODULE);
    let entry = vendor_module(layout, ENTRY_MODULE);
    let ui = vendor_module(layout, UI_MODULE);
    debug!(
        "event=branding_register module=branding installation={} entry={} ui={}",
        installation, entry, ui
    );

    context.register_injectable(Injectable::property(
        installation.as_str(),
        "VERSION",
        branding.version.as_str(),
    ));
    context.register_injectable(Injectable::property(
        installation,
        "NAME",
        branding.name.as_str(),
    ));

    let script_name = branding.script_name.clone();
    context.register_patch(Patch::replace(entry, "scriptName", move |_| {
        Ok(Export::from(script_name.as_str()))
    }));

    let tagline = format!("{} - AI-powered CLI assistant", branding.name);
    context.register_patch(Patch::wrap(ui, "displayBanner", move |_, _, _| {
        Ok(Value::String(format!("{BANNER}\n{tagline}\n")))
    }));
}

/// Path of the built-in info command module inside the extensions tree.
pub fn info_command_path(layout: &LayerLayout) -> PathBuf {
    layout
        .extensions_dir
        .join("commands")
        .join(format!("{INFO_COMMAND}.ts"))
}

/// Registers the built-in command module with a source registry.
pub fn register_builtin_sources(
    registry: &mut SourceRegistry,
    layout: &LayerLayout,
    branding: &BrandingConfig,
) {
    let branding = branding.clone();
    registry.register(info_command_path(layout), move || {
        Ok(info_command_exports(&branding))
    });
}

/// Export surface of the `heimdall-info` command module.
pub fn info_command_exports(branding: &BrandingConfig) -> ExportMap {
    let report_branding = branding.clone();
    Module::builder(INFO_COMMAND)
        .value(
            "default",
            json!({ "name": INFO_COMMAND, "type": ExtensionKind::Command.as_str() }),
        )
        .value("command", INFO_COMMAND)
        .value(
            "describe",
            format!("Display {} system information", branding.name),
        )
        .value("aliases", json!(["hinfo"]))
        .value(
            "builder",
            json!({
                "verbose": {
                    "alias": "v",
                    "type": "boolean",
                    "description": "Show detailed information"
                }
            }),
        )
        .function("handler", move |_, args| {
            let verbose = args
                .first()
                .and_then(|argv| argv.get("verbose"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Ok(Value::String(info_report(&report_branding, verbose)))
        })
        .into_exports()
}

/// Text printed by `heimdall-info`.
pub fn info_report(branding: &BrandingConfig, verbose: bool) -> String {
    let mut report = format!(
        "{BANNER}
{name} System Information
===========================

Version: {version}
Base: {VENDOR_BASE}
Architecture: Layered Modification System

Layers:
  1. Vendor (pristine opencode)
  2. Patches (git patches for modifications)
  3. Extensions (new features)
  4. Overrides (complete file replacements)

Configuration:
  Config Path: {config}
  Cache Path: {cache}
  Default Model: {model} ({provider})
",
        name = branding.name,
        version = branding.version,
        config = branding.config_path,
        cache = branding.cache_path,
        model = branding.default_model,
        provider = branding.default_provider,
    );
    if verbose {
        report.push_str(&format!(
            "
Active Extensions:
  - {INFO_COMMAND} (this command)
"
        ));
    }
    report
}

/// Built-in extension entry for hosts that skip discovery.
pub fn info_extension() -> Arc<dyn Extension> {
    Arc::new(InfoExtension)
}

struct InfoExtension;

#[async_trait]
impl Extension for InfoExtension {
    fn name(&self) -> &str {
        INFO_COMMAND
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Command
    }

    async fn init(&self) -> Result<(), ExtensionError> {
        debug!(
            "event=extension_init module=branding status=ok name={}",
            INFO_COMMAND
        );
        Ok(())
    }
}
