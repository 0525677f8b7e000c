use heimdall_core::branding::{
    info_extension, register_branding, register_builtin_sources, vendor_module, BANNER,
    ENTRY_MODULE, INFO_COMMAND, INSTALLATION_MODULE, UI_MODULE,
};
use heimdall_core::{
    BrandingConfig, Callable, CommandHost, Export, ExtensionKind, LayerContext, LayerLayout,
    Module, ModuleExtension, ModuleResolver, SourceRegistry,
};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Default)]
struct RecordingHost {
    commands: Vec<(String, String, Export, Callable)>,
}

impl CommandHost for RecordingHost {
    fn command(&mut self, name: &str, describe: &str, builder: Export, handler: Callable) {
        self.commands
            .push((name.to_string(), describe.to_string(), builder, handler));
    }
}

fn vendor_sources(layout: &LayerLayout, branding: &BrandingConfig) -> SourceRegistry {
    let installation = vendor_module(layout, INSTALLATION_MODULE);
    let entry = vendor_module(layout, ENTRY_MODULE);
    let ui = vendor_module(layout, UI_MODULE);

    let mut sources = SourceRegistry::new(&layout.root);
    sources.register_exports(
        &installation,
        Module::builder(&installation)
            .value("VERSION", "0.4.45")
            .value("NAME", "opencode")
            .into_exports(),
    );
    sources.register_exports(
        &entry,
        Module::builder(&entry)
            .value("scriptName", "opencode")
            .into_exports(),
    );
    sources.register_exports(
        &ui,
        Module::builder(&ui)
            .function("displayBanner", |_, _| Ok(json!("opencode banner")))
            .into_exports(),
    );
    register_builtin_sources(&mut sources, layout, branding);
    sources
}

fn branded_context() -> (LayerContext, BrandingConfig) {
    branded_context_in(LayerLayout::with_root("/app"))
}

fn branded_context_in(layout: LayerLayout) -> (LayerContext, BrandingConfig) {
    let branding = BrandingConfig::default();
    let sources = vendor_sources(&layout, &branding);
    let mut context = LayerContext::new(ModuleResolver::from_registry_memoized(layout, sources));
    register_branding(&mut context, &branding);
    (context, branding)
}

fn string_member(module: &Module, name: &str) -> Option<String> {
    module
        .get(name)
        .and_then(|export| export.as_str().map(str::to_string))
}

async fn assert_branded(context: &mut LayerContext, branding: &BrandingConfig) {
    let layout = context.resolver().layout().clone();
    let injections = context.apply_injections().await;
    let patches = context.apply_patches().await;
    assert!(injections.is_clean());
    assert!(patches.is_clean());

    let installation = context
        .resolver()
        .load(&vendor_module(&layout, INSTALLATION_MODULE))
        .await
        .expect("load installation");
    assert_eq!(
        string_member(&installation, "VERSION"),
        Some(branding.version.clone())
    );
    assert_eq!(string_member(&installation, "NAME"), Some("Heimdall".to_string()));

    let entry = context
        .resolver()
        .load(&vendor_module(&layout, ENTRY_MODULE))
        .await
        .expect("load entry");
    assert_eq!(string_member(&entry, "scriptName"), Some("heimdall".to_string()));

    let ui = context
        .resolver()
        .load(&vendor_module(&layout, UI_MODULE))
        .await
        .expect("load ui");
    let banner = ui.call("displayBanner", &[]).expect("display banner");
    let banner = banner.as_str().unwrap_or_default();
    assert!(banner.starts_with(BANNER));
    assert!(banner.contains("Heimdall - AI-powered CLI assistant"));
}

#[tokio::test]
async fn branding_flow_rewrites_vendor_surface() {
    let (mut context, branding) = branded_context();
    assert_branded(&mut context, &branding).await;
}

#[tokio::test]
async fn branding_follows_a_relocated_vendor_dir() {
    let layout = LayerLayout {
        vendor_dir: "third_party".into(),
        ..LayerLayout::with_root("/app")
    };
    let (mut context, branding) = branded_context_in(layout);
    assert_branded(&mut context, &branding).await;

    let stale = context
        .resolver()
        .load("vendor/opencode/packages/opencode/src/installation.ts")
        .await;
    assert!(stale.is_err());
}

#[tokio::test]
async fn discovered_info_command_is_wired_into_the_host() {
    let (mut context, _) = branded_context();

    let discovery = context.discover_extensions().await;
    assert_eq!(discovery.registered, vec![INFO_COMMAND.to_string()]);
    let init = context.initialize_extensions().await;
    assert!(init.failures.is_empty());

    let mut host = RecordingHost::default();
    let report = context.inject_commands(&mut host).await;
    assert_eq!(report.wired, vec![INFO_COMMAND.to_string()]);
    assert_eq!(host.commands.len(), 1);

    let (name, describe, builder, handler) = &host.commands[0];
    assert_eq!(name, INFO_COMMAND);
    assert_eq!(describe, "Display Heimdall system information");
    assert!(builder
        .as_value()
        .and_then(|value| value.get("verbose"))
        .is_some());

    let invocation = heimdall_core::Invocation::new(INFO_COMMAND, "handler");
    let output = handler
        .call(&invocation, &[json!({ "verbose": true })])
        .expect("run info handler");
    assert!(output
        .as_str()
        .unwrap_or_default()
        .contains("Active Extensions"));
}

#[tokio::test]
async fn broken_command_does_not_stop_other_commands() {
    let (mut context, _) = branded_context();
    context
        .register_extension(Arc::new(ModuleExtension::new(
            "missing",
            ExtensionKind::Command,
        )))
        .expect("register missing command");
    context
        .register_extension(info_extension())
        .expect("register info command");

    let mut host = RecordingHost::default();
    let report = context.inject_commands(&mut host).await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].extension, "missing");
    assert_eq!(report.wired, vec![INFO_COMMAND.to_string()]);
}

#[tokio::test]
async fn command_module_without_handler_gets_defaults() {
    let layout = LayerLayout::with_root("/app");
    let mut sources = SourceRegistry::new("/app");
    sources.register_exports(
        "src/extensions/commands/bare.ts",
        Module::builder("bare").value("command", "bare").into_exports(),
    );
    sources.register_exports(
        "src/extensions/commands/silent.ts",
        Module::builder("silent").value("describe", "no command").into_exports(),
    );
    let mut context = LayerContext::new(ModuleResolver::from_registry(layout, sources));
    for name in ["bare", "silent"] {
        context
            .register_extension(Arc::new(ModuleExtension::new(name, ExtensionKind::Command)))
            .expect("register command");
    }

    let mut host = RecordingHost::default();
    let report = context.inject_commands(&mut host).await;
    assert_eq!(report.wired, vec!["bare".to_string()]);
    assert_eq!(report.skipped, vec!["silent".to_string()]);

    let (_, describe, builder, handler) = &host.commands[0];
    assert_eq!(describe, "");
    assert_eq!(builder.as_value(), Some(&json!({})));
    let invocation = heimdall_core::Invocation::new("bare", "handler");
    assert_eq!(handler.call(&invocation, &[]).expect("noop"), Value::Null);
}

#[tokio::test]
async fn providers_and_tools_are_listed_not_wired() {
    let (mut context, _) = branded_context();
    context
        .register_extension(Arc::new(ModuleExtension::new(
            "anthropic",
            ExtensionKind::Provider,
        )))
        .expect("register provider");
    context
        .register_extension(Arc::new(ModuleExtension::new("grep", ExtensionKind::Tool)))
        .expect("register tool");

    assert_eq!(context.inject_providers(), vec!["anthropic".to_string()]);
    assert_eq!(context.inject_tools(), vec!["grep".to_string()]);
}
