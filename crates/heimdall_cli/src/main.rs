//! Heimdall host entry point.
//!
//! # Responsibility
//! - Bootstrap the layering context against the stock vendor surface.
//! - Wire command extensions into a minimal command table and run one.
//!
//! # Invariants
//! - Layer failures are reported, never fatal; only bad configuration or an
//!   unknown command exits non-zero.

use clap::Parser;
use heimdall_core::branding::{
    register_branding, register_builtin_sources, vendor_module, ENTRY_MODULE, INFO_COMMAND,
    INSTALLATION_MODULE, UI_MODULE,
};
use heimdall_core::{
    init_logging, ApplyReport, BrandingConfig, Callable, CommandHost, Export, Invocation,
    LayerContext, LayerLayout, Module, ModuleResolver, SourceRegistry,
};
use log::{debug, info, warn};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "heimdall",
    version = heimdall_core::core_version(),
    about = "Layered customization host for a vendored opencode tree"
)]
struct Cli {
    /// Application root holding `heimdall.toml`; defaults to HEIMDALL_ROOT or `.`.
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, value_name = "LEVEL", default_value_t = heimdall_core::default_log_level().to_string())]
    log_level: String,

    /// Absolute directory for rolling log files; logging is off without it.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Pass `verbose` to the command being run.
    #[arg(short, long)]
    verbose: bool,

    /// Wired command to run after startup.
    #[arg(value_name = "COMMAND", default_value = INFO_COMMAND)]
    command: String,
}

/// Command table filled by `inject_commands`.
#[derive(Default)]
struct CommandTable {
    commands: Vec<WiredCommand>,
}

struct WiredCommand {
    name: String,
    describe: String,
    handler: Callable,
}

impl CommandHost for CommandTable {
    fn command(&mut self, name: &str, describe: &str, _builder: Export, handler: Callable) {
        self.commands.push(WiredCommand {
            name: name.to_string(),
            describe: describe.to_string(),
            handler,
        });
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        if let Err(err) = init_logging(&cli.log_level, &log_dir.to_string_lossy()) {
            eprintln!("heimdall: {err}");
            return ExitCode::FAILURE;
        }
    }

    let layout = match &cli.root {
        Some(root) => LayerLayout::load(root),
        None => LayerLayout::from_env(&PathBuf::from(".")),
    };
    let layout = match layout {
        Ok(layout) => layout,
        Err(err) => {
            eprintln!("heimdall: {err}");
            return ExitCode::FAILURE;
        }
    };
    let branding = BrandingConfig::from_env();
    for (key, value) in branding.vendor_env() {
        debug!("event=startup module=cli vendor_env={}={}", key, value);
        std::env::set_var(key, value);
    }

    let sources = stock_sources(&layout, &branding);
    let mut context = LayerContext::new(ModuleResolver::from_registry_memoized(layout, sources));
    register_branding(&mut context, &branding);

    let discovery = context.discover_extensions().await;
    for failure in &discovery.failures {
        warn!(
            "event=startup module=cli status=discover_error path={} error={}",
            failure.path.display(),
            failure.message
        );
    }
    report_pass("injections", &context.apply_injections().await);
    report_pass("patches", &context.apply_patches().await);
    let init = context.initialize_extensions().await;
    for failure in &init.failures {
        eprintln!("heimdall: extension {} failed: {}", failure.name, failure.error);
    }

    let mut table = CommandTable::default();
    let wiring = context.inject_commands(&mut table).await;
    for failure in &wiring.failures {
        eprintln!(
            "heimdall: command {} not wired: {}",
            failure.extension, failure.error
        );
    }
    info!(
        "event=startup module=cli status=ok extensions={} commands={}",
        context.extensions().len(),
        wiring.wired.len()
    );

    let ui_module = vendor_module(context.resolver().layout(), UI_MODULE);
    if let Ok(ui) = context.resolver().load(&ui_module).await {
        if let Ok(banner) = ui.call("displayBanner", &[]) {
            println!("{}", banner.as_str().unwrap_or_default());
        }
    }

    let Some(command) = table
        .commands
        .iter()
        .find(|command| command.name == cli.command)
    else {
        eprintln!("heimdall: unknown command `{}`", cli.command);
        for command in &table.commands {
            eprintln!("  {:<16} {}", command.name, command.describe);
        }
        return ExitCode::FAILURE;
    };

    let invocation = Invocation::new(command.name.as_str(), "handler");
    match command
        .handler
        .call(&invocation, &[json!({ "verbose": cli.verbose })])
    {
        Ok(output) => {
            if let Some(text) = output.as_str() {
                print!("{text}");
            } else if !output.is_null() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("heimdall: {} failed: {err}", command.name);
            ExitCode::FAILURE
        }
    }
}

fn report_pass(label: &str, report: &ApplyReport) {
    for failure in &report.failures {
        eprintln!(
            "heimdall: {label} for {} failed: {}",
            failure.target, failure.error
        );
    }
    info!(
        "event=startup module=cli pass={} applied={} failed={} skipped={}",
        label,
        report.applied.len(),
        report.failures.len(),
        report.skipped_items
    );
}

/// Stand-in exports for the vendored modules the stock branding layer targets.
fn stock_sources(layout: &LayerLayout, branding: &BrandingConfig) -> SourceRegistry {
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
            .function("displayBanner", |_, _| Ok(json!("opencode")))
            .into_exports(),
    );
    register_builtin_sources(&mut sources, layout, branding);
    sources
}
