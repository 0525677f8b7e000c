//! Declarative member injection and command wiring.
//!
//! # Responsibility
//! - Queue property/method/class injections per target module.
//! - Apply each target's queue once, in registration order.
//! - Wire command extensions into a host CLI builder.
//!
//! # Invariants
//! - Method and class injections whose value is not callable are skipped
//!   without error.
//! - A target that fails to load does not affect any other target.

use crate::apply::{ApplyQueue, ApplyReport, TargetState};
use crate::extension::{Extension, ExtensionKind, ExtensionRegistry};
use crate::module::{Callable, Export, ExportMap};
use crate::resolver::{ModuleResolver, ResolveError};
use log::{debug, error, trace};
use serde_json::json;

/// How an injectable value is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionKind {
    Property,
    Method,
    Class,
}

impl InjectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Method => "method",
            Self::Class => "class",
        }
    }
}

/// One declarative member assignment.
#[derive(Debug, Clone)]
pub struct Injectable {
    /// Logical module path handed to the resolver.
    pub target: String,
    pub property: String,
    pub value: Export,
    pub kind: InjectionKind,
}

impl Injectable {
    pub fn new(
        target: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<Export>,
        kind: InjectionKind,
    ) -> Self {
        Self {
            target: target.into(),
            property: property.into(),
            value: value.into(),
            kind,
        }
    }

    pub fn property(
        target: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<Export>,
    ) -> Self {
        Self::new(target, property, value, InjectionKind::Property)
    }

    pub fn method(target: impl Into<String>, property: impl Into<String>, value: Callable) -> Self {
        Self::new(target, property, Export::Function(value), InjectionKind::Method)
    }

    pub fn class(target: impl Into<String>, property: impl Into<String>, value: Callable) -> Self {
        Self::new(target, property, Export::Class(value), InjectionKind::Class)
    }
}

/// Host CLI builder receiving wired commands.
///
/// The builder and handler shapes belong to the host's CLI framework.
pub trait CommandHost {
    fn command(&mut self, name: &str, describe: &str, builder: Export, handler: Callable);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub extension: String,
    pub error: ResolveError,
}

/// Outcome of one `inject_commands` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    /// Command names handed to the host.
    pub wired: Vec<String>,
    /// Extensions whose module exposes no `command` member.
    pub skipped: Vec<String>,
    pub failures: Vec<CommandFailure>,
}

/// Per-target injection queues.
#[derive(Debug, Default)]
pub struct DependencyInjector {
    queue: ApplyQueue<Injectable>,
}

impl DependencyInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one injectable to its target's queue.
    pub fn register(&mut self, injectable: Injectable) {
        debug!(
            "event=injectable_register module=injector target={} property={} kind={}",
            injectable.target,
            injectable.property,
            injectable.kind.as_str()
        );
        let target = injectable.target.clone();
        self.queue.push(&target, injectable);
    }

    pub fn target_count(&self) -> usize {
        self.queue.len()
    }

    pub fn injectable_count(&self) -> usize {
        self.queue.item_count()
    }

    pub fn target_state(&self, target: &str) -> Option<TargetState> {
        self.queue.state(target)
    }

    /// Applies every pending target once.
    ///
    /// Targets already applied are skipped. A target whose module cannot
    /// be loaded is reported and retried on the next pass.
    pub async fn apply_all(&mut self, resolver: &ModuleResolver) -> ApplyReport {
        let mut report = ApplyReport::default();

        for target in self.queue.pending() {
            self.queue.set_state(&target, TargetState::Applying);
            let module = match resolver.load(&target).await {
                Ok(module) => module,
                Err(err) => {
                    error!(
                        "event=inject_target module=injector status=error target={} error={}",
                        target, err
                    );
                    self.queue.set_state(&target, TargetState::Registered);
                    report.fail(&target, err.into());
                    continue;
                }
            };

            let mut exports = module.snapshot();
            for injectable in self.queue.items(&target) {
                if apply_injectable(&mut exports, injectable) {
                    debug!(
                        "event=inject_member module=injector status=ok target={} property={} kind={}",
                        target,
                        injectable.property,
                        injectable.kind.as_str()
                    );
                } else {
                    trace!(
                        "event=inject_member module=injector status=skip target={} property={} value={}",
                        target,
                        injectable.property,
                        injectable.value.kind_label()
                    );
                    report.skipped_items += 1;
                }
            }
            module.commit(exports);

            self.queue.set_state(&target, TargetState::Applied);
            report.applied.push(target);
        }

        report
    }

    /// Wires every command extension's module into `host`.
    ///
    /// Command modules live at `<extensions-root>/commands/<name>`. One
    /// broken command never prevents the others from being wired.
    pub async fn inject_commands(
        &self,
        registry: &ExtensionRegistry,
        resolver: &ModuleResolver,
        host: &mut dyn CommandHost,
    ) -> CommandReport {
        let mut report = CommandReport::default();

        for extension in registry.list_by_kind(ExtensionKind::Command) {
            let name = extension.name().to_string();
            let module = match resolver.load_extension(&format!("commands/{name}")).await {
                Ok(module) => module,
                Err(err) => {
                    error!(
                        "event=inject_command module=injector status=error extension={} error={}",
                        name, err
                    );
                    report.failures.push(CommandFailure {
                        extension: name,
                        error: err,
                    });
                    continue;
                }
            };

            let Some(command) = module
                .get("command")
                .and_then(|export| export.as_str().map(str::to_string))
            else {
                debug!(
                    "event=inject_command module=injector status=skip extension={}",
                    name
                );
                report.skipped.push(name);
                continue;
            };
            let describe = module
                .get("describe")
                .and_then(|export| export.as_str().map(str::to_string))
                .unwrap_or_default();
            let builder = module
                .get("builder")
                .unwrap_or_else(|| Export::Value(json!({})));
            let handler = module
                .get("handler")
                .and_then(|export| export.as_callable().cloned())
                .unwrap_or_else(Callable::noop);

            host.command(&command, &describe, builder, handler);
            debug!(
                "event=inject_command module=injector status=ok extension={} command={}",
                name, command
            );
            report.wired.push(command);
        }

        report
    }

    /// Lists provider extensions. Wiring is left to the host application.
    pub fn inject_providers(&self, registry: &ExtensionRegistry) -> Vec<String> {
        announce(registry, ExtensionKind::Provider)
    }

    /// Lists tool extensions. Wiring is left to the host application.
    pub fn inject_tools(&self, registry: &ExtensionRegistry) -> Vec<String> {
        announce(registry, ExtensionKind::Tool)
    }
}

fn announce(registry: &ExtensionRegistry, kind: ExtensionKind) -> Vec<String> {
    registry
        .list_by_kind(kind)
        .into_iter()
        .map(|extension| {
            debug!(
                "event=inject_{} module=injector status=pending name={}",
                kind,
                extension.name()
            );
            extension.name().to_string()
        })
        .collect()
}

/// Applies one injectable; returns false when it was skipped as malformed.
fn apply_injectable(exports: &mut ExportMap, injectable: &Injectable) -> bool {
    match injectable.kind {
        InjectionKind::Property => {}
        InjectionKind::Method | InjectionKind::Class if injectable.value.is_callable() => {}
        InjectionKind::Method | InjectionKind::Class => return false,
    }
    exports.insert(injectable.property.clone(), injectable.value.clone());
    true
}
