//! Runtime patch strategies folded into module export slots.
//!
//! # Responsibility
//! - Queue replace/wrap/extend/inject patches per target module.
//! - Compose each target's patches left-to-right into a new export map and
//!   commit it to the shared module slot.
//!
//! # Invariants
//! - Each patch sees the cumulative result of earlier patches in the pass.
//! - A wrap captures the wrapped callable once, at wrap time.
//! - An applied target is never patched again, so wraps never stack twice.
//! - A failing patch stops its own target only; work done before the
//!   failure is still committed.

use crate::apply::{ApplyError, ApplyQueue, ApplyReport, TargetState};
use crate::module::{CallResult, Callable, Export, ExportMap, Invocation};
use crate::resolver::ModuleResolver;
use log::{debug, error, trace};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use std::sync::Arc;

pub type ReplaceFn = dyn Fn(Option<Export>) -> Result<Export, PatchError> + Send + Sync;
pub type WrapFn = dyn Fn(&Callable, &Invocation, &[Value]) -> CallResult + Send + Sync;
pub type ExtendFn = dyn Fn() -> Result<ExportMap, PatchError> + Send + Sync;
pub type InjectFn = dyn Fn(&mut ExportMap) -> Result<(), PatchError> + Send + Sync;

/// Patch body failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchError {
    message: String,
}

impl PatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for PatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for PatchError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Replace,
    Wrap,
    Extend,
    Inject,
}

impl PatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Wrap => "wrap",
            Self::Extend => "extend",
            Self::Inject => "inject",
        }
    }
}

/// Strategy plus its callback.
#[derive(Clone)]
pub enum PatchBody {
    /// Receives the current member (if any) and returns its replacement.
    Replace(Arc<ReplaceFn>),
    /// Receives the original callable, the invocation, and the arguments.
    Wrap(Arc<WrapFn>),
    /// Returns members shallow-merged into the module.
    Extend(Arc<ExtendFn>),
    /// Mutates the export map directly.
    Inject(Arc<InjectFn>),
}

impl PatchBody {
    pub fn kind(&self) -> PatchKind {
        match self {
            Self::Replace(_) => PatchKind::Replace,
            Self::Wrap(_) => PatchKind::Wrap,
            Self::Extend(_) => PatchKind::Extend,
            Self::Inject(_) => PatchKind::Inject,
        }
    }
}

impl Debug for PatchBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PatchBody::{}", self.kind().as_str())
    }
}

/// One queued patch.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Logical module path handed to the resolver.
    pub target: String,
    /// Member name; required by replace and wrap.
    pub method: Option<String>,
    pub body: PatchBody,
}

impl Patch {
    pub fn replace<F>(target: impl Into<String>, method: impl Into<String>, body: F) -> Self
    where
        F: Fn(Option<Export>) -> Result<Export, PatchError> + Send + Sync + 'static,
    {
        Self {
            target: target.into(),
            method: Some(method.into()),
            body: PatchBody::Replace(Arc::new(body)),
        }
    }

    pub fn wrap<F>(target: impl Into<String>, method: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Callable, &Invocation, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        Self {
            target: target.into(),
            method: Some(method.into()),
            body: PatchBody::Wrap(Arc::new(body)),
        }
    }

    pub fn extend<F>(target: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> Result<ExportMap, PatchError> + Send + Sync + 'static,
    {
        Self {
            target: target.into(),
            method: None,
            body: PatchBody::Extend(Arc::new(body)),
        }
    }

    pub fn inject<F>(target: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut ExportMap) -> Result<(), PatchError> + Send + Sync + 'static,
    {
        Self {
            target: target.into(),
            method: None,
            body: PatchBody::Inject(Arc::new(body)),
        }
    }

    pub fn kind(&self) -> PatchKind {
        self.body.kind()
    }
}

/// Whether a patch changed the export map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchOutcome {
    Applied,
    Skipped,
}

/// Per-target patch queues.
#[derive(Debug, Default)]
pub struct RuntimePatcher {
    queue: ApplyQueue<Patch>,
}

impl RuntimePatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, patch: Patch) {
        debug!(
            "event=patch_register module=patcher target={} method={} kind={}",
            patch.target,
            patch.method.as_deref().unwrap_or("-"),
            patch.kind().as_str()
        );
        let target = patch.target.clone();
        self.queue.push(&target, patch);
    }

    pub fn target_count(&self) -> usize {
        self.queue.len()
    }

    pub fn patch_count(&self) -> usize {
        self.queue.item_count()
    }

    pub fn target_state(&self, target: &str) -> Option<TargetState> {
        self.queue.state(target)
    }

    /// Applies every pending target once.
    ///
    /// A load failure leaves the target eligible for the next pass. A patch
    /// failure commits what was composed so far and marks the target applied.
    pub async fn apply_all(&mut self, resolver: &ModuleResolver) -> ApplyReport {
        let mut report = ApplyReport::default();

        for target in self.queue.pending() {
            self.queue.set_state(&target, TargetState::Applying);
            let module = match resolver.load(&target).await {
                Ok(module) => module,
                Err(err) => {
                    error!(
                        "event=patch_target module=patcher status=error target={} error={}",
                        target, err
                    );
                    self.queue.set_state(&target, TargetState::Registered);
                    report.fail(&target, err.into());
                    continue;
                }
            };

            let patches = self.queue.items(&target);
            let mut exports = module.snapshot();
            for (index, patch) in patches.iter().enumerate() {
                match apply_patch(module.path(), &mut exports, patch) {
                    Ok(PatchOutcome::Applied) => {}
                    Ok(PatchOutcome::Skipped) => {
                        trace!(
                            "event=patch_apply module=patcher status=skip target={} index={} kind={}",
                            target,
                            index,
                            patch.kind().as_str()
                        );
                        report.skipped_items += 1;
                    }
                    Err(err) => {
                        error!(
                            "event=patch_apply module=patcher status=error target={} index={} error={}",
                            target, index, err
                        );
                        report.fail(
                            &target,
                            ApplyError::Patch {
                                index,
                                message: err.to_string(),
                            },
                        );
                        break;
                    }
                }
            }
            module.commit(exports);
            debug!(
                "event=patch_target module=patcher status=ok target={} patches={}",
                target,
                patches.len()
            );

            self.queue.set_state(&target, TargetState::Applied);
            report.applied.push(target);
        }

        report
    }
}

fn apply_patch(
    module_path: &Path,
    exports: &mut ExportMap,
    patch: &Patch,
) -> Result<PatchOutcome, PatchError> {
    match &patch.body {
        PatchBody::Replace(body) => {
            let Some(method) = patch.method.as_deref() else {
                return Ok(PatchOutcome::Skipped);
            };
            let original = exports.get(method).cloned();
            let replacement = body(original)?;
            exports.insert(method.to_string(), replacement);
            Ok(PatchOutcome::Applied)
        }
        PatchBody::Wrap(body) => {
            let Some(method) = patch.method.as_deref() else {
                return Ok(PatchOutcome::Skipped);
            };
            let Some(current) = exports.get(method) else {
                return Ok(PatchOutcome::Skipped);
            };
            let Some(original) = current.as_callable().cloned() else {
                return Ok(PatchOutcome::Skipped);
            };
            let wrapped = wrap_callable(original, body.clone());
            let replacement = match current {
                Export::Class(_) => Export::Class(wrapped),
                _ => Export::Function(wrapped),
            };
            debug!(
                "event=patch_apply module=patcher kind=wrap path={} method={}",
                module_path.display(),
                method
            );
            exports.insert(method.to_string(), replacement);
            Ok(PatchOutcome::Applied)
        }
        PatchBody::Extend(body) => {
            let members = body()?;
            debug!(
                "event=patch_apply module=patcher kind=extend path={} members={}",
                module_path.display(),
                members.len()
            );
            exports.extend(members);
            Ok(PatchOutcome::Applied)
        }
        PatchBody::Inject(body) => {
            body(exports)?;
            Ok(PatchOutcome::Applied)
        }
    }
}

fn wrap_callable(original: Callable, body: Arc<WrapFn>) -> Callable {
    Callable::new(move |invocation, args| body(&original, invocation, args))
}
