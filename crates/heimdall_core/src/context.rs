//! Composition root for the layering components.
//!
//! # Responsibility
//! - Own one resolver, injector, patcher, and extension registry.
//! - Expose the registration and apply entry points to host startup code.
//!
//! # Invariants
//! - Components share only the resolver.
//! - Each apply/initialize entry point is safe to call repeatedly.

use crate::apply::ApplyReport;
use crate::extension::{
    auto_discover, DiscoveryReport, Extension, ExtensionRegistry, ExtensionRegistryError,
    InitReport,
};
use crate::injector::{CommandHost, CommandReport, DependencyInjector, Injectable};
use crate::patcher::{Patch, RuntimePatcher};
use crate::resolver::ModuleResolver;
use std::sync::Arc;

pub struct LayerContext {
    resolver: ModuleResolver,
    injector: DependencyInjector,
    patcher: RuntimePatcher,
    extensions: ExtensionRegistry,
}

impl LayerContext {
    pub fn new(resolver: ModuleResolver) -> Self {
        Self {
            resolver,
            injector: DependencyInjector::new(),
            patcher: RuntimePatcher::new(),
            extensions: ExtensionRegistry::new(),
        }
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    pub fn injector(&self) -> &DependencyInjector {
        &self.injector
    }

    pub fn patcher(&self) -> &RuntimePatcher {
        &self.patcher
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub fn register_injectable(&mut self, injectable: Injectable) {
        self.injector.register(injectable);
    }

    pub fn register_patch(&mut self, patch: Patch) {
        self.patcher.register(patch);
    }

    pub fn register_extension(
        &mut self,
        extension: Arc<dyn Extension>,
    ) -> Result<(), ExtensionRegistryError> {
        self.extensions.register(extension)
    }

    pub async fn apply_injections(&mut self) -> ApplyReport {
        self.injector.apply_all(&self.resolver).await
    }

    pub async fn apply_patches(&mut self) -> ApplyReport {
        self.patcher.apply_all(&self.resolver).await
    }

    pub async fn initialize_extensions(&mut self) -> InitReport {
        self.extensions.initialize_all().await
    }

    pub async fn discover_extensions(&mut self) -> DiscoveryReport {
        auto_discover(&mut self.extensions, &self.resolver).await
    }

    pub async fn inject_commands(&self, host: &mut dyn CommandHost) -> CommandReport {
        self.injector
            .inject_commands(&self.extensions, &self.resolver, host)
            .await
    }

    pub fn inject_providers(&self) -> Vec<String> {
        self.injector.inject_providers(&self.extensions)
    }

    pub fn inject_tools(&self) -> Vec<String> {
        self.injector.inject_tools(&self.extensions)
    }
}
