//! The adapter trait and the per-platform registry.

use std::collections::HashMap;
use std::sync::Arc;

use forge_common::Platform;

use crate::android::AndroidAdapter;
use crate::apple::AppleAdapter;
use crate::custom::CustomAdapter;
use crate::error::ToolchainError;
use crate::request::{Artifacts, BuildRequest, CommandSpec};
use crate::runner::ProcessOutput;
use crate::validator::ToolRequirement;

/// Translates a build request into a concrete toolchain invocation.
///
/// Adapters never run anything themselves. The scheduler spawns the returned
/// [`CommandSpec`] and hands the captured output back for artifact discovery.
pub trait ToolchainAdapter: Send + Sync {
    /// Short adapter name for logs and reports.
    fn name(&self) -> &'static str;

    /// Tools that must be installed for `request` to build.
    fn tools(&self, request: &BuildRequest) -> Vec<ToolRequirement>;

    /// Builds the command line for `request`.
    fn command(&self, request: &BuildRequest) -> Result<CommandSpec, ToolchainError>;

    /// Locates the artifacts of a successful run.
    fn collect_artifacts(
        &self,
        request: &BuildRequest,
        output: &ProcessOutput,
    ) -> Result<Artifacts, ToolchainError>;
}

/// Maps platforms to adapters.
///
/// A request that carries an explicit command always goes to the custom
/// adapter, whatever its platform.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn ToolchainAdapter>>,
    custom: Arc<dyn ToolchainAdapter>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    /// Creates a registry with the built-in adapters.
    pub fn new() -> Self {
        let mut adapters: HashMap<Platform, Arc<dyn ToolchainAdapter>> = HashMap::new();
        adapters.insert(Platform::Android, Arc::new(AndroidAdapter));
        adapters.insert(Platform::Ios, Arc::new(AppleAdapter::ios()));
        adapters.insert(Platform::Macos, Arc::new(AppleAdapter::macos()));
        adapters.insert(Platform::Windows, Arc::new(crate::windows::WindowsAdapter));
        adapters.insert(Platform::Web, Arc::new(crate::web::WebAdapter));
        Self {
            adapters,
            custom: Arc::new(CustomAdapter),
        }
    }

    /// Replaces the adapter for `platform`.
    pub fn register(&mut self, platform: Platform, adapter: Arc<dyn ToolchainAdapter>) {
        self.adapters.insert(platform, adapter);
    }

    /// Returns the adapter that handles `request`.
    pub fn resolve(&self, request: &BuildRequest) -> Arc<dyn ToolchainAdapter> {
        if !request.command.is_empty() {
            return self.custom.clone();
        }
        self.adapters
            .get(&request.config.platform)
            .cloned()
            .unwrap_or_else(|| self.custom.clone())
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self
            .adapters
            .iter()
            .map(|(p, a)| format!("{p}={}", a.name()))
            .collect();
        names.sort();
        f.debug_struct("AdapterRegistry").field("adapters", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_common::BuildConfig;

    fn request(platform: Platform) -> BuildRequest {
        BuildRequest::new("t", "/p", vec![], BuildConfig::new(platform), "/p/build/t")
    }

    #[test]
    fn resolves_builtin_adapters() {
        let registry = AdapterRegistry::new();
        assert_eq!(registry.resolve(&request(Platform::Android)).name(), "android");
        assert_eq!(registry.resolve(&request(Platform::Ios)).name(), "ios");
        assert_eq!(registry.resolve(&request(Platform::Macos)).name(), "macos");
        assert_eq!(registry.resolve(&request(Platform::Windows)).name(), "windows");
        assert_eq!(registry.resolve(&request(Platform::Web)).name(), "web");
        assert_eq!(registry.resolve(&request(Platform::Linux)).name(), "custom");
    }

    #[test]
    fn explicit_command_selects_custom() {
        let registry = AdapterRegistry::new();
        let req = request(Platform::Web).with_command(["sh", "-c", "true"]);
        assert_eq!(registry.resolve(&req).name(), "custom");
    }

    #[test]
    fn register_overrides() {
        let mut registry = AdapterRegistry::new();
        registry.register(Platform::Web, Arc::new(CustomAdapter));
        assert_eq!(registry.resolve(&request(Platform::Web)).name(), "custom");
    }
}
