use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::events::LifecycleEvent;

/// Phases hooks can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookPhase {
    Startup,
    Shutdown,
}

/// Callback invoked synchronously around lifecycle transitions.
///
/// A failing `Startup` hook aborts startup; a failing `Shutdown` hook is only
/// logged.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn call(&self, token: &CancellationToken, event: &LifecycleEvent) -> anyhow::Result<()>;
}

pub type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Adapter turning a closure into a [`Hook`]
pub struct FnHook<F> {
    name: String,
    func: F,
}

impl<F> FnHook<F>
where
    F: Fn(LifecycleEvent) -> HookFuture + Send + Sync,
{
    pub fn new<S: Into<String>>(name: S, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(LifecycleEvent) -> HookFuture + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, _token: &CancellationToken, event: &LifecycleEvent) -> anyhow::Result<()> {
        (self.func)(event.clone()).await
    }
}

/// Build a shared hook from a closure returning a boxed future
pub fn hook_fn<S, F>(name: S, func: F) -> Arc<dyn Hook>
where
    S: Into<String>,
    F: Fn(LifecycleEvent) -> HookFuture + Send + Sync + 'static,
{
    Arc::new(FnHook::new(name, func))
}

/// Per-phase ordered hook lists
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<HookPhase, Vec<Arc<dyn Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, phase: HookPhase, hook: Arc<dyn Hook>) {
        self.hooks.entry(phase).or_default().push(hook);
    }

    /// Remove the first registration of this exact hook instance
    pub fn remove(&mut self, phase: HookPhase, hook: &Arc<dyn Hook>) -> bool {
        let Some(list) = self.hooks.get_mut(&phase) else {
            return false;
        };

        match list.iter().position(|h| Arc::ptr_eq(h, hook)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the hooks for `phase`, in registration order
    pub fn hooks(&self, phase: HookPhase) -> Vec<Arc<dyn Hook>> {
        self.hooks.get(&phase).cloned().unwrap_or_default()
    }

    pub fn len(&self, phase: HookPhase) -> usize {
        self.hooks.get(&phase).map(Vec::len).unwrap_or(0)
    }
}
