use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Result, SupervisorError};
use crate::ports::agent_provider::{AgentProvider, DispatchOutcome, DispatchRequest};

/// A static ordered priority list of providers (operator-configured).
/// The first available provider is used; "available" means present on
/// the host *and* not circuit-broken. No LLM-based routing — selection
/// is a deterministic linear scan.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn AgentProvider>>,
    circuit_open: Mutex<HashMap<String, bool>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn AgentProvider>>) -> Self {
        Self {
            providers,
            circuit_open: Mutex::new(HashMap::new()),
        }
    }

    pub fn open_circuit(&self, provider: &str) {
        self.circuit_open.lock().expect("registry mutex poisoned").insert(provider.to_string(), true);
    }

    pub fn close_circuit(&self, provider: &str) {
        self.circuit_open.lock().expect("registry mutex poisoned").insert(provider.to_string(), false);
    }

    fn is_circuit_open(&self, provider: &str) -> bool {
        *self.circuit_open.lock().expect("registry mutex poisoned").get(provider).unwrap_or(&false)
    }

    /// Finds the first available provider, preferring the task's
    /// requested provider if present in the priority list and
    /// available; otherwise walks the configured priority order.
    pub async fn select(&self, preferred: Option<&str>) -> Option<Arc<dyn AgentProvider>> {
        if let Some(name) = preferred {
            if let Some(provider) = self.providers.iter().find(|p| p.name() == name) {
                if !self.is_circuit_open(name) && provider.is_available().await {
                    return Some(Arc::clone(provider));
                }
            }
        }
        for provider in &self.providers {
            if self.is_circuit_open(provider.name()) {
                continue;
            }
            if provider.is_available().await {
                return Some(Arc::clone(provider));
            }
        }
        None
    }

    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let mut statuses = HashMap::new();
        for provider in &self.providers {
            statuses.insert(provider.name().to_string(), !self.is_circuit_open(provider.name()) && provider.is_available().await);
        }
        statuses
    }

    pub async fn dispatch(&self, preferred: Option<&str>, request: DispatchRequest) -> Result<(String, DispatchOutcome)> {
        let provider = self
            .select(preferred)
            .await
            .ok_or_else(|| SupervisorError::Internal("no provider available".into()))?;
        let outcome = provider.dispatch(request).await?;
        if outcome.resource_exhausted {
            self.open_circuit(provider.name());
        }
        Ok((provider.name().to_string(), outcome))
    }
}
