use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::function_tool::ToolFault;
use crate::tools::context::ResultContract;
use crate::tools::context::ToolCategory;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutcome;
use crate::tools::spec::ToolSpec;

/// Executor for one registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutcome, ToolFault>;
}

#[derive(Clone)]
pub struct ToolRegistryEntry {
    pub spec: ToolSpec,
    pub category: ToolCategory,
    pub contract: ResultContract,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolRegistryEntry {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

impl std::fmt::Debug for ToolRegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistryEntry")
            .field("name", &self.spec.name)
            .field("category", &self.category)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

/// Read-only table of tools, built once at startup and shared between
/// sessions.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    entries: Vec<ToolRegistryEntry>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ToolRegistryEntry> {
        self.by_name.get(name).map(|idx| &self.entries[*idx])
    }

    pub fn category_of(&self, name: &str) -> Option<ToolCategory> {
        self.get(name).map(|entry| entry.category)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[ToolRegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tool schemas in the Chat Completions wire format, in registration
    /// order.
    pub fn tools_json(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|entry| entry.spec.to_chat_completions_json())
            .collect()
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: Vec<ToolRegistryEntry>,
}

impl ToolRegistryBuilder {
    /// Registers `handler` under `spec.name` with the category's default
    /// result contract.
    pub fn register(
        self,
        spec: ToolSpec,
        category: ToolCategory,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        let contract = category.default_contract();
        self.register_with_contract(spec, category, contract, handler)
    }

    pub fn register_with_contract(
        mut self,
        spec: ToolSpec,
        category: ToolCategory,
        contract: ResultContract,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        let entry = ToolRegistryEntry {
            spec,
            category,
            contract,
            handler,
        };
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|existing| existing.spec.name == entry.spec.name)
        {
            warn!("overwriting handler for tool {}", entry.spec.name);
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
        self
    }

    pub fn build(self) -> ToolRegistry {
        let by_name = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.spec.name.clone(), idx))
            .collect();
        ToolRegistry {
            entries: self.entries,
            by_name,
        }
    }
}
