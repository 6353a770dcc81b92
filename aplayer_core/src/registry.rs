//! Name-keyed registry of discovered add-ons.
//!
//! Descriptors are immutable after discovery; protocol commands refer to
//! add-ons by name only. Instantiation goes through stored factory
//! closures so each session gets its own instance.

use std::collections::HashMap;

use aplayer_protocol::{AddOnCategory, AddOnInfo, AddOnSupport};
use tracing::debug;

use crate::addon::{AgentAddOn, ClientAddOn, ConverterAddOn, PlayerAddOn};

/// One live add-on instance, tagged by its capability contract.
pub enum AddOnInstance {
    Player(Box<dyn PlayerAddOn>),
    Converter(Box<dyn ConverterAddOn>),
    Agent(Box<dyn AgentAddOn>),
    Client(Box<dyn ClientAddOn>),
}

impl AddOnInstance {
    pub fn category(&self) -> AddOnCategory {
        match self {
            AddOnInstance::Player(_) => AddOnCategory::Player,
            AddOnInstance::Converter(_) => AddOnCategory::Converter,
            AddOnInstance::Agent(_) => AddOnCategory::Agent,
            AddOnInstance::Client(_) => AddOnCategory::Client,
        }
    }
}

type Factory = Box<dyn Fn() -> AddOnInstance + Send + Sync>;

struct Entry {
    info: AddOnInfo,
    factory: Factory,
}

#[derive(Default)]
pub struct AddOnRegistry {
    entries: HashMap<String, Entry>,
}

impl AddOnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a discovered add-on. A duplicate name replaces the earlier
    /// registration (last discovery wins).
    pub fn register<F>(&mut self, info: AddOnInfo, factory: F)
    where
        F: Fn() -> AddOnInstance + Send + Sync + 'static,
    {
        if self.entries.contains_key(&info.name) {
            debug!(name = %info.name, "replacing add-on registration");
        }
        self.entries.insert(
            info.name.clone(),
            Entry {
                info,
                factory: Box::new(factory),
            },
        );
    }

    pub fn info(&self, name: &str) -> Option<&AddOnInfo> {
        self.entries.get(name).map(|e| &e.info)
    }

    pub fn infos_in(&self, category: AddOnCategory) -> Vec<&AddOnInfo> {
        let mut infos: Vec<&AddOnInfo> = self
            .entries
            .values()
            .map(|e| &e.info)
            .filter(|i| i.category == category)
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn instantiate(&self, name: &str) -> Option<AddOnInstance> {
        self.entries.get(name).map(|e| (e.factory)())
    }

    /// Pick the output agent with the highest plugin priority among agents
    /// advertising [`AddOnSupport::OUTPUT_AGENT`]. Equal priorities resolve
    /// by name so selection is deterministic.
    pub fn best_output_agent(&self) -> Option<&AddOnInfo> {
        let mut best: Option<(&AddOnInfo, i8)> = None;
        for info in self.infos_in(AddOnCategory::Agent) {
            if !info.flags.contains(AddOnSupport::OUTPUT_AGENT) {
                continue;
            }
            let Some(AddOnInstance::Agent(agent)) = self.instantiate(&info.name) else {
                continue;
            };
            let priority = agent.plugin_priority(AddOnSupport::OUTPUT_AGENT);
            let better = match best {
                None => true,
                // infos_in is name-ordered, so strictly-greater keeps the
                // first name on ties.
                Some((_, best_priority)) => priority > best_priority,
            };
            if better {
                best = Some((info, priority));
            }
        }
        best.map(|(info, _)| info)
    }
}
