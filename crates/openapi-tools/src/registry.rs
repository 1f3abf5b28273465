//! Immutable snapshot of loaded specifications, generated tools and dependency hints.

use crate::config::EngineConfig;
use crate::dependency::{self, DependencyEdge, DependencyMap};
use crate::generator;
use crate::loader;
use crate::model::{Specification, ToolDescriptor};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Maximum number of names offered for an unknown tool.
pub const MAX_SUGGESTIONS: usize = 10;

#[derive(Debug, Default)]
pub struct Registry {
    specs: BTreeMap<String, Specification>,
    /// Discovery order.
    tools: Vec<Arc<ToolDescriptor>>,
    by_name: HashMap<String, usize>,
    dependencies: DependencyMap,
}

/// Outcome of looking a tool up by name.
#[derive(Debug)]
pub enum Lookup {
    Found(Arc<ToolDescriptor>),
    NotFound { suggestions: Vec<String> },
}

impl Registry {
    /// Load every spec under the configured directory and build a fresh snapshot.
    #[must_use]
    pub fn load(config: &EngineConfig) -> Self {
        Self::from_specs(loader::load_all(config))
    }

    #[must_use]
    pub fn from_specs(specs: Vec<Specification>) -> Self {
        let tools: Vec<Arc<ToolDescriptor>> = generator::generate(&specs)
            .into_iter()
            .map(Arc::new)
            .collect();
        let by_name = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        let dependencies = dependency::analyze(&tools);

        Self {
            specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect(),
            tools,
            by_name,
            dependencies,
        }
    }

    #[must_use]
    pub fn tools(&self) -> &[Arc<ToolDescriptor>] {
        &self.tools
    }

    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn specs(&self) -> impl Iterator<Item = &Specification> {
        self.specs.values()
    }

    #[must_use]
    pub fn spec_count(&self) -> usize {
        self.specs.len()
    }

    /// `spec name -> base URL` for every loaded spec.
    #[must_use]
    pub fn base_urls(&self) -> BTreeMap<String, String> {
        self.specs
            .values()
            .map(|s| (s.name.clone(), s.base_url.clone()))
            .collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ToolDescriptor>> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// Resolve by exact name, then by a unique `_{name}` suffix (e.g. `getMails` for
    /// `bank_getMails`). Misses carry up to [`MAX_SUGGESTIONS`] names.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Lookup {
        if let Some(tool) = self.get(name) {
            return Lookup::Found(Arc::clone(tool));
        }

        let suffix = format!("_{name}");
        let mut aliased = self.tools.iter().filter(|t| t.name.ends_with(&suffix));
        if let (Some(tool), None) = (aliased.next(), aliased.next()) {
            return Lookup::Found(Arc::clone(tool));
        }

        Lookup::NotFound {
            suggestions: self.suggestions(name),
        }
    }

    /// Closest names by Jaro similarity, then alphabetical fill.
    #[must_use]
    pub fn suggestions(&self, unknown: &str) -> Vec<String> {
        let known: Vec<&str> = self.tools.iter().map(|t| t.name.as_str()).collect();
        let mut out = find_similar_strings(unknown, &known);
        out.truncate(MAX_SUGGESTIONS);

        if out.len() < MAX_SUGGESTIONS {
            let mut rest: Vec<&str> = known
                .iter()
                .copied()
                .filter(|k| !out.iter().any(|o| o == k))
                .collect();
            rest.sort_unstable();
            out.extend(
                rest.into_iter()
                    .take(MAX_SUGGESTIONS - out.len())
                    .map(str::to_string),
            );
        }
        out
    }

    #[must_use]
    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    #[must_use]
    pub fn dependencies_for(&self, tool: &str) -> &[DependencyEdge] {
        self.dependencies
            .get(tool)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn find_similar_strings(unknown: &str, known: &[&str]) -> Vec<String> {
    let mut candidates: Vec<(f64, String)> = Vec::new();
    for k in known {
        let score = strsim::jaro(unknown, k);
        if score > 0.7 {
            candidates.push((score, (*k).to_string()));
        }
    }
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    candidates.into_iter().map(|(_, s)| s).collect()
}
