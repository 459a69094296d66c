use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::component::Component;
use crate::error::{LifelineError, Result};

/// A registered component inside the dependency graph
#[derive(Clone)]
pub struct Node {
    component: Arc<dyn Component>,
}

impl Node {
    pub fn component(&self) -> &Arc<dyn Component> {
        &self.component
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Visited,
}

/// Components keyed by name together with their declared dependencies.
///
/// The edge map records, for every node, the names it depends on in the
/// order the component declared them. Edges may point at names that are not
/// registered yet; `validate_dependencies` reports those.
#[derive(Default, Clone)]
pub struct DependencyGraph {
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn add_node(&mut self, component: Arc<dyn Component>) -> Result<()> {
        let name = component.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(LifelineError::DuplicateComponent { name });
        }

        let mut deps: Vec<String> = Vec::new();
        for dep in component.dependencies() {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        debug!("Adding node {} with dependencies {:?}", name, deps);
        self.edges.insert(name.clone(), deps);
        self.nodes.insert(name, Node { component });
        Ok(())
    }

    pub fn remove_node(&mut self, name: &str) -> Result<()> {
        if !self.nodes.contains_key(name) {
            return Err(LifelineError::not_found(name));
        }

        let dependents = self.dependents(name);
        if !dependents.is_empty() {
            return Err(LifelineError::DependentsExist {
                name: name.to_string(),
                dependents,
            });
        }

        self.nodes.remove(name);
        self.edges.remove(name);
        debug!("Removed node {}", name);
        Ok(())
    }

    /// Names of the components `name` depends on, in declaration order
    pub fn dependencies(&self, name: &str) -> Result<Vec<String>> {
        self.edges
            .get(name)
            .cloned()
            .ok_or_else(|| LifelineError::not_found(name))
    }

    /// Names of the components that list `name` as a dependency, sorted
    pub fn dependents(&self, name: &str) -> Vec<String> {
        let mut dependents: Vec<String> = self
            .edges
            .iter()
            .filter(|(node, deps)| node.as_str() != name && deps.iter().any(|d| d == name))
            .map(|(node, _)| node.clone())
            .collect();
        dependents.sort();
        dependents
    }

    fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check that every dependency exists and that the graph is acyclic
    pub fn validate_dependencies(&self) -> Result<()> {
        for name in self.sorted_names() {
            for dep in &self.edges[name] {
                if !self.nodes.contains_key(dep) {
                    return Err(LifelineError::MissingDependency {
                        component: name.to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Marks are reset for every root so an earlier traversal can never
        // hide a cycle that is only reachable from a later one.
        for name in self.sorted_names() {
            let mut marks: HashMap<&str, Mark> = HashMap::new();
            self.visit(name, &mut marks)?;
        }

        Ok(())
    }

    fn visit<'a>(&'a self, name: &'a str, marks: &mut HashMap<&'a str, Mark>) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Visiting) => {
                return Err(LifelineError::CycleDetected {
                    component: name.to_string(),
                })
            }
            Some(Mark::Visited) => return Ok(()),
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        for dep in &self.edges[name] {
            self.visit(dep, marks)?;
        }
        marks.insert(name, Mark::Visited);
        Ok(())
    }

    /// Group components into levels that can start concurrently.
    ///
    /// `level(n) = 0` without dependencies, otherwise one more than the
    /// deepest dependency. Names inside a level are sorted.
    pub fn startup_levels(&self) -> Result<Vec<Vec<String>>> {
        self.validate_dependencies()?;

        let mut levels: HashMap<&str, usize> = HashMap::with_capacity(self.nodes.len());
        for name in self.sorted_names() {
            self.resolve_level(name, &mut levels);
        }

        let mut grouped: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (name, level) in levels {
            grouped.entry(level).or_default().push(name.to_string());
        }

        Ok(grouped
            .into_values()
            .map(|mut names| {
                names.sort();
                names
            })
            .collect())
    }

    // Only called on a validated graph, so recursion terminates.
    fn resolve_level<'a>(&'a self, name: &'a str, levels: &mut HashMap<&'a str, usize>) -> usize {
        if let Some(level) = levels.get(name) {
            return *level;
        }

        let level = self.edges[name]
            .iter()
            .map(|dep| self.resolve_level(dep, levels) + 1)
            .max()
            .unwrap_or(0);

        levels.insert(name, level);
        level
    }

    /// Level-by-level flattening of `startup_levels`
    pub fn startup_order(&self) -> Result<Vec<String>> {
        Ok(self.startup_levels()?.into_iter().flatten().collect())
    }

    /// Exact reverse of `startup_order`
    pub fn shutdown_order(&self) -> Result<Vec<String>> {
        let mut order = self.startup_order()?;
        order.reverse();
        Ok(order)
    }
}
