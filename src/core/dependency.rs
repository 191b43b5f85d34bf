//! Dependency graph between calculations
//!
//! Calculations reference each other by bracketed name. References are
//! resolved through the [`FieldResolver`] into calculation indices; the
//! graph is then ordered topologically so a calculation is only translated
//! after everything it refers to.

use crate::error::{MigrateError, MigrateResult};
use crate::translate::{Expr, FieldResolver, Resolved};
use crate::types::{field_key, Calculation};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// One unit of work in dependency order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Translate this calculation; its dependencies come earlier
    Translate(usize),
    /// These calculations reference each other in a cycle
    Cycle(Vec<usize>),
}

/// Edges point from a dependency to the calculation that uses it
pub struct DependencyGraph {
    graph: DiGraph<usize, ()>,
    nodes: Vec<NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph. `parsed[i]` is the parsed formula of `calculations[i]`
    /// (`None` when blank or unparsable).
    pub fn build(
        calculations: &[Calculation],
        parsed: &[Option<&Expr>],
        resolver: &FieldResolver,
        case_insensitive: bool,
    ) -> Self {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..calculations.len()).map(|i| graph.add_node(i)).collect();

        let normalize = |name: &str| {
            let key = field_key(name);
            if case_insensitive {
                key.to_ascii_lowercase()
            } else {
                key.to_string()
            }
        };

        // First definition wins for duplicated names
        let mut index: HashMap<(String, String), usize> = HashMap::new();
        for (i, calc) in calculations.iter().enumerate() {
            let datasource = if case_insensitive {
                calc.datasource.to_ascii_lowercase()
            } else {
                calc.datasource.clone()
            };
            index.entry((datasource, normalize(&calc.name))).or_insert(i);
        }

        for (i, expr) in parsed.iter().enumerate() {
            let Some(expr) = expr else { continue };
            let mut seen = Vec::new();
            for field in expr.references() {
                let Ok(Resolved::Measure { datasource, key, .. }) =
                    resolver.resolve(&calculations[i].datasource, field)
                else {
                    continue;
                };
                let datasource = if case_insensitive {
                    datasource.to_ascii_lowercase()
                } else {
                    datasource
                };
                if let Some(&dep) = index.get(&(datasource, key)) {
                    if !seen.contains(&dep) {
                        seen.push(dep);
                        graph.add_edge(nodes[dep], nodes[i], ());
                    }
                }
            }
        }

        Self { graph, nodes }
    }

    /// Direct dependencies of a calculation, in first-reference order
    pub fn dependencies(&self, calculation: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(self.nodes[calculation], petgraph::Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        // petgraph yields the most recently added edge first
        deps.reverse();
        deps
    }

    /// Strict topological order; any cycle is an error
    pub fn order(&self, calculations: &[Calculation]) -> MigrateResult<Vec<usize>> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|n| self.graph[n]).collect())
            .map_err(|cycle| {
                let calc = &calculations[self.graph[cycle.node_id()]];
                MigrateError::CircularDependency(format!(
                    "calculation '{}' in data source '{}' depends on itself",
                    calc.measure_name(),
                    calc.datasource
                ))
            })
    }

    /// Dependency order that isolates cycles instead of failing
    pub fn steps(&self) -> Vec<Step> {
        // tarjan_scc yields components in reverse topological order
        let mut components = tarjan_scc(&self.graph);
        components.reverse();

        components
            .into_iter()
            .map(|component| {
                let is_cycle = component.len() > 1
                    || self.graph.contains_edge(component[0], component[0]);
                if is_cycle {
                    let mut members: Vec<usize> =
                        component.iter().map(|n| self.graph[*n]).collect();
                    members.sort_unstable();
                    Step::Cycle(members)
                } else {
                    Step::Translate(self.graph[component[0]])
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::parse_formula;

    fn graph_for(calcs: &[Calculation]) -> DependencyGraph {
        let mut resolver = FieldResolver::new(false);
        for calc in calcs {
            resolver.add_calculation(&calc.datasource, &calc.name, &calc.measure_name(), None);
        }
        let parsed: Vec<Option<Expr>> = calcs
            .iter()
            .map(|c| parse_formula(c.formula.as_deref().unwrap_or("")).ok().flatten())
            .collect();
        let refs: Vec<Option<&Expr>> = parsed.iter().map(Option::as_ref).collect();
        DependencyGraph::build(calcs, &refs, &resolver, false)
    }

    #[test]
    fn test_order_puts_dependencies_first() {
        let calcs = vec![
            Calculation::new("ds", "[Margin]", None, "[Profit Ratio] * 100"),
            Calculation::new("ds", "[Profit Ratio]", None, "[Profit] / [Sales]"),
        ];
        let graph = graph_for(&calcs);
        assert_eq!(graph.dependencies(0), vec![1]);
        assert_eq!(graph.order(&calcs).unwrap(), vec![1, 0]);
        assert_eq!(graph.steps(), vec![Step::Translate(1), Step::Translate(0)]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let calcs = vec![
            Calculation::new("ds", "[A]", None, "[B] + 1"),
            Calculation::new("ds", "[B]", None, "[A] + 1"),
            Calculation::new("ds", "[C]", None, "[Sales]"),
        ];
        let graph = graph_for(&calcs);

        let err = graph.order(&calcs).unwrap_err();
        assert!(matches!(err, MigrateError::CircularDependency(_)));

        let steps = graph.steps();
        assert!(steps.contains(&Step::Cycle(vec![0, 1])));
        assert!(steps.contains(&Step::Translate(2)));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let calcs = vec![Calculation::new("ds", "[A]", None, "[A] * 2")];
        assert_eq!(graph_for(&calcs).steps(), vec![Step::Cycle(vec![0])]);
    }

    #[test]
    fn test_same_name_in_other_datasource_is_not_a_dependency() {
        let calcs = vec![
            Calculation::new("one", "[Total]", None, "[Sales]"),
            Calculation::new("two", "[Ratio]", None, "[Total] / 2"),
        ];
        let graph = graph_for(&calcs);
        assert!(graph.dependencies(1).is_empty());
    }
}
