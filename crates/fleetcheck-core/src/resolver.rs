//! Deployment target selection

use std::collections::HashSet;

use crate::environment::{Application, Environment, Node, Placement};
use crate::error::ResolutionError;

/// Selects the nodes an application is supposed to run on.
pub trait TargetResolver: Send + Sync {
    /// Ordered, duplicate-free target list
    ///
    /// # Errors
    /// Returns `ResolutionError` if the placement references something the
    /// environment does not define
    fn resolve_targets<'e>(
        &self,
        app: &Application,
        env: &'e Environment,
    ) -> Result<Vec<&'e Node>, ResolutionError>;
}

/// Resolver driven by each application's [`Placement`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PlacementResolver;

impl TargetResolver for PlacementResolver {
    fn resolve_targets<'e>(
        &self,
        app: &Application,
        env: &'e Environment,
    ) -> Result<Vec<&'e Node>, ResolutionError> {
        match &app.placement {
            Placement::All => Ok(env.nodes().iter().collect()),
            Placement::Nodes(names) => {
                let mut seen = HashSet::new();
                let mut targets = Vec::with_capacity(names.len());
                for name in names {
                    let node = env
                        .node(name)
                        .ok_or_else(|| ResolutionError::UndefinedNode {
                            app: app.name.clone(),
                            node: name.clone(),
                        })?;
                    if seen.insert(node.name.as_str()) {
                        targets.push(node);
                    }
                }
                Ok(targets)
            }
            Placement::Labels(labels) => {
                if let Some(label) = labels
                    .iter()
                    .find(|l| !env.nodes().iter().any(|n| n.has_label(l)))
                {
                    return Err(ResolutionError::UndefinedLabel {
                        app: app.name.clone(),
                        label: label.clone(),
                    });
                }
                Ok(env
                    .nodes()
                    .iter()
                    .filter(|n| labels.iter().any(|l| n.has_label(l)))
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::new(
            "/srv/fleet",
            vec![
                Node::new("a", "10.0.0.1").with_labels(["web"]),
                Node::new("b", "10.0.0.2").with_labels(["db"]),
                Node::new("c", "10.0.0.3").with_labels(["web", "db"]),
            ],
            vec![],
        )
        .unwrap()
    }

    fn names(nodes: &[&Node]) -> Vec<String> {
        nodes.iter().map(|n| n.name.clone()).collect()
    }

    #[test]
    fn test_all_nodes_in_environment_order() {
        let env = env();
        let targets = PlacementResolver
            .resolve_targets(&Application::new("agent"), &env)
            .unwrap();

        assert_eq!(names(&targets), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_named_nodes_keep_listed_order_without_duplicates() {
        let env = env();
        let app = Application::new("api").with_placement(Placement::Nodes(vec![
            "c".to_string(),
            "a".to_string(),
            "c".to_string(),
        ]));

        let targets = PlacementResolver.resolve_targets(&app, &env).unwrap();
        assert_eq!(names(&targets), vec!["c", "a"]);
    }

    #[test]
    fn test_undefined_node() {
        let env = env();
        let app = Application::new("api").with_placement(Placement::Nodes(vec!["z".to_string()]));

        assert_eq!(
            PlacementResolver.resolve_targets(&app, &env),
            Err(ResolutionError::UndefinedNode {
                app: "api".to_string(),
                node: "z".to_string(),
            })
        );
    }

    #[test]
    fn test_labels_union() {
        let env = env();
        let app = Application::new("web")
            .with_placement(Placement::Labels(vec!["db".to_string(), "web".to_string()]));

        let targets = PlacementResolver.resolve_targets(&app, &env).unwrap();
        assert_eq!(names(&targets), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_undefined_label() {
        let env = env();
        let app = Application::new("web")
            .with_placement(Placement::Labels(vec!["web".to_string(), "gpu".to_string()]));

        assert_eq!(
            PlacementResolver.resolve_targets(&app, &env),
            Err(ResolutionError::UndefinedLabel {
                app: "web".to_string(),
                label: "gpu".to_string(),
            })
        );
    }
}
