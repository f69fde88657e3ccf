//! Table-of-contents document (storage key `toc`) and the navigation links
//! derived from it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocComponent {
    #[serde(rename = "Key")]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocProject {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Component", default)]
    pub components: Vec<TocComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocSolution {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Project", default)]
    pub projects: Vec<TocProject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TocDocument {
    #[serde(rename = "Solution", default)]
    pub solutions: Vec<TocSolution>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectLink {
    pub name: String,
    pub href: String,
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolutionLink {
    pub name: String,
    pub href: String,
    pub projects: Vec<ProjectLink>,
}

impl TocDocument {
    pub fn navigation(&self) -> Vec<SolutionLink> {
        self.solutions
            .iter()
            .map(|solution| SolutionLink {
                name: solution.name.clone(),
                href: format!("/solution/{}", solution.name),
                projects: solution
                    .projects
                    .iter()
                    .map(|project| ProjectLink {
                        name: project.name.clone(),
                        href: format!("/{}/{}", solution.name, project.name),
                        components: project.components.iter().map(|c| c.key.clone()).collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_links() {
        let doc: TocDocument = serde_json::from_value(serde_json::json!({
            "Solution": [{
                "Name": "planner",
                "Project": [
                    { "Name": "demo", "Component": [{ "Key": "schedule" }, { "Key": "tracker" }] },
                    { "Name": "docs" }
                ]
            }]
        }))
        .unwrap();

        let nav = doc.navigation();
        assert_eq!(nav.len(), 1);
        assert_eq!(nav[0].href, "/solution/planner");
        assert_eq!(nav[0].projects[0].href, "/planner/demo");
        assert_eq!(nav[0].projects[0].components, vec!["schedule", "tracker"]);
        assert!(nav[0].projects[1].components.is_empty());
    }
}
