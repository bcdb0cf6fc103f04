use std::fmt;

use serde::{Deserialize, Serialize};

/// The four independently prepared sub-resources of a job.
///
/// Declaration order is the iteration order used everywhere a job is
/// inspected component by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    ResultsJob,
    SerializedSuite,
    Machine,
    WorkerJob,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::ResultsJob,
        Component::SerializedSuite,
        Component::Machine,
        Component::WorkerJob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::ResultsJob => "results-job",
            Component::SerializedSuite => "serialized-suite",
            Component::Machine => "machine",
            Component::WorkerJob => "worker-job",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_in_declaration_order() {
        let mut sorted = Component::ALL;
        sorted.sort();
        assert_eq!(sorted, Component::ALL);
    }

    #[test]
    fn serializes_as_kebab_case() {
        let json = serde_json::to_string(&Component::SerializedSuite).unwrap();
        assert_eq!(json, "\"serialized-suite\"");
        assert_eq!(Component::WorkerJob.to_string(), "worker-job");
    }

    #[test]
    fn parse_matches_display() {
        for component in Component::ALL {
            assert_eq!(Component::parse(&component.to_string()), Some(component));
        }
        assert_eq!(Component::parse("database"), None);
    }
}
