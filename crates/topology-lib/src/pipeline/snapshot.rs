use super::RunReport;
use crate::models::{Component, Relation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Everything one run emitted, framed by start and stop markers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySnapshot {
    pub start_snapshot: bool,
    pub stop_snapshot: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub components: Vec<Component>,
    pub relations: Vec<Relation>,
    pub failed_collectors: Vec<String>,
    /// Resources whose list call failed during the run
    pub failed_resources: Vec<String>,
    pub dropped_relations: usize,
}

impl TopologySnapshot {
    /// The run lost collectors, and only to API list failures
    pub fn api_degraded(&self) -> bool {
        !self.failed_collectors.is_empty()
            && self.failed_resources.len() == self.failed_collectors.len()
    }

    pub fn new(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        components: Vec<Component>,
        relations: Vec<Relation>,
        report: RunReport,
    ) -> Self {
        Self {
            start_snapshot: true,
            stop_snapshot: true,
            started_at,
            finished_at,
            components,
            relations,
            failed_collectors: report.failures.iter().map(|f| f.name.to_string()).collect(),
            failed_resources: report
                .failures
                .iter()
                .filter_map(|f| f.resource.map(str::to_string))
                .collect(),
            dropped_relations: report.dropped_relations,
        }
    }

    pub fn component(&self, external_id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.external_id == external_id)
    }

    pub fn relation(&self, source_id: &str, target_id: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.source_id == source_id && r.target_id == target_id)
    }

    pub fn has_relation(&self, source_id: &str, target_id: &str) -> bool {
        self.relation(source_id, target_id).is_some()
    }

    /// Relations with an endpoint that is not a component of this snapshot
    pub fn dangling_relations(&self) -> Vec<&Relation> {
        let known: HashSet<&str> = self
            .components
            .iter()
            .map(|c| c.external_id.as_str())
            .collect();
        self.relations
            .iter()
            .filter(|r| {
                !known.contains(r.source_id.as_str()) || !known.contains(r.target_id.as_str())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentType, Data, RelationType};
    use crate::pipeline::CollectorFailure;

    fn component(id: &str) -> Component {
        Component::new(id.to_string(), ComponentType::Pod, Data::new())
    }

    #[test]
    fn test_dangling_relations() {
        let snapshot = TopologySnapshot::new(
            Utc::now(),
            Utc::now(),
            vec![component("a"), component("b")],
            vec![
                Relation::new("a", "b", RelationType::Encloses),
                Relation::new("a", "missing", RelationType::Uses),
            ],
            RunReport::default(),
        );

        assert!(snapshot.has_relation("a", "b"));
        let dangling = snapshot.dangling_relations();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].target_id, "missing");
    }

    #[test]
    fn test_api_degraded_only_for_api_failures() {
        let failure = |name, resource| CollectorFailure {
            name,
            error: "boom".to_string(),
            resource,
        };
        let snapshot = |failures| {
            TopologySnapshot::new(
                Utc::now(),
                Utc::now(),
                Vec::new(),
                Vec::new(),
                RunReport {
                    failures,
                    ..Default::default()
                },
            )
        };

        assert!(!snapshot(Vec::new()).api_degraded());
        let listed = snapshot(vec![failure("secret-collector", Some("secrets"))]);
        assert!(listed.api_degraded());
        assert_eq!(listed.failed_resources, vec!["secrets".to_string()]);
        assert!(!snapshot(vec![
            failure("secret-collector", Some("secrets")),
            failure("cluster-collector", None),
        ])
        .api_degraded());
    }

    #[test]
    fn test_snapshot_serializes_markers() {
        let snapshot = TopologySnapshot::new(
            Utc::now(),
            Utc::now(),
            Vec::new(),
            Vec::new(),
            RunReport::default(),
        );
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["startSnapshot"], true);
        assert_eq!(json["stopSnapshot"], true);
        assert!(json["components"].as_array().unwrap().is_empty());
    }
}
