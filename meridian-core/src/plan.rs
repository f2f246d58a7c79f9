//! Plan - Ordered resources to create
//!
//! A Plan is built from the declarations of a network plan and holds the
//! resources in the order they must be created. No side effects occur until
//! the Plan is applied by an [`Interpreter`](crate::interpreter::Interpreter).

use std::collections::BTreeMap;

use crate::declare;
use crate::resource::Resource;
use crate::topology::{NetworkPlan, TopologyRequest};

/// Plan containing resources to be created
#[derive(Debug, Clone, Default)]
pub struct Plan {
    resources: Vec<Resource>,
}

impl Plan {
    /// Plan creation of everything `network` needs, as a VPC called `name`
    pub fn for_network(name: &str, request: &TopologyRequest, network: &NetworkPlan) -> Self {
        Self {
            resources: declare::declare(name, request, network),
        }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for resource in &self.resources {
            *summary
                .by_type
                .entry(resource.id.resource_type.clone())
                .or_default() += 1;
            summary.create += 1;
        }
        summary
    }
}

#[derive(Debug, Default)]
pub struct PlanSummary {
    pub create: usize,
    /// Resource type -> count
    pub by_type: BTreeMap<String, usize>,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Plan: {} to create", self.create)?;
        if !self.by_type.is_empty() {
            let parts: Vec<String> = self
                .by_type
                .iter()
                .map(|(resource_type, count)| format!("{} {}", count, resource_type))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology;

    #[test]
    fn empty_plan() {
        let plan = Plan::default();
        assert!(plan.is_empty());
        assert_eq!(plan.summary().to_string(), "Plan: 0 to create");
    }

    #[test]
    fn plan_summary() {
        let request = TopologyRequest::new("10.0.0.0/16")
            .with_az_count(1)
            .with_public_subnets(1)
            .with_private_subnets(0);
        let network = topology::plan(&request, &["z1"]).unwrap();
        let plan = Plan::for_network("main", &request, &network);

        let summary = plan.summary();
        assert_eq!(summary.create, 6);
        assert_eq!(summary.by_type.get("subnet"), Some(&1));
        assert_eq!(
            summary.to_string(),
            "Plan: 6 to create (1 internet_gateway, 1 route, 1 route_table, \
             1 route_table_association, 1 subnet, 1 vpc)"
        );
    }

    #[test]
    fn plan_for_network() {
        let request = TopologyRequest::new("10.0.0.0/16")
            .with_az_count(2)
            .with_public_subnets(2)
            .with_private_subnets(2);
        let network = topology::plan(&request, &["z1", "z2"]).unwrap();
        let plan = Plan::for_network("main", &request, &network);

        let summary = plan.summary();
        assert_eq!(plan.len(), 18);
        assert_eq!(summary.by_type.get("nat_gateway"), Some(&1));
        assert_eq!(summary.by_type.get("route"), Some(&3));
        assert_eq!(summary.by_type.get("route_table"), Some(&3));
    }
}
