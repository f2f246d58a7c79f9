//! Declare - Turn a network plan into cloud resource declarations
//!
//! Each entity of a [`NetworkPlan`] becomes one or more named [`Resource`]s that
//! a [`Provider`](crate::provider::Provider) knows how to create. Resources are
//! emitted in dependency order: anything referenced through
//! [`Value::ResourceRef`] is declared before the resource referring to it.

use std::collections::BTreeMap;

use crate::resource::{Resource, Value};
use crate::topology::{
    DEFAULT_ROUTE_DESTINATION, NetworkPlan, RouteTarget, SubnetKind, SubnetPlan, TopologyRequest,
};

pub const VPC: &str = "vpc";
pub const INTERNET_GATEWAY: &str = "internet_gateway";
pub const ROUTE_TABLE: &str = "route_table";
pub const ROUTE: &str = "route";
pub const SUBNET: &str = "subnet";
pub const ROUTE_TABLE_ASSOCIATION: &str = "route_table_association";
pub const EIP: &str = "eip";
pub const NAT_GATEWAY: &str = "nat_gateway";

/// Resource names derived from the VPC name
///
/// Indices are 0-based in the plan and 1-based in names.
#[derive(Debug, Clone)]
pub struct Names<'a> {
    vpc: &'a str,
}

impl<'a> Names<'a> {
    pub fn new(vpc: &'a str) -> Self {
        Self { vpc }
    }

    pub fn vpc(&self) -> String {
        self.vpc.to_string()
    }

    pub fn internet_gateway(&self) -> String {
        format!("{}-igw", self.vpc)
    }

    pub fn public_route_table(&self) -> String {
        format!("{}-public-rt", self.vpc)
    }

    pub fn public_route(&self) -> String {
        format!("{}-public-route", self.vpc)
    }

    pub fn subnet(&self, kind: SubnetKind, index: usize) -> String {
        format!("{}-{}-{}", self.vpc, kind, index + 1)
    }

    pub fn association(&self, kind: SubnetKind, index: usize) -> String {
        format!("{}-rt-assoc", self.subnet(kind, index))
    }

    pub fn eip(&self, public_index: usize) -> String {
        format!("{}-eip-{}", self.vpc, public_index + 1)
    }

    pub fn nat_gateway(&self, public_index: usize) -> String {
        format!("{}-nat-{}", self.vpc, public_index + 1)
    }

    pub fn private_route_table(&self, index: usize) -> String {
        format!("{}-private-rt-{}", self.vpc, index + 1)
    }

    pub fn private_route(&self, index: usize) -> String {
        format!("{}-private-route-{}", self.vpc, index + 1)
    }
}

/// Declare every resource needed to realize `plan` as a VPC called `name`
pub fn declare(name: &str, request: &TopologyRequest, plan: &NetworkPlan) -> Vec<Resource> {
    let names = Names::new(name);
    let tags = |resource_name: &str| tags_for(resource_name, &request.tags);
    let mut resources = Vec::new();

    resources.push(
        Resource::new(VPC, names.vpc())
            .with_attribute("cidr_block", request.cidr_block.as_str())
            .with_attribute("enable_dns_hostnames", true)
            .with_attribute("enable_dns_support", true)
            .with_attribute("tags", tags(name)),
    );

    resources.push(
        Resource::new(INTERNET_GATEWAY, names.internet_gateway())
            .with_attribute("vpc_id", Value::id_of(names.vpc()))
            .with_attribute("tags", tags(names.internet_gateway().as_str())),
    );

    resources.push(
        Resource::new(ROUTE_TABLE, names.public_route_table())
            .with_attribute("vpc_id", Value::id_of(names.vpc()))
            .with_attribute("tags", tags(names.public_route_table().as_str())),
    );

    resources.push(
        Resource::new(ROUTE, names.public_route())
            .with_attribute("route_table_id", Value::id_of(names.public_route_table()))
            .with_attribute("destination_cidr_block", DEFAULT_ROUTE_DESTINATION)
            .with_attribute("gateway_id", Value::id_of(names.internet_gateway())),
    );

    for subnet in plan.public_subnets() {
        let subnet_name = names.subnet(SubnetKind::Public, subnet.index);
        resources.push(subnet_resource(&names, subnet, tags(subnet_name.as_str())));
        resources.push(association(&names, subnet, names.public_route_table()));

        if plan.nat_in_public_subnet(subnet.index).is_some() {
            let eip = names.eip(subnet.index);
            let nat = names.nat_gateway(subnet.index);
            resources.push(
                Resource::new(EIP, eip.clone())
                    .with_attribute("domain", "vpc")
                    .with_attribute("tags", tags(eip.as_str())),
            );
            resources.push(
                Resource::new(NAT_GATEWAY, nat.clone())
                    .with_attribute("allocation_id", Value::id_of(eip))
                    .with_attribute("subnet_id", Value::id_of(subnet_name))
                    .with_attribute("tags", tags(nat.as_str())),
            );
        }
    }

    for subnet in plan.private_subnets() {
        let subnet_name = names.subnet(SubnetKind::Private, subnet.index);
        let route_table = names.private_route_table(subnet.index);
        resources.push(subnet_resource(&names, subnet, tags(subnet_name.as_str())));
        resources.push(
            Resource::new(ROUTE_TABLE, route_table.clone())
                .with_attribute("vpc_id", Value::id_of(names.vpc()))
                .with_attribute("tags", tags(route_table.as_str())),
        );
        resources.push(association(&names, subnet, route_table.clone()));

        let target = plan
            .route_for(SubnetKind::Private, subnet.index)
            .and_then(|r| r.default_route);
        if let Some(RouteTarget::NatGateway { index }) = target
            && let Some(nat) = plan.nat_gateways.get(index)
        {
            resources.push(
                Resource::new(ROUTE, names.private_route(subnet.index))
                    .with_attribute("route_table_id", Value::id_of(route_table))
                    .with_attribute("destination_cidr_block", DEFAULT_ROUTE_DESTINATION)
                    .with_attribute(
                        "nat_gateway_id",
                        Value::id_of(names.nat_gateway(nat.attached_public_subnet_index)),
                    ),
            );
        }
    }

    resources
}

/// `Name` tag first, then the request tags (which win on collision)
fn tags_for(resource_name: &str, extra: &BTreeMap<String, String>) -> Value {
    let mut tags = BTreeMap::new();
    tags.insert("Name".to_string(), Value::from(resource_name));
    for (key, value) in extra {
        tags.insert(key.clone(), Value::from(value.as_str()));
    }
    Value::Map(tags)
}

fn subnet_resource(names: &Names<'_>, subnet: &SubnetPlan, tags: Value) -> Resource {
    let mut resource = Resource::new(SUBNET, names.subnet(subnet.kind, subnet.index))
        .with_attribute("vpc_id", Value::id_of(names.vpc()))
        .with_attribute("cidr_block", subnet.cidr.to_string())
        .with_attribute("availability_zone", subnet.zone.as_str())
        .with_attribute("tags", tags);
    if subnet.has_public_ip {
        resource = resource.with_attribute("map_public_ip_on_launch", true);
    }
    resource
}

fn association(names: &Names<'_>, subnet: &SubnetPlan, route_table: String) -> Resource {
    Resource::new(
        ROUTE_TABLE_ASSOCIATION,
        names.association(subnet.kind, subnet.index),
    )
    .with_attribute(
        "subnet_id",
        Value::id_of(names.subnet(subnet.kind, subnet.index)),
    )
    .with_attribute("route_table_id", Value::id_of(route_table))
}
