//! Topology - Derive a VPC network plan from a high-level request
//!
//! [`plan`] is a pure function: given a [`TopologyRequest`] and the ordered list
//! of availability zones it resolves how many subnets of each kind to build,
//! which CIDR and zone each one gets, where NAT gateways go and which gateway
//! every subnet's default route points at. It performs no I/O; zone discovery
//! happens before it and resource creation after it.
//!
//! Requests that ask for more than the zones allow are clamped, and private
//! subnets that end up without a NAT gateway are left isolated. Neither case is
//! an error; the shape of the returned [`NetworkPlan`] records it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cidr::{CidrLayout, Ipv4Cidr};

/// Destination of every default route
pub const DEFAULT_ROUTE_DESTINATION: &str = "0.0.0.0/0";

/// Errors that stop planning
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// The zone list was empty
    #[error("No availability zones available")]
    InsufficientZones,

    #[error("Invalid CIDR block '{cidr}': {reason}")]
    InvalidCidr { cidr: String, reason: String },

    /// Subnets of one kind would need a third octet above 255
    #[error("{count} {kind} subnets starting at octet {base} do not fit below 256")]
    LayoutOverflow {
        kind: SubnetKind,
        base: u8,
        count: usize,
    },

    #[error(
        "Public subnets ({public_count} from octet {public_base}) overlap private subnets ({private_count} from octet {private_base})"
    )]
    LayoutOverlap {
        public_base: u8,
        public_count: usize,
        private_base: u8,
        private_count: usize,
    },
}

impl PlanError {
    pub fn invalid_cidr(cidr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCidr {
            cidr: cidr.into(),
            reason: reason.into(),
        }
    }
}

/// What the caller wants built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyRequest {
    /// Parent block of the VPC (e.g., "10.0.0.0/16")
    pub cidr_block: String,
    /// Number of availability zones to spread across
    pub az_count: usize,
    pub public_subnet_count: usize,
    pub private_subnet_count: usize,
    /// One NAT gateway per eligible private subnet instead of a single shared one
    pub nat_per_private_subnet: bool,
    /// Opaque tags carried through to every declared resource
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub layout: CidrLayout,
}

impl Default for TopologyRequest {
    /// Two zones with two public and two private subnets sharing one NAT gateway
    fn default() -> Self {
        Self {
            cidr_block: "10.0.0.0/16".to_string(),
            az_count: 2,
            public_subnet_count: 2,
            private_subnet_count: 2,
            nat_per_private_subnet: false,
            tags: BTreeMap::new(),
            layout: CidrLayout::default(),
        }
    }
}

impl TopologyRequest {
    /// Default request over the given parent block
    pub fn new(cidr_block: impl Into<String>) -> Self {
        Self {
            cidr_block: cidr_block.into(),
            ..Self::default()
        }
    }

    pub fn with_az_count(mut self, az_count: usize) -> Self {
        self.az_count = az_count;
        self
    }

    pub fn with_public_subnets(mut self, count: usize) -> Self {
        self.public_subnet_count = count;
        self
    }

    pub fn with_private_subnets(mut self, count: usize) -> Self {
        self.private_subnet_count = count;
        self
    }

    pub fn with_nat_per_private_subnet(mut self, enabled: bool) -> Self {
        self.nat_per_private_subnet = enabled;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_layout(mut self, layout: CidrLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Subnet counts after clamping to the zones actually usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCounts {
    pub usable_azs: usize,
    pub public_count: usize,
    pub private_count: usize,
}

impl ResolvedCounts {
    pub fn resolve(request: &TopologyRequest, zone_count: usize) -> Self {
        let usable_azs = zone_count.min(request.az_count);
        Self {
            usable_azs,
            public_count: request.public_subnet_count.min(usable_azs),
            private_count: request.private_subnet_count.min(usable_azs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetKind {
    Public,
    Private,
}

impl fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetKind::Public => write!(f, "public"),
            SubnetKind::Private => write!(f, "private"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetPlan {
    /// 0-based position within its kind
    pub index: usize,
    pub kind: SubnetKind,
    pub zone: String,
    pub cidr: Ipv4Cidr,
    pub has_public_ip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatGatewayPlan {
    pub index: usize,
    pub attached_public_subnet_index: usize,
}

/// Target of a subnet's default route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteTarget {
    InternetGateway,
    NatGateway { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAssignment {
    pub subnet_kind: SubnetKind,
    pub subnet_index: usize,
    /// None leaves the subnet without egress
    pub default_route: Option<RouteTarget>,
}

impl RouteAssignment {
    pub fn is_isolated(&self) -> bool {
        self.default_route.is_none()
    }
}

/// Fully resolved layout for one request and zone list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPlan {
    /// Public subnets first, then private, each in index order
    pub subnets: Vec<SubnetPlan>,
    pub nat_gateways: Vec<NatGatewayPlan>,
    /// One per subnet, in the same order as `subnets`
    pub routes: Vec<RouteAssignment>,
}

impl NetworkPlan {
    pub fn public_subnets(&self) -> impl Iterator<Item = &SubnetPlan> {
        self.subnets_of(SubnetKind::Public)
    }

    pub fn private_subnets(&self) -> impl Iterator<Item = &SubnetPlan> {
        self.subnets_of(SubnetKind::Private)
    }

    fn subnets_of(&self, kind: SubnetKind) -> impl Iterator<Item = &SubnetPlan> {
        self.subnets.iter().filter(move |s| s.kind == kind)
    }

    pub fn route_for(&self, kind: SubnetKind, index: usize) -> Option<&RouteAssignment> {
        self.routes
            .iter()
            .find(|r| r.subnet_kind == kind && r.subnet_index == index)
    }

    /// NAT gateway placed in the given public subnet, if any
    pub fn nat_in_public_subnet(&self, public_index: usize) -> Option<&NatGatewayPlan> {
        self.nat_gateways
            .iter()
            .find(|n| n.attached_public_subnet_index == public_index)
    }

    /// Private subnets that received no default route
    pub fn isolated_subnets(&self) -> Vec<&SubnetPlan> {
        self.routes
            .iter()
            .filter(|r| r.is_isolated())
            .filter_map(|r| {
                self.subnets
                    .iter()
                    .find(|s| s.kind == r.subnet_kind && s.index == r.subnet_index)
            })
            .collect()
    }

    /// Returns true if no two subnet CIDRs share an address
    pub fn subnets_disjoint(&self) -> bool {
        self.subnets.iter().enumerate().all(|(i, a)| {
            self.subnets[i + 1..]
                .iter()
                .all(|b| !a.cidr.overlaps(&b.cidr))
        })
    }
}

/// Plan the network for `request` over the ordered `zones`
pub fn plan<S: AsRef<str>>(
    request: &TopologyRequest,
    zones: &[S],
) -> Result<NetworkPlan, PlanError> {
    let parent = Ipv4Cidr::parse(&request.cidr_block)?;
    if !parent.has_room_for_subnets() {
        log::warn!(
            "CIDR block {} is narrower than /{}; derived /24 subnets fall outside it",
            parent,
            Ipv4Cidr::MAX_PARENT_PREFIX
        );
    }

    if zones.is_empty() {
        return Err(PlanError::InsufficientZones);
    }

    let counts = ResolvedCounts::resolve(request, zones.len());
    log_clamping(request, zones.len(), &counts);

    request
        .layout
        .check(counts.public_count, counts.private_count)?;

    let mut subnets = build_subnets(
        SubnetKind::Public,
        counts.public_count,
        &parent,
        &request.layout,
        zones,
        counts.usable_azs,
    );
    subnets.extend(build_subnets(
        SubnetKind::Private,
        counts.private_count,
        &parent,
        &request.layout,
        zones,
        counts.usable_azs,
    ));

    let nat_gateways = place_nat_gateways(&counts, request.nat_per_private_subnet);
    let routes = assign_routes(&subnets, &nat_gateways, request.nat_per_private_subnet);

    let plan = NetworkPlan {
        subnets,
        nat_gateways,
        routes,
    };
    debug_assert!(plan.subnets_disjoint());

    log::debug!(
        "Planned {} subnets, {} NAT gateways across {} zones",
        plan.subnets.len(),
        plan.nat_gateways.len(),
        counts.usable_azs
    );

    Ok(plan)
}

fn log_clamping(request: &TopologyRequest, zone_count: usize, counts: &ResolvedCounts) {
    if counts.usable_azs < request.az_count {
        log::debug!(
            "Requested {} zones but only {} are available",
            request.az_count,
            zone_count
        );
    }
    if counts.public_count < request.public_subnet_count {
        log::debug!(
            "Clamped public subnets from {} to {}",
            request.public_subnet_count,
            counts.public_count
        );
    }
    if counts.private_count < request.private_subnet_count {
        log::debug!(
            "Clamped private subnets from {} to {}",
            request.private_subnet_count,
            counts.private_count
        );
    }
}

fn build_subnets<S: AsRef<str>>(
    kind: SubnetKind,
    count: usize,
    parent: &Ipv4Cidr,
    layout: &CidrLayout,
    zones: &[S],
    usable_azs: usize,
) -> Vec<SubnetPlan> {
    (0..count)
        .filter_map(|index| {
            // Octets were bounds-checked by CidrLayout::check
            let octet = layout.third_octet(kind, index)?;
            Some(SubnetPlan {
                index,
                kind,
                zone: zones[index % usable_azs].as_ref().to_string(),
                cidr: parent.subnet_24(octet),
                has_public_ip: kind == SubnetKind::Public,
            })
        })
        .collect()
}

fn place_nat_gateways(counts: &ResolvedCounts, nat_per_private_subnet: bool) -> Vec<NatGatewayPlan> {
    (0..counts.public_count)
        .filter(|&i| i < counts.private_count && (nat_per_private_subnet || i == 0))
        .enumerate()
        .map(|(index, public_index)| NatGatewayPlan {
            index,
            attached_public_subnet_index: public_index,
        })
        .collect()
}

fn assign_routes(
    subnets: &[SubnetPlan],
    nat_gateways: &[NatGatewayPlan],
    nat_per_private_subnet: bool,
) -> Vec<RouteAssignment> {
    subnets
        .iter()
        .map(|subnet| {
            let default_route = match subnet.kind {
                SubnetKind::Public => Some(RouteTarget::InternetGateway),
                SubnetKind::Private => {
                    let nat_index = if nat_per_private_subnet {
                        subnet.index
                    } else {
                        0
                    };
                    if nat_index < nat_gateways.len() {
                        Some(RouteTarget::NatGateway { index: nat_index })
                    } else {
                        log::warn!(
                            "Private subnet {} ({}) has no NAT gateway and will have no egress",
                            subnet.index,
                            subnet.cidr
                        );
                        None
                    }
                }
            };
            RouteAssignment {
                subnet_kind: subnet.kind,
                subnet_index: subnet.index,
                default_route,
            }
        })
        .collect()
}
