use meridian_core::interpreter::Interpreter;
use meridian_core::plan::Plan;
use meridian_core::provider::{BoxFuture, Provider, ProviderResult, StaticZones, ZoneSource};
use meridian_core::resource::{Resource, State, Value};
use meridian_core::topology::{
    self, NetworkPlan, PlanError, ResolvedCounts, RouteTarget, SubnetKind, TopologyRequest,
};

fn zones(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("us-east-1{}", (b'a' + i as u8) as char)).collect()
}

fn scenario(
    az_count: usize,
    public: usize,
    private: usize,
    nat_per_private: bool,
) -> TopologyRequest {
    TopologyRequest::new("10.0.0.0/16")
        .with_az_count(az_count)
        .with_public_subnets(public)
        .with_private_subnets(private)
        .with_nat_per_private_subnet(nat_per_private)
}

fn private_target(plan: &NetworkPlan, index: usize) -> Option<RouteTarget> {
    plan.route_for(SubnetKind::Private, index)
        .and_then(|r| r.default_route)
}

#[test]
fn scenario_a_shared_nat() {
    let plan = topology::plan(&scenario(2, 2, 2, false), &["z1", "z2"]).unwrap();

    let public: Vec<String> = plan.public_subnets().map(|s| s.cidr.to_string()).collect();
    let private: Vec<String> = plan.private_subnets().map(|s| s.cidr.to_string()).collect();
    assert_eq!(public, vec!["10.0.0.0/24", "10.0.1.0/24"]);
    assert_eq!(private, vec!["10.0.100.0/24", "10.0.101.0/24"]);

    assert_eq!(plan.nat_gateways.len(), 1);
    assert_eq!(plan.nat_gateways[0].attached_public_subnet_index, 0);
    assert_eq!(
        private_target(&plan, 0),
        Some(RouteTarget::NatGateway { index: 0 })
    );
    assert_eq!(
        private_target(&plan, 1),
        Some(RouteTarget::NatGateway { index: 0 })
    );
}

#[test]
fn scenario_b_nat_per_private_subnet() {
    let plan = topology::plan(&scenario(2, 2, 2, true), &["z1", "z2"]).unwrap();

    assert_eq!(plan.nat_gateways.len(), 2);
    assert_eq!(plan.nat_gateways[0].attached_public_subnet_index, 0);
    assert_eq!(plan.nat_gateways[1].attached_public_subnet_index, 1);
    assert_eq!(
        private_target(&plan, 0),
        Some(RouteTarget::NatGateway { index: 0 })
    );
    assert_eq!(
        private_target(&plan, 1),
        Some(RouteTarget::NatGateway { index: 1 })
    );
}

#[test]
fn scenario_c_no_public_subnets() {
    for nat_per_private in [false, true] {
        let plan = topology::plan(&scenario(2, 0, 2, nat_per_private), &["z1", "z2"]).unwrap();
        assert!(plan.nat_gateways.is_empty());
        assert_eq!(private_target(&plan, 0), None);
        assert_eq!(private_target(&plan, 1), None);
        assert_eq!(plan.routes.len(), 2);
    }
}

#[test]
fn scenario_d_more_private_than_public() {
    let plan = topology::plan(&scenario(3, 1, 3, true), &zones(3)).unwrap();

    assert_eq!(plan.nat_gateways.len(), 1);
    assert_eq!(plan.nat_gateways[0].index, 0);
    assert_eq!(plan.nat_gateways[0].attached_public_subnet_index, 0);
    assert_eq!(
        private_target(&plan, 0),
        Some(RouteTarget::NatGateway { index: 0 })
    );
    assert_eq!(private_target(&plan, 1), None);
    assert_eq!(private_target(&plan, 2), None);
}

#[test]
fn subnets_are_pairwise_disjoint() {
    for az_count in 0..=6 {
        for public in 0..=6 {
            for private in 0..=6 {
                for nat_per_private in [false, true] {
                    let request = scenario(az_count, public, private, nat_per_private);
                    let plan = topology::plan(&request, &zones(4)).unwrap();
                    assert!(plan.subnets_disjoint(), "{:?}", request);
                    assert_eq!(plan.routes.len(), plan.subnets.len());
                }
            }
        }
    }
}

#[test]
fn routes_only_reference_existing_nat_gateways() {
    for public in 0..=3 {
        for private in 0..=3 {
            for nat_per_private in [false, true] {
                let plan =
                    topology::plan(&scenario(3, public, private, nat_per_private), &zones(3))
                        .unwrap();
                for route in &plan.routes {
                    if let Some(RouteTarget::NatGateway { index }) = route.default_route {
                        assert!(index < plan.nat_gateways.len());
                        assert_eq!(route.subnet_kind, SubnetKind::Private);
                    }
                }
            }
        }
    }
}

#[test]
fn clamping_boundaries() {
    let request = scenario(0, 3, 3, false);
    assert_eq!(
        ResolvedCounts::resolve(&request, 3),
        ResolvedCounts {
            usable_azs: 0,
            public_count: 0,
            private_count: 0
        }
    );

    let request = scenario(10, 3, 1, false);
    let counts = ResolvedCounts::resolve(&request, 2);
    assert_eq!(counts.usable_azs, 2);
    assert_eq!(counts.public_count, 2);
    assert_eq!(counts.private_count, 1);

    let request = scenario(3, 0, 0, true);
    let plan = topology::plan(&request, &zones(3)).unwrap();
    assert!(plan.subnets.is_empty());
}

#[test]
fn degraded_requests_do_not_error() {
    // More subnets than zones, more private than public, no public at all
    for request in [
        scenario(9, 9, 9, true),
        scenario(3, 1, 3, true),
        scenario(3, 0, 3, false),
    ] {
        assert!(topology::plan(&request, &zones(2)).is_ok());
    }
}

#[test]
fn zone_assignment_never_wraps() {
    let plan = topology::plan(&scenario(3, 5, 5, false), &zones(3)).unwrap();
    for subnet in &plan.subnets {
        assert_eq!(subnet.zone, zones(3)[subnet.index]);
    }
}

#[test]
fn planning_is_deterministic() {
    let request = scenario(3, 2, 3, true).with_tag("env", "prod");
    let first = serde_json::to_string(&topology::plan(&request, &zones(3)).unwrap()).unwrap();
    let second = serde_json::to_string(&topology::plan(&request, &zones(3)).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn fatal_errors() {
    let no_zones: Vec<String> = Vec::new();
    assert_eq!(
        topology::plan(&scenario(2, 2, 2, false), &no_zones),
        Err(PlanError::InsufficientZones)
    );

    for cidr in ["", "10.0", "10.0.0.0", "a.b.c.d/16", "10.0.0.0/40"] {
        let request = TopologyRequest::new(cidr).with_az_count(1);
        assert!(
            matches!(
                topology::plan(&request, &zones(1)),
                Err(PlanError::InvalidCidr { .. })
            ),
            "{}",
            cidr
        );
    }
}

#[test]
fn only_leading_octets_of_parent_matter() {
    // Narrower than /16, wider than /16, and host bits set
    for cidr in ["10.0.0.0/20", "10.0.0.0/8", "10.0.5.7/16"] {
        let request = TopologyRequest::new(cidr)
            .with_az_count(2)
            .with_public_subnets(2)
            .with_private_subnets(2);
        let plan = topology::plan(&request, &zones(2))
            .unwrap_or_else(|e| panic!("{}: {}", cidr, e));

        let subnets: Vec<String> = plan.subnets.iter().map(|s| s.cidr.to_string()).collect();
        assert_eq!(
            subnets,
            vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.100.0/24", "10.0.101.0/24"],
            "{}",
            cidr
        );
    }
}

#[test]
fn plan_serializes_with_camel_case_keys() {
    let plan = topology::plan(&scenario(1, 1, 1, false), &["z1"]).unwrap();
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["natGateways"][0]["attachedPublicSubnetIndex"], 0);
    assert_eq!(json["subnets"][1]["cidr"], "10.0.100.0/24");
    assert_eq!(json["subnets"][0]["hasPublicIp"], true);
    assert_eq!(json["routes"][1]["defaultRoute"]["type"], "nat_gateway");
}

struct CountingProvider;

impl Provider for CountingProvider {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            // Every reference must already be resolved by the time we get here
            assert!(resource.references().is_empty(), "{}", resource.id);
            Ok(State::new(resource.id.clone(), resource.attributes.clone())
                .with_identifier(format!("{}-{}", resource.id.resource_type, resource.id.name)))
        })
    }
}

#[tokio::test]
async fn zones_then_plan_then_apply() {
    let source = StaticZones(zones(2));
    let zone_list = source.available_zones().await.unwrap();

    let request = scenario(2, 2, 2, true).with_tag("env", "test");
    let network = topology::plan(&request, &zone_list).unwrap();
    let plan = Plan::for_network("edge", &request, &network);

    let result = Interpreter::new(CountingProvider).apply(&plan).await;
    assert!(result.is_success());
    assert_eq!(result.success_count, plan.len());

    let nat_ids: Vec<&str> = result
        .identifiers()
        .into_iter()
        .filter(|(id, _)| id.resource_type == "nat_gateway")
        .map(|(_, identifier)| identifier)
        .collect();
    assert_eq!(
        nat_ids,
        vec!["nat_gateway-edge-nat-1", "nat_gateway-edge-nat-2"]
    );

    let vpc = &plan.resources()[0];
    assert_eq!(vpc.attributes.get("cidr_block"), Some(&Value::from("10.0.0.0/16")));
}
