//! Meridian AWS Provider
//!
//! Creates the EC2 networking resources declared by `meridian-core` and
//! discovers the availability zones of a region.

use std::collections::BTreeMap;
use std::time::Duration;

use aws_config::Region;
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::types::{AttributeBooleanValue, DomainType, Filter, NatGatewayState, Tag};
use meridian_core::declare;
use meridian_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ZoneSource};
use meridian_core::resource::{Resource, State, Value};

/// Polling limits while a NAT gateway becomes available
const NAT_WAIT_ATTEMPTS: usize = 60;
const NAT_WAIT_DELAY: Duration = Duration::from_secs(10);

/// AWS Provider
pub struct AwsProvider {
    ec2_client: Ec2Client,
    region: String,
}

impl AwsProvider {
    /// Create a new AWS Provider
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            ec2_client: Ec2Client::new(&config),
            region: region.to_string(),
        }
    }

    /// Apply the resource's `tags` map to a created EC2 resource
    async fn tag(&self, ec2_id: &str, resource: &Resource) -> ProviderResult<()> {
        let tags = tags_of(resource);
        if tags.is_empty() {
            return Ok(());
        }

        self.ec2_client
            .create_tags()
            .resources(ec2_id)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| api_error(resource, "tag", e))?;

        Ok(())
    }

    // ========== EC2 VPC Operations ==========

    async fn create_ec2_vpc(&self, resource: Resource) -> ProviderResult<State> {
        let cidr_block = required_str(&resource, "cidr_block")?;

        let result = self
            .ec2_client
            .create_vpc()
            .cidr_block(cidr_block)
            .send()
            .await
            .map_err(|e| api_error(&resource, "create VPC", e))?;

        let vpc_id = result
            .vpc()
            .and_then(|v| v.vpc_id())
            .ok_or_else(|| missing_id(&resource, "VPC"))?
            .to_string();

        self.tag(&vpc_id, &resource).await?;

        // ModifyVpcAttribute accepts only one attribute per call
        if let Some(Value::Bool(enabled)) = resource.attributes.get("enable_dns_support") {
            self.ec2_client
                .modify_vpc_attribute()
                .vpc_id(&vpc_id)
                .enable_dns_support(AttributeBooleanValue::builder().value(*enabled).build())
                .send()
                .await
                .map_err(|e| api_error(&resource, "set DNS support", e))?;
        }

        if let Some(Value::Bool(enabled)) = resource.attributes.get("enable_dns_hostnames") {
            self.ec2_client
                .modify_vpc_attribute()
                .vpc_id(&vpc_id)
                .enable_dns_hostnames(AttributeBooleanValue::builder().value(*enabled).build())
                .send()
                .await
                .map_err(|e| api_error(&resource, "set DNS hostnames", e))?;
        }

        Ok(created(resource, vpc_id))
    }

    // ========== EC2 Internet Gateway Operations ==========

    async fn create_ec2_internet_gateway(&self, resource: Resource) -> ProviderResult<State> {
        let vpc_id = required_str(&resource, "vpc_id")?;

        let result = self
            .ec2_client
            .create_internet_gateway()
            .send()
            .await
            .map_err(|e| api_error(&resource, "create internet gateway", e))?;

        let igw_id = result
            .internet_gateway()
            .and_then(|igw| igw.internet_gateway_id())
            .ok_or_else(|| missing_id(&resource, "Internet Gateway"))?
            .to_string();

        self.tag(&igw_id, &resource).await?;

        self.ec2_client
            .attach_internet_gateway()
            .internet_gateway_id(&igw_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| api_error(&resource, "attach internet gateway", e))?;

        Ok(created(resource, igw_id))
    }

    // ========== EC2 Route Table Operations ==========

    async fn create_ec2_route_table(&self, resource: Resource) -> ProviderResult<State> {
        let vpc_id = required_str(&resource, "vpc_id")?;

        let result = self
            .ec2_client
            .create_route_table()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| api_error(&resource, "create route table", e))?;

        let rt_id = result
            .route_table()
            .and_then(|rt| rt.route_table_id())
            .ok_or_else(|| missing_id(&resource, "Route Table"))?
            .to_string();

        self.tag(&rt_id, &resource).await?;

        Ok(created(resource, rt_id))
    }

    async fn create_ec2_route(&self, resource: Resource) -> ProviderResult<State> {
        let route_table_id = required_str(&resource, "route_table_id")?;
        let destination_cidr = required_str(&resource, "destination_cidr_block")?;

        let mut req = self
            .ec2_client
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr);

        if let Some(gw_id) = resource.get_str("gateway_id") {
            req = req.gateway_id(gw_id);
        }

        if let Some(nat_gw_id) = resource.get_str("nat_gateway_id") {
            req = req.nat_gateway_id(nat_gw_id);
        }

        req.send()
            .await
            .map_err(|e| api_error(&resource, "create route", e))?;

        // Routes have no ID of their own
        Ok(State::new(resource.id, resource.attributes))
    }

    async fn create_ec2_route_table_association(
        &self,
        resource: Resource,
    ) -> ProviderResult<State> {
        let route_table_id = required_str(&resource, "route_table_id")?;
        let subnet_id = required_str(&resource, "subnet_id")?;

        let result = self
            .ec2_client
            .associate_route_table()
            .route_table_id(route_table_id)
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| api_error(&resource, "associate route table", e))?;

        let association_id = result
            .association_id()
            .ok_or_else(|| missing_id(&resource, "Route Table Association"))?
            .to_string();

        Ok(created(resource, association_id))
    }

    // ========== EC2 Subnet Operations ==========

    async fn create_ec2_subnet(&self, resource: Resource) -> ProviderResult<State> {
        let vpc_id = required_str(&resource, "vpc_id")?;
        let cidr_block = required_str(&resource, "cidr_block")?;

        let mut req = self
            .ec2_client
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr_block);

        if let Some(az) = resource.get_str("availability_zone") {
            req = req.availability_zone(az);
        }

        let result = req
            .send()
            .await
            .map_err(|e| api_error(&resource, "create subnet", e))?;

        let subnet_id = result
            .subnet()
            .and_then(|s| s.subnet_id())
            .ok_or_else(|| missing_id(&resource, "Subnet"))?
            .to_string();

        self.tag(&subnet_id, &resource).await?;

        if let Some(Value::Bool(true)) = resource.attributes.get("map_public_ip_on_launch") {
            self.ec2_client
                .modify_subnet_attribute()
                .subnet_id(&subnet_id)
                .map_public_ip_on_launch(AttributeBooleanValue::builder().value(true).build())
                .send()
                .await
                .map_err(|e| api_error(&resource, "enable public IP mapping", e))?;
        }

        Ok(created(resource, subnet_id))
    }

    // ========== EC2 NAT Operations ==========

    async fn create_ec2_eip(&self, resource: Resource) -> ProviderResult<State> {
        let result = self
            .ec2_client
            .allocate_address()
            .domain(DomainType::Vpc)
            .send()
            .await
            .map_err(|e| api_error(&resource, "allocate elastic IP", e))?;

        let allocation_id = result
            .allocation_id()
            .ok_or_else(|| missing_id(&resource, "Elastic IP"))?
            .to_string();

        self.tag(&allocation_id, &resource).await?;

        let mut state = created(resource, allocation_id);
        if let Some(public_ip) = result.public_ip() {
            state
                .attributes
                .insert("public_ip".to_string(), Value::from(public_ip));
        }
        Ok(state)
    }

    async fn create_ec2_nat_gateway(&self, resource: Resource) -> ProviderResult<State> {
        let allocation_id = required_str(&resource, "allocation_id")?;
        let subnet_id = required_str(&resource, "subnet_id")?;

        let result = self
            .ec2_client
            .create_nat_gateway()
            .allocation_id(allocation_id)
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| api_error(&resource, "create NAT gateway", e))?;

        let nat_id = result
            .nat_gateway()
            .and_then(|nat| nat.nat_gateway_id())
            .ok_or_else(|| missing_id(&resource, "NAT Gateway"))?
            .to_string();

        self.tag(&nat_id, &resource).await?;
        self.wait_for_nat_gateway(&resource, &nat_id).await?;

        Ok(created(resource, nat_id))
    }

    /// Wait until a NAT gateway can be used as a route target
    async fn wait_for_nat_gateway(&self, resource: &Resource, nat_id: &str) -> ProviderResult<()> {
        for _ in 0..NAT_WAIT_ATTEMPTS {
            let result = self
                .ec2_client
                .describe_nat_gateways()
                .nat_gateway_ids(nat_id)
                .send()
                .await
                .map_err(|e| api_error(resource, "describe NAT gateway", e))?;

            let state = result.nat_gateways().first().and_then(|nat| nat.state());
            match state {
                Some(NatGatewayState::Available) => return Ok(()),
                Some(NatGatewayState::Failed) | Some(NatGatewayState::Deleted) => {
                    let reason = result
                        .nat_gateways()
                        .first()
                        .and_then(|nat| nat.failure_message())
                        .unwrap_or("unknown reason");
                    return Err(ProviderError::new(format!(
                        "NAT gateway {} failed: {}",
                        nat_id, reason
                    ))
                    .for_resource(resource.id.clone()));
                }
                _ => {
                    log::debug!("Waiting for NAT gateway {} ({:?})", nat_id, state);
                    tokio::time::sleep(NAT_WAIT_DELAY).await;
                }
            }
        }

        Err(
            ProviderError::new(format!("Timed out waiting for NAT gateway {}", nat_id))
                .for_resource(resource.id.clone()),
        )
    }
}

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                declare::VPC => self.create_ec2_vpc(resource).await,
                declare::INTERNET_GATEWAY => self.create_ec2_internet_gateway(resource).await,
                declare::ROUTE_TABLE => self.create_ec2_route_table(resource).await,
                declare::ROUTE => self.create_ec2_route(resource).await,
                declare::SUBNET => self.create_ec2_subnet(resource).await,
                declare::ROUTE_TABLE_ASSOCIATION => {
                    self.create_ec2_route_table_association(resource).await
                }
                declare::EIP => self.create_ec2_eip(resource).await,
                declare::NAT_GATEWAY => self.create_ec2_nat_gateway(resource).await,
                _ => Err(ProviderError::new(format!(
                    "Unknown resource type: {}",
                    resource.id.resource_type
                ))
                .for_resource(resource.id.clone())),
            }
        })
    }
}

impl ZoneSource for AwsProvider {
    fn available_zones(&self) -> BoxFuture<'_, ProviderResult<Vec<String>>> {
        Box::pin(async move {
            let filter = Filter::builder().name("state").values("available").build();

            let result = self
                .ec2_client
                .describe_availability_zones()
                .filters(filter)
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!(
                        "Failed to describe availability zones in {}: {:?}",
                        self.region, e
                    ))
                })?;

            let zones: Vec<String> = result
                .availability_zones()
                .iter()
                .filter_map(|zone| zone.zone_name().map(String::from))
                .collect();
            log::debug!("Available zones in {}: {:?}", self.region, zones);
            Ok(zones)
        })
    }
}

fn created(resource: Resource, identifier: String) -> State {
    State::new(resource.id, resource.attributes).with_identifier(identifier)
}

fn required_str(resource: &Resource, key: &str) -> ProviderResult<String> {
    resource.get_str(key).map(String::from).ok_or_else(|| {
        ProviderError::new(format!("{} is required", key)).for_resource(resource.id.clone())
    })
}

fn api_error(resource: &Resource, action: &str, e: impl std::fmt::Debug) -> ProviderError {
    ProviderError::new(format!("Failed to {}: {:?}", action, e)).for_resource(resource.id.clone())
}

fn missing_id(resource: &Resource, kind: &str) -> ProviderError {
    ProviderError::new(format!("{} created but no ID returned", kind))
        .for_resource(resource.id.clone())
}

/// Convert the `tags` attribute into EC2 tags
fn tags_of(resource: &Resource) -> Vec<Tag> {
    let Some(Value::Map(tags)) = resource.attributes.get("tags") else {
        return Vec::new();
    };
    string_pairs(tags)
        .into_iter()
        .map(|(key, value)| Tag::builder().key(key).value(value).build())
        .collect()
}

fn string_pairs(map: &BTreeMap<String, Value>) -> Vec<(&str, &str)> {
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged_subnet() -> Resource {
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), Value::from("main-public-1"));
        tags.insert("env".to_string(), Value::from("dev"));
        tags.insert("ignored".to_string(), Value::Bool(true));
        Resource::new("subnet", "main-public-1")
            .with_attribute("cidr_block", "10.0.0.0/24")
            .with_attribute("tags", Value::Map(tags))
    }

    #[test]
    fn tags_convert_string_values() {
        let tags = tags_of(&tagged_subnet());
        let pairs: Vec<(Option<&str>, Option<&str>)> =
            tags.iter().map(|t| (t.key(), t.value())).collect();
        assert_eq!(
            pairs,
            vec![
                (Some("Name"), Some("main-public-1")),
                (Some("env"), Some("dev")),
            ]
        );
    }

    #[test]
    fn untagged_resource_has_no_tags() {
        assert!(tags_of(&Resource::new("route", "r")).is_empty());
    }

    #[test]
    fn required_attribute_missing() {
        let resource = tagged_subnet();
        assert_eq!(required_str(&resource, "cidr_block").unwrap(), "10.0.0.0/24");

        let err = required_str(&resource, "vpc_id").unwrap_err();
        assert_eq!(err.to_string(), "[subnet.main-public-1] vpc_id is required");
    }

    #[test]
    fn created_state_carries_identifier() {
        let state = created(tagged_subnet(), "subnet-123".to_string());
        assert_eq!(state.identifier.as_deref(), Some("subnet-123"));
        assert_eq!(state.attribute("cidr_block"), Some(Value::from("10.0.0.0/24")));
    }
}
