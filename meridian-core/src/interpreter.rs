//! Interpreter - Create the resources of a Plan using a Provider
//!
//! Resources are created one at a time, in Plan order. Before each create the
//! interpreter replaces every [`Value::ResourceRef`] with the matching attribute
//! of a resource created earlier in the same run. This is where side effects
//! actually occur.

use std::collections::{BTreeMap, HashMap};

use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceId, State, Value};

/// Result of creating each resource
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Create succeeded
    Created { state: State },
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<(ResourceId, Result<ApplyOutcome, ProviderError>)>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    /// Cloud identifiers of created resources, in creation order
    pub fn identifiers(&self) -> Vec<(&ResourceId, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| match outcome {
                Ok(ApplyOutcome::Created { state }) => {
                    state.identifier.as_deref().map(|identifier| (id, identifier))
                }
                _ => None,
            })
            .collect()
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that creates resources using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute a Plan, creating every resource in order
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;
        let mut created: HashMap<String, State> = HashMap::new();

        for resource in plan.resources() {
            let result = self.create(resource, &created).await;

            match &result {
                Ok(outcome) => {
                    success_count += 1;
                    if let ApplyOutcome::Created { state } = outcome {
                        log::info!("Created {} ({:?})", resource.id, state.identifier);
                        created.insert(resource.id.name.clone(), state.clone());
                    }
                }
                Err(e) => {
                    log::error!("Failed to create {}: {}", resource.id, e);
                    failure_count += 1;
                    if !self.config.continue_on_error {
                        outcomes.push((resource.id.clone(), result));
                        break;
                    }
                }
            }

            outcomes.push((resource.id.clone(), result));
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Create a single resource
    async fn create(
        &self,
        resource: &Resource,
        created: &HashMap<String, State>,
    ) -> ProviderResult<ApplyOutcome> {
        if self.config.dry_run {
            return Ok(ApplyOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        let resolved = resolve_resource(resource, created)?;
        let state = self.provider.create(&resolved).await?;
        Ok(ApplyOutcome::Created { state })
    }
}

/// Replace references in `resource` with values from already created resources
pub fn resolve_resource(
    resource: &Resource,
    created: &HashMap<String, State>,
) -> ProviderResult<Resource> {
    let attributes = resource
        .attributes
        .iter()
        .map(|(key, value)| {
            resolve_value(value, created)
                .map(|v| (key.clone(), v))
                .map_err(|e| e.for_resource(resource.id.clone()))
        })
        .collect::<ProviderResult<BTreeMap<_, _>>>()?;

    Ok(Resource {
        id: resource.id.clone(),
        attributes,
    })
}

fn resolve_value(value: &Value, created: &HashMap<String, State>) -> ProviderResult<Value> {
    match value {
        Value::ResourceRef(binding, attribute) => created
            .get(binding)
            .and_then(|state| state.attribute(attribute))
            .ok_or_else(|| {
                ProviderError::new(format!("Unresolved reference {}.{}", binding, attribute))
            }),
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| resolve_value(v, created).map(|v| (k.clone(), v)))
            .collect::<ProviderResult<BTreeMap<_, _>>>()
            .map(Value::Map),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::BoxFuture;
    use std::sync::Mutex;
    use crate::topology::{self, TopologyRequest};

    /// Records every resource it is asked to create
    #[derive(Default)]
    struct TestProvider {
        created: Mutex<Vec<Resource>>,
        fail_on: Option<&'static str>,
    }

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let resource = resource.clone();
            Box::pin(async move {
                if self.fail_on == Some(resource.id.name.as_str()) {
                    return Err(ProviderError::new("injected failure").for_resource(resource.id));
                }
                let state = State::new(resource.id.clone(), resource.attributes.clone())
                    .with_identifier(format!("{}-id", resource.id.name));
                self.created.lock().unwrap().push(resource);
                Ok(state)
            })
        }
    }

    /// VPC, gateway, public route table and route, one public subnet and its association
    fn public_only_plan() -> Plan {
        let request = TopologyRequest::new("10.0.0.0/16")
            .with_az_count(1)
            .with_public_subnets(1)
            .with_private_subnets(0);
        let network = topology::plan(&request, &["z1"]).unwrap();
        Plan::for_network("main", &request, &network)
    }

    #[tokio::test]
    async fn apply_empty_plan() {
        let interpreter = Interpreter::new(TestProvider::default());
        let result = interpreter.apply(&Plan::default()).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn references_resolve_to_created_identifiers() {
        let interpreter = Interpreter::new(TestProvider::default());
        let result = interpreter.apply(&public_only_plan()).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 6);

        let created = interpreter.provider.created.lock().unwrap();
        assert_eq!(
            created[1].attributes.get("vpc_id"),
            Some(&Value::from("main-id"))
        );
        let route = &created[3];
        assert_eq!(route.get_str("route_table_id"), Some("main-public-rt-id"));
        assert_eq!(route.get_str("gateway_id"), Some("main-igw-id"));
        assert!(created.iter().all(|r| r.references().is_empty()));

        let identifiers: Vec<&str> = result.identifiers().iter().map(|(_, i)| *i).collect();
        assert_eq!(identifiers[..2], ["main-id", "main-igw-id"]);
    }

    #[tokio::test]
    async fn dry_run_skips_creates() {
        let config = InterpreterConfig {
            dry_run: true,
            ..Default::default()
        };
        let interpreter = Interpreter::new(TestProvider::default()).with_config(config);
        let result = interpreter.apply(&public_only_plan()).await;

        assert!(result.is_success());
        assert!(matches!(
            result.outcomes[0].1,
            Ok(ApplyOutcome::Skipped { .. })
        ));
        assert!(interpreter.provider.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stops_on_first_error() {
        let provider = TestProvider {
            fail_on: Some("main"),
            ..Default::default()
        };
        let result = Interpreter::new(provider).apply(&public_only_plan()).await;

        assert!(!result.is_success());
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.failure_count, 1);
    }

    #[tokio::test]
    async fn continue_on_error_reports_unresolved_dependents() {
        let provider = TestProvider {
            fail_on: Some("main"),
            ..Default::default()
        };
        let config = InterpreterConfig {
            continue_on_error: true,
            ..Default::default()
        };
        let result = Interpreter::new(provider)
            .with_config(config)
            .apply(&public_only_plan())
            .await;

        // Everything depends on the VPC, directly or through another resource
        assert_eq!(result.outcomes.len(), 6);
        assert_eq!(result.failure_count, 6);
        let err = result.outcomes[1].1.as_ref().unwrap_err();
        assert!(err.message.contains("Unresolved reference main.id"));
        assert_eq!(
            err.resource_id,
            Some(ResourceId::new("internet_gateway", "main-igw"))
        );
    }

    #[test]
    fn resolve_nested_references() {
        let mut created = HashMap::new();
        created.insert(
            "igw".to_string(),
            State::new(ResourceId::new("internet_gateway", "igw"), BTreeMap::new())
                .with_identifier("igw-1"),
        );
        let mut route = BTreeMap::new();
        route.insert("gateway_id".to_string(), Value::id_of("igw"));
        route.insert("destination".to_string(), Value::from("0.0.0.0/0"));

        let mut expected = BTreeMap::new();
        expected.insert("gateway_id".to_string(), Value::from("igw-1"));
        expected.insert("destination".to_string(), Value::from("0.0.0.0/0"));

        assert_eq!(
            resolve_value(&Value::Map(route), &created).unwrap(),
            Value::Map(expected)
        );
    }
}
