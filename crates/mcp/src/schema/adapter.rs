//! SchemaAdapter: turns a step target and candidate input into a validated call.

use std::sync::Arc;
use std::time::Duration;

use relay_types::{OperationSchema, ProviderDescriptor, StepTarget};
use relay_util::parse_embedded_json;
use serde_json::{Map, Value, json};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::ProviderHandle;
use crate::generation::TextGenerator;
use crate::registry::ProviderRegistry;

use super::SchemaError;
use super::catalog::SchemaCatalog;
use super::resolve::{find_exact, find_substring, rank_by_keywords};
use super::validate::{into_arguments, validate_arguments};

const DEFAULT_GENERATOR_TIMEOUT: Duration = Duration::from_secs(20);

/// How an operation was picked for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The step named the operation.
    Exact,
    /// The text generator chose it from the discovered list.
    Generator,
    /// Closest substring match of the generator's choice or the goal.
    Substring,
    /// Local keyword scoring after the generator was unavailable.
    Keywords,
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Selection::Exact => "exact",
            Selection::Generator => "generator",
            Selection::Substring => "substring",
            Selection::Keywords => "keywords",
        };
        f.write_str(label)
    }
}

/// An operation ready to call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOperation {
    pub schema: OperationSchema,
    pub arguments: Map<String, Value>,
    pub selected_by: Selection,
}

/// Resolves step targets against discovered operations and validates their input.
pub struct SchemaAdapter {
    catalog: Arc<SchemaCatalog>,
    registry: Arc<ProviderRegistry>,
    generator: Arc<dyn TextGenerator>,
    generator_timeout: Duration,
}

impl SchemaAdapter {
    pub fn new(registry: Arc<ProviderRegistry>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            catalog: Arc::new(SchemaCatalog::new()),
            registry,
            generator,
            generator_timeout: DEFAULT_GENERATOR_TIMEOUT,
        }
    }

    /// Share an existing catalog, e.g. between several adapters in one process.
    pub fn with_catalog(mut self, catalog: Arc<SchemaCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_generator_timeout(mut self, generator_timeout: Duration) -> Self {
        self.generator_timeout = generator_timeout;
        self
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    /// Operations exposed by the provider behind `handle`, cached per connection generation.
    pub async fn discover(&self, descriptor: &ProviderDescriptor, handle: &ProviderHandle) -> Result<Arc<Vec<OperationSchema>>, SchemaError> {
        self.catalog.discover(descriptor, handle).await
    }

    /// Pick the operation for `target` and validate `candidate` against it.
    ///
    /// Goals are handed to the text generator together with the discovered operations. Its
    /// answer may also translate the input; when the answer names no known operation the
    /// closest substring match is used, and when the generator fails entirely local keyword
    /// scoring takes over.
    pub async fn resolve_operation(
        &self,
        descriptor: &ProviderDescriptor,
        handle: &ProviderHandle,
        target: &StepTarget,
        candidate: Value,
    ) -> Result<ResolvedOperation, SchemaError> {
        let operations = self.discover(descriptor, handle).await?;

        let (schema, input, selected_by) = match target {
            StepTarget::Operation(name) => {
                let schema = find_exact(&operations, name).ok_or_else(|| SchemaError::OperationNotFound {
                    provider: descriptor.name.clone(),
                    operation: name.clone(),
                })?;
                (schema, candidate, Selection::Exact)
            }
            StepTarget::Goal(goal) => {
                let (schema, translated, selected_by) = self.select_for_goal(descriptor, &operations, goal, &candidate).await?;
                (schema, translated.unwrap_or(candidate), selected_by)
            }
        };
        debug!(provider = %descriptor.name, operation = %schema.operation_name, selected_by = %selected_by, "resolved operation");

        let mut arguments = into_arguments(schema, input)?;
        self.registry.normalize_parameters(&descriptor.name, schema, &mut arguments);
        let arguments = validate_arguments(schema, arguments)?;

        Ok(ResolvedOperation {
            schema: schema.clone(),
            arguments,
            selected_by,
        })
    }

    async fn select_for_goal<'a>(
        &self,
        descriptor: &ProviderDescriptor,
        operations: &'a [OperationSchema],
        goal: &str,
        candidate: &Value,
    ) -> Result<(&'a OperationSchema, Option<Value>, Selection), SchemaError> {
        let not_found = || SchemaError::OperationNotFound {
            provider: descriptor.name.clone(),
            operation: goal.to_string(),
        };

        let prompt = selection_prompt(goal, candidate, operations);
        let answer = match timeout(self.generator_timeout, self.generator.suggest(&prompt)).await {
            Ok(Ok(answer)) => Some(answer),
            Ok(Err(error)) => {
                warn!(provider = %descriptor.name, error = %error, "operation selection failed, using keyword match");
                None
            }
            Err(_) => {
                warn!(provider = %descriptor.name, timeout = ?self.generator_timeout, "operation selection timed out, using keyword match");
                None
            }
        };

        let Some(answer) = answer else {
            return rank_by_keywords(operations, goal)
                .map(|schema| (schema, None, Selection::Keywords))
                .or_else(|| find_substring(operations, goal).map(|schema| (schema, None, Selection::Substring)))
                .ok_or_else(not_found);
        };

        let (choice, translated) = parse_selection(&answer);
        if let Some(schema) = find_exact(operations, &choice) {
            info!(provider = %descriptor.name, operation = %schema.operation_name, "generator selected operation");
            return Ok((schema, translated, Selection::Generator));
        }
        debug!(provider = %descriptor.name, choice = %choice, "generator choice matched no operation");
        find_substring(operations, &choice)
            .or_else(|| find_substring(operations, goal))
            .map(|schema| (schema, translated, Selection::Substring))
            .ok_or_else(not_found)
    }
}

/// Operation name and optional translated arguments from a generator answer.
fn parse_selection(answer: &str) -> (String, Option<Value>) {
    match parse_embedded_json(answer) {
        Some(Value::Object(mut object)) => {
            let choice = object
                .remove("operation")
                .or_else(|| object.remove("name"))
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default();
            let arguments = object
                .remove("arguments")
                .or_else(|| object.remove("input"))
                .filter(|value| !value.is_null());
            (choice, arguments)
        }
        Some(Value::String(choice)) => (choice, None),
        _ => (answer.trim().trim_matches(['`', '"', '\'']).to_string(), None),
    }
}

fn selection_prompt(goal: &str, candidate: &Value, operations: &[OperationSchema]) -> String {
    let catalogue: Vec<Value> = operations
        .iter()
        .map(|operation| {
            let parameters: Map<String, Value> = operation
                .parameters
                .iter()
                .map(|(name, spec)| {
                    (
                        name.clone(),
                        json!({
                            "type": spec.kind.as_str(),
                            "required": spec.required,
                            "description": spec.description,
                        }),
                    )
                })
                .collect();
            json!({
                "name": operation.operation_name,
                "description": operation.description,
                "parameters": parameters,
            })
        })
        .collect();

    format!(
        "Choose the single operation that best accomplishes the goal and map the input onto its parameters.\n\
         Goal: {goal}\n\
         Input: {candidate}\n\
         Operations: {operations}\n\
         Answer with JSON only: {{\"operation\": \"<name>\", \"arguments\": {{...}}}}",
        operations = Value::Array(catalogue),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ProviderSession, RemoteOperation};
    use crate::types::CallError;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use relay_types::LaunchSpec;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CatalogSession {
        lists: AtomicUsize,
    }

    #[async_trait]
    impl ProviderSession for CatalogSession {
        async fn list_operations(&self) -> Result<Vec<RemoteOperation>, CallError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                RemoteOperation {
                    name: "get-forecast".into(),
                    description: Some("Weather forecast for a city".into()),
                    input_schema: json!({"properties": {"city": {"type": "string"}, "days": {"type": "integer"}}, "required": ["city"]}),
                },
                RemoteOperation {
                    name: "publish_post".into(),
                    description: Some("Publish a message".into()),
                    input_schema: json!({"properties": {"message": {"type": "string"}}, "required": ["message"]}),
                },
            ])
        }

        async fn call(&self, _operation: &str, _arguments: &Map<String, Value>) -> Result<Value, CallError> {
            Ok(Value::Null)
        }

        async fn ping(&self) -> Result<(), CallError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    struct ScriptedGenerator {
        answer: Mutex<Option<anyhow::Result<String>>>,
        prompts: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(answer: anyhow::Result<String>) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(Some(answer)),
                prompts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn suggest(&self, _prompt: &str) -> anyhow::Result<String> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.answer
                .lock()
                .expect("answer lock")
                .take()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more answers")))
        }
    }

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            name: "weather".into(),
            launch: LaunchSpec::Subprocess {
                command: "weather-mcp".into(),
                args: vec![],
                env: IndexMap::new(),
                cwd: None,
            },
            category: None,
            auth_required: false,
            auth_param_names: Default::default(),
            static_operations: vec![],
            parameter_aliases: IndexMap::new(),
        }
    }

    fn handle(session: &Arc<CatalogSession>, generation: u64) -> ProviderHandle {
        ProviderHandle::detached("weather", generation, Arc::clone(session) as Arc<dyn ProviderSession>)
    }

    fn session() -> Arc<CatalogSession> {
        Arc::new(CatalogSession { lists: AtomicUsize::new(0) })
    }

    fn adapter(generator: Arc<dyn TextGenerator>) -> SchemaAdapter {
        let registry = Arc::new(ProviderRegistry::new([descriptor()], IndexMap::new()));
        SchemaAdapter::new(registry, generator)
    }

    #[tokio::test]
    async fn discovery_is_cached_per_generation() {
        let adapter = adapter(Arc::new(crate::generation::DisabledTextGenerator));
        let session = session();

        let first = adapter.discover(&descriptor(), &handle(&session, 1)).await.expect("discover");
        let second = adapter.discover(&descriptor(), &handle(&session, 1)).await.expect("discover again");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.lists.load(Ordering::SeqCst), 1);

        adapter.discover(&descriptor(), &handle(&session, 2)).await.expect("after reconnect");
        assert_eq!(session.lists.load(Ordering::SeqCst), 2);

        adapter.catalog().invalidate("weather").await;
        adapter.discover(&descriptor(), &handle(&session, 2)).await.expect("after invalidate");
        assert_eq!(session.lists.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn static_operations_skip_discovery() {
        let adapter = adapter(Arc::new(crate::generation::DisabledTextGenerator));
        let session = session();
        let mut descriptor = descriptor();
        descriptor.static_operations = vec![OperationSchema::from_input_schema("weather", "get_forecast", None, &json!({}))];

        let operations = adapter.discover(&descriptor, &handle(&session, 1)).await.expect("discover");
        assert_eq!(operations.len(), 1);
        assert_eq!(session.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exact_names_tolerate_separator_variants() {
        let adapter = adapter(Arc::new(crate::generation::DisabledTextGenerator));
        let resolved = adapter
            .resolve_operation(
                &descriptor(),
                &handle(&session(), 1),
                &StepTarget::Operation("get_forecast".into()),
                json!({"city": "Paris", "days": "2"}),
            )
            .await
            .expect("resolved");

        assert_eq!(resolved.schema.operation_name, "get-forecast");
        assert_eq!(resolved.selected_by, Selection::Exact);
        assert_eq!(resolved.arguments["days"], json!(2));
    }

    #[tokio::test]
    async fn unknown_exact_name_is_operation_not_found() {
        let adapter = adapter(Arc::new(crate::generation::DisabledTextGenerator));
        let error = adapter
            .resolve_operation(&descriptor(), &handle(&session(), 1), &StepTarget::Operation("delete_city".into()), Value::Null)
            .await
            .expect_err("unknown operation");
        assert!(matches!(error, SchemaError::OperationNotFound { .. }));
    }

    #[tokio::test]
    async fn goal_uses_generator_choice_and_arguments() {
        let generator = ScriptedGenerator::new(Ok(
            "```json\n{\"operation\": \"publish_post\", \"arguments\": {\"message\": \"BTC is at 42\"}}\n```".into(),
        ));
        let adapter = adapter(generator.clone());
        let resolved = adapter
            .resolve_operation(
                &descriptor(),
                &handle(&session(), 1),
                &StepTarget::Goal("post a price update".into()),
                json!({"price": 42}),
            )
            .await
            .expect("resolved");

        assert_eq!(resolved.selected_by, Selection::Generator);
        assert_eq!(resolved.schema.operation_name, "publish_post");
        assert_eq!(resolved.arguments, json!({"message": "BTC is at 42"}).as_object().cloned().expect("object"));
        assert_eq!(generator.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmatched_generator_choice_falls_back_to_substring() {
        let generator = ScriptedGenerator::new(Ok("{\"operation\": \"Forecast\"}".into()));
        let resolved = adapter(generator)
            .resolve_operation(&descriptor(), &handle(&session(), 1), &StepTarget::Goal("weather please".into()), json!("Paris"))
            .await
            .expect("resolved");

        assert_eq!(resolved.selected_by, Selection::Substring);
        assert_eq!(resolved.schema.operation_name, "get-forecast");
        assert_eq!(resolved.arguments["city"], json!("Paris"));
    }

    #[tokio::test]
    async fn failed_generator_falls_back_to_keywords() {
        let generator = ScriptedGenerator::new(Err(anyhow::anyhow!("model overloaded")));
        let resolved = adapter(generator)
            .resolve_operation(
                &descriptor(),
                &handle(&session(), 1),
                &StepTarget::Goal("publish a message".into()),
                json!({"message": "hello"}),
            )
            .await
            .expect("resolved");

        assert_eq!(resolved.selected_by, Selection::Keywords);
        assert_eq!(resolved.schema.operation_name, "publish_post");
    }

    #[tokio::test]
    async fn goal_without_any_match_is_not_found() {
        let generator = ScriptedGenerator::new(Ok("{\"operation\": \"transfer_funds\"}".into()));
        let error = adapter(generator)
            .resolve_operation(&descriptor(), &handle(&session(), 1), &StepTarget::Goal("wire money".into()), Value::Null)
            .await
            .expect_err("no match");
        assert_eq!(
            error,
            SchemaError::OperationNotFound {
                provider: "weather".into(),
                operation: "wire money".into(),
            }
        );
    }

    #[tokio::test]
    async fn configured_renames_apply_before_validation() {
        let mut weather = descriptor();
        weather.parameter_aliases = IndexMap::from([("town".to_string(), "city".to_string())]);
        let registry = Arc::new(ProviderRegistry::new([weather.clone()], IndexMap::new()));
        let adapter = SchemaAdapter::new(registry, Arc::new(crate::generation::DisabledTextGenerator));

        let resolved = adapter
            .resolve_operation(&weather, &handle(&session(), 1), &StepTarget::Operation("get-forecast".into()), json!({"town": "Lyon"}))
            .await
            .expect("resolved");
        assert_eq!(resolved.arguments["city"], json!("Lyon"));
    }
}
