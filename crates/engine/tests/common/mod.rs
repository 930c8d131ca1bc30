//! In-process fake providers and collaborators for executor tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use relay_engine::{
    ExecutionStore, ExecutorOptions, ExecutorServices, InMemoryExecutionStore, TextGenerator, WorkflowExecutor,
};
use relay_mcp::client::RemoteOperation;
use relay_mcp::{CallError, ConnectionError, InMemoryCredentialStore, LogManager, ProviderConnector, ProviderRegistry, ProviderSession};
use relay_types::{Credential, ExecutionEvent, LaunchSpec, ProviderDescriptor};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Text content envelope as returned by MCP providers.
pub fn text(body: &str) -> Value {
    json!({"content": [{"type": "text", "text": body}]})
}

/// A scripted provider: fixed operations, queued responses per operation.
#[derive(Default)]
pub struct FakeProvider {
    operations: Vec<RemoteOperation>,
    scripts: Mutex<HashMap<String, VecDeque<Result<Value, CallError>>>>,
    defaults: HashMap<String, Value>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    cancel_on_call: Option<CancellationToken>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an operation that answers `response` unless a scripted answer is queued.
    pub fn operation(mut self, name: &str, description: &str, input_schema: Value, response: Value) -> Self {
        self.operations.push(RemoteOperation {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema,
        });
        self.defaults.insert(name.to_string(), response);
        self
    }

    /// Queue answers returned before the default one.
    pub fn script(self, name: &str, answers: Vec<Result<Value, CallError>>) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(name.to_string(), answers.into());
        self
    }

    /// Cancel `token` as soon as any operation is called.
    pub fn cancel_on_call(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

struct FakeSession {
    provider: Arc<FakeProvider>,
}

#[async_trait]
impl ProviderSession for FakeSession {
    async fn list_operations(&self) -> Result<Vec<RemoteOperation>, CallError> {
        Ok(self.provider.operations.clone())
    }

    async fn call(&self, operation: &str, arguments: &Map<String, Value>) -> Result<Value, CallError> {
        self.provider
            .calls
            .lock()
            .expect("calls lock")
            .push((operation.to_string(), arguments.clone()));
        if let Some(token) = &self.provider.cancel_on_call {
            token.cancel();
        }
        if let Some(answer) = self
            .provider
            .scripts
            .lock()
            .expect("scripts lock")
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            return answer;
        }
        self.provider
            .defaults
            .get(operation)
            .cloned()
            .ok_or_else(|| CallError::operation(operation, "unknown tool"))
    }

    async fn ping(&self) -> Result<(), CallError> {
        Ok(())
    }

    async fn close(&self) {}
}

/// Connector handing out sessions to registered fake providers.
#[derive(Default)]
pub struct FakeConnector {
    providers: HashMap<String, Arc<FakeProvider>>,
    pub connects: AtomicUsize,
    pub launches: Mutex<Vec<(String, LaunchSpec)>>,
}

impl FakeConnector {
    pub fn with(mut self, name: &str, provider: FakeProvider) -> Self {
        self.providers.insert(name.to_string(), Arc::new(provider));
        self
    }

    pub fn provider(&self, name: &str) -> Arc<FakeProvider> {
        Arc::clone(self.providers.get(name).expect("provider registered"))
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderConnector for FakeConnector {
    async fn connect(&self, provider: &str, launch: &LaunchSpec) -> Result<Arc<dyn ProviderSession>, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.launches
            .lock()
            .expect("launches lock")
            .push((provider.to_string(), launch.clone()));
        let provider = self
            .providers
            .get(provider)
            .cloned()
            .ok_or_else(|| ConnectionError::startup_failed(provider, "command not found"))?;
        Ok(Arc::new(FakeSession { provider }))
    }
}

/// Generator answering through a closure and remembering every prompt.
pub struct FnGenerator {
    respond: Box<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>,
    pub prompts: Mutex<Vec<String>>,
}

impl FnGenerator {
    pub fn new(respond: impl Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts_starting_with(&self, prefix: &str) -> usize {
        self.prompts
            .lock()
            .expect("prompts lock")
            .iter()
            .filter(|prompt| prompt.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl TextGenerator for FnGenerator {
    async fn suggest(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().expect("prompts lock").push(prompt.to_string());
        (self.respond)(prompt)
    }
}

pub fn subprocess(name: &str, auth_params: &[&str]) -> ProviderDescriptor {
    ProviderDescriptor {
        name: name.to_string(),
        launch: LaunchSpec::Subprocess {
            command: format!("{name}-mcp"),
            args: vec![],
            env: IndexMap::new(),
            cwd: None,
        },
        category: None,
        auth_required: !auth_params.is_empty(),
        auth_param_names: auth_params.iter().map(|key| key.to_string()).collect(),
        static_operations: vec![],
        parameter_aliases: IndexMap::new(),
    }
}

pub fn verified(user_id: &str, provider: &str, key: &str, secret: &str) -> Credential {
    Credential {
        user_id: user_id.to_string(),
        provider_name: provider.to_string(),
        is_verified: true,
        auth_data: IndexMap::from([(key.to_string(), secret.to_string())]),
    }
}

pub fn weather_provider() -> FakeProvider {
    FakeProvider::new().operation(
        "get_forecast",
        "Weather forecast for a city",
        json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]}),
        text("sunny"),
    )
}

pub fn social_provider() -> FakeProvider {
    FakeProvider::new().operation(
        "publish_post",
        "Publish a short message to the feed",
        json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}),
        text("{\"status\": \"ok\", \"data\": {\"id\": \"post-1\"}}"),
    )
}

pub fn fast_options() -> ExecutorOptions {
    ExecutorOptions {
        backoff_unit: Duration::from_millis(5),
        call_timeout: Duration::from_secs(5),
        generator_timeout: Duration::from_secs(2),
        ..ExecutorOptions::default()
    }
}

/// Everything a test needs to drive and inspect one executor.
pub struct Harness {
    pub executor: WorkflowExecutor,
    pub connector: Arc<FakeConnector>,
    pub store: Arc<InMemoryExecutionStore>,
}

pub struct HarnessBuilder {
    connector: FakeConnector,
    descriptors: Vec<ProviderDescriptor>,
    aliases: IndexMap<String, String>,
    credentials: Vec<Credential>,
    generator: Arc<dyn TextGenerator>,
    store: Option<Arc<dyn ExecutionStore>>,
    options: ExecutorOptions,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            connector: FakeConnector::default(),
            descriptors: Vec::new(),
            aliases: IndexMap::new(),
            credentials: Vec::new(),
            generator: Arc::new(relay_engine::DisabledTextGenerator),
            store: None,
            options: fast_options(),
        }
    }

    pub fn provider(mut self, descriptor: ProviderDescriptor, provider: FakeProvider) -> Self {
        self.connector = self.connector.with(&descriptor.name, provider);
        self.descriptors.push(descriptor);
        self
    }

    pub fn alias(mut self, alias: &str, canonical: &str) -> Self {
        self.aliases.insert(alias.to_string(), canonical.to_string());
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Harness {
        let connector = Arc::new(self.connector);
        let memory_store = Arc::new(InMemoryExecutionStore::new());
        let store: Arc<dyn ExecutionStore> = match self.store {
            Some(store) => store,
            None => Arc::clone(&memory_store) as Arc<dyn ExecutionStore>,
        };
        let connections = self
            .options
            .connection_manager(Arc::clone(&connector) as Arc<dyn ProviderConnector>, Arc::new(LogManager::new()));
        let services = ExecutorServices {
            registry: Arc::new(ProviderRegistry::new(self.descriptors, self.aliases)),
            connections: Arc::new(connections),
            credentials: Arc::new(InMemoryCredentialStore::new(self.credentials)),
            generator: self.generator,
            store,
        };
        Harness {
            executor: WorkflowExecutor::new(services, self.options),
            connector,
            store: memory_store,
        }
    }
}

/// Everything currently buffered on an event channel.
pub fn drain(receiver: &mut UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
