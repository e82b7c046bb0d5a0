// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory fakes of the store, configuration resolver and DNS provider
//! shared by the reconciler tests.

use crate::config::{ConfigResolver, TargetConfig};
use crate::context::Context;
use crate::dns_errors::{ConfigError, ProviderError};
use crate::providers::{DnsProvider, DnsRecord, ProviderFactory, ProviderKind, RecordType};
use crate::store::{IngressStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::jiff::Timestamp;
use k8s_openapi::api::networking::v1::{Ingress, IngressRule, IngressSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Mutation = Box<dyn FnMut(&mut Ingress) + Send>;

/// Build an Ingress in `default` with the given hosts and annotations.
pub fn ingress(name: &str, hosts: &[&str], annotations: &[(&str, &str)]) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            annotations: if annotations.is_empty() {
                None
            } else {
                Some(
                    annotations
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                )
            },
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(
                hosts
                    .iter()
                    .map(|host| IngressRule {
                        host: Some((*host).to_string()),
                        http: None,
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

/// Mark an Ingress as being deleted.
pub fn mark_deleted(ingress: &mut Ingress) {
    ingress.metadata.deletion_timestamp = Some(Time(Timestamp::now()));
}

/// Ingress store holding objects in memory with resourceVersion checks.
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<(String, String), Ingress>>,
    version: AtomicU64,
    writes: AtomicU32,
    injected_conflicts: AtomicU32,
    concurrent_writer: Mutex<Option<Mutation>>,
}

impl FakeStore {
    pub fn with(ingress: Ingress) -> Arc<Self> {
        let store = Arc::new(Self::default());
        store.insert(ingress);
        store
    }

    pub fn insert(&self, mut ingress: Ingress) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        ingress.metadata.resource_version = Some(version.to_string());
        let key = (ingress.namespace().unwrap_or_default(), ingress.name_any());
        self.objects.lock().unwrap().insert(key, ingress);
    }

    pub fn current(&self, name: &str) -> Option<Ingress> {
        self.objects
            .lock()
            .unwrap()
            .get(&("default".to_string(), name.to_string()))
            .cloned()
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Fail the next `count` writes with a conflict.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Apply `mutation` to the stored object whenever an injected conflict
    /// fires, as if another writer won the race.
    pub fn on_conflict(&self, mutation: impl FnMut(&mut Ingress) + Send + 'static) {
        *self.concurrent_writer.lock().unwrap() = Some(Box::new(mutation));
    }

    fn conflict(namespace: &str, name: &str) -> StoreError {
        StoreError::Conflict {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: "the object has been modified".to_string(),
        }
    }
}

#[async_trait]
impl IngressStore for FakeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn replace(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        let namespace = ingress.namespace().unwrap_or_default();
        let name = ingress.name_any();
        let key = (namespace.clone(), name.clone());

        if self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let mut objects = self.objects.lock().unwrap();
            if let (Some(stored), Some(writer)) = (
                objects.get_mut(&key),
                self.concurrent_writer.lock().unwrap().as_mut(),
            ) {
                writer(stored);
                let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
                stored.metadata.resource_version = Some(version.to_string());
            }
            return Err(Self::conflict(&namespace, &name));
        }

        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get(&key) else {
            return Err(StoreError::NotFound { namespace, name });
        };
        if stored.metadata.resource_version != ingress.metadata.resource_version {
            return Err(Self::conflict(&namespace, &name));
        }

        let mut updated = ingress.clone();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        updated.metadata.resource_version = Some(version.to_string());
        objects.insert(key, updated.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

/// Configuration resolver with fixed answers.
pub struct FakeConfig {
    pub target: Mutex<Result<TargetConfig, ConfigError>>,
    pub sources: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    pub address: Mutex<Result<String, ConfigError>>,
    pub target_calls: AtomicU32,
}

impl Default for FakeConfig {
    fn default() -> Self {
        let mut sources = BTreeMap::new();
        sources.insert("dns-source".to_string(), BTreeMap::new());
        Self {
            target: Mutex::new(Ok(TargetConfig::default())),
            sources: Mutex::new(sources),
            address: Mutex::new(Ok("203.0.113.10".to_string())),
            target_calls: AtomicU32::new(0),
        }
    }
}

impl FakeConfig {
    pub fn excluding(domains: &[&str]) -> Self {
        let config = Self::default();
        *config.target.lock().unwrap() = Ok(TargetConfig {
            exclude_domains: domains.iter().map(ToString::to_string).collect(),
            ..TargetConfig::default()
        });
        config
    }
}

#[async_trait]
impl ConfigResolver for FakeConfig {
    async fn target_config(&self) -> Result<TargetConfig, ConfigError> {
        self.target_calls.fetch_add(1, Ordering::SeqCst);
        self.target.lock().unwrap().clone()
    }

    async fn resolve_source(
        &self,
        source_name: &str,
    ) -> Result<BTreeMap<String, String>, ConfigError> {
        self.sources
            .lock()
            .unwrap()
            .get(source_name)
            .cloned()
            .ok_or_else(|| ConfigError::SourceNotFound {
                source_name: source_name.to_string(),
                namespace: "kube-dns-manager".to_string(),
            })
    }

    async fn load_balancer_address(
        &self,
        _namespace: &str,
        _service_name: &str,
    ) -> Result<String, ConfigError> {
        self.address.lock().unwrap().clone()
    }
}

/// A call observed by [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Lookup(String, RecordType),
    Create(String, RecordType, String),
    Update(String, RecordType, String),
    Delete(String, RecordType),
}

/// DNS provider keeping a zone in memory and recording every call.
///
/// A name may hold several records of one type, as a real zone can.
#[derive(Default)]
pub struct RecordingProvider {
    zone: Mutex<Vec<DnsRecord>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    next_id: AtomicU32,
}

impl RecordingProvider {
    pub fn seed(&self, name: &str, record_type: RecordType, content: &str) {
        let id = format!("seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.zone.lock().unwrap().push(DnsRecord {
            id,
            name: name.to_string(),
            record_type,
            content: content.to_string(),
        });
    }

    /// Content of the first record of `record_type` at `name`.
    pub fn content(&self, name: &str, record_type: RecordType) -> Option<String> {
        self.contents(name, record_type).into_iter().next()
    }

    /// Content of every record of `record_type` at `name`.
    pub fn contents(&self, name: &str, record_type: RecordType) -> Vec<String> {
        self.zone
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.name == name && record.record_type == record_type)
            .map(|record| record.content.clone())
            .collect()
    }

    /// Make every call for `name` fail.
    pub fn fail_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn heal(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change the zone.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Lookup(..)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) -> Result<(), ProviderError> {
        let name = match &call {
            Call::Lookup(name, _)
            | Call::Create(name, _, _)
            | Call::Update(name, _, _)
            | Call::Delete(name, _) => name.clone(),
        };
        self.calls.lock().unwrap().push(call);

        if self.failing.lock().unwrap().contains(&name) {
            return Err(ProviderError::CloudflareApi {
                operation: "test".to_string(),
                name,
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for RecordingProvider {
    fn provider_name(&self) -> &'static str {
        "recording"
    }

    async fn lookup(
        &self,
        name: &str,
        record_type: RecordType,
        content: Option<&str>,
    ) -> Result<Option<DnsRecord>, ProviderError> {
        self.record(Call::Lookup(name.to_string(), record_type))?;
        Ok(self
            .zone
            .lock()
            .unwrap()
            .iter()
            .find(|record| {
                record.name == name
                    && record.record_type == record_type
                    && content.is_none_or(|content| record.content == content)
            })
            .cloned())
    }

    async fn create(
        &self,
        name: &str,
        record_type: RecordType,
        content: &str,
    ) -> Result<(), ProviderError> {
        self.record(Call::Create(
            name.to_string(),
            record_type,
            content.to_string(),
        ))?;
        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.zone.lock().unwrap().push(DnsRecord {
            id,
            name: name.to_string(),
            record_type,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn update(&self, existing: &DnsRecord, content: &str) -> Result<(), ProviderError> {
        self.record(Call::Update(
            existing.name.clone(),
            existing.record_type,
            content.to_string(),
        ))?;
        if let Some(record) = self
            .zone
            .lock()
            .unwrap()
            .iter_mut()
            .find(|record| record.id == existing.id)
        {
            record.content = content.to_string();
        }
        Ok(())
    }

    async fn delete(&self, existing: &DnsRecord) -> Result<(), ProviderError> {
        self.record(Call::Delete(existing.name.clone(), existing.record_type))?;
        self.zone
            .lock()
            .unwrap()
            .retain(|record| record.id != existing.id);
        Ok(())
    }
}

/// Factory handing out one shared [`RecordingProvider`].
pub struct FakeFactory {
    pub provider: Arc<RecordingProvider>,
    pub builds: Mutex<Vec<(ProviderKind, String)>>,
}

impl FakeFactory {
    pub fn new(provider: Arc<RecordingProvider>) -> Self {
        Self {
            provider,
            builds: Mutex::new(Vec::new()),
        }
    }
}

impl ProviderFactory for FakeFactory {
    fn build(
        &self,
        kind: ProviderKind,
        source_name: &str,
        _settings: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn DnsProvider>, ConfigError> {
        self.builds
            .lock()
            .unwrap()
            .push((kind, source_name.to_string()));
        Ok(self.provider.clone())
    }
}

/// Everything a reconciler test needs.
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub config: Arc<FakeConfig>,
    pub provider: Arc<RecordingProvider>,
    pub factory: Arc<FakeFactory>,
    pub context: Arc<Context>,
}

impl Harness {
    pub fn new(ingress: Ingress, config: FakeConfig) -> Self {
        let store = FakeStore::with(ingress);
        let config = Arc::new(config);
        let provider = Arc::new(RecordingProvider::default());
        let factory = Arc::new(FakeFactory::new(provider.clone()));
        let context = Arc::new(Context::new(store.clone(), config.clone(), factory.clone()));
        Self {
            store,
            config,
            provider,
            factory,
            context,
        }
    }
}
