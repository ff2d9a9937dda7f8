//! Kubernetes implementation of [`ClusterPlatform`].

use crate::config::SYSTEM_NAMESPACE;
use crate::error::{PlatformError, PlatformResult};
use crate::platform::{ClusterObject, ClusterPlatform, PlatformConnector, PodIdentity};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Namespace, ObjectReference};
use kube::api::{Api, DynamicObject, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, Scope};
use kube::{Client, Config};
use std::env;
use std::path::Path;
use std::sync::Arc;

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
const NAMESPACE_ENV: &str = "KUBE_NAMESPACE";
const DEFAULT_NAMESPACE: &str = "default";

/// Returns true when the service environment variables are set and a service
/// account token is mounted.
#[must_use]
pub fn possibly_in_cluster() -> bool {
    let set = |key: &str| env::var(key).is_ok_and(|v| !v.is_empty());
    set("KUBERNETES_SERVICE_HOST")
        && set("KUBERNETES_SERVICE_PORT")
        && Path::new(SERVICE_ACCOUNT_TOKEN).is_file()
}

/// Namespace of the current pod: `KUBE_NAMESPACE`, then the mounted service
/// account namespace, then `default`.
#[must_use]
pub fn current_namespace() -> String {
    resolve_namespace(
        env::var(NAMESPACE_ENV).ok().as_deref(),
        Path::new(SERVICE_ACCOUNT_NAMESPACE),
    )
}

/// Picks the pod namespace from an explicit override, then `namespace_file`,
/// then `default`. Blank values are ignored.
#[must_use]
pub fn resolve_namespace(explicit: Option<&str>, namespace_file: &Path) -> String {
    if let Some(ns) = explicit.map(str::trim).filter(|ns| !ns.is_empty()) {
        return ns.to_string();
    }
    std::fs::read_to_string(namespace_file)
        .ok()
        .map(|ns| ns.trim().to_string())
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
}

/// Pod name, which Kubernetes sets as the host name.
pub fn current_pod_name() -> PlatformResult<String> {
    hostname::get()
        .map_err(|e| PlatformError::Hostname(e.to_string()))?
        .into_string()
        .map_err(|_| PlatformError::Hostname("host name is not valid UTF-8".to_string()))
}

/// Cluster access through the Kubernetes API.
#[derive(Clone)]
pub struct KubePlatform {
    client: Client,
}

impl KubePlatform {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn events(&self, namespace: &str) -> Api<Event> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterPlatform for KubePlatform {
    fn possibly_in_cluster(&self) -> bool {
        possibly_in_cluster()
    }

    fn current_pod(&self) -> PlatformResult<PodIdentity> {
        Ok(PodIdentity {
            namespace: current_namespace(),
            name: current_pod_name()?,
        })
    }

    async fn cluster_uid(&self) -> PlatformResult<String> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces
            .get(SYSTEM_NAMESPACE)
            .await?
            .metadata
            .uid
            .ok_or(PlatformError::MissingField("metadata.uid"))
    }

    async fn get_object(&self, target: &ObjectReference) -> PlatformResult<ClusterObject> {
        let api_version = target
            .api_version
            .as_deref()
            .ok_or(PlatformError::MissingField("apiVersion"))?;
        let kind = target
            .kind
            .as_deref()
            .ok_or(PlatformError::MissingField("kind"))?;
        let name = target
            .name
            .as_deref()
            .ok_or(PlatformError::MissingField("name"))?;
        let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));

        let gvk = GroupVersionKind::gvk(group, version, kind);
        let (resource, caps) = discovery::pinned_kind(&self.client, &gvk).await?;
        let api: Api<DynamicObject> = match (caps.scope, target.namespace.as_deref()) {
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        };

        let object = api
            .get_opt(name)
            .await?
            .ok_or_else(|| PlatformError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })?;
        let meta = object.metadata;

        Ok(ClusterObject {
            reference: ObjectReference {
                api_version: Some(api_version.to_string()),
                kind: Some(kind.to_string()),
                namespace: meta.namespace,
                name: meta.name,
                uid: meta.uid,
                resource_version: meta.resource_version,
                ..Default::default()
            },
            owners: meta.owner_references.unwrap_or_default(),
        })
    }

    async fn get_event(&self, namespace: &str, name: &str) -> PlatformResult<Option<Event>> {
        Ok(self.events(namespace).get_opt(name).await?)
    }

    async fn create_event(&self, event: &Event) -> PlatformResult<Event> {
        let namespace = event
            .metadata
            .namespace
            .as_deref()
            .ok_or(PlatformError::MissingField("metadata.namespace"))?;
        Ok(self
            .events(namespace)
            .create(&PostParams::default(), event)
            .await?)
    }

    async fn update_event(&self, event: &Event) -> PlatformResult<Event> {
        let namespace = event
            .metadata
            .namespace
            .as_deref()
            .ok_or(PlatformError::MissingField("metadata.namespace"))?;
        let name = event
            .metadata
            .name
            .as_deref()
            .ok_or(PlatformError::MissingField("metadata.name"))?;
        Ok(self
            .events(namespace)
            .replace(name, &PostParams::default(), event)
            .await?)
    }
}

/// Connects to Kubernetes with an explicit config, or the inferred one
/// (in-cluster service account, then kubeconfig).
#[derive(Clone, Default)]
pub struct KubeConnector {
    config: Option<Config>,
}

impl KubeConnector {
    /// Uses the inferred configuration.
    #[must_use]
    pub fn inferred() -> Self {
        Self::default()
    }

    /// Uses `config` as given.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config: Some(config),
        }
    }
}

#[async_trait]
impl PlatformConnector for KubeConnector {
    async fn connect(&self) -> PlatformResult<Arc<dyn ClusterPlatform>> {
        let client = match &self.config {
            Some(config) => Client::try_from(config.clone()),
            None => Client::try_default().await,
        }
        .map_err(|e| PlatformError::Client(e.to_string()))?;
        Ok(Arc::new(KubePlatform::new(client)))
    }
}
