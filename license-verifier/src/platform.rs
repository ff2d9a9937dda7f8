//! Orchestration platform seam.
//!
//! Verification needs the cluster UID; failure reporting needs to find the
//! controller that owns this pod and write an event against it. Both go
//! through [`ClusterPlatform`] so the Kubernetes client can be swapped out.

use crate::config::MAX_OWNER_DEPTH;
use crate::error::{PlatformError, PlatformResult};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Name and namespace of the pod this process runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodIdentity {
    pub namespace: String,
    pub name: String,
}

/// An object fetched from the cluster together with its owners.
#[derive(Debug, Clone, Default)]
pub struct ClusterObject {
    /// Full reference to the object, including its UID.
    pub reference: ObjectReference,
    /// The object's owner references.
    pub owners: Vec<OwnerReference>,
}

/// Operations the verifier needs from the orchestration platform.
#[async_trait]
pub trait ClusterPlatform: Send + Sync {
    /// Whether this process appears to run inside the cluster.
    fn possibly_in_cluster(&self) -> bool;

    /// Resolves the pod this process runs in.
    fn current_pod(&self) -> PlatformResult<PodIdentity>;

    /// Returns the stable identifier of the cluster.
    async fn cluster_uid(&self) -> PlatformResult<String>;

    /// Fetches the object `target` points to.
    async fn get_object(&self, target: &ObjectReference) -> PlatformResult<ClusterObject>;

    /// Fetches an event by name, if it exists.
    async fn get_event(&self, namespace: &str, name: &str) -> PlatformResult<Option<Event>>;

    /// Creates a new event.
    async fn create_event(&self, event: &Event) -> PlatformResult<Event>;

    /// Replaces an existing event.
    async fn update_event(&self, event: &Event) -> PlatformResult<Event>;
}

/// Builds a platform client at the start of a verification session.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    async fn connect(&self) -> PlatformResult<Arc<dyn ClusterPlatform>>;
}

#[async_trait]
impl<T: ClusterPlatform + 'static> PlatformConnector for Arc<T> {
    async fn connect(&self) -> PlatformResult<Arc<dyn ClusterPlatform>> {
        Ok(self.clone())
    }
}

/// Walks controller owner references up from a pod to its root controller.
///
/// Stops at the first object without a controller owner. Fails if an object
/// repeats or the chain is more than [`MAX_OWNER_DEPTH`] owners long.
pub async fn detect_workload(
    platform: &dyn ClusterPlatform,
    namespace: &str,
    pod_name: &str,
) -> PlatformResult<ObjectReference> {
    let mut target = ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("Pod".to_string()),
        namespace: Some(namespace.to_string()),
        name: Some(pod_name.to_string()),
        ..Default::default()
    };
    let mut seen = HashSet::new();

    for depth in 0..=MAX_OWNER_DEPTH {
        let object = platform.get_object(&target).await?;
        if let Some(uid) = object.reference.uid.as_deref() {
            if !seen.insert(uid.to_string()) {
                return Err(PlatformError::OwnerCycle(uid.to_string()));
            }
        }

        let Some(owner) = object
            .owners
            .iter()
            .find(|owner| owner.controller == Some(true))
        else {
            debug!(
                kind = object.reference.kind.as_deref().unwrap_or_default(),
                name = object.reference.name.as_deref().unwrap_or_default(),
                depth,
                "found root workload"
            );
            return Ok(object.reference);
        };
        if seen.contains(&owner.uid) {
            return Err(PlatformError::OwnerCycle(owner.uid.clone()));
        }

        target = ObjectReference {
            api_version: Some(owner.api_version.clone()),
            kind: Some(owner.kind.clone()),
            namespace: object.reference.namespace.clone(),
            name: Some(owner.name.clone()),
            uid: Some(owner.uid.clone()),
            ..Default::default()
        };
    }

    Err(PlatformError::OwnerChainTooDeep(MAX_OWNER_DEPTH))
}

/// Creates the named event, or updates it if it already exists.
///
/// `mutate` receives the existing event, or an empty one carrying only the
/// name and namespace, and returns the event to store.
pub async fn create_or_patch_event<F>(
    platform: &dyn ClusterPlatform,
    namespace: &str,
    name: &str,
    mutate: F,
) -> PlatformResult<Event>
where
    F: FnOnce(Event) -> Event + Send,
{
    match platform.get_event(namespace, name).await? {
        Some(existing) => {
            debug!(namespace, name, "updating event");
            platform.update_event(&mutate(existing)).await
        }
        None => {
            debug!(namespace, name, "creating event");
            let fresh = Event {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            platform.create_event(&mutate(fresh)).await
        }
    }
}
