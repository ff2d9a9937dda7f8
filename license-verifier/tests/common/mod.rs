//! Shared test helpers for license verifier tests.

#![allow(dead_code)]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use license_verifier::{
    ClusterObject, ClusterPlatform, CredentialSource, PlatformConnector, PlatformError,
    PlatformResult, PodIdentity, ProcessExit, Shutdown,
};
use rcgen::{
    date_time_ymd, BasicConstraints, Certificate, CertificateParams, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

pub const CLUSTER_UID: &str = "cluster-123";
pub const PRODUCT: &str = "Acme";

// ── Certificates ─────────────────────────────────────────────────

/// A CA able to sign license certificates.
pub struct TestCa {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl TestCa {
    pub fn new(org: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::OrganizationName, org);
        params
            .distinguished_name
            .push(DnType::CommonName, format!("{org} License CA"));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Issues a license with the given builder settings.
    pub fn issue(&self, license: &LicenseParams) -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(license.dns_names.clone()).unwrap();
        params
            .distinguished_name
            .push(DnType::CommonName, "license");
        for org in &license.organizations {
            params
                .distinguished_name
                .push(DnType::OrganizationName, org.clone());
        }
        params.extended_key_usages = license.usages.clone();
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        if let Some((before, after)) = license.validity {
            params.not_before = date_time_ymd(before, 1, 1);
            params.not_after = date_time_ymd(after, 1, 1);
        }
        params
            .signed_by(&key, &self.cert, &self.key)
            .unwrap()
            .pem()
    }
}

/// What goes into a test license.
#[derive(Clone)]
pub struct LicenseParams {
    pub dns_names: Vec<String>,
    pub organizations: Vec<String>,
    pub usages: Vec<ExtendedKeyUsagePurpose>,
    /// `(not_before_year, not_after_year)`; `None` keeps the generous default.
    pub validity: Option<(i32, i32)>,
}

impl Default for LicenseParams {
    fn default() -> Self {
        Self {
            dns_names: vec![CLUSTER_UID.to_string()],
            organizations: vec![PRODUCT.to_string()],
            usages: vec![ExtendedKeyUsagePurpose::ClientAuth],
            validity: None,
        }
    }
}

/// A CA plus a valid license for `CLUSTER_UID` / `PRODUCT`, built once.
pub struct Fixture {
    pub ca_pem: String,
    pub license_pem: String,
}

pub fn fixture() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let ca = TestCa::new("Licensor");
        Fixture {
            ca_pem: ca.pem(),
            license_pem: ca.issue(&LicenseParams::default()),
        }
    })
}

// ── Credential sources ───────────────────────────────────────────

/// In-memory license source that counts reads and can trigger a stop.
pub struct CountingSource {
    bytes: Mutex<Vec<u8>>,
    reads: AtomicUsize,
    stop_after: Option<(usize, Shutdown)>,
    corrupt_after: Option<usize>,
}

impl CountingSource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Mutex::new(bytes.into()),
            reads: AtomicUsize::new(0),
            stop_after: None,
            corrupt_after: None,
        }
    }

    /// Serves garbage instead of the license after `n` reads.
    pub fn corrupt_after(mut self, n: usize) -> Self {
        self.corrupt_after = Some(n);
        self
    }

    /// Triggers `stop` during the `n`-th read.
    pub fn stopping_after(mut self, n: usize, stop: Shutdown) -> Self {
        self.stop_after = Some((n, stop));
        self
    }

    pub fn set(&self, bytes: impl Into<Vec<u8>>) {
        *self.bytes.lock().unwrap() = bytes.into();
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for CountingSource {
    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn read(&self) -> io::Result<Vec<u8>> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, stop)) = &self.stop_after {
            if n == *limit {
                stop.trigger();
            }
        }
        if self.corrupt_after.is_some_and(|limit| n > limit) {
            return Ok(b"not a license".to_vec());
        }
        Ok(self.bytes.lock().unwrap().clone())
    }
}

// ── Process exit ─────────────────────────────────────────────────

/// Records exit codes instead of exiting.
#[derive(Default)]
pub struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordingExit {
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().unwrap().clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes.lock().unwrap().push(code);
    }
}

// ── Platform fake ────────────────────────────────────────────────

/// In-memory cluster.
pub struct FakePlatform {
    pub in_cluster: bool,
    pub pod: PodIdentity,
    pub cluster_uid: Option<String>,
    pub fail_event_writes: bool,
    pub objects: Mutex<HashMap<(String, String), ClusterObject>>,
    pub events: Mutex<HashMap<(String, String), Event>>,
    pub uid_lookups: AtomicUsize,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            in_cluster: true,
            pod: PodIdentity {
                namespace: "apps".to_string(),
                name: "operator-7d9f-abcde".to_string(),
            },
            cluster_uid: Some(CLUSTER_UID.to_string()),
            fail_event_writes: false,
            objects: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
            uid_lookups: AtomicUsize::new(0),
        }
    }
}

impl FakePlatform {
    /// Adds an object, optionally controlled by `owner` (`api_version`, `kind`,
    /// `name`, `uid`).
    pub fn add_object(
        &self,
        api_version: &str,
        kind: &str,
        name: &str,
        uid: &str,
        owner: Option<(&str, &str, &str, &str)>,
    ) {
        let owners = owner
            .map(|(api_version, kind, name, uid)| {
                vec![OwnerReference {
                    api_version: api_version.to_string(),
                    kind: kind.to_string(),
                    name: name.to_string(),
                    uid: uid.to_string(),
                    controller: Some(true),
                    ..Default::default()
                }]
            })
            .unwrap_or_default();
        let object = ClusterObject {
            reference: ObjectReference {
                api_version: Some(api_version.to_string()),
                kind: Some(kind.to_string()),
                namespace: Some(self.pod.namespace.clone()),
                name: Some(name.to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            owners,
        };
        self.objects
            .lock()
            .unwrap()
            .insert((kind.to_string(), name.to_string()), object);
    }

    /// Pod -> ReplicaSet -> Deployment, the usual chain.
    pub fn with_deployment(self) -> Self {
        let pod = self.pod.name.clone();
        self.add_object(
            "v1",
            "Pod",
            &pod,
            "uid-pod",
            Some(("apps/v1", "ReplicaSet", "operator-7d9f", "uid-rs")),
        );
        self.add_object(
            "apps/v1",
            "ReplicaSet",
            "operator-7d9f",
            "uid-rs",
            Some(("apps/v1", "Deployment", "operator", "uid-deploy")),
        );
        self.add_object("apps/v1", "Deployment", "operator", "uid-deploy", None);
        self
    }

    pub fn event(&self, name: &str) -> Option<Event> {
        self.events
            .lock()
            .unwrap()
            .get(&(self.pod.namespace.clone(), name.to_string()))
            .cloned()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn uid_lookups(&self) -> usize {
        self.uid_lookups.load(Ordering::SeqCst)
    }
}

fn event_key(event: &Event) -> (String, String) {
    (
        event.metadata.namespace.clone().unwrap_or_default(),
        event.metadata.name.clone().unwrap_or_default(),
    )
}

#[async_trait]
impl ClusterPlatform for FakePlatform {
    fn possibly_in_cluster(&self) -> bool {
        self.in_cluster
    }

    fn current_pod(&self) -> PlatformResult<PodIdentity> {
        Ok(self.pod.clone())
    }

    async fn cluster_uid(&self) -> PlatformResult<String> {
        self.uid_lookups.fetch_add(1, Ordering::SeqCst);
        self.cluster_uid.clone().ok_or(PlatformError::NotFound {
            kind: "Namespace".to_string(),
            name: "kube-system".to_string(),
        })
    }

    async fn get_object(&self, target: &ObjectReference) -> PlatformResult<ClusterObject> {
        let kind = target.kind.clone().unwrap_or_default();
        let name = target.name.clone().unwrap_or_default();
        self.objects
            .lock()
            .unwrap()
            .get(&(kind.clone(), name.clone()))
            .cloned()
            .ok_or(PlatformError::NotFound { kind, name })
    }

    async fn get_event(&self, namespace: &str, name: &str) -> PlatformResult<Option<Event>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_event(&self, event: &Event) -> PlatformResult<Event> {
        if self.fail_event_writes {
            return Err(PlatformError::Api("events is forbidden".to_string()));
        }
        let mut events = self.events.lock().unwrap();
        let key = event_key(event);
        if events.contains_key(&key) {
            return Err(PlatformError::Api("already exists".to_string()));
        }
        events.insert(key, event.clone());
        Ok(event.clone())
    }

    async fn update_event(&self, event: &Event) -> PlatformResult<Event> {
        if self.fail_event_writes {
            return Err(PlatformError::Api("events is forbidden".to_string()));
        }
        let mut events = self.events.lock().unwrap();
        let key = event_key(event);
        if !events.contains_key(&key) {
            return Err(PlatformError::NotFound {
                kind: "Event".to_string(),
                name: key.1,
            });
        }
        events.insert(key, event.clone());
        Ok(event.clone())
    }
}

/// Connector that cannot build a client.
pub struct FailingConnector;

#[async_trait]
impl PlatformConnector for FailingConnector {
    async fn connect(&self) -> PlatformResult<Arc<dyn ClusterPlatform>> {
        Err(PlatformError::Client("no cluster configuration".to_string()))
    }
}
