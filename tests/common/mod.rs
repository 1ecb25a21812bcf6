#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::{api::ListParams, core::ErrorResponse};
use mongo_migrate::{
    cluster::{Cluster, ClusterScoped, Namespaced},
    config::{AppConfig, PollPolicy, Settings},
    Migration,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;
use test_context::AsyncTestContext;

pub const PVC: &str = "PersistentVolumeClaim";
pub const PV: &str = "PersistentVolume";
pub const JOB: &str = "Job";
pub const POD: &str = "Pod";
pub const PVC_PROTECTION: &str = "kubernetes.io/pvc-protection";

/// How the simulated control plane reacts.
#[derive(Clone, Debug)]
pub struct Behaviour {
    /// Reads of a released volume without claim reference before it turns `Available`.
    /// `None` keeps it `Released` forever.
    pub available_after: Option<u32>,
    /// Put the protection finalizer back the first time a claim's finalizers are cleared.
    pub restore_finalizers_once: bool,
    /// Storage class forced onto every created claim, as an admission webhook would.
    pub claim_storage_class: Option<String>,
    /// Claims in this namespace get bound to a freshly provisioned `pv-999`, whatever volume
    /// they name.
    pub hijack_namespace: Option<String>,
    /// Jobs with these names exhaust their backoff limit.
    pub failing_jobs: Vec<String>,
    /// Deleted claims stay behind with the protection finalizer put back, as when a pod still
    /// mounts them.
    pub claims_linger: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            available_after: Some(2),
            restore_finalizers_once: false,
            claim_storage_class: None,
            hijack_namespace: None,
            failing_jobs: Vec::new(),
            claims_linger: false,
        }
    }
}

type Key = (String, String, String);

fn key(kind: &str, namespace: &str, name: &str) -> Key {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse { status: "Failure".into(), message, reason: reason.into(), code })
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(target) = target {
        for (k, v) in patch {
            if v.is_null() {
                target.remove(k);
            } else {
                merge_patch(target.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

fn matches_labels(obj: &Value, selector: Option<&str>) -> bool {
    selector.map_or(true, |selector| {
        selector.split(',').all(|pair| match pair.split_once('=') {
            Some((k, v)) => obj["metadata"]["labels"][k].as_str() == Some(v),
            None => true,
        })
    })
}

fn has_finalizers(obj: &Value) -> bool {
    obj["metadata"]["finalizers"].as_array().is_some_and(|x| !x.is_empty())
}

#[derive(Default)]
struct World {
    objects: BTreeMap<Key, Value>,
    logs: BTreeMap<(String, String), String>,
    mutations: Vec<String>,
    phases: BTreeMap<String, Vec<String>>,
    observed: BTreeMap<String, u32>,
    behaviour: Behaviour,
    next_volume: u32,
    next_uid: u64,
    finalizers_restored: bool,
}

impl World {
    fn record(&mut self, verb: &str, kind: &str, namespace: &str, name: &str) {
        let target = if namespace.is_empty() { name.to_string() } else { format!("{namespace}/{name}") };
        self.mutations.push(format!("{verb} {kind} {target}"));
    }

    fn stamp(&mut self, namespace: &str, obj: &mut Value) {
        self.next_uid += 1;
        let metadata = &mut obj["metadata"];
        if !namespace.is_empty() {
            metadata["namespace"] = json!(namespace);
        }
        metadata["uid"] = json!(format!("uid-{}", self.next_uid));
        metadata["resourceVersion"] = json!(self.next_uid.to_string());
        metadata["creationTimestamp"] = json!(Utc::now().to_rfc3339());
    }

    fn set_volume_phase(&mut self, volume: &str, phase: &str) {
        if let Some(pv) = self.objects.get_mut(&key(PV, "", volume)) {
            pv["status"]["phase"] = json!(phase);
            self.phases.entry(volume.to_string()).or_default().push(phase.to_string());
        }
    }

    fn bind(&mut self, volume: &str, namespace: &str, claim: &str) {
        let uid = self.objects.get(&key(PVC, namespace, claim)).map(|x| x["metadata"]["uid"].clone());
        if let Some(pv) = self.objects.get_mut(&key(PV, "", volume)) {
            pv["spec"]["claimRef"] = json!({
                "kind": "PersistentVolumeClaim",
                "apiVersion": "v1",
                "namespace": namespace,
                "name": claim,
                "uid": uid,
            });
        }
        self.set_volume_phase(volume, "Bound");
        if let Some(pvc) = self.objects.get_mut(&key(PVC, namespace, claim)) {
            pvc["spec"]["volumeName"] = json!(volume);
            pvc["metadata"]["annotations"]["pv.kubernetes.io/bind-completed"] = json!("yes");
            pvc["status"]["phase"] = json!("Bound");
        }
    }

    fn provision(&mut self, name: &str, storage_class: &str, size: &Value) {
        let mut pv = json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": { "name": name },
            "spec": {
                "storageClassName": storage_class,
                "capacity": { "storage": size },
                "accessModes": ["ReadWriteOnce"],
                "persistentVolumeReclaimPolicy": "Retain",
            },
            "status": {},
        });
        self.stamp("", &mut pv);
        self.objects.insert(key(PV, "", name), pv);
        self.record("provision", PV, "", name);
        self.set_volume_phase(name, "Available");
    }

    fn is_available(pv: &Value) -> bool {
        pv["status"]["phase"] == "Available" && pv["spec"]["claimRef"].is_null()
    }

    fn waits_for_consumer(&self, storage_class: &str) -> bool {
        self.objects
            .get(&key("StorageClass", "", storage_class))
            .is_some_and(|sc| sc["volumeBindingMode"] == "WaitForFirstConsumer")
    }

    /// Bind a pending claim the way the volume binder would. A claim naming a volume waits for
    /// that volume to be `Available`. Any other claim takes a free volume of its class or gets
    /// one provisioned, and under `WaitForFirstConsumer` only once a pod mounts it.
    fn bind_claim(&mut self, namespace: &str, name: &str, consumer: bool) {
        let Some(claim) = self.objects.get(&key(PVC, namespace, name)).cloned() else { return };
        if claim["status"]["phase"] == "Bound" {
            return;
        }
        let storage_class = claim["spec"]["storageClassName"].as_str().unwrap_or_default().to_string();
        let size = claim["spec"]["resources"]["requests"]["storage"].clone();

        if self.behaviour.hijack_namespace.as_deref() == Some(namespace) {
            self.provision("pv-999", &storage_class, &size);
            self.bind("pv-999", namespace, name);
            return;
        }

        if let Some(volume) = claim["spec"]["volumeName"].as_str().filter(|x| !x.is_empty()) {
            if self.objects.get(&key(PV, "", volume)).is_some_and(Self::is_available) {
                self.bind(volume, namespace, name);
            }
            return;
        }

        if !consumer && self.waits_for_consumer(&storage_class) {
            return;
        }

        let available = self
            .objects
            .iter()
            .find(|((kind, _, _), pv)| {
                kind == PV && Self::is_available(pv) && pv["spec"]["storageClassName"] == storage_class
            })
            .map(|((_, _, volume), _)| volume.clone());

        let volume = available.unwrap_or_else(|| {
            let volume = format!("pv-{}", self.next_volume);
            self.next_volume += 1;
            self.provision(&volume, &storage_class, &size);
            volume
        });
        self.bind(&volume, namespace, name);
    }

    fn bind_pending(&mut self) {
        let pending: Vec<(String, String)> = self
            .objects
            .iter()
            .filter(|((kind, _, _), pvc)| kind == PVC && pvc["status"]["phase"] != "Bound")
            .map(|((_, ns, name), _)| (ns.clone(), name.clone()))
            .collect();
        for (namespace, name) in pending {
            self.bind_claim(&namespace, &name, false);
        }
    }

    /// Each read of the volumes moves released ones without a claim reference towards `Available`.
    fn observe_volumes(&mut self) {
        let released: Vec<String> = self
            .objects
            .iter()
            .filter(|((kind, _, _), pv)| {
                kind == PV && pv["status"]["phase"] == "Released" && pv["spec"]["claimRef"].is_null()
            })
            .map(|((_, _, name), _)| name.clone())
            .collect();

        let mut flipped = false;
        for volume in released {
            let seen = self.observed.entry(volume.clone()).or_default();
            *seen += 1;
            if self.behaviour.available_after.is_some_and(|n| *seen >= n) {
                self.observed.remove(&volume);
                self.set_volume_phase(&volume, "Available");
                flipped = true;
            }
        }
        if flipped {
            self.bind_pending();
        }
    }

    fn get(&mut self, kind: &str, namespace: &str, name: &str) -> Option<Value> {
        if kind == PV {
            self.observe_volumes();
        }
        self.objects.get(&key(kind, namespace, name)).cloned()
    }

    fn list(&mut self, kind: &str, namespace: Option<&str>, selector: Option<&str>) -> Vec<Value> {
        if kind == PV {
            self.observe_volumes();
        }
        self.objects
            .iter()
            .filter(|((k, ns, _), obj)| {
                k == kind && namespace.map_or(true, |x| x == ns) && matches_labels(obj, selector)
            })
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    fn after_write(&mut self, kind: &str, namespace: &str, name: &str, created: bool) {
        match kind {
            PVC => {
                let storage_class = self.behaviour.claim_storage_class.clone();
                if let Some(pvc) = self.objects.get_mut(&key(PVC, namespace, name)) {
                    if !has_finalizers(pvc) {
                        pvc["metadata"]["finalizers"] = json!([PVC_PROTECTION]);
                    }
                    if let Some(class) = storage_class.filter(|_| created) {
                        pvc["spec"]["storageClassName"] = json!(class);
                    }
                    if pvc["status"].is_null() {
                        pvc["status"] = json!({ "phase": "Pending" });
                    }
                }
                self.bind_claim(namespace, name, false);
            }
            JOB if created => self.run_job(namespace, name),
            _ => {}
        }
    }

    fn run_job(&mut self, namespace: &str, job: &str) {
        let Some(spec) = self.objects.get(&key(JOB, namespace, job)) else { return };
        let mounted: Vec<String> = spec["spec"]["template"]["spec"]["volumes"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|x| x["persistentVolumeClaim"]["claimName"].as_str().map(str::to_string))
            .collect();
        // The job's pod is the claims' first consumer
        for claim in mounted {
            self.bind_claim(namespace, &claim, true);
        }

        let failing = self.behaviour.failing_jobs.iter().any(|x| x == job);
        let Some(obj) = self.objects.get_mut(&key(JOB, namespace, job)) else { return };
        let backoff = obj["spec"]["backoffLimit"].as_i64().unwrap_or(6);
        obj["status"] = if failing {
            json!({ "active": 0, "failed": backoff + 1 })
        } else {
            json!({ "active": 0, "succeeded": 1 })
        };

        let pod_name = format!("{job}-{:05x}", self.next_uid);
        let phase = if failing { "Failed" } else { "Succeeded" };
        let mut pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": pod_name,
                "labels": { "job-name": job },
            },
            "spec": { "containers": [{ "name": "mongodb", "image": "mongo" }] },
            "status": { "phase": phase },
        });
        self.stamp(namespace, &mut pod);
        self.objects.insert(key(POD, namespace, &pod_name), pod);
        self.logs.insert(
            (namespace.to_string(), pod_name),
            format!("{job}: {}\n", if failing { "exit code 1" } else { "done" }),
        );
    }

    fn create(&mut self, kind: &str, namespace: &str, mut obj: Value) -> Result<Value, kube::Error> {
        let name = obj["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let k = key(kind, namespace, &name);
        if self.objects.contains_key(&k) {
            return Err(api_error(409, "AlreadyExists", format!("{kind} {name} already exists")));
        }
        self.stamp(namespace, &mut obj);
        self.objects.insert(k.clone(), obj);
        self.record("create", kind, namespace, &name);
        self.after_write(kind, namespace, &name, true);
        Ok(self.objects[&k].clone())
    }

    fn apply(&mut self, kind: &str, namespace: &str, obj: Value) -> Result<Value, kube::Error> {
        let name = obj["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let k = key(kind, namespace, &name);
        if let Some(existing) = self.objects.get_mut(&k) {
            merge_patch(existing, &obj);
        } else {
            let mut obj = obj;
            self.stamp(namespace, &mut obj);
            self.objects.insert(k.clone(), obj);
        }
        self.record("apply", kind, namespace, &name);
        self.after_write(kind, namespace, &name, false);
        Ok(self.objects[&k].clone())
    }

    fn patch(&mut self, kind: &str, namespace: &str, name: &str, patch: &Value) -> Result<Value, kube::Error> {
        let k = key(kind, namespace, name);
        let Some(existing) = self.objects.get_mut(&k) else {
            return Err(api_error(404, "NotFound", format!("{kind} {name} not found")));
        };
        merge_patch(existing, patch);
        self.record("patch", kind, namespace, name);

        if kind == PVC
            && self.behaviour.restore_finalizers_once
            && !self.finalizers_restored
            && !has_finalizers(&self.objects[&k])
        {
            self.finalizers_restored = true;
            if let Some(pvc) = self.objects.get_mut(&k) {
                pvc["metadata"]["finalizers"] = json!([PVC_PROTECTION]);
            }
        }
        if kind == PV && patch["spec"].get("claimRef").is_some_and(Value::is_null) {
            self.observed.remove(name);
        }
        Ok(self.objects[&k].clone())
    }

    fn delete(&mut self, kind: &str, namespace: &str, name: &str) -> Result<bool, kube::Error> {
        let k = key(kind, namespace, name);
        let Some(existing) = self.objects.get(&k) else { return Ok(false) };

        if kind == PVC && has_finalizers(existing) {
            self.record("delete-rejected", kind, namespace, name);
            return Err(api_error(409, "Conflict", format!("claim {name} is protected by finalizers")));
        }

        if kind == PVC && self.behaviour.claims_linger {
            if let Some(pvc) = self.objects.get_mut(&k) {
                pvc["metadata"]["deletionTimestamp"] = json!(Utc::now().to_rfc3339());
                pvc["metadata"]["finalizers"] = json!([PVC_PROTECTION]);
            }
            self.record("delete-pending", kind, namespace, name);
            return Ok(true);
        }

        let existing = self.objects.remove(&k).unwrap_or_default();
        self.record("delete", kind, namespace, name);

        match kind {
            PVC => {
                if let Some(volume) = existing["spec"]["volumeName"].as_str() {
                    let points_here = self.objects.get(&key(PV, "", volume)).is_some_and(|pv| {
                        pv["spec"]["claimRef"]["namespace"] == namespace
                            && pv["spec"]["claimRef"]["name"] == name
                    });
                    if points_here {
                        self.set_volume_phase(volume, "Released");
                    }
                }
            }
            JOB => {
                let pods: Vec<Key> = self
                    .objects
                    .iter()
                    .filter(|((kind, ns, _), pod)| {
                        kind == POD && ns == namespace && pod["metadata"]["labels"]["job-name"] == name
                    })
                    .map(|(k, _)| k.clone())
                    .collect();
                for pod in pods {
                    self.objects.remove(&pod);
                    self.logs.remove(&(pod.1.clone(), pod.2.clone()));
                }
            }
            _ => {}
        }
        Ok(true)
    }
}

/// In-memory cluster with just enough control-plane behaviour for the migration.
#[derive(Clone, Default)]
pub struct FakeCluster {
    world: Arc<Mutex<World>>,
}

fn encode<K: Serialize>(obj: &K) -> Result<Value, kube::Error> {
    serde_json::to_value(obj).map_err(kube::Error::SerdeError)
}

fn decode<K: DeserializeOwned>(value: Value) -> Result<K, kube::Error> {
    serde_json::from_value(value).map_err(kube::Error::SerdeError)
}

fn kind_of<K: kube::Resource<DynamicType = ()>>() -> String {
    K::kind(&()).into_owned()
}

impl FakeCluster {
    pub fn new(behaviour: Behaviour) -> Self {
        let cluster = Self::default();
        {
            let mut world = cluster.world();
            world.behaviour = behaviour;
            world.next_volume = 123;
        }
        cluster
    }

    /// Namespaces `ns-a` and `ns-b`, a `gp2` storage class binding on first consumer and a
    /// database claim in `ns-a` on it.
    pub fn seeded(behaviour: Behaviour) -> Self {
        let cluster = Self::new(behaviour);
        cluster.seed(
            "Namespace",
            "",
            json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": { "name": "ns-a" } }),
        );
        cluster.seed(
            "Namespace",
            "",
            json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": { "name": "ns-b" } }),
        );
        cluster.seed(
            "StorageClass",
            "",
            json!({
                "apiVersion": "storage.k8s.io/v1",
                "kind": "StorageClass",
                "metadata": {
                    "name": "gp2",
                    "annotations": { "storageclass.kubernetes.io/is-default-class": "true" }
                },
                "provisioner": "ebs.csi.aws.com",
                "parameters": { "type": "gp2" },
                "reclaimPolicy": "Delete",
                "volumeBindingMode": "WaitForFirstConsumer"
            }),
        );
        cluster.seed(
            PV,
            "",
            json!({
                "apiVersion": "v1",
                "kind": "PersistentVolume",
                "metadata": { "name": "pv-db-0" },
                "spec": {
                    "storageClassName": "gp2",
                    "capacity": { "storage": "20Gi" },
                    "claimRef": { "namespace": "ns-a", "name": "mongodbdir-icp-mongodb-0" },
                    "persistentVolumeReclaimPolicy": "Delete"
                },
                "status": { "phase": "Bound" }
            }),
        );
        cluster.seed(
            PVC,
            "ns-a",
            json!({
                "apiVersion": "v1",
                "kind": "PersistentVolumeClaim",
                "metadata": {
                    "name": "mongodbdir-icp-mongodb-0",
                    "finalizers": [PVC_PROTECTION]
                },
                "spec": {
                    "storageClassName": "gp2",
                    "volumeName": "pv-db-0",
                    "resources": { "requests": { "storage": "20Gi" } }
                },
                "status": { "phase": "Bound" }
            }),
        );
        cluster
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    /// Insert an object without recording a mutation or triggering any reaction.
    pub fn seed(&self, kind: &str, namespace: &str, mut obj: Value) {
        let mut world = self.world();
        world.stamp(namespace, &mut obj);
        let name = obj["metadata"]["name"].as_str().unwrap().to_string();
        world.objects.insert(key(kind, namespace, &name), obj);
    }

    pub fn set_behaviour(&self, behaviour: Behaviour) {
        self.world().behaviour = behaviour;
    }

    pub fn mutations(&self) -> Vec<String> {
        self.world().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.world().mutations.clear();
    }

    pub fn phases(&self, volume: &str) -> Vec<String> {
        self.world().phases.get(volume).cloned().unwrap_or_default()
    }

    pub fn contains(&self, kind: &str, namespace: &str, name: &str) -> bool {
        self.world().objects.contains_key(&key(kind, namespace, name))
    }

    pub fn count(&self, kind: &str) -> usize {
        self.world().objects.keys().filter(|(k, _, _)| k == kind).count()
    }

    /// Read without counting as an observation.
    pub fn peek(&self, kind: &str, namespace: &str, name: &str) -> Option<Value> {
        self.world().objects.get(&key(kind, namespace, name)).cloned()
    }

    pub fn volume(&self, name: &str) -> Option<PersistentVolume> {
        self.peek(PV, "", name).map(|x| serde_json::from_value(x).unwrap())
    }

    pub fn claim(&self, namespace: &str, name: &str) -> Option<PersistentVolumeClaim> {
        self.peek(PVC, namespace, name).map(|x| serde_json::from_value(x).unwrap())
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn get<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<Option<K>, kube::Error> {
        let found = self.world().get(&kind_of::<K>(), namespace, name);
        found.map(decode).transpose()
    }

    async fn list<K: Namespaced>(&self, namespace: &str, lp: &ListParams) -> Result<Vec<K>, kube::Error> {
        let found = self.world().list(&kind_of::<K>(), Some(namespace), lp.label_selector.as_deref());
        found.into_iter().map(decode).collect()
    }

    async fn create<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        let value = encode(obj)?;
        let created = self.world().create(&kind_of::<K>(), namespace, value)?;
        decode(created)
    }

    async fn apply<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        let value = encode(obj)?;
        let applied = self.world().apply(&kind_of::<K>(), namespace, value)?;
        decode(applied)
    }

    async fn patch<K: Namespaced>(
        &self, namespace: &str, name: &str, patch: &Value,
    ) -> Result<K, kube::Error> {
        let patched = self.world().patch(&kind_of::<K>(), namespace, name, patch)?;
        decode(patched)
    }

    async fn delete<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<bool, kube::Error> {
        self.world().delete(&kind_of::<K>(), namespace, name)
    }

    async fn get_global<K: ClusterScoped>(&self, name: &str) -> Result<Option<K>, kube::Error> {
        let found = self.world().get(&kind_of::<K>(), "", name);
        found.map(decode).transpose()
    }

    async fn list_global<K: ClusterScoped>(&self, lp: &ListParams) -> Result<Vec<K>, kube::Error> {
        let found = self.world().list(&kind_of::<K>(), None, lp.label_selector.as_deref());
        found.into_iter().map(decode).collect()
    }

    async fn create_global<K: ClusterScoped>(&self, obj: &K) -> Result<K, kube::Error> {
        let value = encode(obj)?;
        let created = self.world().create(&kind_of::<K>(), "", value)?;
        decode(created)
    }

    async fn patch_global<K: ClusterScoped>(&self, name: &str, patch: &Value) -> Result<K, kube::Error> {
        let patched = self.world().patch(&kind_of::<K>(), "", name, patch)?;
        decode(patched)
    }

    async fn delete_global<K: ClusterScoped>(&self, name: &str) -> Result<bool, kube::Error> {
        self.world().delete(&kind_of::<K>(), "", name)
    }

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String, kube::Error> {
        self.world()
            .logs
            .get(&(namespace.to_string(), pod.to_string()))
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound", format!("pod {pod} not found")))
    }
}

pub struct MyContext {
    pub cluster: FakeCluster,
    pub log_dir: TempDir,
}

impl MyContext {
    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            log_dir: self.log_dir.path().to_path_buf(),
            volume_poll: PollPolicy::default(),
            ..AppConfig::default()
        }
    }

    pub fn settings(&self) -> Settings {
        Settings::new(Some("ns-a".into()), Some("ns-b".into()), self.app_config()).unwrap()
    }

    pub fn migration(&self) -> Migration<FakeCluster> {
        Migration::new(self.cluster.clone(), self.settings())
    }
}

#[async_trait]
impl AsyncTestContext for MyContext {
    async fn setup() -> Self {
        mongo_migrate::telemetry::init();

        MyContext {
            cluster: FakeCluster::seeded(Behaviour::default()),
            log_dir: tempfile::tempdir().unwrap(),
        }
    }
}
