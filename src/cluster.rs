use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{
    api::{DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams},
    Api, Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use snafu::ResultExt as _;

use crate::{KubeSnafu, MIGRATOR};

/// A namespaced k8s-openapi resource type.
pub trait Namespaced:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Namespaced for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// A cluster-scoped k8s-openapi resource type.
pub trait ClusterScoped:
    Resource<Scope = ClusterResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ClusterScoped for K where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// The cluster operations the migration needs.
///
/// `delete*` returns `Ok(false)` when the object was already gone, so callers can treat
/// repeated deletion as success.
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn get<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<Option<K>, kube::Error>;
    async fn list<K: Namespaced>(&self, namespace: &str, lp: &ListParams) -> Result<Vec<K>, kube::Error>;
    async fn create<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, kube::Error>;
    /// Server-side apply of a complete object.
    async fn apply<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, kube::Error>;
    /// JSON merge patch, `null` removes a field.
    async fn patch<K: Namespaced>(
        &self, namespace: &str, name: &str, patch: &serde_json::Value,
    ) -> Result<K, kube::Error>;
    async fn delete<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<bool, kube::Error>;

    async fn get_global<K: ClusterScoped>(&self, name: &str) -> Result<Option<K>, kube::Error>;
    async fn list_global<K: ClusterScoped>(&self, lp: &ListParams) -> Result<Vec<K>, kube::Error>;
    async fn create_global<K: ClusterScoped>(&self, obj: &K) -> Result<K, kube::Error>;
    async fn patch_global<K: ClusterScoped>(
        &self, name: &str, patch: &serde_json::Value,
    ) -> Result<K, kube::Error>;
    async fn delete_global<K: ClusterScoped>(&self, name: &str) -> Result<bool, kube::Error>;

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String, kube::Error>;
}

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409)
}

fn deleted<T>(result: Result<T, kube::Error>) -> Result<bool, kube::Error> {
    match result {
        Ok(_) => Ok(true),
        Err(err) if is_not_found(&err) => Ok(false),
        Err(err) => Err(err),
    }
}

/// [`Cluster`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the in-cluster config or the local kubeconfig.
    pub async fn try_default() -> crate::Result<Self> {
        let client = Client::try_default()
            .await
            .context(KubeSnafu { msg: "Unable to create Kubernetes client" })?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<Option<K>, kube::Error> {
        Api::<K>::namespaced(self.client(), namespace).get_opt(name).await
    }

    async fn list<K: Namespaced>(&self, namespace: &str, lp: &ListParams) -> Result<Vec<K>, kube::Error> {
        Ok(Api::<K>::namespaced(self.client(), namespace).list(lp).await?.items)
    }

    async fn create<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        Api::<K>::namespaced(self.client(), namespace).create(&PostParams::default(), obj).await
    }

    async fn apply<K: Namespaced>(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        let name = obj.meta().name.clone().unwrap_or_default();
        Api::<K>::namespaced(self.client(), namespace)
            .patch(&name, &PatchParams::apply(MIGRATOR).force(), &Patch::Apply(obj))
            .await
    }

    async fn patch<K: Namespaced>(
        &self, namespace: &str, name: &str, patch: &serde_json::Value,
    ) -> Result<K, kube::Error> {
        Api::<K>::namespaced(self.client(), namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
    }

    async fn delete<K: Namespaced>(&self, namespace: &str, name: &str) -> Result<bool, kube::Error> {
        deleted(
            Api::<K>::namespaced(self.client(), namespace)
                .delete(name, &DeleteParams::background())
                .await,
        )
    }

    async fn get_global<K: ClusterScoped>(&self, name: &str) -> Result<Option<K>, kube::Error> {
        Api::<K>::all(self.client()).get_opt(name).await
    }

    async fn list_global<K: ClusterScoped>(&self, lp: &ListParams) -> Result<Vec<K>, kube::Error> {
        Ok(Api::<K>::all(self.client()).list(lp).await?.items)
    }

    async fn create_global<K: ClusterScoped>(&self, obj: &K) -> Result<K, kube::Error> {
        Api::<K>::all(self.client()).create(&PostParams::default(), obj).await
    }

    async fn patch_global<K: ClusterScoped>(
        &self, name: &str, patch: &serde_json::Value,
    ) -> Result<K, kube::Error> {
        Api::<K>::all(self.client())
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
    }

    async fn delete_global<K: ClusterScoped>(&self, name: &str) -> Result<bool, kube::Error> {
        deleted(Api::<K>::all(self.client()).delete(name, &DeleteParams::background()).await)
    }

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String, kube::Error> {
        Api::<k8s_openapi::api::core::v1::Pod>::namespaced(self.client(), namespace)
            .logs(pod, &LogParams::default())
            .await
    }
}
