//! Kubernetes platform backed by `kube`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::ContainerState;
use k8s_openapi::api::core::v1::ContainerStatus as KubeContainerStatus;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec as KubePodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Api;
use kube::Client;
use kube::api::DeleteParams;
use kube::api::LogParams;
use kube::api::PostParams;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::debug;

use crate::error::ClusterError;
use crate::error::Result;
use crate::platform::ClusterPlatform;
use crate::platform::LogStream;
use crate::types::ContainerSpec;
use crate::types::ContainerStatus;
use crate::types::PodIdentity;
use crate::types::PodPhase;
use crate::types::PodSpec;
use crate::types::PodStatusSnapshot;
use crate::types::ReportedState;
use crate::types::RunningInfo;
use crate::types::TerminatedInfo;
use crate::types::WaitingInfo;

/// Cluster platform talking to a Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the ambient kubeconfig or in-cluster service account.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.map_err(|e| ClusterError::Api {
            operation: "connect".to_string(),
            target: "kubernetes".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_error(operation: &str, namespace: &str, name: &str, error: kube::Error) -> ClusterError {
    match error {
        kube::Error::Api(response) if response.code == 404 => ClusterError::PodNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 => ClusterError::PodAlreadyExists {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => ClusterError::Api {
            operation: operation.to_string(),
            target: format!("{namespace}/{name}"),
            reason: other.to_string(),
        },
    }
}

fn to_container(spec: &ContainerSpec) -> Container {
    Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        args: (!spec.args.is_empty()).then(|| spec.args.clone()),
        env: (!spec.env.is_empty()).then(|| {
            spec.env
                .iter()
                .map(|(name, value)| EnvVar {
                    name: name.clone(),
                    value: Some(value.clone()),
                    ..EnvVar::default()
                })
                .collect()
        }),
        ..Container::default()
    }
}

fn to_pod(spec: &PodSpec) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(KubePodSpec {
            restart_policy: Some("Never".to_string()),
            init_containers: (!spec.init_containers.is_empty())
                .then(|| spec.init_containers.iter().map(to_container).collect()),
            containers: spec.containers.iter().map(to_container).collect(),
            ..KubePodSpec::default()
        }),
        ..Pod::default()
    }
}

fn identity(pod: &Pod) -> PodIdentity {
    PodIdentity::new(
        pod.metadata.namespace.clone().unwrap_or_default(),
        pod.metadata.uid.clone().unwrap_or_default(),
        pod.metadata.name.clone().unwrap_or_default(),
    )
}

fn reported_state(state: Option<&ContainerState>) -> ReportedState {
    let Some(state) = state else {
        return ReportedState::default();
    };
    ReportedState {
        waiting: state.waiting.as_ref().map(|w| WaitingInfo {
            reason: w.reason.clone(),
            message: w.message.clone(),
        }),
        running: state.running.as_ref().map(|r| RunningInfo {
            started_at: r.started_at.as_ref().map(|t| t.0),
        }),
        terminated: state.terminated.as_ref().map(|t| TerminatedInfo {
            exit_code: t.exit_code,
            reason: t.reason.clone(),
            finished_at: t.finished_at.as_ref().map(|t| t.0),
        }),
    }
}

fn container_status(status: &KubeContainerStatus) -> ContainerStatus {
    ContainerStatus {
        name: status.name.clone(),
        ready: status.ready,
        restart_count: u32::try_from(status.restart_count).unwrap_or(0),
        state: reported_state(status.state.as_ref()),
    }
}

fn snapshot(pod: &Pod) -> PodStatusSnapshot {
    let status = pod.status.as_ref();
    let statuses = |list: Option<&Vec<KubeContainerStatus>>| -> Vec<ContainerStatus> {
        list.map(|l| l.iter().map(container_status).collect()).unwrap_or_default()
    };

    PodStatusSnapshot {
        identity: identity(pod),
        phase: status.and_then(|s| s.phase.as_deref()).map(PodPhase::from).unwrap_or_default(),
        init_container_statuses: statuses(status.and_then(|s| s.init_container_statuses.as_ref())),
        container_statuses: statuses(status.and_then(|s| s.container_statuses.as_ref())),
    }
}

#[async_trait]
impl ClusterPlatform for KubeCluster {
    async fn create_pod(&self, spec: &PodSpec) -> Result<Option<PodIdentity>> {
        spec.validate()?;

        let created = self
            .pods(&spec.namespace)
            .create(&PostParams::default(), &to_pod(spec))
            .await
            .map_err(|e| map_error("create", &spec.namespace, &spec.name, e))?;

        debug!(namespace = %spec.namespace, pod = %spec.name, "pod created");
        let identity = identity(&created);
        Ok((!identity.is_empty()).then_some(identity))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodStatusSnapshot> {
        let pod = self.pods(namespace).get(name).await.map_err(|e| map_error("get", namespace, name, e))?;
        Ok(snapshot(&pod))
    }

    async fn stream_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<LogStream> {
        let params = LogParams {
            container: Some(container.to_string()),
            follow: true,
            ..LogParams::default()
        };
        let stream =
            self.pods(namespace).log_stream(pod, &params).await.map_err(|e| map_error("logs", namespace, pod, e))?;
        Ok(Box::pin(stream.compat()))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_error("delete", namespace, name, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ContainerStateTerminated;
    use k8s_openapi::api::core::v1::ContainerStateWaiting;
    use k8s_openapi::api::core::v1::PodStatus;

    use super::*;

    #[test]
    fn test_pod_request_never_restarts() {
        let spec = PodSpec {
            name: "step-1".to_string(),
            namespace: "ci".to_string(),
            containers: vec![ContainerSpec::new("step", "rust:1")],
            ..PodSpec::default()
        };
        let pod = to_pod(&spec);
        let pod_spec = pod.spec.unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));
        assert!(pod_spec.init_containers.is_none());
        assert_eq!(pod_spec.containers[0].image.as_deref(), Some("rust:1"));
    }

    #[test]
    fn test_snapshot_from_pod_status() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("step-1".to_string()),
                namespace: Some("ci".to_string()),
                uid: Some("abc".to_string()),
                ..ObjectMeta::default()
            },
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                init_container_statuses: Some(vec![KubeContainerStatus {
                    name: "clone".to_string(),
                    ready: true,
                    state: Some(ContainerState {
                        terminated: Some(ContainerStateTerminated {
                            exit_code: 0,
                            ..ContainerStateTerminated::default()
                        }),
                        ..ContainerState::default()
                    }),
                    ..KubeContainerStatus::default()
                }]),
                container_statuses: Some(vec![KubeContainerStatus {
                    name: "step".to_string(),
                    state: Some(ContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some("PodInitializing".to_string()),
                            ..ContainerStateWaiting::default()
                        }),
                        ..ContainerState::default()
                    }),
                    ..KubeContainerStatus::default()
                }]),
                ..PodStatus::default()
            }),
            ..Pod::default()
        };

        let snapshot = snapshot(&pod);
        assert_eq!(snapshot.identity, PodIdentity::new("ci", "abc", "step-1"));
        assert_eq!(snapshot.phase, PodPhase::Running);
        assert_eq!(snapshot.init_container_statuses[0].state.terminated.as_ref().map(|t| t.exit_code), Some(0));
        assert!(snapshot.container_statuses[0].state.waiting.is_some());
    }
}
