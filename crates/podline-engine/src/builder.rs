//! Translation of a step into a pod request.

use podline_cluster::ContainerSpec;
use podline_cluster::PodSpec;

use crate::definition::StageDefinition;
use crate::definition::StepDefinition;
use crate::verified::label_value;
use crate::verified::pod_name;

/// Name of the app container created by [`StepPodSpecBuilder`].
pub const STEP_CONTAINER_NAME: &str = "step";

/// Turns a step of a build into the pod that runs it.
pub trait PodSpecBuilder: Send + Sync {
    fn build_pod_request(&self, step: &StepDefinition, stage: &StageDefinition, build_id: u64)
    -> anyhow::Result<PodSpec>;
}

/// Minimal builder: one app container running the step's commands with `/bin/sh -c`.
///
/// Pods are named with [`pod_name`] and labelled with the build, stage and step,
/// the names cleaned by [`label_value`].
#[derive(Debug, Clone)]
pub struct StepPodSpecBuilder {
    namespace: String,
}

impl StepPodSpecBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl PodSpecBuilder for StepPodSpecBuilder {
    fn build_pod_request(
        &self,
        step: &StepDefinition,
        stage: &StageDefinition,
        build_id: u64,
    ) -> anyhow::Result<PodSpec> {
        anyhow::ensure!(!step.image.is_empty(), "step '{}' has no image", step.name);

        let mut container = ContainerSpec::new(STEP_CONTAINER_NAME, &step.image);
        if !step.commands.is_empty() {
            container.command = vec!["/bin/sh".to_string(), "-c".to_string()];
            container.args = vec![step.commands.join("\n")];
        }
        container.env = step.env.clone();

        let labels = [
            ("podline/build".to_string(), build_id.to_string()),
            ("podline/stage".to_string(), label_value(&stage.name)),
            ("podline/step".to_string(), label_value(&step.name)),
        ]
        .into_iter()
        .collect();

        Ok(PodSpec {
            name: pod_name(&stage.name, &step.name, build_id),
            namespace: self.namespace.clone(),
            labels,
            init_containers: Vec::new(),
            containers: vec![container],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_single_container_pod() {
        let stage = StageDefinition::new("Build", vec![]);
        let step = StepDefinition::new("compile", "rust:1").with_commands(["cargo build", "cargo test"]);

        let spec = StepPodSpecBuilder::new("ci").build_pod_request(&step, &stage, 12).unwrap();
        assert_eq!(spec.name, pod_name("Build", "compile", 12));
        assert_eq!(spec.namespace, "ci");
        assert_eq!(spec.labels["podline/step"], "compile");
        assert_eq!(spec.containers[0].args, ["cargo build\ncargo test"]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_free_form_names_become_valid_labels() {
        let stage = StageDefinition::new("Build & Test", vec![]);
        let step = StepDefinition::new("unit tests (linux)", "rust:1");

        let spec = StepPodSpecBuilder::new("ci").build_pod_request(&step, &stage, 4).unwrap();
        assert_eq!(spec.labels["podline/stage"], "Build---Test");
        assert_eq!(spec.labels["podline/step"], "unit-tests--linux");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_missing_image_rejected() {
        let stage = StageDefinition::new("build", vec![]);
        let step = StepDefinition::new("compile", "");
        let err = StepPodSpecBuilder::new("ci").build_pod_request(&step, &stage, 1).unwrap_err();
        assert!(err.to_string().contains("has no image"));
    }
}
