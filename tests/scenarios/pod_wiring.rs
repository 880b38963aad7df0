//! Test: environment and mount wiring of executed pods

use crate::helpers::*;
use stagerun::core::step::{CredentialReference, PhaseList, StepParameter};
use stagerun::core::RunContext;
use stagerun::k8s::Pod;
use std::sync::Arc;

fn env_value(pod: &Pod, name: &str) -> Option<String> {
    pod.spec.containers[0]
        .env
        .iter()
        .find(|var| var.name == name)
        .map(|var| var.value.clone())
}

/// Run-context identity and test-level environment flow into the pod
#[tokio::test]
async fn test_pod_environment_bindings() {
    let mut step0 = step("step0");
    step0.environment = vec![
        StepParameter {
            name: "CLUSTER_TYPE".to_string(),
            default: None,
        },
        StepParameter {
            name: "RETRIES".to_string(),
            default: Some("3".to_string()),
        },
    ];
    let mut phases = PhaseList {
        test: vec![step0],
        ..Default::default()
    };
    phases
        .environment
        .insert("CLUSTER_TYPE".to_string(), "aws".to_string());

    let mut ctx = RunContext::new("namespace", "test");
    ctx.job = "job".to_string();
    ctx.build_id = "42".to_string();
    ctx.env.insert(
        "RELEASE_IMAGE_LATEST".to_string(),
        "release:latest".to_string(),
    );

    let client = Arc::new(FakePodClient::new());
    let outcome = run_phases(client.clone(), phases, ctx).await;
    assert!(outcome.result.is_ok());

    let pods = client.created_pods();
    assert_eq!(pods.len(), 1);
    let pod = &pods[0];

    assert_eq!(env_value(pod, "NAMESPACE").as_deref(), Some("namespace"));
    assert_eq!(env_value(pod, "JOB_NAME").as_deref(), Some("job"));
    assert_eq!(env_value(pod, "BUILD_ID").as_deref(), Some("42"));
    assert_eq!(
        env_value(pod, "RELEASE_IMAGE_LATEST").as_deref(),
        Some("release:latest")
    );
    assert_eq!(env_value(pod, "CLUSTER_TYPE").as_deref(), Some("aws"));
    assert_eq!(env_value(pod, "RETRIES").as_deref(), Some("3"));
    assert_eq!(env_value(pod, "SHARED_DIR").as_deref(), Some("/var/run/secrets/shared-dir"));
}

/// Credentials from two source namespaces mount under disambiguated
/// volume names
#[tokio::test]
async fn test_pod_credential_volumes() {
    let mut step0 = step("step0");
    step0.credentials = vec![
        CredentialReference {
            namespace: "ns".to_string(),
            name: "name".to_string(),
            mount_path: "/secrets/first".to_string(),
        },
        CredentialReference {
            namespace: "other".to_string(),
            name: "name".to_string(),
            mount_path: "/secrets/second".to_string(),
        },
    ];
    let phases = PhaseList {
        test: vec![step0],
        ..Default::default()
    };

    let client = Arc::new(FakePodClient::new());
    let outcome = run_phases(client.clone(), phases, RunContext::new("ns", "test")).await;
    assert!(outcome.result.is_ok());

    let pod = &client.created_pods()[0];
    let volume_names: Vec<_> = pod.spec.volumes.iter().map(|v| v.name.as_str()).collect();
    assert!(volume_names.contains(&"ns-name"));
    assert!(volume_names.contains(&"other-name"));

    let mounts: Vec<_> = pod.spec.containers[0]
        .volume_mounts
        .iter()
        .map(|m| (m.name.as_str(), m.mount_path.as_str()))
        .collect();
    assert!(mounts.contains(&("ns-name", "/secrets/first")));
    assert!(mounts.contains(&("other-name", "/secrets/second")));
}
