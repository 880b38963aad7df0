//! Credential and shared-storage mounting
//!
//! Computes the volume/mount layout that injects named credentials and
//! the per-run shared directory into step pods. The shared directory is
//! backed by one secret per run, named after the run; it is the only
//! mutable state shared by every step.

use crate::core::context::RunContext;
use crate::core::step::CredentialReference;
use crate::k8s::{EnvVar, Pod, Secret, SecretVolumeSource, Volume, VolumeMount};

/// Mount point of the shared directory inside step containers
pub const SHARED_DIR_MOUNT_PATH: &str = "/var/run/secrets/shared-dir";

/// Environment variable pointing steps at the shared directory
pub const SHARED_DIR_ENV: &str = "SHARED_DIR";

const SHARED_VOLUME_NAME: &str = "shared-dir";

/// The per-run shared-directory secret object
///
/// Created in the target namespace before the first pod; left for
/// external garbage collection at run end.
pub fn shared_secret(ctx: &RunContext) -> Secret {
    Secret {
        metadata: crate::k8s::ObjectMeta {
            name: ctx.run_name.clone(),
            namespace: ctx.namespace.clone(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Mount the shared directory into every container of the pod
///
/// Read-only steps receive the same volume without write access.
pub fn add_shared_dir(pod: &mut Pod, run_name: &str, read_only: bool) {
    pod.spec.volumes.push(Volume {
        name: SHARED_VOLUME_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: run_name.to_string(),
        }),
    });
    for container in &mut pod.spec.containers {
        container.volume_mounts.push(VolumeMount {
            name: SHARED_VOLUME_NAME.to_string(),
            mount_path: SHARED_DIR_MOUNT_PATH.to_string(),
            read_only,
        });
        container.env.push(EnvVar {
            name: SHARED_DIR_ENV.to_string(),
            value: SHARED_DIR_MOUNT_PATH.to_string(),
        });
    }
}

/// Mount credentials into every container of the pod
///
/// One volume + one mount per distinct (namespace, name) reference;
/// repeated references to the same source secret collapse into one.
/// True collisions after disambiguation are rejected during config
/// validation, before this runs.
pub fn add_credentials(credentials: &[CredentialReference], pod: &mut Pod) {
    let mut distinct: Vec<&CredentialReference> = Vec::new();
    for cred in credentials {
        if !distinct
            .iter()
            .any(|prev| prev.namespace == cred.namespace && prev.name == cred.name)
        {
            distinct.push(cred);
        }
    }

    for cred in distinct {
        let name = cred.volume_name();
        pod.spec.volumes.push(Volume {
            name: name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: name.clone(),
            }),
        });
        for container in &mut pod.spec.containers {
            container.volume_mounts.push(VolumeMount {
                name: name.clone(),
                mount_path: cred.mount_path.clone(),
                read_only: false,
            });
        }
    }
}
