//! Dependency-link graph
//!
//! Typed requires/provides tokens used for static pipeline analysis
//! before execution. Matching is value equality over the tagged variant;
//! no partial or fuzzy matching.

use crate::core::step::PhaseList;

/// Release name for the latest release payload
pub const LATEST_RELEASE_NAME: &str = "latest";

/// Release name for the initial release payload
pub const INITIAL_RELEASE_NAME: &str = "initial";

/// Image stream tags the internal pipeline always builds
pub const PIPELINE_TAGS: &[&str] = &["root", "src", "bin", "test-bin", "rpms"];

/// A typed requires/provides marker between pipeline steps
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepLink {
    /// The full set of release images imported into the release namespace
    ReleaseImages { name: String },

    /// A single release payload image, safe to depend on even when a
    /// leasing/profile subsystem substitutes tags at run time
    ReleasePayloadImage { name: String },

    /// An image built by the internal pipeline
    InternalImage { tag: String },

    /// All pipeline image builds have finished
    ImagesReady,

    /// An externally hosted image or artifact, referenced by its full
    /// pullspec rather than resolved through the release namespace
    External { name: String },
}

impl StepLink {
    /// Whether `other` satisfies this requirement
    ///
    /// Value equality over (kind, name); `ImagesReady` has no name.
    pub fn satisfied_by(&self, other: &StepLink) -> bool {
        self == other
    }
}

impl std::fmt::Display for StepLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepLink::ReleaseImages { name } => write!(f, "release images {name:?}"),
            StepLink::ReleasePayloadImage { name } => write!(f, "release payload image {name:?}"),
            StepLink::InternalImage { tag } => write!(f, "internal image {tag:?}"),
            StepLink::ImagesReady => write!(f, "images ready"),
            StepLink::External { name } => write!(f, "external artifact {name:?}"),
        }
    }
}

/// Pipeline-wide image inventory, built from the whole CI configuration
/// rather than a single run
#[derive(Debug, Clone, Default)]
pub struct PipelineInventory {
    images: Vec<String>,
}

impl PipelineInventory {
    /// Inventory over the names of images the pipeline builds itself
    pub fn new<I, S>(images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            images: images.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `from` names an image the internal pipeline produces
    pub fn is_internal(&self, from: &str) -> bool {
        PIPELINE_TAGS.contains(&from) || self.images.iter().any(|i| i == from)
    }
}

/// Requirement for a single step source
fn source_links(from: &str, cluster_profile: Option<&str>, inventory: &PipelineInventory) -> Vec<StepLink> {
    if inventory.is_internal(from) {
        return vec![StepLink::InternalImage { tag: from.to_string() }];
    }
    // A full pullspec bypasses the release namespace entirely.
    if from.contains('/') {
        return vec![StepLink::External { name: from.to_string() }];
    }
    // A `stream:tag` reference pins a specific release stream.
    if let Some((stream, _tag)) = from.split_once(':') {
        let name = match stream.strip_prefix("stable-") {
            Some(rest) => rest.to_string(),
            None => LATEST_RELEASE_NAME.to_string(),
        };
        return vec![StepLink::ReleaseImages { name }];
    }
    if cluster_profile.is_some() {
        // Leased-profile runs must not depend on a release tag directly;
        // the leasing subsystem may substitute it at run time.
        return vec![
            StepLink::ReleasePayloadImage {
                name: LATEST_RELEASE_NAME.to_string(),
            },
            StepLink::ImagesReady,
        ];
    }
    vec![StepLink::ReleaseImages {
        name: LATEST_RELEASE_NAME.to_string(),
    }]
}

/// The full set of tokens a run requires, in step order with duplicates
/// removed
pub fn requires(phases: &PhaseList, inventory: &PipelineInventory) -> Vec<StepLink> {
    let mut links = Vec::new();
    for step in phases.all_steps() {
        for link in source_links(&step.from, phases.cluster_profile.as_deref(), inventory) {
            if !links.contains(&link) {
                links.push(link);
            }
        }
    }
    links
}
