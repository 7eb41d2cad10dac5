//! Abstract surface of the shared namespace-addressed datastore.
//!
//! The harness only observes the store: it opens artifacts, lists children,
//! and deletes what a run recorded. Writing results is the task engine's job.

use crate::core::errors::{FchError, Result};
use crate::core::paths::NamespacePath;

/// One element of a result collection.
pub type CollectionEntry = serde_json::Value;

/// Shape of an artifact, discovered only at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A namespace node with children and no content ("volume").
    Container,
    /// A leaf object with byte content.
    File,
    /// An append-only sequence of result entries.
    Collection,
}

impl ArtifactKind {
    /// Human-readable label used in type-mismatch messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::File => "file",
            Self::Collection => "collection",
        }
    }
}

/// Content of an opened artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactPayload {
    /// No content of its own; existence implied by indexed children.
    Container,
    /// Leaf bytes.
    File {
        /// Stored content.
        data: Vec<u8>,
    },
    /// Result entries in arrival order.
    Collection {
        /// Stored entries.
        entries: Vec<CollectionEntry>,
    },
}

/// A read-only reference to an object in the store, short-lived by design.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Where the artifact was opened.
    pub path: NamespacePath,
    /// What was found there.
    pub payload: ArtifactPayload,
}

impl Artifact {
    /// Discovered shape.
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        match self.payload {
            ArtifactPayload::Container => ArtifactKind::Container,
            ArtifactPayload::File { .. } => ArtifactKind::File,
            ArtifactPayload::Collection { .. } => ArtifactKind::Collection,
        }
    }

    /// Whether the artifact is a container ("volume").
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self.payload, ArtifactPayload::Container)
    }

    /// Up to `n` leading content bytes; empty for non-file artifacts.
    #[must_use]
    pub fn read(&self, n: usize) -> &[u8] {
        match &self.payload {
            ArtifactPayload::File { data } => &data[..data.len().min(n)],
            _ => &[],
        }
    }

    /// Collection entries; empty for non-collection artifacts.
    #[must_use]
    pub fn entries(&self) -> &[CollectionEntry] {
        match &self.payload {
            ArtifactPayload::Collection { entries } => entries,
            _ => &[],
        }
    }

    /// Fail unless the artifact has the expected shape.
    pub fn expect_kind(&self, expected: ArtifactKind) -> Result<()> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(FchError::TypeMismatch {
                path: self.path.clone(),
                expected: expected.label(),
                actual: self.kind().label(),
            })
        }
    }
}

/// Datastore operations consumed by the harness.
pub trait Store {
    /// Open one artifact read-only; `expected` turns a shape mismatch into an
    /// error at open time.
    fn open(&self, path: &NamespacePath, expected: Option<ArtifactKind>) -> Result<Artifact>;

    /// Open many artifacts, silently skipping unresolvable paths.
    fn multi_open(&self, paths: &[NamespacePath]) -> Vec<Artifact>;

    /// List immediate children for every given path in one batched call.
    /// Paths without children yield an empty child list.
    fn multi_list_children(
        &self,
        paths: &[NamespacePath],
    ) -> Vec<(NamespacePath, Vec<NamespacePath>)>;

    /// Delete the object stored at `path`. Deleting an absent path is a no-op.
    fn delete_subject(&self, path: &NamespacePath) -> Result<()>;

    /// Remove `path` from its parent's child index.
    fn remove_from_parent_index(&self, path: &NamespacePath) -> Result<()>;

    /// Flush write caches so subsequent reads observe prior deletions.
    fn flush(&self) -> Result<()>;
}
