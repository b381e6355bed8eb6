use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{ImageRef, ImageSet, PendingImage, StoredImage};
use crate::storage::BlobStore;

/// Failure of an image reconcile. Delete failures never show up here.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Too many images for '{slot}': {count} given, at most {max} allowed")]
    TooManyImages {
        slot: String,
        count: usize,
        max: usize,
    },

    #[error("Image listed more than once: {0}")]
    DuplicateImage(String),

    #[error("Upload failed for {path}: {source}")]
    UploadFailed {
        path: String,
        #[source]
        source: Box<AppError>,
    },
}

impl ReconcileError {
    /// Raised before any blob store call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReconcileError::TooManyImages { .. } | ReconcileError::DuplicateImage(_)
        )
    }
}

/// Where new images of an entity are uploaded.
///
/// One target is shared by every slot of a submission, so all uploads of
/// that submission carry the same timestamp.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub prefix: String,
    pub entity_id: String,
    pub stamp: i64,
}

impl UploadTarget {
    pub fn new(prefix: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entity_id: entity_id.into(),
            stamp: Utc::now().timestamp_millis(),
        }
    }

    /// `{prefix}/{entity_id}/{slot}/{stamp}_{position}_{file_name}`
    fn path_for(&self, slot: &str, position: usize, file_name: &str) -> String {
        format!(
            "{}/{}/{}/{}_{}_{}",
            self.prefix,
            self.entity_id,
            slot,
            self.stamp,
            position,
            sanitize_file_name(file_name)
        )
    }
}

#[derive(Debug)]
enum PlannedEntry {
    Keep(StoredImage),
    Upload(PendingImage),
}

/// Validated partition of an edit buffer against the persisted set
#[derive(Debug)]
pub struct ReconcilePlan {
    slot: String,
    entries: Vec<PlannedEntry>,
    to_delete: Vec<StoredImage>,
}

impl ReconcilePlan {
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Number of pending images that will be uploaded
    pub fn upload_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, PlannedEntry::Upload(_)))
            .count()
    }

    /// Persisted images the edit dropped
    pub fn to_delete(&self) -> &[StoredImage] {
        &self.to_delete
    }

    pub fn is_noop(&self) -> bool {
        self.upload_count() == 0 && self.to_delete.is_empty()
    }
}

/// A slot whose new images are uploaded but whose dropped images still exist
#[derive(Debug)]
pub struct StagedImageSet {
    slot: String,
    images: Vec<StoredImage>,
    uploaded: Vec<String>,
    to_delete: Vec<StoredImage>,
}

impl StagedImageSet {
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Final ordered list to write to the record
    pub fn images(&self) -> &[StoredImage] {
        &self.images
    }

    /// Storage paths uploaded by this stage
    pub fn uploaded(&self) -> &[String] {
        &self.uploaded
    }
}

/// Result of a completed reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub images: Vec<StoredImage>,
    /// Superseded storage paths whose delete failed
    pub orphaned: Vec<String>,
}

#[cfg(test)]
impl ReconcileOutcome {
    pub fn urls(&self) -> Vec<&str> {
        self.images.iter().map(|image| image.url.as_str()).collect()
    }
}

/// Turns an edited image buffer plus the persisted set into blob store calls
/// and the ordered list of durable images to store on the record.
#[derive(Clone)]
pub struct Reconciler {
    blobs: Arc<dyn BlobStore>,
}

impl Reconciler {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Validate the buffer and partition it into kept, uploaded and deleted images.
    /// Makes no blob store calls.
    pub fn plan(
        slot: &str,
        previous: &ImageSet,
        edited: ImageSet,
        max_images: usize,
    ) -> Result<ReconcilePlan, ReconcileError> {
        if edited.len() > max_images {
            return Err(ReconcileError::TooManyImages {
                slot: slot.to_string(),
                count: edited.len(),
                max: max_images,
            });
        }

        if edited.is_empty() && !previous.is_empty() {
            tracing::debug!("'{}' cleared, releasing {} image(s)", slot, previous.len());
        }

        let mut kept = HashSet::new();
        for path in edited.iter().filter_map(ImageRef::storage_path) {
            if !kept.insert(path.to_string()) {
                return Err(ReconcileError::DuplicateImage(path.to_string()));
            }
        }

        let entries = edited
            .into_inner()
            .into_iter()
            .map(|image| match image {
                ImageRef::Persisted(stored) => PlannedEntry::Keep(stored),
                ImageRef::Pending(pending) => PlannedEntry::Upload(pending),
            })
            .collect();

        let to_delete = previous
            .stored()
            .filter(|image| !kept.contains(&image.storage_path))
            .cloned()
            .collect();

        Ok(ReconcilePlan {
            slot: slot.to_string(),
            entries,
            to_delete,
        })
    }

    /// Upload every pending image concurrently and resolve its durable URL.
    ///
    /// Any failure fails the whole stage. Uploads that already succeeded are
    /// left in place and logged as orphans; there is no rollback.
    pub async fn stage(
        &self,
        plan: ReconcilePlan,
        target: &UploadTarget,
    ) -> Result<StagedImageSet, ReconcileError> {
        if plan.is_noop() {
            tracing::debug!("'{}' of {} is unchanged", plan.slot(), target.entity_id);
        } else {
            tracing::debug!(
                "Reconciling '{}' of {}: {} upload(s), {} delete(s)",
                plan.slot(),
                target.entity_id,
                plan.upload_count(),
                plan.to_delete().len()
            );
        }

        let ReconcilePlan {
            slot,
            entries,
            to_delete,
        } = plan;
        let slot_name = slot.as_str();

        let results = join_all(entries.into_iter().enumerate().map(|(position, entry)| {
            let target = target.clone();
            async move {
                match entry {
                    PlannedEntry::Keep(stored) => Ok((stored, false)),
                    PlannedEntry::Upload(pending) => {
                        let path = target.path_for(slot_name, position, &pending.file_name);
                        self.upload_one(path, pending).await.map(|stored| (stored, true))
                    }
                }
            }
        }))
        .await;

        let mut images = Vec::with_capacity(results.len());
        let mut uploaded = Vec::new();
        let mut failure = None;
        for result in results {
            match result {
                Ok((stored, fresh)) => {
                    if fresh {
                        uploaded.push(stored.storage_path.clone());
                    }
                    images.push(stored);
                }
                Err(e) if failure.is_none() => failure = Some(e),
                Err(e) => tracing::warn!("Additional upload failure in '{}': {}", slot, e),
            }
        }

        if let Some(e) = failure {
            if !uploaded.is_empty() {
                tracing::warn!(
                    "Upload failed in '{}', leaving {} uploaded blob(s) orphaned: {:?}",
                    slot,
                    uploaded.len(),
                    uploaded
                );
            }
            return Err(e);
        }

        tracing::debug!(
            "Staged '{}' for {}: {} image(s), {} uploaded",
            slot,
            target.entity_id,
            images.len(),
            uploaded.len()
        );

        Ok(StagedImageSet {
            slot,
            images,
            uploaded,
            to_delete,
        })
    }

    /// Delete the images a staged set superseded. Never fails.
    pub async fn commit(&self, staged: StagedImageSet) -> ReconcileOutcome {
        let orphaned = self.release(&staged.to_delete).await;
        ReconcileOutcome {
            images: staged.images,
            orphaned,
        }
    }

    /// Plan, stage and commit in one call
    pub async fn reconcile(
        &self,
        slot: &str,
        previous: &ImageSet,
        edited: ImageSet,
        max_images: usize,
        target: &UploadTarget,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let plan = Self::plan(slot, previous, edited, max_images)?;
        let staged = self.stage(plan, target).await?;
        Ok(self.commit(staged).await)
    }

    /// Best-effort concurrent delete. Returns the paths that could not be deleted.
    pub async fn release(&self, images: &[StoredImage]) -> Vec<String> {
        let results = join_all(images.iter().map(|image| async move {
            let path = image.storage_path.as_str();
            self.blobs.delete(path).await.map_err(|e| (path, e))
        }))
        .await;

        let mut orphaned = Vec::new();
        for result in results {
            if let Err((path, e)) = result {
                tracing::warn!("Failed to delete blob {}, leaving it orphaned: {}", path, e);
                orphaned.push(path.to_string());
            }
        }
        orphaned
    }

    async fn upload_one(
        &self,
        path: String,
        pending: PendingImage,
    ) -> Result<StoredImage, ReconcileError> {
        let content_type = pending.content_type.clone().or_else(|| {
            mime_guess::from_path(&pending.file_name)
                .first()
                .map(|mime| mime.to_string())
        });

        let handle = match self
            .blobs
            .upload(&path, pending.data, content_type.as_deref())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                return Err(ReconcileError::UploadFailed {
                    path,
                    source: Box::new(e),
                })
            }
        };

        match self.blobs.durable_url(&handle).await {
            Ok(url) => Ok(StoredImage {
                url,
                storage_path: handle.path,
            }),
            Err(e) => {
                tracing::warn!("Uploaded {} but could not resolve its URL, leaving it orphaned", path);
                Err(ReconcileError::UploadFailed {
                    path,
                    source: Box::new(e),
                })
            }
        }
    }
}

/// Keep a client file name safe to use as the last storage path segment
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}
