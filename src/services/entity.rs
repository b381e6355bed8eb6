use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::GalleryConfig;
use crate::error::{AppError, Result};
use crate::models::{
    DeleteReport, EntityForm, EntityKind, EntityRecord, ImageEdit, ImageRef, ImageSet,
    RecordPath, SaveResponse, StoredImage,
};
use crate::records::{ChangeCallback, RecordStore, Subscription};
use crate::services::reconcile::{ReconcilePlan, Reconciler, StagedImageSet, UploadTarget};

type InFlightSet = Arc<Mutex<HashSet<(EntityKind, String)>>>;

/// Marks an entity as busy until dropped
struct InFlight {
    key: (EntityKind, String),
    set: InFlightSet,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}

/// Create, update and delete entities together with their images
pub struct EntityService {
    records: Arc<dyn RecordStore>,
    reconciler: Reconciler,
    gallery: GalleryConfig,
    in_flight: InFlightSet,
}

impl EntityService {
    pub fn new(records: Arc<dyn RecordStore>, reconciler: Reconciler, gallery: GalleryConfig) -> Self {
        Self {
            records,
            reconciler,
            gallery,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// All records of a kind, oldest first
    pub async fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        let value = self
            .records
            .read(&RecordPath::collection(kind.collection()))
            .await?;
        records_from_collection(value)
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<EntityRecord> {
        let value = self
            .records
            .read(&RecordPath::record(kind.collection(), id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found: {}", kind.label(), id)))?;
        EntityRecord::from_value(id, value)
    }

    pub async fn create(&self, kind: EntityKind, form: EntityForm) -> Result<SaveResponse> {
        let fields = kind.normalize_fields(form.fields)?;
        reject_unknown_slots(kind, &form.images)?;

        // Every slot of the kind is written on create; unsubmitted ones start empty
        let mut plans = Vec::with_capacity(kind.slots().len());
        for slot in kind.slots() {
            let edits = form.images.get(slot.name).cloned().unwrap_or_default();
            let edited = resolve_edits(slot.name, &[], edits)?;
            let max = kind.max_images(slot, &self.gallery);
            plans.push(Reconciler::plan(slot.name, &ImageSet::default(), edited, max)?);
        }

        let id = self.records.create(kind.collection()).await?;
        let target = UploadTarget::new(kind.storage_prefix(), &id);
        let staged = self.stage_all(plans, &target).await?;

        let now = Utc::now().to_rfc3339();
        let mut value = fields;
        for set in &staged {
            value.insert(set.slot().to_string(), images_to_value(set.images())?);
        }
        value.insert("createdAt".to_string(), Value::String(now.clone()));
        value.insert("updatedAt".to_string(), Value::String(now));

        let path = RecordPath::record(kind.collection(), &id);
        if let Err(e) = self.records.write(&path, Value::Object(value.clone())).await {
            log_stranded(&path, &staged);
            return Err(AppError::RecordWrite(e.to_string()));
        }

        let orphaned = self.commit_all(staged).await;
        tracing::info!("{} created: {}", kind.label(), id);

        Ok(SaveResponse {
            record: EntityRecord { id, value },
            orphaned,
        })
    }

    pub async fn update(&self, kind: EntityKind, id: &str, form: EntityForm) -> Result<SaveResponse> {
        let _guard = self.begin(kind, id)?;
        reject_unknown_slots(kind, &form.images)?;

        let existing = self.get(kind, id).await?;
        let fields = submitted_fields(kind, &existing, form.fields)?;

        let mut plans = Vec::with_capacity(form.images.len());
        for slot in kind.slots() {
            let Some(edits) = form.images.get(slot.name) else {
                continue;
            };
            let previous = existing.slot_images(slot.name)?;
            let edited = resolve_edits(slot.name, &previous, edits.clone())?;
            let max = kind.max_images(slot, &self.gallery);
            plans.push(Reconciler::plan(
                slot.name,
                &ImageSet::persisted(previous),
                edited,
                max,
            )?);
        }

        let target = UploadTarget::new(kind.storage_prefix(), id);
        let staged = self.stage_all(plans, &target).await?;

        let mut partial = fields;
        for set in &staged {
            partial.insert(set.slot().to_string(), images_to_value(set.images())?);
        }
        partial.insert("updatedAt".to_string(), Value::String(Utc::now().to_rfc3339()));

        let path = RecordPath::record(kind.collection(), id);
        if let Err(e) = self.records.merge(&path, partial.clone()).await {
            log_stranded(&path, &staged);
            return Err(AppError::RecordWrite(e.to_string()));
        }

        // Superseded images go only once the record no longer points at them
        let orphaned = self.commit_all(staged).await;
        tracing::info!("{} updated: {}", kind.label(), id);

        let mut value = existing.value;
        value.extend(partial);
        Ok(SaveResponse {
            record: EntityRecord {
                id: id.to_string(),
                value,
            },
            orphaned,
        })
    }

    /// Release every image of the entity, then remove the record
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<DeleteReport> {
        let _guard = self.begin(kind, id)?;
        let existing = self.get(kind, id).await?;
        let images = existing.all_images(kind)?;

        let orphaned = self.reconciler.release(&images).await;

        let path = RecordPath::record(kind.collection(), id);
        self.records
            .delete(&path)
            .await
            .map_err(|e| AppError::RecordWrite(e.to_string()))?;

        tracing::info!(
            "{} deleted: {} ({} image(s) released, {} orphaned)",
            kind.label(),
            id,
            images.len() - orphaned.len(),
            orphaned.len()
        );

        Ok(DeleteReport {
            id: id.to_string(),
            released: images.len() - orphaned.len(),
            orphaned,
        })
    }

    /// Live list of a kind. The callback receives the whole list after every change.
    pub async fn subscribe<F>(&self, kind: EntityKind, on_change: F) -> Result<Subscription>
    where
        F: Fn(Vec<EntityRecord>) + Send + Sync + 'static,
    {
        let callback: ChangeCallback = Arc::new(move |value: Option<Value>| {
            match records_from_collection(value) {
                Ok(records) => on_change(records),
                Err(e) => tracing::warn!("Dropping malformed {} update: {}", kind.as_str(), e),
            }
        });
        self.records
            .subscribe(&RecordPath::collection(kind.collection()), callback)
            .await
    }

    fn begin(&self, kind: EntityKind, id: &str) -> Result<InFlight> {
        let key = (kind, id.to_string());
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(key.clone()) {
            return Err(AppError::Conflict(format!(
                "{} {} is already being saved",
                kind.label(),
                id
            )));
        }
        Ok(InFlight {
            key,
            set: self.in_flight.clone(),
        })
    }

    async fn stage_all(
        &self,
        plans: Vec<ReconcilePlan>,
        target: &UploadTarget,
    ) -> Result<Vec<StagedImageSet>> {
        let mut staged: Vec<StagedImageSet> = Vec::with_capacity(plans.len());
        for plan in plans {
            match self.reconciler.stage(plan, target).await {
                Ok(set) => staged.push(set),
                Err(e) => {
                    let stranded: Vec<&String> = staged.iter().flat_map(|s| s.uploaded()).collect();
                    if !stranded.is_empty() {
                        tracing::warn!(
                            "Leaving uploads of {} orphaned after a failed stage: {:?}",
                            target.entity_id,
                            stranded
                        );
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(staged)
    }

    async fn commit_all(&self, staged: Vec<StagedImageSet>) -> Vec<String> {
        let mut orphaned = Vec::new();
        for set in staged {
            orphaned.extend(self.reconciler.commit(set).await.orphaned);
        }
        orphaned
    }
}

fn records_from_collection(value: Option<Value>) -> Result<Vec<EntityRecord>> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(id, value)| EntityRecord::from_value(id, value))
            .collect(),
        Some(_) => Err(AppError::Internal("Collection is not an object".to_string())),
    }
}

/// Validate an update against the stored record and keep only the keys the
/// client sent, so omitted fields are not overwritten with defaults
fn submitted_fields(
    kind: EntityKind,
    existing: &EntityRecord,
    fields: Value,
) -> Result<Map<String, Value>> {
    let Value::Object(submitted) = fields else {
        return Err(AppError::BadRequest("Fields must be a JSON object".to_string()));
    };

    let mut combined = existing.value.clone();
    combined.extend(submitted.clone());
    let normalized = kind.normalize_fields(Value::Object(combined))?;

    Ok(normalized
        .into_iter()
        .filter(|(key, _)| submitted.contains_key(key))
        .collect())
}

fn reject_unknown_slots(
    kind: EntityKind,
    images: &HashMap<String, Vec<ImageEdit>>,
) -> Result<()> {
    match images.keys().find(|name| kind.slot(name).is_none()) {
        Some(name) => Err(AppError::BadRequest(format!(
            "{} has no image slot '{}'",
            kind.label(),
            name
        ))),
        None => Ok(()),
    }
}

/// Turn client edits into an image set. Kept images must be persisted on the record.
fn resolve_edits(slot: &str, previous: &[StoredImage], edits: Vec<ImageEdit>) -> Result<ImageSet> {
    edits
        .into_iter()
        .map(|edit| match edit {
            ImageEdit::Add(pending) => Ok(ImageRef::Pending(pending)),
            ImageEdit::Keep(path) => previous
                .iter()
                .find(|image| image.storage_path == path)
                .cloned()
                .map(ImageRef::Persisted)
                .ok_or_else(|| {
                    AppError::BadRequest(format!("Unknown image in '{}': {}", slot, path))
                }),
        })
        .collect()
}

fn images_to_value(images: &[StoredImage]) -> Result<Value> {
    Ok(serde_json::to_value(images)?)
}

fn log_stranded(path: &RecordPath, staged: &[StagedImageSet]) {
    let stranded: Vec<&String> = staged.iter().flat_map(|s| s.uploaded()).collect();
    if !stranded.is_empty() {
        tracing::warn!(
            "Record write for {} failed, leaving uploads orphaned: {:?}",
            path,
            stranded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemoryRecordStore;
    use crate::services::reconcile::ReconcileError;
    use crate::storage::MemoryBlobStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;

    use crate::models::PendingImage;

    struct Fixture {
        records: Arc<MemoryRecordStore>,
        blobs: Arc<MemoryBlobStore>,
        service: EntityService,
    }

    fn fixture() -> Fixture {
        let records = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(MemoryBlobStore::new("mem://blobs"));
        let service = EntityService::new(
            records.clone(),
            Reconciler::new(blobs.clone()),
            GalleryConfig::default(),
        );
        Fixture {
            records,
            blobs,
            service,
        }
    }

    fn add(name: &str) -> ImageEdit {
        ImageEdit::Add(PendingImage::new(name, None, Bytes::from_static(b"img")))
    }

    fn paths(record: &EntityRecord, slot: &str) -> Vec<String> {
        record
            .slot_images(slot)
            .unwrap()
            .into_iter()
            .map(|image| image.storage_path)
            .collect()
    }

    async fn seeded_car(f: &Fixture) -> EntityRecord {
        let form = EntityForm::new(json!({ "title": "Phantom" }))
            .with_images("img", vec![add("cover.jpg")])
            .with_images("images", vec![add("a.jpg"), add("b.jpg")]);
        f.service.create(EntityKind::Car, form).await.unwrap().record
    }

    #[tokio::test]
    async fn create_uploads_every_slot_and_writes_the_record() {
        let f = fixture();
        let record = seeded_car(&f).await;

        assert_eq!(f.blobs.upload_calls(), 3);
        assert_eq!(paths(&record, "img").len(), 1);
        assert_eq!(paths(&record, "images").len(), 2);
        assert!(paths(&record, "images")[0].starts_with(&format!("car_images/{}/images/", record.id)));

        let stored = f.service.get(EntityKind::Car, &record.id).await.unwrap();
        assert_eq!(stored.value["title"], "Phantom");
        assert!(stored.value.contains_key("createdAt"));
        assert_eq!(paths(&stored, "images"), paths(&record, "images"));
    }

    #[tokio::test]
    async fn deals_are_stored_under_the_admin_collection() {
        let f = fixture();
        let saved = f
            .service
            .create(EntityKind::Deal, EntityForm::new(json!({ "name": "Aman Venice" })))
            .await
            .unwrap();

        let raw = f
            .records
            .read(&RecordPath::record("admin/Dealoftehday", &saved.record.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw["name"], "Aman Venice");
        assert_eq!(f.service.list(EntityKind::Deal).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_with_too_many_images_makes_no_calls() {
        let f = fixture();
        let form = EntityForm::new(json!({ "name": "Global 7500" }))
            .with_images("images", (0..5).map(|i| add(&format!("{}.jpg", i))).collect());

        let err = f.service.create(EntityKind::Aircraft, form).await.unwrap_err();
        assert_matches!(err, AppError::Reconcile(ReconcileError::TooManyImages { max: 4, .. }));
        assert_eq!(f.blobs.upload_calls(), 0);
        assert!(f.service.list(EntityKind::Aircraft).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_unknown_slot_and_kept_images() {
        let f = fixture();
        let form = EntityForm::new(json!({ "name": "Ana", "message": "Superb" }))
            .with_images("gallery", vec![add("a.jpg")]);
        assert_matches!(
            f.service.create(EntityKind::Testimonial, form).await,
            Err(AppError::BadRequest(_))
        );

        let form = EntityForm::new(json!({ "name": "Ana", "message": "Superb" }))
            .with_images("imageUrl", vec![ImageEdit::Keep("elsewhere/x.jpg".to_string())]);
        assert_matches!(
            f.service.create(EntityKind::Testimonial, form).await,
            Err(AppError::BadRequest(_))
        );
        assert_eq!(f.blobs.upload_calls(), 0);
    }

    #[tokio::test]
    async fn update_reorders_and_deletes_after_the_write() {
        let f = fixture();
        let record = seeded_car(&f).await;
        let gallery = paths(&record, "images");
        let cover = paths(&record, "img");

        let form = EntityForm::new(json!({ "title": "Phantom VIII" })).with_images(
            "images",
            vec![add("c.jpg"), ImageEdit::Keep(gallery[1].clone())],
        );
        let saved = f.service.update(EntityKind::Car, &record.id, form).await.unwrap();

        let updated = paths(&saved.record, "images");
        assert_eq!(updated.len(), 2);
        assert!(updated[0].ends_with("_0_c.jpg"));
        assert_eq!(updated[1], gallery[1]);
        // Unsubmitted slot is untouched
        assert_eq!(paths(&saved.record, "img"), cover);
        assert!(!f.blobs.paths().contains(&gallery[0]));
        assert!(saved.orphaned.is_empty());

        let stored = f.service.get(EntityKind::Car, &record.id).await.unwrap();
        assert_eq!(stored.value["title"], "Phantom VIII");
        assert_eq!(paths(&stored, "images"), updated);
    }

    #[tokio::test]
    async fn update_keeps_fields_the_client_did_not_send() {
        let f = fixture();
        let form = EntityForm::new(json!({ "title": "Phantom", "price": "9000", "pax": "4" }));
        let record = f.service.create(EntityKind::Car, form).await.unwrap().record;

        let form = EntityForm::new(json!({ "title": "Phantom VIII" }));
        let saved = f.service.update(EntityKind::Car, &record.id, form).await.unwrap();
        assert_eq!(saved.record.value["price"], "9000");

        let stored = f.service.get(EntityKind::Car, &record.id).await.unwrap();
        assert_eq!(stored.value["title"], "Phantom VIII");
        assert_eq!(stored.value["price"], "9000");
        assert_eq!(stored.value["pax"], "4");

        // A required field may be omitted when the record already has it
        let form = EntityForm::new(json!({ "pax": "6" }));
        f.service.update(EntityKind::Car, &record.id, form).await.unwrap();
        let stored = f.service.get(EntityKind::Car, &record.id).await.unwrap();
        assert_eq!(stored.value["title"], "Phantom VIII");
        assert_eq!(stored.value["pax"], "6");

        let form = EntityForm::new(json!({ "title": " " }));
        assert_matches!(
            f.service.update(EntityKind::Car, &record.id, form).await,
            Err(AppError::BadRequest(_))
        );
    }

    #[tokio::test]
    async fn cover_and_gallery_with_same_file_name_stay_separate() {
        let f = fixture();
        let form = EntityForm::new(json!({ "title": "Cullinan" }))
            .with_images("img", vec![add("photo.jpg")])
            .with_images("images", vec![add("photo.jpg")]);
        let record = f.service.create(EntityKind::Car, form).await.unwrap().record;

        let cover = paths(&record, "img");
        let gallery = paths(&record, "images");
        assert_ne!(cover, gallery);
        assert_eq!(f.blobs.paths().len(), 2);

        let form = EntityForm::new(json!({})).with_images("images", Vec::new());
        f.service.update(EntityKind::Car, &record.id, form).await.unwrap();

        let stored = f.service.get(EntityKind::Car, &record.id).await.unwrap();
        assert_eq!(paths(&stored, "img"), cover);
        assert!(paths(&stored, "images").is_empty());
        assert_eq!(f.blobs.paths(), cover);
    }

    #[tokio::test]
    async fn failed_upload_leaves_record_untouched() {
        let f = fixture();
        let record = seeded_car(&f).await;
        f.blobs.fail_uploads_matching("broken");

        let seen = Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        let _subscription = f
            .records
            .subscribe(
                &RecordPath::record("cars", &record.id),
                Arc::new(move |_: Option<Value>| *counter.lock().unwrap() += 1),
            )
            .await
            .unwrap();

        let form = EntityForm::new(json!({ "title": "Changed" }))
            .with_images("images", vec![add("fine.jpg"), add("broken.jpg")]);
        let err = f.service.update(EntityKind::Car, &record.id, form).await.unwrap_err();

        assert_matches!(err, AppError::Reconcile(ReconcileError::UploadFailed { .. }));
        // Only the immediate delivery on subscribe
        assert_eq!(*seen.lock().unwrap(), 1);
        let stored = f.service.get(EntityKind::Car, &record.id).await.unwrap();
        assert_eq!(stored.value["title"], "Phantom");
        assert_eq!(paths(&stored, "images"), paths(&record, "images"));
        assert_eq!(f.blobs.delete_calls(), 0);
    }

    #[tokio::test]
    async fn update_rejects_images_not_on_the_record() {
        let f = fixture();
        let record = seeded_car(&f).await;

        let form = EntityForm::new(json!({ "title": "Phantom" }))
            .with_images("images", vec![ImageEdit::Keep("car_images/other/1_0_x.jpg".to_string())]);
        assert_matches!(
            f.service.update(EntityKind::Car, &record.id, form).await,
            Err(AppError::BadRequest(_))
        );
    }

    #[tokio::test]
    async fn update_of_missing_entity_is_not_found() {
        let f = fixture();
        let form = EntityForm::new(json!({ "title": "Ghost" }));
        assert_matches!(
            f.service.update(EntityKind::Car, "nope", form).await,
            Err(AppError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn delete_releases_images_then_removes_record() {
        let f = fixture();
        let record = seeded_car(&f).await;
        let cover = paths(&record, "img");
        f.blobs.fail_deletes_matching("cover.jpg");

        let report = f.service.delete(EntityKind::Car, &record.id).await.unwrap();

        assert_eq!(report.released, 2);
        assert_eq!(report.orphaned, cover.clone());
        assert_eq!(f.blobs.paths(), cover);
        assert_matches!(
            f.service.get(EntityKind::Car, &record.id).await,
            Err(AppError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn concurrent_save_of_same_entity_conflicts() {
        let f = fixture();
        let busy = f.service.begin(EntityKind::Yacht, "y1").unwrap();

        assert_matches!(
            f.service.delete(EntityKind::Yacht, "y1").await,
            Err(AppError::Conflict(_))
        );
        assert!(f.service.begin(EntityKind::Yacht, "y2").is_ok());
        drop(busy);
        assert!(f.service.begin(EntityKind::Yacht, "y1").is_ok());
    }

    #[tokio::test]
    async fn subscribe_delivers_the_current_list() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = f
            .service
            .subscribe(EntityKind::Car, move |records| {
                sink.lock().unwrap().push(records.len())
            })
            .await
            .unwrap();

        seeded_car(&f).await;
        assert_eq!(seen.lock().unwrap().as_slice(), &[0, 1]);
    }

    /// Record store whose writes always fail
    struct ReadOnlyStore(MemoryRecordStore);

    #[async_trait]
    impl RecordStore for ReadOnlyStore {
        async fn create(&self, collection: &str) -> Result<String> {
            self.0.create(collection).await
        }
        async fn write(&self, _: &RecordPath, _: Value) -> Result<()> {
            Err(AppError::Internal("read-only".to_string()))
        }
        async fn merge(&self, _: &RecordPath, _: Map<String, Value>) -> Result<()> {
            Err(AppError::Internal("read-only".to_string()))
        }
        async fn read(&self, path: &RecordPath) -> Result<Option<Value>> {
            self.0.read(path).await
        }
        async fn delete(&self, path: &RecordPath) -> Result<()> {
            self.0.delete(path).await
        }
        async fn subscribe(&self, path: &RecordPath, cb: ChangeCallback) -> Result<Subscription> {
            self.0.subscribe(path, cb).await
        }
        fn backend_name(&self) -> &'static str {
            "read-only"
        }
    }

    #[tokio::test]
    async fn failed_record_write_surfaces_and_deletes_nothing() {
        let blobs = Arc::new(MemoryBlobStore::new("mem://blobs"));
        let service = EntityService::new(
            Arc::new(ReadOnlyStore(MemoryRecordStore::new())),
            Reconciler::new(blobs.clone()),
            GalleryConfig::default(),
        );

        let form = EntityForm::new(json!({ "title": "Phantom" }))
            .with_images("images", vec![add("a.jpg")]);
        let err = service.create(EntityKind::Car, form).await.unwrap_err();

        assert_matches!(err, AppError::RecordWrite(_));
        assert_eq!(blobs.upload_calls(), 1);
        assert_eq!(blobs.delete_calls(), 0);
        assert_eq!(blobs.paths().len(), 1);
    }
}
