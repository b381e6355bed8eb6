use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An image that already lives in the blob store.
///
/// The storage path is persisted next to the URL so deletion never has to
/// reverse-engineer a path out of a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub url: String,
    pub storage_path: String,
}

/// A locally selected file that has not been uploaded yet
#[derive(Clone)]
pub struct PendingImage {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl PendingImage {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            data,
        }
    }
}

impl std::fmt::Debug for PendingImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingImage")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// One entry of an image edit buffer
#[derive(Debug, Clone)]
pub enum ImageRef {
    Persisted(StoredImage),
    Pending(PendingImage),
}

impl ImageRef {
    pub fn storage_path(&self) -> Option<&str> {
        match self {
            ImageRef::Persisted(image) => Some(&image.storage_path),
            ImageRef::Pending(_) => None,
        }
    }
}

impl From<StoredImage> for ImageRef {
    fn from(image: StoredImage) -> Self {
        ImageRef::Persisted(image)
    }
}

impl From<PendingImage> for ImageRef {
    fn from(image: PendingImage) -> Self {
        ImageRef::Pending(image)
    }
}

/// Ordered collection of images for one slot of an entity. Index 0 is the cover.
#[derive(Debug, Clone, Default)]
pub struct ImageSet(Vec<ImageRef>);

impl ImageSet {
    #[cfg(test)]
    pub fn new(images: Vec<ImageRef>) -> Self {
        Self(images)
    }

    pub fn persisted(images: impl IntoIterator<Item = StoredImage>) -> Self {
        Self(images.into_iter().map(ImageRef::Persisted).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageRef> {
        self.0.iter()
    }

    #[cfg(test)]
    pub fn push(&mut self, image: impl Into<ImageRef>) {
        self.0.push(image.into());
    }

    /// The persisted entries, in order
    pub fn stored(&self) -> impl Iterator<Item = &StoredImage> {
        self.0.iter().filter_map(|image| match image {
            ImageRef::Persisted(stored) => Some(stored),
            ImageRef::Pending(_) => None,
        })
    }

    pub fn into_inner(self) -> Vec<ImageRef> {
        self.0
    }
}

impl FromIterator<ImageRef> for ImageSet {
    fn from_iter<I: IntoIterator<Item = ImageRef>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One edit instruction as submitted by a client
#[derive(Debug, Clone)]
pub enum ImageEdit {
    /// Keep the persisted image with this storage path
    Keep(String),
    /// Add a new file
    Add(PendingImage),
}
