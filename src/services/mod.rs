pub mod entity;
pub mod inbox;
pub mod reconcile;

pub use entity::EntityService;
pub use inbox::InboxService;
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler, UploadTarget};
