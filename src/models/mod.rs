pub mod entity;
pub mod fleet;
pub mod image;
pub mod inbox;
pub mod record;

pub use entity::*;
pub use image::*;
pub use inbox::*;
pub use record::*;
