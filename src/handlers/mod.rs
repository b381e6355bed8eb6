pub mod blob;
pub mod entity;
pub mod health;
pub mod inbox;
