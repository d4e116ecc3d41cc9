pub mod entity;
pub mod fields;
