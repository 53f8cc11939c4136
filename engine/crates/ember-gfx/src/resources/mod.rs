pub mod buffer_desc;
pub mod factory;
pub mod image_desc;
