pub mod category;
pub mod photo;
pub mod settings;
