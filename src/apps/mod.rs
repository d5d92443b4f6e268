pub mod annotation;
pub mod style_transfer;
