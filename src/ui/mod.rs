pub mod card;
pub mod event;
pub mod page;
pub mod render;
