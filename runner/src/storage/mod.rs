//! Settings and on-disk runtime layout

pub mod layout;
pub mod settings;
