pub mod categories;
pub mod core;
pub mod ideas;
pub mod main_module;
pub mod notifications;
pub mod security;
pub mod users;
