pub mod command;
pub mod conversation;
pub mod event;
pub mod user;
