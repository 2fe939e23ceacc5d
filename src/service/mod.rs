pub mod account_service;
pub mod chat_service;
pub mod command_executor;
pub mod conversation_service;
pub mod event_service;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod rate_limit;
