pub mod models;
pub mod registry;
pub mod retry;
pub mod session;
pub mod settings;
pub mod tokens;
