//! Typed operations over the SQLite tables. Every query is scoped to one user.

pub mod catalog;
pub mod chat_log;
pub mod profiles;
pub mod shortlist;
pub mod todos;
