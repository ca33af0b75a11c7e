// src/services/mod.rs
pub mod mail;
pub mod password;
pub mod prompt_builder;
pub mod tokens;

pub use mail::{LogMailer, Mailer, ResendMailer};
