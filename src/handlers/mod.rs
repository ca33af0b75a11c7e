// src/handlers/mod.rs
pub mod auth;
pub mod chat;
pub mod generate; // 🎨 Assistant chat, visualizer and restyler
pub mod password_reset;
pub mod webhooks; // 🎓 Enrolment provisioning
