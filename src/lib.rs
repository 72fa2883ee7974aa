//! KB Mail Triage: knowledge-base-assisted email triage pipeline.

pub mod channels;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod objects;
pub mod pipeline;
pub mod server;
pub mod store;
