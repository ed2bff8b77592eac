// src/lib.rs

// On déclare tous nos modules principaux pour les rendre publics et
// utilisables par nos programmes binaires (fanout_engine.rs, interest_admin.rs).
pub mod communication;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod monitoring;
pub mod notify;
pub mod parser;
pub mod queue;
pub mod registry;
