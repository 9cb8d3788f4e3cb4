//! HTTP handlers

pub mod health;
pub mod ingest;
pub mod cache;
pub mod devices;
pub mod alerts;

#[cfg(test)]
mod tests;
