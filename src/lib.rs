//! Template curation: a catalog of video/image templates grouped by
//! category, with duplicate detection, bulk recategorization, import and
//! upload pipelines, and an optimistic drag-and-drop playground.
//!
//! SYSTEM CONTEXT
//! ==============
//! The `curator` CLI opens a Postgres-backed [`store::PgTemplateStore`] (or a
//! [`store::MemoryTemplateStore`] loaded from a JSON snapshot), wraps it in a
//! [`services::accessor::TemplateService`], and drives the services from
//! there.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod services;
pub mod store;
pub mod template;
