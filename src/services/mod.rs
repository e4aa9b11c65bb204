//! Template curation services.
//!
//! ARCHITECTURE
//! ============
//! `accessor` is the only module that talks to a `TemplateStore`; every other
//! service goes through a `TemplateService` so event publication and logging
//! stay in one place. `catalog` and `duplicates` are pure and never write.

pub mod accessor;
pub mod catalog;
pub mod duplicates;
pub mod import;
pub mod playground;
pub mod upload;
