//! Cross-cutting helpers consumed by both backends and tools.

pub mod deadline;
pub mod json_extract;
pub mod reasoning;
pub mod retry;
