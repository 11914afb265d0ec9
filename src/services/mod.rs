//! Service layer: workflow, editing, and persistence logic shared by routes.

pub mod conversation;
pub mod diagram;
pub mod editor;
pub mod generation;
pub mod persistence;
