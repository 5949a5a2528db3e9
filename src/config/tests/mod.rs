//! Unit tests for bladedock configuration types.
//!
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults and serialisation
//! - [`validation`] - `ToolConfig` validation
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence

mod helpers;
