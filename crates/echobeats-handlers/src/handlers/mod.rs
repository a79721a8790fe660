//! Built-in operation handlers.
//!
//! Each handler is a self-contained module. To add a new handler:
//! 1. Create a new file in this directory
//! 2. Implement the OperationHandler trait
//! 3. Add `pub mod <name>;` here
//! 4. Register it in create_default_registry() in ../lib.rs

pub mod actualize;
pub mod fault;
pub mod integrate;
pub mod trace;
