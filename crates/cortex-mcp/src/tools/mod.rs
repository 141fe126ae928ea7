//! Tool handlers. The tool surface is deliberately thin: one primary tool
//! (`process_request`) that drives the whole cognitive pipeline, plus two
//! read-only introspection tools for an operator who needs tier health
//! without going through the chat loop.

pub mod introspection;
pub mod process;
