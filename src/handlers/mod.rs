//! Built-in conversion rule kinds
//!
//! Two standalone kinds cover the monkey-patched assertion and stubbing
//! conventions; `any_instance_block` is a dependent kind only ever reached
//! through a winning any-instance stub.

pub mod any_instance_block;
pub mod implicit_assertion;
pub mod method_stub;
