//! Grid of tiny assembly nodes.
//!
//! Provides the node instruction set, the port handshake between neighbors,
//! the assembler and a lock-step grid driver.

pub mod utils;
pub mod virtual_machine;
