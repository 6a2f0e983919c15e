//! Node virtual machine for a lock-step grid.
//!
//! Each node runs a small assembly program against two registers (`ACC` and
//! `BAK`) and talks to its four neighbors only through blocking port
//! transfers. The grid driver steps every node once per tick in a fixed
//! order, which keeps runs reproducible.
//!
//! # Architecture
//!
//! - **Word**: 16-bit signed, all arithmetic wraps
//! - **Targets**: `ACC`, `NIL`, `UP`, `RIGHT`, `DOWN`, `LEFT`, `ANY`, `LAST`
//! - **Transfers**: two-phase handshake; a value moves only when a write and
//!   a read are both announced, and both sides clear together
//! - **Stalls**: an instruction waiting on a port leaves all state untouched
//!   and is retried on the next tick
//!
//! # Modules
//!
//! - [`assembler`]: Tokenizer, emitter registry and two-pass compiler
//! - [`errors`]: Compile diagnostics, runtime faults and grid errors
//! - [`grid`]: Lock-step driver wiring nodes on a rectangle
//! - [`instruction`]: Compiled instructions and their state transitions
//! - [`isa`]: Mnemonic table
//! - [`machine`]: Per-node registers, program counter and `step`
//! - [`operand`]: Ports, targets, sources and literal parsing
//! - [`port`]: Pipe handshake and the `Ports` wiring trait
//! - [`program`]: Immutable compiled program

pub mod assembler;
pub mod errors;
pub mod grid;
pub mod instruction;
pub mod isa;
pub mod machine;
pub mod operand;
pub mod port;
pub mod program;
