//! Per-node execution.
//!
//! A [`Machine`] owns its registers, program counter and the program it runs.
//! It never touches another node directly: everything crossing a node
//! boundary goes through the [`Ports`] passed into [`Machine::step`].
//!
//! The word is a 16-bit signed integer and all arithmetic wraps.

mod context;

pub use context::Context;

use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::operand::Port;
use crate::virtual_machine::port::Ports;
use crate::virtual_machine::program::Program;
use crate::{debug, error};
use std::sync::Arc;

/// Register file and program counter of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineState {
    pub(crate) acc: i16,
    pub(crate) bak: i16,
    pub(crate) pc: usize,
    /// Port chosen by the latest `ANY` resolution.
    pub(crate) last: Option<Port>,
    /// Outgoing port holding a write that no reader has taken yet.
    pub(crate) pending_write: Option<Port>,
}

impl MachineState {
    pub fn acc(&self) -> i16 {
        self.acc
    }

    pub fn bak(&self) -> i16 {
        self.bak
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn last(&self) -> Option<Port> {
        self.last
    }

    pub fn pending_write(&self) -> Option<Port> {
        self.pending_write
    }
}

/// Coarse execution status for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// No program loaded.
    Idle,
    Running,
    /// The last step stalled on a port transfer.
    Blocked,
    Faulted(Fault),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => f.pad("idle"),
            Status::Running => f.pad("running"),
            Status::Blocked => f.pad("blocked"),
            Status::Faulted(fault) => write!(f, "faulted: {fault}"),
        }
    }
}

/// One execution node.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    program: Option<Arc<Program>>,
    state: MachineState,
    blocked: bool,
    fault: Option<Fault>,
}

impl Machine {
    /// Creates an idle machine with no program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a machine that starts executing `program` at index 0.
    pub fn with_program(program: Arc<Program>) -> Self {
        Self {
            program: Some(program),
            ..Self::default()
        }
    }

    /// Replaces the program and resets the node.
    pub fn load<P: Ports + ?Sized>(&mut self, program: Arc<Program>, ports: &mut P) {
        self.reset(ports);
        debug!("loaded program with {} instruction(s)", program.len());
        self.program = Some(program);
    }

    /// Drops the program and resets the node.
    pub fn unload<P: Ports + ?Sized>(&mut self, ports: &mut P) {
        self.reset(ports);
        self.program = None;
    }

    /// Clears registers, PC and fault, and withdraws every port announcement
    /// this node made. Neighbors are not touched.
    pub fn reset<P: Ports + ?Sized>(&mut self, ports: &mut P) {
        for port in Port::SCAN_ORDER {
            if let Some(pipe) = ports.incoming(port) {
                pipe.cancel_read();
            }
            if let Some(pipe) = ports.outgoing(port) {
                pipe.cancel_write();
            }
        }
        self.state = MachineState::default();
        self.blocked = false;
        self.fault = None;
        debug!("machine reset");
    }

    /// Executes the instruction at PC for one tick.
    ///
    /// Does nothing without a program or after a fault. A write finished by
    /// a neighbor since the previous tick is settled first.
    pub fn step<P: Ports + ?Sized>(&mut self, ports: &mut P) {
        if self.fault.is_some() || self.program.is_none() {
            return;
        }
        self.settle(ports);

        let Some(program) = self.program.as_deref() else {
            return;
        };
        if program.is_empty() {
            self.blocked = false;
            return;
        }
        if self.state.pc >= program.len() {
            self.state.pc = 0;
        }
        let Some(instruction) = program.get(self.state.pc).copied() else {
            return;
        };

        let mut ctx = Context::new(&mut self.state, ports, program);
        let result = instruction.step(&mut ctx);
        self.blocked = ctx.is_stalled();

        if let Err(fault) = result {
            error!("node fault at pc {}: {fault}", self.state.pc);
            self.blocked = false;
            self.fault = Some(fault);
        }
    }

    /// Finishes a port write whose reader has taken the value, advancing PC
    /// past the writing instruction. Returns whether anything completed.
    pub fn settle<P: Ports + ?Sized>(&mut self, ports: &mut P) -> bool {
        if self.fault.is_some() {
            return false;
        }
        let Some(port) = self.state.pending_write else {
            return false;
        };
        if !ports.outgoing(port).is_some_and(|pipe| pipe.take_completion()) {
            return false;
        }

        self.state.pending_write = None;
        self.blocked = false;
        let len = self.program.as_ref().map_or(0, |program| program.len());
        let next = self.state.pc + 1;
        self.state.pc = if next >= len { 0 } else { next };
        true
    }

    pub fn acc(&self) -> i16 {
        self.state.acc
    }

    pub fn bak(&self) -> i16 {
        self.state.bak
    }

    pub fn pc(&self) -> usize {
        self.state.pc
    }

    /// Port `LAST` currently refers to.
    pub fn last(&self) -> Option<Port> {
        self.state.last
    }

    /// The fault that stopped this node, if any.
    pub fn last_error(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// 1-based source line of the instruction at PC.
    pub fn current_line(&self) -> Option<usize> {
        self.program.as_ref()?.line_of(self.state.pc)
    }

    pub fn program(&self) -> Option<&Arc<Program>> {
        self.program.as_ref()
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn status(&self) -> Status {
        if let Some(fault) = &self.fault {
            Status::Faulted(fault.clone())
        } else if self.program.is_none() {
            Status::Idle
        } else if self.blocked {
            Status::Blocked
        } else {
            Status::Running
        }
    }
}
