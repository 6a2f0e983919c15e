use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::machine::MachineState;
use crate::virtual_machine::operand::{Port, Source, Target};
use crate::virtual_machine::port::{Endpoint, Ports, TargetInterface};
use crate::virtual_machine::program::Program;

/// A target after `ANY`/`LAST` have been resolved for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
    Acc,
    Nil,
    Port(Port),
    Immediate(i16),
}

/// Everything one instruction may touch during a single step.
///
/// Borrowed from the machine for the duration of
/// [`Instruction::step`](crate::virtual_machine::instruction::Instruction::step).
pub struct Context<'a, P: Ports + ?Sized> {
    state: &'a mut MachineState,
    ports: &'a mut P,
    program: &'a Program,
    stalled: bool,
}

impl<'a, P: Ports + ?Sized> Context<'a, P> {
    pub(crate) fn new(state: &'a mut MachineState, ports: &'a mut P, program: &'a Program) -> Self {
        Self {
            state,
            ports,
            program,
            stalled: false,
        }
    }

    pub fn state(&self) -> &MachineState {
        self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut MachineState {
        self.state
    }

    /// Source line of the executing instruction, or 0 when out of range.
    pub fn line(&self) -> usize {
        self.program.line_of(self.state.pc).unwrap_or(0)
    }

    /// Whether the instruction gave up for this tick.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub(crate) fn stall(&mut self) {
        self.stalled = true;
    }

    pub(crate) fn advance(&mut self) {
        self.jump(self.state.pc + 1);
    }

    /// Sets PC, wrapping anything past the last instruction to 0.
    pub(crate) fn jump(&mut self, target: usize) {
        self.state.pc = if target >= self.program.len() { 0 } else { target };
    }

    /// Moves PC by `offset`, clamped to the first and last instruction.
    pub(crate) fn jump_relative(&mut self, offset: i16) {
        let last = self.program.len().saturating_sub(1) as i64;
        self.state.pc = (self.state.pc as i64 + offset as i64).clamp(0, last) as usize;
    }

    /// Whether an earlier step left a port write waiting for its reader.
    pub(crate) fn is_writing(&self) -> bool {
        self.state.pending_write.is_some()
    }

    /// Announces a read of `src` and reports where the value can be taken
    /// from, if it is available this tick.
    pub(crate) fn poll_source(&mut self, src: Source) -> Option<Resolved> {
        match src {
            Source::Immediate(value) => Some(Resolved::Immediate(value)),
            Source::Target(target) => self.poll_read(target),
        }
    }

    pub(crate) fn poll_read(&mut self, target: Target) -> Option<Resolved> {
        match target {
            Target::Acc => Some(Resolved::Acc),
            Target::Nil => Some(Resolved::Nil),
            Target::Last => match self.state.last {
                Some(port) => self.poll_port(port),
                None => Some(Resolved::Nil),
            },
            Target::Port(port) => self.poll_port(port),
            Target::Any => self.poll_any(),
        }
    }

    fn poll_port(&mut self, port: Port) -> Option<Resolved> {
        let mut endpoint = self.incoming(port);
        endpoint.begin_read();
        endpoint.can_transfer().then_some(Resolved::Port(port))
    }

    fn poll_any(&mut self) -> Option<Resolved> {
        let writer = Port::SCAN_ORDER
            .into_iter()
            .find(|&port| self.ports.incoming(port).is_some_and(|pipe| pipe.is_writing()));

        let Some(port) = writer else {
            for port in Port::SCAN_ORDER {
                self.incoming(port).begin_read();
            }
            return None;
        };

        self.state.last = Some(port);
        for other in Port::SCAN_ORDER.into_iter().filter(|&p| p != port) {
            if let Some(pipe) = self.ports.incoming(other) {
                pipe.cancel_read();
            }
        }
        self.poll_port(port)
    }

    /// Picks the concrete destination for a write. `None` when `ANY` finds
    /// no neighbor waiting to read.
    pub(crate) fn resolve_destination(&mut self, target: Target) -> Option<Resolved> {
        match target {
            Target::Acc => Some(Resolved::Acc),
            Target::Nil => Some(Resolved::Nil),
            Target::Port(port) => Some(Resolved::Port(port)),
            Target::Last => Some(self.state.last.map_or(Resolved::Nil, Resolved::Port)),
            Target::Any => {
                let port = Port::SCAN_ORDER
                    .into_iter()
                    .find(|&port| self.ports.outgoing(port).is_some_and(|pipe| pipe.is_reading()))?;
                self.state.last = Some(port);
                Some(Resolved::Port(port))
            }
        }
    }

    /// Completes a read that [`poll_source`](Self::poll_source) reported
    /// as available.
    pub(crate) fn take(&mut self, from: Resolved) -> Result<i16, Fault> {
        match from {
            Resolved::Immediate(value) => Ok(value),
            Resolved::Acc => Endpoint::Register(&mut self.state.acc).read(),
            Resolved::Nil => Endpoint::Nil.read(),
            Resolved::Port(port) => self.incoming(port).read(),
        }
    }

    /// Writes `value`. Returns `false` when a port write is left pending for
    /// the neighbor.
    pub(crate) fn send(&mut self, to: Resolved, value: i16) -> Result<bool, Fault> {
        match to {
            Resolved::Acc => Ok(Endpoint::Register(&mut self.state.acc).begin_write(value)),
            Resolved::Nil => Ok(Endpoint::Nil.begin_write(value)),
            Resolved::Port(port) => {
                let accepted = self.outgoing(port).begin_write(value);
                if !accepted {
                    self.state.pending_write = Some(port);
                }
                Ok(accepted)
            }
            Resolved::Immediate(_) => Err(Fault::InvariantViolation {
                reason: "immediate used as a write destination",
            }),
        }
    }

    /// Reads `src` in one go, or `None` if the value has not arrived yet.
    pub(crate) fn receive(&mut self, src: Source) -> Result<Option<i16>, Fault> {
        match self.poll_source(src) {
            Some(from) => self.take(from).map(Some),
            None => Ok(None),
        }
    }

    /// `ACC = op(ACC, src)` and advance, or stall until `src` arrives.
    pub(crate) fn apply(
        &mut self,
        src: Source,
        op: impl FnOnce(i16, i16) -> i16,
    ) -> Result<(), Fault> {
        match self.receive(src)? {
            Some(value) => {
                self.state.acc = op(self.state.acc, value);
                self.advance();
            }
            None => self.stall(),
        }
        Ok(())
    }

    fn incoming(&mut self, port: Port) -> Endpoint<'_> {
        match self.ports.incoming(port) {
            Some(pipe) => Endpoint::Pipe(pipe),
            None => Endpoint::Unwired,
        }
    }

    fn outgoing(&mut self, port: Port) -> Endpoint<'_> {
        match self.ports.outgoing(port) {
            Some(pipe) => Endpoint::Pipe(pipe),
            None => Endpoint::Unwired,
        }
    }
}
