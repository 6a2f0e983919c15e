//! Port handshake between neighboring nodes.
//!
//! Every directed edge between two nodes is a [`Pipe`]. The writing node
//! announces a value with `begin_write`, the reading node announces intent
//! with `begin_read`, and once both are outstanding the reader's `read`
//! moves the value and clears both sides in one call. The writer learns of
//! the completion through [`Pipe::take_completion`] when it settles.
//!
//! The [`Ports`] trait is how a node reaches its pipes; whoever owns the
//! grid implements it. [`LocalPorts`] is a self-contained implementation for
//! driving a single node.

use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::operand::Port;

/// Two-phase read/write capability of a target.
///
/// `begin_*` calls are announcements and are idempotent. `can_transfer`
/// has no side effects. `read` may only follow a `can_transfer` that
/// returned `true`.
pub trait TargetInterface {
    /// Announces that this side wants a value.
    fn begin_read(&mut self);
    /// Whether a read is announced and not yet completed.
    fn is_reading(&self) -> bool;
    /// Whether a value can move right now.
    fn can_transfer(&self) -> bool;
    /// Takes the value, completing the transfer on both sides.
    fn read(&mut self) -> Result<i16, Fault>;
    /// Announces `value`. Returns `true` when the write is accepted
    /// immediately, `false` when it waits for a reader.
    fn begin_write(&mut self, value: i16) -> bool;
    /// Whether a write is announced and not yet taken.
    fn is_writing(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    #[default]
    Idle,
    Pending(i16),
    /// Value taken by the reader; the writer has not settled yet.
    Complete,
}

/// One-directional handshake cell from a writing node to a reading node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Pipe {
    write: WriteState,
    reading: bool,
}

impl Pipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value announced by the writer and not yet taken.
    pub fn pending_value(&self) -> Option<i16> {
        match self.write {
            WriteState::Pending(value) => Some(value),
            _ => None,
        }
    }

    /// Whether a reader took the value and the writer has not settled yet.
    pub fn is_complete(&self) -> bool {
        self.write == WriteState::Complete
    }

    /// Consumes a completed transfer on the writer's behalf.
    pub fn take_completion(&mut self) -> bool {
        if self.is_complete() {
            self.write = WriteState::Idle;
            true
        } else {
            false
        }
    }

    /// Withdraws the reader's announcement. A completed transfer is kept.
    pub fn cancel_read(&mut self) {
        self.reading = false;
    }

    /// Withdraws the writer's announcement or completion.
    pub fn cancel_write(&mut self) {
        self.write = WriteState::Idle;
    }
}

impl TargetInterface for Pipe {
    fn begin_read(&mut self) {
        self.reading = true;
    }

    fn is_reading(&self) -> bool {
        self.reading
    }

    fn can_transfer(&self) -> bool {
        self.reading && matches!(self.write, WriteState::Pending(_))
    }

    fn read(&mut self) -> Result<i16, Fault> {
        match (self.reading, self.write) {
            (true, WriteState::Pending(value)) => {
                self.reading = false;
                self.write = WriteState::Complete;
                Ok(value)
            }
            _ => Err(Fault::InvariantViolation {
                reason: "pipe read without a matched write",
            }),
        }
    }

    fn begin_write(&mut self, value: i16) -> bool {
        if self.write == WriteState::Idle {
            self.write = WriteState::Pending(value);
        }
        false
    }

    fn is_writing(&self) -> bool {
        matches!(self.write, WriteState::Pending(_))
    }
}

/// Access to the pipes wired to one node.
///
/// `None` means nothing is attached on that face; transfers through it never
/// complete.
pub trait Ports {
    /// Pipe carrying values from the neighbor on `port` into this node.
    fn incoming(&mut self, port: Port) -> Option<&mut Pipe>;
    /// Pipe carrying values from this node to the neighbor on `port`.
    fn outgoing(&mut self, port: Port) -> Option<&mut Pipe>;
}

/// Pipes owned outright by a single node.
///
/// The far ends are not another node: callers play the neighbor by driving
/// the pipes directly.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocalPorts {
    incoming: [Option<Pipe>; 4],
    outgoing: [Option<Pipe>; 4],
}

impl LocalPorts {
    /// No face wired.
    pub fn unwired() -> Self {
        Self::default()
    }

    /// Every face wired.
    pub fn wired() -> Self {
        let mut ports = Self::default();
        for port in Port::SCAN_ORDER {
            ports.wire(port);
        }
        ports
    }

    /// Attaches fresh pipes in both directions on `port`.
    pub fn wire(&mut self, port: Port) {
        self.incoming[port.index()] = Some(Pipe::new());
        self.outgoing[port.index()] = Some(Pipe::new());
    }
}

impl Ports for LocalPorts {
    fn incoming(&mut self, port: Port) -> Option<&mut Pipe> {
        self.incoming[port.index()].as_mut()
    }

    fn outgoing(&mut self, port: Port) -> Option<&mut Pipe> {
        self.outgoing[port.index()].as_mut()
    }
}

/// A resolved target as seen by one instruction.
pub(crate) enum Endpoint<'a> {
    Register(&'a mut i16),
    Nil,
    Pipe(&'a mut Pipe),
    /// A port with nothing attached.
    Unwired,
}

impl TargetInterface for Endpoint<'_> {
    fn begin_read(&mut self) {
        if let Endpoint::Pipe(pipe) = self {
            pipe.begin_read();
        }
    }

    fn is_reading(&self) -> bool {
        match self {
            Endpoint::Pipe(pipe) => pipe.is_reading(),
            _ => false,
        }
    }

    fn can_transfer(&self) -> bool {
        match self {
            Endpoint::Register(_) | Endpoint::Nil => true,
            Endpoint::Pipe(pipe) => pipe.can_transfer(),
            Endpoint::Unwired => false,
        }
    }

    fn read(&mut self) -> Result<i16, Fault> {
        match self {
            Endpoint::Register(value) => Ok(**value),
            Endpoint::Nil => Ok(0),
            Endpoint::Pipe(pipe) => pipe.read(),
            Endpoint::Unwired => Err(Fault::InvariantViolation {
                reason: "read from an unwired port",
            }),
        }
    }

    fn begin_write(&mut self, value: i16) -> bool {
        match self {
            Endpoint::Register(slot) => {
                **slot = value;
                true
            }
            Endpoint::Nil => true,
            Endpoint::Pipe(pipe) => pipe.begin_write(value),
            Endpoint::Unwired => false,
        }
    }

    fn is_writing(&self) -> bool {
        match self {
            Endpoint::Pipe(pipe) => pipe.is_writing(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_needs_both_sides() {
        let mut pipe = Pipe::new();
        assert!(!pipe.can_transfer());

        pipe.begin_read();
        assert!(pipe.is_reading());
        assert!(!pipe.can_transfer());

        pipe.begin_write(9);
        assert!(pipe.is_writing());
        assert!(pipe.can_transfer());
    }

    #[test]
    fn read_clears_both_sides_at_once() {
        let mut pipe = Pipe::new();
        pipe.begin_write(-4);
        pipe.begin_read();

        assert_eq!(pipe.read().unwrap(), -4);
        assert!(!pipe.is_reading());
        assert!(!pipe.is_writing());
        assert!(pipe.is_complete());
        assert!(!pipe.can_transfer());
    }

    #[test]
    fn second_read_is_an_invariant_violation() {
        let mut pipe = Pipe::new();
        pipe.begin_write(1);
        pipe.begin_read();
        pipe.read().unwrap();
        assert!(matches!(
            pipe.read(),
            Err(Fault::InvariantViolation { .. })
        ));
    }

    #[test]
    fn begin_write_is_idempotent() {
        let mut pipe = Pipe::new();
        assert!(!pipe.begin_write(1));
        assert!(!pipe.begin_write(2));
        assert_eq!(pipe.pending_value(), Some(1));
    }

    #[test]
    fn completion_is_taken_once() {
        let mut pipe = Pipe::new();
        pipe.begin_write(3);
        pipe.begin_read();
        pipe.read().unwrap();

        assert!(pipe.take_completion());
        assert!(!pipe.take_completion());
        assert_eq!(pipe, Pipe::new());
    }

    #[test]
    fn cancel_read_keeps_completion() {
        let mut pipe = Pipe::new();
        pipe.begin_write(3);
        pipe.begin_read();
        pipe.read().unwrap();
        pipe.cancel_read();
        assert!(pipe.is_complete());

        pipe.cancel_write();
        assert!(!pipe.is_complete());
    }

    #[test]
    fn register_endpoint_reads_and_writes_immediately() {
        let mut acc = 5;
        let mut endpoint = Endpoint::Register(&mut acc);
        assert!(endpoint.can_transfer());
        assert_eq!(endpoint.read().unwrap(), 5);
        assert!(endpoint.begin_write(8));
        assert_eq!(acc, 8);
    }

    #[test]
    fn nil_endpoint_discards_and_reads_zero() {
        let mut endpoint = Endpoint::Nil;
        assert!(endpoint.begin_write(77));
        assert!(endpoint.can_transfer());
        assert_eq!(endpoint.read().unwrap(), 0);
    }

    #[test]
    fn unwired_endpoint_never_transfers() {
        let mut endpoint = Endpoint::Unwired;
        endpoint.begin_read();
        assert!(!endpoint.can_transfer());
        assert!(!endpoint.begin_write(1));
        assert!(endpoint.read().is_err());
    }

    #[test]
    fn local_ports_wiring() {
        let mut ports = LocalPorts::unwired();
        assert!(ports.incoming(Port::Left).is_none());

        ports.wire(Port::Left);
        assert!(ports.incoming(Port::Left).is_some());
        assert!(ports.outgoing(Port::Left).is_some());
        assert!(ports.outgoing(Port::Up).is_none());

        let mut ports = LocalPorts::wired();
        for port in Port::SCAN_ORDER {
            assert!(ports.incoming(port).is_some());
        }
    }
}
