//! Lock-step driver for a rectangle of nodes.
//!
//! Every ordered pair of adjacent nodes shares one [`Pipe`]: node A's
//! outgoing pipe on a face is node B's incoming pipe on the opposite face.
//! Nodes on the border have nothing attached on their outer faces.
//!
//! A tick steps every node once in row-major order, then settles every node
//! so a write taken during the tick is finished on both ends before the next
//! tick starts.

use crate::debug;
use crate::virtual_machine::assembler::{Compiler, CompilerConfig};
use crate::virtual_machine::errors::GridError;
use crate::virtual_machine::machine::Machine;
use crate::virtual_machine::operand::Port;
use crate::virtual_machine::port::{Pipe, Ports};
use crate::virtual_machine::program::Program;
use std::sync::Arc;

/// Grid dimensions and the limits programs are compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    pub compiler: CompilerConfig,
}

impl GridConfig {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            compiler: CompilerConfig::default(),
        }
    }
}

/// Pipe indices of one node, by port.
#[derive(Debug, Clone, Copy, Default)]
struct Wiring {
    incoming: [Option<usize>; 4],
    outgoing: [Option<usize>; 4],
}

/// A node's view of the grid's pipes.
struct NodePorts<'a> {
    pipes: &'a mut [Pipe],
    wiring: &'a Wiring,
}

impl Ports for NodePorts<'_> {
    fn incoming(&mut self, port: Port) -> Option<&mut Pipe> {
        let index = self.wiring.incoming[port.index()]?;
        self.pipes.get_mut(index)
    }

    fn outgoing(&mut self, port: Port) -> Option<&mut Pipe> {
        let index = self.wiring.outgoing[port.index()]?;
        self.pipes.get_mut(index)
    }
}

pub struct Grid {
    config: GridConfig,
    compiler: Compiler,
    nodes: Vec<Machine>,
    pipes: Vec<Pipe>,
    wiring: Vec<Wiring>,
    ticks: u64,
}

impl Grid {
    /// Creates a grid of idle nodes with every adjacent pair wired.
    pub fn new(config: GridConfig) -> Self {
        let count = config.width * config.height;
        let mut wiring = vec![Wiring::default(); count];
        let mut pipes = Vec::new();

        for y in 0..config.height {
            for x in 0..config.width {
                let from = y * config.width + x;
                for port in Port::SCAN_ORDER {
                    let Some(to) = neighbor(&config, x, y, port) else {
                        continue;
                    };
                    wiring[from].outgoing[port.index()] = Some(pipes.len());
                    wiring[to].incoming[port.opposite().index()] = Some(pipes.len());
                    pipes.push(Pipe::new());
                }
            }
        }

        debug!(
            "created {}x{} grid with {} pipe(s)",
            config.width,
            config.height,
            pipes.len()
        );

        Self {
            config,
            compiler: Compiler::with_config(config.compiler),
            nodes: vec![Machine::new(); count],
            pipes,
            wiring,
            ticks: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.config.width
    }

    pub fn height(&self) -> usize {
        self.config.height
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn index(&self, x: usize, y: usize) -> Result<usize, GridError> {
        if x < self.config.width && y < self.config.height {
            Ok(y * self.config.width + x)
        } else {
            Err(GridError::OutOfBounds {
                x,
                y,
                width: self.config.width,
                height: self.config.height,
            })
        }
    }

    fn ports(&mut self, index: usize) -> (&mut Machine, NodePorts<'_>) {
        let ports = NodePorts {
            pipes: &mut self.pipes,
            wiring: &self.wiring[index],
        };
        (&mut self.nodes[index], ports)
    }

    /// Compiles `source` and loads it into node (x, y).
    ///
    /// On a compile error the node keeps running its previous program.
    pub fn load(&mut self, x: usize, y: usize, source: &str) -> Result<(), GridError> {
        self.index(x, y)?;
        let program = self
            .compiler
            .compile(source)
            .map_err(|source| GridError::Compile { x, y, source })?;
        self.load_program(x, y, Arc::new(program))
    }

    /// Loads an already compiled program into node (x, y).
    pub fn load_program(&mut self, x: usize, y: usize, program: Arc<Program>) -> Result<(), GridError> {
        let index = self.index(x, y)?;
        let (node, mut ports) = self.ports(index);
        node.load(program, &mut ports);
        Ok(())
    }

    /// Resets node (x, y) without touching its neighbors.
    pub fn reset(&mut self, x: usize, y: usize) -> Result<(), GridError> {
        let index = self.index(x, y)?;
        let (node, mut ports) = self.ports(index);
        node.reset(&mut ports);
        Ok(())
    }

    /// Resets every node and the tick counter.
    pub fn reset_all(&mut self) {
        for index in 0..self.nodes.len() {
            let (node, mut ports) = self.ports(index);
            node.reset(&mut ports);
        }
        self.ticks = 0;
    }

    /// Advances the whole grid by one tick.
    pub fn tick(&mut self) {
        for index in 0..self.nodes.len() {
            let (node, mut ports) = self.ports(index);
            node.step(&mut ports);
        }
        for index in 0..self.nodes.len() {
            let (node, mut ports) = self.ports(index);
            node.settle(&mut ports);
        }
        self.ticks += 1;
    }

    /// Runs `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    pub fn node(&self, x: usize, y: usize) -> Option<&Machine> {
        let index = self.index(x, y).ok()?;
        self.nodes.get(index)
    }

    /// Nodes in row-major order with their coordinates.
    pub fn nodes(&self) -> impl Iterator<Item = ((usize, usize), &Machine)> {
        let width = self.config.width;
        self.nodes
            .iter()
            .enumerate()
            .map(move |(i, node)| ((i % width, i / width), node))
    }

    /// Pipe delivering values into node (x, y) through `port`.
    pub fn incoming(&self, x: usize, y: usize, port: Port) -> Option<&Pipe> {
        let index = self.index(x, y).ok()?;
        self.pipes.get(self.wiring[index].incoming[port.index()]?)
    }

    /// Pipe carrying values out of node (x, y) through `port`.
    pub fn outgoing(&self, x: usize, y: usize, port: Port) -> Option<&Pipe> {
        let index = self.index(x, y).ok()?;
        self.pipes.get(self.wiring[index].outgoing[port.index()]?)
    }
}

fn neighbor(config: &GridConfig, x: usize, y: usize, port: Port) -> Option<usize> {
    let (nx, ny) = match port {
        Port::Up => (x, y.checked_sub(1)?),
        Port::Right => (x + 1, y),
        Port::Down => (x, y + 1),
        Port::Left => (x.checked_sub(1)?, y),
    };
    (nx < config.width && ny < config.height).then(|| ny * config.width + nx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::errors::AsmError;
    use crate::virtual_machine::port::TargetInterface;

    fn grid(width: usize, height: usize, programs: &[((usize, usize), &str)]) -> Grid {
        let mut grid = Grid::new(GridConfig::new(width, height));
        for &((x, y), source) in programs {
            grid.load(x, y, source).expect("load failed");
        }
        grid
    }

    #[test]
    fn wiring_pairs_opposite_faces() {
        let grid = Grid::new(GridConfig::new(2, 2));
        // 4 adjacent pairs, one pipe per direction
        assert_eq!(grid.pipes.len(), 8);
        assert!(grid.outgoing(0, 0, Port::Up).is_none());
        assert!(grid.outgoing(0, 0, Port::Left).is_none());
        assert!(grid.outgoing(0, 0, Port::Right).is_some());
        assert!(grid.incoming(1, 1, Port::Up).is_some());
        assert!(grid.incoming(5, 5, Port::Up).is_none());
    }

    #[test]
    fn transfer_completes_on_both_ends_in_one_tick() {
        let mut grid = grid(2, 1, &[((0, 0), "MOV 5, RIGHT\nNOP"), ((1, 0), "MOV LEFT, ACC\nNOP")]);
        grid.tick();

        assert_eq!(grid.node(1, 0).unwrap().acc(), 5);
        assert_eq!(grid.node(0, 0).unwrap().pc(), 1);
        assert_eq!(grid.node(1, 0).unwrap().pc(), 1);

        let pipe = grid.outgoing(0, 0, Port::Right).unwrap();
        assert!(!pipe.is_writing());
        assert!(!pipe.is_reading());
        assert!(!pipe.is_complete());
    }

    #[test]
    fn reader_before_writer_takes_two_ticks() {
        let mut grid = grid(
            2,
            1,
            &[((0, 0), "MOV RIGHT, ACC\nNOP"), ((1, 0), "MOV 7, LEFT\nADD 1\nNOP")],
        );
        grid.tick();
        assert_eq!(grid.node(0, 0).unwrap().pc(), 0);
        assert!(grid.node(1, 0).unwrap().is_blocked());

        // the writer settles at the start of its step and goes on to ADD
        grid.tick();
        assert_eq!(grid.node(0, 0).unwrap().acc(), 7);
        assert_eq!(grid.node(1, 0).unwrap().acc(), 1);
        assert_eq!(grid.node(1, 0).unwrap().pc(), 2);
        let pipe = grid.incoming(0, 0, Port::Right).unwrap();
        assert!(!pipe.is_reading() && !pipe.is_writing());
    }

    #[test]
    fn pipeline_accumulates() {
        let mut grid = grid(
            3,
            1,
            &[
                ((0, 0), "MOV 2, RIGHT"),
                ((1, 0), "ADD LEFT\nMOV ACC, RIGHT"),
                ((2, 0), "MOV LEFT, ACC"),
            ],
        );
        grid.run(4);
        assert_eq!(grid.node(2, 0).unwrap().acc(), 4);
        assert_eq!(grid.ticks(), 4);
    }

    #[test]
    fn any_picks_first_writer_in_scan_order() {
        let mut grid = grid(
            3,
            3,
            &[
                ((1, 0), "MOV 1, DOWN"),
                ((0, 1), "MOV 2, RIGHT"),
                ((1, 1), "MOV ANY, ACC\nMOV LAST, ACC"),
            ],
        );
        grid.tick();
        let center = grid.node(1, 1).unwrap();
        assert_eq!(center.acc(), 1);
        assert_eq!(center.last(), Some(Port::Up));

        // LEFT keeps waiting; LAST keeps reading UP
        grid.tick();
        let center = grid.node(1, 1).unwrap();
        assert_eq!(center.acc(), 1);
        assert_eq!(center.last(), Some(Port::Up));
        assert!(grid.node(0, 1).unwrap().is_blocked());
    }

    #[test]
    fn failed_load_keeps_previous_program() {
        let mut grid = grid(1, 1, &[((0, 0), "ADD 1")]);
        let err = grid.load(0, 0, "MOV ACC, NIL extra").unwrap_err();
        match err {
            GridError::Compile { x: 0, y: 0, source } => {
                assert_eq!(source.line, 1);
                assert!(matches!(source.cause, AsmError::ExcessArgument { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        grid.tick();
        assert_eq!(grid.node(0, 0).unwrap().acc(), 1);
    }

    #[test]
    fn out_of_bounds() {
        let mut grid = Grid::new(GridConfig::new(2, 1));
        assert!(matches!(
            grid.load(2, 0, "NOP"),
            Err(GridError::OutOfBounds { x: 2, y: 0, .. })
        ));
        assert!(grid.reset(0, 1).is_err());
        assert!(grid.node(0, 1).is_none());
    }

    #[test]
    fn reset_only_touches_one_node() {
        let mut grid = grid(2, 1, &[((0, 0), "MOV RIGHT, ACC"), ((1, 0), "MOV LEFT, ACC")]);
        grid.tick();
        assert!(grid.incoming(0, 0, Port::Right).unwrap().is_reading());
        assert!(grid.incoming(1, 0, Port::Left).unwrap().is_reading());

        grid.reset(0, 0).unwrap();
        assert!(!grid.incoming(0, 0, Port::Right).unwrap().is_reading());
        assert!(grid.incoming(1, 0, Port::Left).unwrap().is_reading());
    }

    #[test]
    fn reset_all_restarts_the_clock() {
        let mut grid = grid(2, 1, &[((0, 0), "ADD 1"), ((1, 0), "SUB 1")]);
        grid.run(3);
        grid.reset_all();
        assert_eq!(grid.ticks(), 0);
        for (_, node) in grid.nodes() {
            assert_eq!(node.acc(), 0);
            assert!(node.program().is_some());
        }
    }

    #[test]
    fn nodes_iterate_row_major() {
        let grid = Grid::new(GridConfig::new(2, 2));
        let coords: Vec<_> = grid.nodes().map(|(xy, _)| xy).collect();
        assert_eq!(coords, [(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn identical_runs_are_identical() {
        let programs = [
            ((0, 0), "MOV 3, ANY"),
            ((1, 0), "MOV ANY, ACC\nADD 1\nMOV ACC, ANY"),
            ((0, 1), "MOV ANY, ACC"),
            ((1, 1), "MOV ANY, ACC"),
        ];
        let mut a = grid(2, 2, &programs);
        let mut b = grid(2, 2, &programs);
        a.run(25);
        b.run(25);
        for ((_, left), (_, right)) in a.nodes().zip(b.nodes()) {
            assert_eq!(left.state(), right.state());
        }
        assert_eq!(a.pipes, b.pipes);
    }
}
