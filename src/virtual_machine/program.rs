//! Compiled program representation.
//!
//! A [`Program`] is produced once by the assembler and never mutated
//! afterwards. Machines hold it behind an `Arc`, so nodes running the same
//! source can share one instance.

use crate::virtual_machine::instruction::Instruction;
use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// Ordered instruction list with its label table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    /// Compiled instructions in execution order.
    pub(crate) instructions: Vec<Instruction>,
    /// 1-based source line of each instruction, parallel to `instructions`.
    pub(crate) line_numbers: Vec<usize>,
    /// Label name to instruction index. An index equal to `len()` means the
    /// label closes the program and jumps wrap to the start.
    pub(crate) labels: BTreeMap<String, usize>,
}

impl Program {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Source line the instruction at `index` was compiled from.
    pub fn line_of(&self, index: usize) -> Option<usize> {
        self.line_numbers.get(index).copied()
    }

    /// Instruction index a label points at.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().map(|(name, index)| (name.as_str(), *index))
    }
}

/// Listing with one instruction per row, prefixed by index and source line.
impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (instruction, line)) in self
            .instructions
            .iter()
            .zip(&self.line_numbers)
            .enumerate()
        {
            for (name, _) in self.labels().filter(|(_, at)| *at == index) {
                writeln!(f, "{name}:")?;
            }
            writeln!(f, "{index:>3} (line {line:>2})  {instruction}")?;
        }
        for (name, _) in self.labels().filter(|(_, at)| *at == self.len()) {
            writeln!(f, "{name}:")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::operand::Source;

    fn sample() -> Program {
        Program {
            instructions: vec![Instruction::Add(Source::Immediate(1)), Instruction::Jmp(0)],
            line_numbers: vec![2, 3],
            labels: BTreeMap::from([("TOP".to_string(), 0), ("END".to_string(), 2)]),
        }
    }

    #[test]
    fn accessors() {
        let program = sample();
        assert_eq!(program.len(), 2);
        assert!(!program.is_empty());
        assert_eq!(program.get(1), Some(&Instruction::Jmp(0)));
        assert_eq!(program.get(2), None);
        assert_eq!(program.line_of(0), Some(2));
        assert_eq!(program.line_of(5), None);
        assert_eq!(program.label("TOP"), Some(0));
        assert_eq!(program.label("NOPE"), None);
        assert!(Program::default().is_empty());
    }

    #[test]
    fn listing_shows_labels_and_lines() {
        let listing = sample().to_string();
        assert_eq!(
            listing,
            "TOP:\n  0 (line  2)  ADD 1\n  1 (line  3)  JMP 0\nEND:\n"
        );
    }
}
