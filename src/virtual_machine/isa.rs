//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_mnemonic!`](crate::for_each_mnemonic) macro holds the
//! canonical mnemonic list and invokes a callback macro for code generation,
//! so several modules can derive tables from one definition.
//!
//! This module generates:
//! - The [`Mnemonic`] enum with name lookup and operand shapes
//! - `Instruction::mnemonic` to map a compiled instruction back to its name
//!
//! See [`assembler`](super::assembler) for the emitter registry built from the
//! same table.
//!
//! # Operand shapes
//!
//! - `Nullary`: no operands
//! - `Source`: one target name or integer literal
//! - `Move`: a source, then a target
//! - `Label`: one label name, resolved after every line has been read

use crate::virtual_machine::instruction::Instruction;

/// Invokes a callback macro with the complete mnemonic list.
#[macro_export]
macro_rules! for_each_mnemonic {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Misc
            // =========================
            /// NOP ; no effect
            Nop = "NOP" => Nullary,
            /// HCF ; fault the node
            Hcf = "HCF" => Nullary,
            // =========================
            // Data movement
            // =========================
            /// MOV src, dst ; dst = src
            Mov = "MOV" => Move,
            /// SWP ; exchange ACC and BAK
            Swp = "SWP" => Nullary,
            /// SAV ; BAK = ACC
            Sav = "SAV" => Nullary,
            // =========================
            // Arithmetic
            // =========================
            /// ADD src ; ACC = ACC + src
            Add = "ADD" => Source,
            /// SUB src ; ACC = ACC - src
            Sub = "SUB" => Source,
            /// MUL src ; ACC = ACC * src
            Mul = "MUL" => Source,
            /// NEG ; ACC = -ACC
            Neg = "NEG" => Nullary,
            // =========================
            // Bitwise
            // =========================
            /// NOT ; ACC = !ACC
            Not = "NOT" => Nullary,
            /// AND src ; ACC = ACC & src
            And = "AND" => Source,
            /// OR src ; ACC = ACC | src
            Or = "OR" => Source,
            /// XOR src ; ACC = ACC ^ src
            Xor = "XOR" => Source,
            /// SHL src ; ACC = ACC << src (logical)
            Shl = "SHL" => Source,
            /// SHR src ; ACC = ACC >> src (logical)
            Shr = "SHR" => Source,
            /// ROL src ; rotate ACC left by src mod 16
            Rol = "ROL" => Source,
            /// ROR src ; rotate ACC right by src mod 16
            Ror = "ROR" => Source,
            // =========================
            // Control flow
            // =========================
            /// JMP label ; PC = label
            Jmp = "JMP" => Label,
            /// JEZ label ; if ACC == 0 then PC = label
            Jez = "JEZ" => Label,
            /// JNZ label ; if ACC != 0 then PC = label
            Jnz = "JNZ" => Label,
            /// JGZ label ; if ACC > 0 then PC = label
            Jgz = "JGZ" => Label,
            /// JLZ label ; if ACC < 0 then PC = label
            Jlz = "JLZ" => Label,
            /// JRO src ; PC += src, clamped to the program
            Jro = "JRO" => Source,
        }
    };
}

/// Operand layout of a mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    Nullary,
    Source,
    Move,
    Label,
}

impl OperandShape {
    /// Number of operand tokens the shape consumes.
    pub const fn arity(self) -> usize {
        match self {
            OperandShape::Nullary => 0,
            OperandShape::Source | OperandShape::Label => 1,
            OperandShape::Move => 2,
        }
    }
}

#[macro_export]
macro_rules! define_mnemonics {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $mnemonic:literal => $shape:ident
        ),* $(,)?
    ) => {
        // =========================
        // Mnemonic enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Mnemonic {
            $(
                $(#[$doc])*
                $name,
            )*
        }

        impl Mnemonic {
            /// Every mnemonic, in table order.
            pub const ALL: &'static [Mnemonic] = &[ $( Mnemonic::$name, )* ];

            /// Returns the assembly spelling.
            pub const fn name(&self) -> &'static str {
                match self {
                    $( Mnemonic::$name => $mnemonic, )*
                }
            }

            /// Returns the operand layout.
            pub const fn shape(&self) -> OperandShape {
                match self {
                    $( Mnemonic::$name => OperandShape::$shape, )*
                }
            }

            /// Looks up an upper-case mnemonic.
            pub fn from_name(name: &str) -> Option<Mnemonic> {
                match name {
                    $( $mnemonic => Some(Mnemonic::$name), )*
                    _ => None,
                }
            }
        }

        impl Instruction {
            /// Returns the mnemonic this instruction was compiled from.
            pub const fn mnemonic(&self) -> Mnemonic {
                match self {
                    $( Instruction::$name { .. } => Mnemonic::$name, )*
                }
            }
        }
    };
}

for_each_mnemonic!(define_mnemonics);

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_round_trip() {
        for m in Mnemonic::ALL {
            assert_eq!(Mnemonic::from_name(m.name()), Some(*m));
        }
        assert_eq!(Mnemonic::from_name("mov"), None);
        assert_eq!(Mnemonic::from_name("BAK"), None);
    }

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = Mnemonic::ALL.iter().map(|m| m.name()).collect();
        assert_eq!(names.len(), Mnemonic::ALL.len());
    }

    #[test]
    fn shapes() {
        assert_eq!(Mnemonic::Mov.shape().arity(), 2);
        assert_eq!(Mnemonic::And.shape(), OperandShape::Source);
        assert_eq!(Mnemonic::Jez.shape(), OperandShape::Label);
        assert_eq!(Mnemonic::Swp.shape().arity(), 0);
    }
}
