//! Compiled instructions and their single-tick state transitions.
//!
//! An [`Instruction`] is immutable and carries no per-node state, so one
//! compiled program can be shared by any number of machines. All mutation
//! goes through the [`Context`] handed to [`Instruction::step`].
//!
//! Every step either completes (registers and PC updated) or stalls (nothing
//! observable changes apart from idempotent port announcements). Only
//! instructions that read from or write to a port can stall.

use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::machine::Context;
use crate::virtual_machine::operand::{Source, Target};
use crate::virtual_machine::port::Ports;
use std::fmt::{self, Display};

/// Width of the machine word in bits.
const WORD_BITS: u16 = i16::BITS as u16;

/// One compiled source line.
///
/// Jump variants hold the resolved instruction index of their label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Instruction {
    Nop,
    Hcf,
    Mov(Source, Target),
    Swp,
    Sav,
    Add(Source),
    Sub(Source),
    Mul(Source),
    Neg,
    Not,
    And(Source),
    Or(Source),
    Xor(Source),
    Shl(Source),
    Shr(Source),
    Rol(Source),
    Ror(Source),
    Jmp(usize),
    Jez(usize),
    Jnz(usize),
    Jgz(usize),
    Jlz(usize),
    Jro(Source),
}

impl Instruction {
    /// Executes one tick of this instruction.
    ///
    /// Returns `Err` only for `HCF` and for states a compiled program cannot
    /// reach.
    pub fn step<P: Ports + ?Sized>(&self, ctx: &mut Context<'_, P>) -> Result<(), Fault> {
        match *self {
            Instruction::Nop => ctx.advance(),
            Instruction::Hcf => {
                return Err(Fault::HaltAndCatchFire { line: ctx.line() });
            }
            Instruction::Mov(src, dst) => op_mov(ctx, src, dst)?,
            Instruction::Swp => {
                let state = ctx.state_mut();
                std::mem::swap(&mut state.acc, &mut state.bak);
                ctx.advance();
            }
            Instruction::Sav => {
                let state = ctx.state_mut();
                state.bak = state.acc;
                ctx.advance();
            }
            Instruction::Add(src) => ctx.apply(src, i16::wrapping_add)?,
            Instruction::Sub(src) => ctx.apply(src, i16::wrapping_sub)?,
            Instruction::Mul(src) => ctx.apply(src, i16::wrapping_mul)?,
            Instruction::Neg => {
                let state = ctx.state_mut();
                state.acc = state.acc.wrapping_neg();
                ctx.advance();
            }
            Instruction::Not => {
                let state = ctx.state_mut();
                state.acc = !state.acc;
                ctx.advance();
            }
            Instruction::And(src) => ctx.apply(src, |acc, v| acc & v)?,
            Instruction::Or(src) => ctx.apply(src, |acc, v| acc | v)?,
            Instruction::Xor(src) => ctx.apply(src, |acc, v| acc ^ v)?,
            Instruction::Shl(src) => ctx.apply(src, shift_left)?,
            Instruction::Shr(src) => ctx.apply(src, shift_right)?,
            Instruction::Rol(src) => ctx.apply(src, |acc, v| {
                (acc as u16).rotate_left(rotation(v)) as i16
            })?,
            Instruction::Ror(src) => ctx.apply(src, |acc, v| {
                (acc as u16).rotate_right(rotation(v)) as i16
            })?,
            Instruction::Jmp(target) => ctx.jump(target),
            Instruction::Jez(target) => op_branch(ctx, target, |acc| acc == 0),
            Instruction::Jnz(target) => op_branch(ctx, target, |acc| acc != 0),
            Instruction::Jgz(target) => op_branch(ctx, target, |acc| acc > 0),
            Instruction::Jlz(target) => op_branch(ctx, target, |acc| acc < 0),
            Instruction::Jro(src) => {
                if let Some(offset) = ctx.receive(src)? {
                    ctx.jump_relative(offset);
                } else {
                    ctx.stall();
                }
            }
        }
        Ok(())
    }
}

/// MOV: read `src`, hand the value to `dst`.
///
/// PC advances only once `dst` has taken the value. A port write that is
/// still waiting is finished by the machine's settle step, not here.
fn op_mov<P: Ports + ?Sized>(
    ctx: &mut Context<'_, P>,
    src: Source,
    dst: Target,
) -> Result<(), Fault> {
    if ctx.is_writing() {
        ctx.stall();
        return Ok(());
    }

    let Some(from) = ctx.poll_source(src) else {
        ctx.stall();
        return Ok(());
    };

    // ANY as a destination needs a reader before the source is consumed
    let Some(to) = ctx.resolve_destination(dst) else {
        ctx.stall();
        return Ok(());
    };

    let value = ctx.take(from)?;
    if ctx.send(to, value)? {
        ctx.advance();
    } else {
        ctx.stall();
    }
    Ok(())
}

fn op_branch<P: Ports + ?Sized>(ctx: &mut Context<'_, P>, target: usize, taken: fn(i16) -> bool) {
    if taken(ctx.state().acc) {
        ctx.jump(target);
    } else {
        ctx.advance();
    }
}

fn shift_left(acc: i16, amount: i16) -> i16 {
    let amount = amount as u16;
    if amount >= WORD_BITS {
        0
    } else {
        ((acc as u16) << amount) as i16
    }
}

fn shift_right(acc: i16, amount: i16) -> i16 {
    let amount = amount as u16;
    if amount >= WORD_BITS {
        0
    } else {
        ((acc as u16) >> amount) as i16
    }
}

fn rotation(amount: i16) -> u32 {
    ((amount as u16) % WORD_BITS) as u32
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.mnemonic().name();
        match self {
            Instruction::Mov(src, dst) => write!(f, "{name} {src}, {dst}"),
            Instruction::Add(src)
            | Instruction::Sub(src)
            | Instruction::Mul(src)
            | Instruction::And(src)
            | Instruction::Or(src)
            | Instruction::Xor(src)
            | Instruction::Shl(src)
            | Instruction::Shr(src)
            | Instruction::Rol(src)
            | Instruction::Ror(src)
            | Instruction::Jro(src) => write!(f, "{name} {src}"),
            Instruction::Jmp(target)
            | Instruction::Jez(target)
            | Instruction::Jnz(target)
            | Instruction::Jgz(target)
            | Instruction::Jlz(target) => write!(f, "{name} {target}"),
            Instruction::Nop
            | Instruction::Hcf
            | Instruction::Swp
            | Instruction::Sav
            | Instruction::Neg
            | Instruction::Not => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::operand::Port;

    #[test]
    fn shifts_are_logical() {
        assert_eq!(shift_left(1, 3), 8);
        assert_eq!(shift_left(0x4000, 1), i16::MIN);
        assert_eq!(shift_right(-1, 15), 1);
        assert_eq!(shift_right(i16::MIN, 1), 0x4000);
    }

    #[test]
    fn shifts_past_word_width_clear() {
        assert_eq!(shift_left(-1, 16), 0);
        assert_eq!(shift_right(-1, 100), 0);
        // negative amounts are huge unsigned amounts
        assert_eq!(shift_left(1, -1), 0);
    }

    #[test]
    fn rotation_wraps_amount() {
        assert_eq!(rotation(17), 1);
        assert_eq!(rotation(16), 0);
        assert_eq!(rotation(-1), 15);
    }

    #[test]
    fn display_matches_source_syntax() {
        assert_eq!(
            Instruction::Mov(Source::Target(Target::Port(Port::Left)), Target::Acc).to_string(),
            "MOV LEFT, ACC"
        );
        assert_eq!(Instruction::Add(Source::Immediate(5)).to_string(), "ADD 5");
        assert_eq!(Instruction::Jmp(3).to_string(), "JMP 3");
        assert_eq!(Instruction::Swp.to_string(), "SWP");
    }
}
