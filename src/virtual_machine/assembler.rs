//! Assembly language parser and compiler.
//!
//! Turns program text into a [`Program`]. The [`Compiler`] owns a table of
//! per-mnemonic [`InstructionEmitter`]s; the default table is generated from
//! [`for_each_mnemonic!`](crate::for_each_mnemonic).
//!
//! # Syntax
//!
//! ```text
//! LABEL: INSTRUCTION operand1, operand2  # optional comment
//! ```
//!
//! - Case-insensitive; everything is upper-cased before parsing
//! - A label is `NAME:` at the start of a line and may stand alone
//! - Operands are separated by commas and/or whitespace
//! - Integers are decimal, `0x` hex or `0b` binary
//! - Comments start with `#`
//!
//! # Passes
//!
//! 1. Line pass: every line is tokenized, its label recorded, and its
//!    operands parsed by the mnemonic's emitter.
//! 2. Resolution pass: jump labels are looked up in the label table.
//!
//! Compilation stops at the first diagnostic.

use crate::for_each_mnemonic;
use crate::virtual_machine::errors::{AsmError, Diagnostic};
use crate::virtual_machine::instruction::Instruction;
use crate::virtual_machine::operand::{Source, Target, is_label_name, parse_source, parse_target};
use crate::virtual_machine::program::Program;
use crate::warn;
use std::collections::{BTreeMap, HashMap};

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';

/// Default number of lines a program may span.
pub const DEFAULT_MAX_LINES: usize = 40;
/// Default number of characters per line.
pub const DEFAULT_MAX_COLUMNS: usize = 18;

/// Source size limits. `None` lifts a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerConfig {
    pub max_lines: Option<usize>,
    pub max_columns: Option<usize>,
}

impl CompilerConfig {
    pub const fn unbounded() -> Self {
        Self {
            max_lines: None,
            max_columns: None,
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_lines: Some(DEFAULT_MAX_LINES),
            max_columns: Some(DEFAULT_MAX_COLUMNS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// 1-based column in the line.
    pub column: usize,
}

/// Drops everything from the comment marker on.
fn strip_comment(line: &str) -> &str {
    line.split_once(COMMENT_CHAR).map_or(line, |(code, _)| code)
}

/// Splits an optional leading `NAME:` off the line.
///
/// Returns the label token, the remaining text and the column it starts at.
fn split_label(code: &str) -> (Option<Token<'_>>, &str, usize) {
    match code.split_once(LABEL_SUFFIX) {
        Some((head, rest)) => {
            let column = head.chars().take_while(|c| c.is_whitespace()).count() + 1;
            let label = Token {
                text: head.trim(),
                column,
            };
            (Some(label), rest, head.chars().count() + 2)
        }
        None => (None, code, 1),
    }
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - commas are separators
/// - whitespace-separated tokens
fn tokenize(text: &str, first_column: usize) -> Vec<Token<'_>> {
    let mut out = Vec::with_capacity(4);
    let mut start: Option<(usize, usize)> = None;

    for (column, (i, c)) in (first_column..).zip(text.char_indices()) {
        if c == ',' || c.is_whitespace() {
            if let Some((s, col)) = start.take() {
                out.push(Token {
                    text: &text[s..i],
                    column: col,
                });
            }
        } else if start.is_none() {
            start = Some((i, column));
        }
    }

    if let Some((s, col)) = start {
        out.push(Token {
            text: &text[s..],
            column: col,
        });
    }
    out
}

/// Operand tokens of one instruction, consumed front to back by an emitter.
pub struct Operands<'t, 'a> {
    instruction: &'a str,
    line: usize,
    tokens: &'t [Token<'a>],
    cursor: usize,
    /// Column just past the last token, where a missing operand is reported.
    end_column: usize,
    arity: usize,
}

impl<'t, 'a> Operands<'t, 'a> {
    fn new(head: &Token<'a>, line: usize, tokens: &'t [Token<'a>], arity: usize) -> Self {
        let last = tokens.last().unwrap_or(head);
        Self {
            instruction: head.text,
            line,
            tokens,
            cursor: 0,
            end_column: last.column + last.text.chars().count(),
            arity,
        }
    }

    /// 1-based line being compiled.
    pub fn line(&self) -> usize {
        self.line
    }

    fn next(&mut self) -> Result<Token<'a>, Diagnostic> {
        let Some(token) = self.tokens.get(self.cursor).copied() else {
            return Err(Diagnostic::new(
                self.line,
                self.end_column,
                AsmError::MissingArgument {
                    instruction: self.instruction.to_string(),
                    expected: self.arity,
                    actual: self.tokens.len(),
                },
            ));
        };
        self.cursor += 1;
        Ok(token)
    }

    fn at(&self, token: Token<'_>, cause: AsmError) -> Diagnostic {
        Diagnostic::new(self.line, token.column, cause)
    }

    /// Next operand as a target name.
    pub fn target(&mut self) -> Result<Target, Diagnostic> {
        let token = self.next()?;
        parse_target(token.text).map_err(|cause| self.at(token, cause))
    }

    /// Next operand as a target name or integer literal.
    pub fn source(&mut self) -> Result<Source, Diagnostic> {
        let token = self.next()?;
        parse_source(token.text).map_err(|cause| self.at(token, cause))
    }

    /// Next operand as a label reference; returns the name and its column.
    pub fn label(&mut self) -> Result<(String, usize), Diagnostic> {
        let token = self.next()?;
        if !is_label_name(token.text) {
            return Err(self.at(
                token,
                AsmError::InvalidLabel {
                    label: token.text.to_string(),
                },
            ));
        }
        Ok((token.text.to_string(), token.column))
    }

    /// Fails on the first token no operand consumed.
    pub fn finish(&self) -> Result<(), Diagnostic> {
        match self.tokens.get(self.cursor) {
            Some(token) => Err(self.at(
                *token,
                AsmError::ExcessArgument {
                    instruction: self.instruction.to_string(),
                    token: token.text.to_string(),
                },
            )),
            None => Ok(()),
        }
    }
}

/// Output of an emitter for one line.
#[derive(Debug, Clone)]
pub enum Emitted {
    Ready(Instruction),
    /// Needs the label's index, known only after every line is read.
    Branch {
        build: fn(usize) -> Instruction,
        label: String,
        column: usize,
    },
}

/// Parses the operands of one mnemonic.
pub trait InstructionEmitter: Send + Sync {
    /// Number of operands the mnemonic takes.
    fn arity(&self) -> usize;

    /// Consumes operands and produces the instruction. Unconsumed operands
    /// are reported by the compiler afterwards.
    fn emit(&self, operands: &mut Operands<'_, '_>) -> Result<Emitted, Diagnostic>;
}

/// Mnemonic without operands.
pub struct NullaryEmitter(pub Instruction);

impl InstructionEmitter for NullaryEmitter {
    fn arity(&self) -> usize {
        0
    }

    fn emit(&self, _operands: &mut Operands<'_, '_>) -> Result<Emitted, Diagnostic> {
        Ok(Emitted::Ready(self.0))
    }
}

/// Mnemonic taking one target or integer.
pub struct SourceEmitter(pub fn(Source) -> Instruction);

impl InstructionEmitter for SourceEmitter {
    fn arity(&self) -> usize {
        1
    }

    fn emit(&self, operands: &mut Operands<'_, '_>) -> Result<Emitted, Diagnostic> {
        Ok(Emitted::Ready((self.0)(operands.source()?)))
    }
}

/// Mnemonic taking a target or integer followed by a target.
pub struct MoveEmitter(pub fn(Source, Target) -> Instruction);

impl InstructionEmitter for MoveEmitter {
    fn arity(&self) -> usize {
        2
    }

    fn emit(&self, operands: &mut Operands<'_, '_>) -> Result<Emitted, Diagnostic> {
        let src = operands.source()?;
        let dst = operands.target()?;
        Ok(Emitted::Ready((self.0)(src, dst)))
    }
}

/// Mnemonic taking one label.
pub struct BranchEmitter(pub fn(usize) -> Instruction);

impl InstructionEmitter for BranchEmitter {
    fn arity(&self) -> usize {
        1
    }

    fn emit(&self, operands: &mut Operands<'_, '_>) -> Result<Emitted, Diagnostic> {
        let (label, column) = operands.label()?;
        Ok(Emitted::Branch {
            build: self.0,
            label,
            column,
        })
    }
}

/// Assembler with its own emitter table and limits.
///
/// Independent instances share nothing, so compilations may run
/// concurrently.
pub struct Compiler {
    emitters: HashMap<String, Box<dyn InstructionEmitter>>,
    config: CompilerConfig,
}

macro_rules! define_default_emitters {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $mnemonic:literal => $shape:ident
        ),* $(,)?
    ) => {
        impl Compiler {
            /// Registers an emitter for every mnemonic of the ISA.
            fn register_defaults(&mut self) {
                $(
                    self.register($mnemonic, define_default_emitters!(@emitter $shape $name));
                )*
            }
        }
    };

    (@emitter Nullary $name:ident) => { NullaryEmitter(Instruction::$name) };
    (@emitter Source $name:ident)  => { SourceEmitter(Instruction::$name) };
    (@emitter Move $name:ident)    => { MoveEmitter(Instruction::$name) };
    (@emitter Label $name:ident)   => { BranchEmitter(Instruction::$name) };
}

for_each_mnemonic!(define_default_emitters);

impl Compiler {
    /// Compiler for the full instruction set with default limits.
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    /// Compiler for the full instruction set.
    pub fn with_config(config: CompilerConfig) -> Self {
        let mut compiler = Self::empty(config);
        compiler.register_defaults();
        compiler
    }

    /// Compiler that knows no mnemonics.
    pub fn empty(config: CompilerConfig) -> Self {
        Self {
            emitters: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Adds or replaces the emitter for `mnemonic`.
    pub fn register(&mut self, mnemonic: &str, emitter: impl InstructionEmitter + 'static) {
        self.emitters
            .insert(mnemonic.to_ascii_uppercase(), Box::new(emitter));
    }

    /// Compiles program text.
    pub fn compile(&self, source: &str) -> Result<Program, Diagnostic> {
        self.compile_lines(source.lines())
    }

    /// Compiles a program given line by line.
    pub fn compile_lines<I, S>(&self, lines: I) -> Result<Program, Diagnostic>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let result = self.assemble(lines);
        if let Err(diag) = &result {
            warn!("compile failed: {diag}");
        }
        result
    }

    fn check_limits(&self, line_no: usize, line: &str) -> Result<(), Diagnostic> {
        if let Some(max) = self.config.max_lines
            && line_no > max
        {
            return Err(Diagnostic::new(line_no, 1, AsmError::TooManyLines { max }));
        }
        if let Some(max) = self.config.max_columns
            && line.chars().count() > max
        {
            return Err(Diagnostic::new(
                line_no,
                max + 1,
                AsmError::LineTooLong { max },
            ));
        }
        Ok(())
    }

    fn assemble<I, S>(&self, lines: I) -> Result<Program, Diagnostic>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels: BTreeMap<String, usize> = BTreeMap::new();
        // (source line, emitter output)
        let mut parsed: Vec<(usize, Emitted)> = Vec::new();

        // First pass: labels and operands
        for (index, raw) in lines.into_iter().enumerate() {
            let line_no = index + 1;
            let raw = raw.as_ref();
            self.check_limits(line_no, raw)?;

            let upper = raw.to_ascii_uppercase();
            let (label, body, body_column) = split_label(strip_comment(&upper));

            if let Some(label) = label {
                if !is_label_name(label.text) {
                    return Err(Diagnostic::new(
                        line_no,
                        label.column,
                        AsmError::InvalidLabel {
                            label: label.text.to_string(),
                        },
                    ));
                }
                if labels.contains_key(label.text) {
                    return Err(Diagnostic::new(
                        line_no,
                        label.column,
                        AsmError::DuplicateLabel {
                            label: label.text.to_string(),
                        },
                    ));
                }
                labels.insert(label.text.to_string(), parsed.len());
            }

            let tokens = tokenize(body, body_column);
            let Some((head, rest)) = tokens.split_first() else {
                continue;
            };

            let emitter = self.emitters.get(head.text).ok_or_else(|| {
                Diagnostic::new(
                    line_no,
                    head.column,
                    AsmError::UnknownInstruction {
                        name: head.text.to_string(),
                    },
                )
            })?;

            let mut operands = Operands::new(head, line_no, rest, emitter.arity());
            let emitted = emitter.emit(&mut operands)?;
            operands.finish()?;
            parsed.push((line_no, emitted));
        }

        // Second pass: resolve labels
        let mut instructions = Vec::with_capacity(parsed.len());
        let mut line_numbers = Vec::with_capacity(parsed.len());
        for (line_no, emitted) in parsed {
            let instruction = match emitted {
                Emitted::Ready(instruction) => instruction,
                Emitted::Branch {
                    build,
                    label,
                    column,
                } => match labels.get(&label) {
                    Some(&target) => build(target),
                    None => {
                        return Err(Diagnostic::new(
                            line_no,
                            column,
                            AsmError::UndefinedLabel { label },
                        ));
                    }
                },
            };
            instructions.push(instruction);
            line_numbers.push(line_no);
        }

        Ok(Program {
            instructions,
            line_numbers,
            labels,
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles `source` with the default instruction set and limits.
pub fn compile(source: &str) -> Result<Program, Diagnostic> {
    Compiler::new().compile(source)
}
