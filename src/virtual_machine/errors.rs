use std::fmt::Write;
use tisvm_derive::Error;

/// Why a single source line failed to assemble.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    /// Mnemonic not present in the compiler's emitter table.
    #[error("unknown instruction '{name}'")]
    UnknownInstruction { name: String },
    /// Fewer operands than the instruction takes.
    #[error("{instruction} expects {expected} argument(s), got {actual}")]
    MissingArgument {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Tokens left over after the last operand.
    #[error("unexpected '{token}' after {instruction} arguments")]
    ExcessArgument {
        instruction: String,
        token: String,
    },
    /// Operand must name a target.
    #[error("expected a target (ACC, NIL, UP, RIGHT, DOWN, LEFT, ANY, LAST), got '{token}'")]
    ExpectedTarget { token: String },
    /// Operand must name a target or be an integer literal.
    #[error("expected a target or an integer, got '{token}'")]
    ExpectedTargetOrInteger { token: String },
    /// Looks numeric but does not parse.
    #[error("invalid integer literal '{token}'")]
    InvalidInteger { token: String },
    /// Parses, but does not fit the 16-bit word.
    #[error("integer '{token}' is out of range ({min}..={max})")]
    IntegerOutOfRange { token: String, min: i32, max: i32 },
    /// Label name is not `[A-Z_][A-Z0-9_]*`.
    #[error("invalid label name '{label}'")]
    InvalidLabel { label: String },
    /// Label defined more than once.
    #[error("duplicate label '{label}'")]
    DuplicateLabel { label: String },
    /// Jump to a label that is never defined.
    #[error("undefined label '{label}'")]
    UndefinedLabel { label: String },
    #[error("program exceeds {max} lines")]
    TooManyLines { max: usize },
    #[error("line exceeds {max} columns")]
    LineTooLong { max: usize },
}

/// A compile failure pinned to its source location.
///
/// `line` and `column` are 1-based. A failed compile yields exactly one
/// diagnostic: the first syntax fault in line order, or, when every line
/// parses, the first unresolved jump.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}:{column}: {cause}")]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub cause: AsmError,
}

impl Diagnostic {
    pub fn new(line: usize, column: usize, cause: AsmError) -> Self {
        Self {
            line,
            column,
            cause,
        }
    }

    /// Human-readable reason, without location.
    pub fn message(&self) -> String {
        self.cause.to_string()
    }

    /// Formats a compiler-style snippet with a caret under the faulty column.
    pub fn render(&self, file: &str, source: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "error: {}", self.cause);
        let _ = writeln!(out, " --> {}:{}:{}", file, self.line, self.column);

        if let Some(raw_line) = source.lines().nth(self.line.saturating_sub(1)) {
            let text = raw_line.trim_end_matches('\r');
            let gutter = self.line.to_string().len();
            let _ = writeln!(out, "{:gutter$} |", "");
            let _ = writeln!(out, "{} | {}", self.line, text);
            let _ = writeln!(
                out,
                "{:gutter$} | {}^",
                "",
                " ".repeat(self.column.saturating_sub(1))
            );
        }

        out
    }
}

/// Why a node stopped executing. Cleared only by a reset or a new program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The program executed `HCF`.
    #[error("halt and catch fire on line {line}")]
    HaltAndCatchFire { line: usize },
    /// Execution reached a state a compiled program cannot produce.
    #[error("invariant violated: {reason}")]
    InvariantViolation { reason: &'static str },
}

/// Errors raised by the grid driver.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("node ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[error("node ({x}, {y}): {source}")]
    Compile {
        x: usize,
        y: usize,
        source: Diagnostic,
    },
    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },
}
