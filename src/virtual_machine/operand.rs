//! Operand types: ports, targets and instruction sources.
//!
//! Also holds the literal parsers the emitters use. Tokens reach these
//! parsers already upper-cased.

use crate::virtual_machine::errors::AsmError;
use std::fmt::{self, Display};
use std::num::IntErrorKind;

/// Smallest accepted integer literal.
pub const MIN_IMMEDIATE: i32 = i16::MIN as i32;
/// Largest accepted integer literal. Values above `i16::MAX` keep their
/// 16-bit pattern and read back negative.
pub const MAX_IMMEDIATE: i32 = u16::MAX as i32;

/// One of the four faces a node talks through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Port {
    Up,
    Right,
    Down,
    Left,
}

impl Port {
    /// Order in which `ANY` probes the ports.
    pub const SCAN_ORDER: [Port; 4] = [Port::Up, Port::Right, Port::Down, Port::Left];

    /// The face on the neighboring node that pairs with this one.
    pub const fn opposite(self) -> Port {
        match self {
            Port::Up => Port::Down,
            Port::Right => Port::Left,
            Port::Down => Port::Up,
            Port::Left => Port::Right,
        }
    }

    /// Dense index for per-port tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Port::Up => "UP",
            Port::Right => "RIGHT",
            Port::Down => "DOWN",
            Port::Left => "LEFT",
        }
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An addressable read/write endpoint.
///
/// `ANY` and `LAST` are selectors: they name no port themselves and are
/// resolved against the node's state each time they are used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// The accumulator.
    Acc,
    /// Discards writes, reads as zero.
    Nil,
    Port(Port),
    /// First port with a compatible transfer pending.
    Any,
    /// Port picked by the most recent `ANY` resolution; `NIL` before that.
    Last,
}

impl Target {
    pub fn from_name(name: &str) -> Option<Target> {
        Some(match name {
            "ACC" => Target::Acc,
            "NIL" => Target::Nil,
            "UP" => Target::Port(Port::Up),
            "RIGHT" => Target::Port(Port::Right),
            "DOWN" => Target::Port(Port::Down),
            "LEFT" => Target::Port(Port::Left),
            "ANY" => Target::Any,
            "LAST" => Target::Last,
            _ => return None,
        })
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Target::Acc => "ACC",
            Target::Nil => "NIL",
            Target::Port(port) => port.name(),
            Target::Any => "ANY",
            Target::Last => "LAST",
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value operand: a target to read from, or an immediate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    Target(Target),
    Immediate(i16),
}

impl Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Target(target) => target.fmt(f),
            Source::Immediate(value) => write!(f, "{value}"),
        }
    }
}

/// Whether `tok` is shaped like an integer literal (optional sign, then a digit).
pub(crate) fn looks_numeric(tok: &str) -> bool {
    tok.trim_start_matches(['+', '-'])
        .starts_with(|c: char| c.is_ascii_digit())
}

/// Parse a decimal, `0x` hex or `0b` binary literal into a 16-bit word.
pub(crate) fn parse_int(tok: &str) -> Result<i16, AsmError> {
    let (negative, body) = match tok.as_bytes().first() {
        Some(b'-') => (true, &tok[1..]),
        Some(b'+') => (false, &tok[1..]),
        _ => (false, tok),
    };
    let (radix, digits) = if let Some(hex) = body.strip_prefix("0X") {
        (16, hex)
    } else if let Some(bin) = body.strip_prefix("0B") {
        (2, bin)
    } else {
        (10, body)
    };

    // from_str_radix accepts its own sign, which would allow "--5"
    if digits.starts_with(['+', '-']) {
        return Err(AsmError::InvalidInteger {
            token: tok.to_string(),
        });
    }

    let magnitude = i64::from_str_radix(digits, radix).map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => out_of_range(tok),
        _ => AsmError::InvalidInteger {
            token: tok.to_string(),
        },
    })?;
    let value = if negative { -magnitude } else { magnitude };
    if !(MIN_IMMEDIATE as i64..=MAX_IMMEDIATE as i64).contains(&value) {
        return Err(out_of_range(tok));
    }
    Ok(value as u16 as i16)
}

fn out_of_range(tok: &str) -> AsmError {
    AsmError::IntegerOutOfRange {
        token: tok.to_string(),
        min: MIN_IMMEDIATE,
        max: MAX_IMMEDIATE,
    }
}

/// Parse a target name such as `ACC` or `LEFT`.
pub(crate) fn parse_target(tok: &str) -> Result<Target, AsmError> {
    Target::from_name(tok).ok_or_else(|| AsmError::ExpectedTarget {
        token: tok.to_string(),
    })
}

/// Parse a target name or an integer literal.
pub(crate) fn parse_source(tok: &str) -> Result<Source, AsmError> {
    if let Some(target) = Target::from_name(tok) {
        return Ok(Source::Target(target));
    }
    if looks_numeric(tok) {
        return parse_int(tok).map(Source::Immediate);
    }
    Err(AsmError::ExpectedTargetOrInteger {
        token: tok.to_string(),
    })
}

/// Labels are `[A-Z_][A-Z0-9_]*` after upper-casing.
pub(crate) fn is_label_name(tok: &str) -> bool {
    let mut chars = tok.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase() || c == '_')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_decimal() {
        assert_eq!(parse_int("0").unwrap(), 0);
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("-1").unwrap(), -1);
        assert_eq!(parse_int("+7").unwrap(), 7);
        assert_eq!(parse_int("-32768").unwrap(), i16::MIN);
        assert_eq!(parse_int("32767").unwrap(), i16::MAX);
    }

    #[test]
    fn parse_int_wraps_unsigned_range() {
        assert_eq!(parse_int("65535").unwrap(), -1);
        assert_eq!(parse_int("32768").unwrap(), i16::MIN);
        assert_eq!(parse_int("0XFFFF").unwrap(), -1);
    }

    #[test]
    fn parse_int_prefixes() {
        assert_eq!(parse_int("0X1F").unwrap(), 31);
        assert_eq!(parse_int("0B101").unwrap(), 5);
        assert_eq!(parse_int("-0X10").unwrap(), -16);
    }

    #[test]
    fn parse_int_out_of_range() {
        for tok in ["65536", "-32769", "0X10000", "99999999999999999999999"] {
            assert!(
                matches!(parse_int(tok), Err(AsmError::IntegerOutOfRange { .. })),
                "{tok}"
            );
        }
    }

    #[test]
    fn parse_int_malformed() {
        for tok in ["0XZZ", "12A", "0B2", "--5", "-", "0X"] {
            assert!(
                matches!(parse_int(tok), Err(AsmError::InvalidInteger { .. })),
                "{tok}"
            );
        }
    }

    #[test]
    fn parse_target_names() {
        assert_eq!(parse_target("ACC").unwrap(), Target::Acc);
        assert_eq!(parse_target("NIL").unwrap(), Target::Nil);
        assert_eq!(parse_target("LEFT").unwrap(), Target::Port(Port::Left));
        assert_eq!(parse_target("ANY").unwrap(), Target::Any);
        assert_eq!(parse_target("LAST").unwrap(), Target::Last);
        assert!(matches!(
            parse_target("5"),
            Err(AsmError::ExpectedTarget { ref token }) if token == "5"
        ));
        assert!(parse_target("acc").is_err());
    }

    #[test]
    fn parse_source_prefers_targets_then_integers() {
        assert_eq!(parse_source("UP").unwrap(), Source::Target(Target::Port(Port::Up)));
        assert_eq!(parse_source("-3").unwrap(), Source::Immediate(-3));
        assert!(matches!(
            parse_source("BAK"),
            Err(AsmError::ExpectedTargetOrInteger { .. })
        ));
        assert!(matches!(
            parse_source("70000"),
            Err(AsmError::IntegerOutOfRange { .. })
        ));
    }

    #[test]
    fn port_opposites_pair_up() {
        for port in Port::SCAN_ORDER {
            assert_ne!(port.opposite(), port);
            assert_eq!(port.opposite().opposite(), port);
        }
    }

    #[test]
    fn port_indices_are_dense() {
        let mut seen = [false; 4];
        for port in Port::SCAN_ORDER {
            seen[port.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn label_names() {
        assert!(is_label_name("LOOP"));
        assert!(is_label_name("_A1"));
        assert!(!is_label_name("1A"));
        assert!(!is_label_name(""));
        assert!(!is_label_name("A-B"));
    }

    #[test]
    fn display_round_trips_names() {
        assert_eq!(Target::Port(Port::Right).to_string(), "RIGHT");
        assert_eq!(Source::Immediate(-4).to_string(), "-4");
        assert_eq!(Source::Target(Target::Acc).to_string(), "ACC");
    }
}
