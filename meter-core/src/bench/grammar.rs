//! Parser for bench console lines.
//!
//! ```text
//! regget <C|D>
//! regset <A|B|C|E> <value>      value: decimal or 0x-prefixed hex, 0..=255
//! status
//! help
//! ```

use core::fmt;

use winnow::ascii::{Caseless, dec_uint, hex_uint, space0, space1};
use winnow::combinator::{alt, eof, preceded};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{any, literal};

use crate::coulomb::Register;

/// Parsed bench command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BenchCommand {
    RegGet(Register),
    RegSet(Register, u8),
    Status,
    Help,
}

/// Grammar errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError {
    Empty,
    UnknownCommand,
    ExpectedRegister,
    ExpectedValue,
    ValueOutOfRange(u32),
    TrailingInput,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command"),
            ParseError::UnknownCommand => f.write_str("unknown command"),
            ParseError::ExpectedRegister => f.write_str("expected register letter"),
            ParseError::ExpectedValue => f.write_str("expected value"),
            ParseError::ValueOutOfRange(value) => write!(f, "value {value} exceeds 255"),
            ParseError::TrailingInput => f.write_str("unexpected trailing input"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Keyword {
    RegGet,
    RegSet,
    Status,
    Help,
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<BenchCommand, ParseError> {
    let mut input = line.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let keyword = keyword
        .parse_next(&mut input)
        .map_err(|_: ContextError| ParseError::UnknownCommand)?;

    let command = match keyword {
        Keyword::RegGet => BenchCommand::RegGet(register_arg(&mut input)?),
        Keyword::RegSet => {
            let register = register_arg(&mut input)?;
            let value = value_arg(&mut input)?;
            BenchCommand::RegSet(register, value)
        }
        Keyword::Status => BenchCommand::Status,
        Keyword::Help => BenchCommand::Help,
    };

    (space0, eof)
        .parse_next(&mut input)
        .map_err(|_: ContextError| ParseError::TrailingInput)?;

    Ok(command)
}

fn keyword(input: &mut &str) -> Result<Keyword, ContextError> {
    alt((
        literal(Caseless("regget")).value(Keyword::RegGet),
        literal(Caseless("regset")).value(Keyword::RegSet),
        literal(Caseless("status")).value(Keyword::Status),
        literal(Caseless("help")).value(Keyword::Help),
    ))
    .parse_next(input)
}

fn register_arg(input: &mut &str) -> Result<Register, ParseError> {
    preceded(space1, any.verify_map(Register::from_letter))
        .parse_next(input)
        .map_err(|_: ContextError| ParseError::ExpectedRegister)
}

fn value_arg(input: &mut &str) -> Result<u8, ParseError> {
    let value: u32 = preceded(
        space1,
        alt((
            preceded(literal(Caseless("0x")), hex_uint::<_, u32, _>),
            dec_uint::<_, u32, _>,
        )),
    )
    .parse_next(input)
    .map_err(|_: ContextError| ParseError::ExpectedValue)?;

    u8::try_from(value).map_err(|_| ParseError::ValueOutOfRange(value))
}
