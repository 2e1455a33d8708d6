//! Dimensioned values that appear in content records as strings.
//!
//! Content JSON writes physical quantities as `"1 kg"`, `"250 ml"` or
//! `"1 day -23 hours"`. Each type parses to a count of its base unit and
//! prints back out in the base unit.

use std::{fmt, str::FromStr};

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::multispace0,
    combinator::{all_consuming, opt, value},
    error::Error,
    multi::many1,
    number::complete::double,
    sequence::{delimited, preceded},
    Finish, IResult, Parser,
};
use serde_json::Value;
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Mass in grams. Bare numbers are grams.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, PartialOrd, DeserializeFromStr, SerializeDisplay,
)]
pub struct Mass(pub f64);

/// Volume in milliliters. Bare numbers are legacy quarter-liter units.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, PartialOrd, DeserializeFromStr, SerializeDisplay,
)]
pub struct Volume(pub f64);

/// Duration in seconds, one game turn being one second. Parses compound
/// signed expressions like `"+1 day -23 hours 50m"` into their sum.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, PartialOrd, DeserializeFromStr, SerializeDisplay,
)]
pub struct Duration(pub f64);

fn mass_unit(s: &str) -> IResult<&str, f64> {
    alt((
        value(0.001, tag("mg")),
        value(1000.0, tag("kg")),
        value(1.0, tag("g")),
    ))
    .parse(s)
}

fn volume_unit(s: &str) -> IResult<&str, f64> {
    alt((value(1.0, tag("ml")), value(1000.0, tag_no_case("l")))).parse(s)
}

fn duration_unit(s: &str) -> IResult<&str, f64> {
    alt((
        value(1.0, alt((tag("turns"), tag("turn"), tag("t")))),
        value(1.0, alt((tag("seconds"), tag("second"), tag("s")))),
        value(60.0, alt((tag("minutes"), tag("minute"), tag("m")))),
        value(3600.0, alt((tag("hours"), tag("hour"), tag("h")))),
        value(86400.0, alt((tag("days"), tag("day"), tag("d")))),
    ))
    .parse(s)
}

fn own_err(e: Error<&str>) -> Error<String> {
    Error::new(e.input.to_string(), e.code)
}

impl FromStr for Mass {
    type Err = Error<String>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, (n, unit)) = all_consuming((
            preceded(multispace0, double),
            delimited(multispace0, opt(mass_unit), multispace0),
        ))
        .parse(s)
        .finish()
        .map_err(own_err)?;
        Ok(Mass(n * unit.unwrap_or(1.0)))
    }
}

impl FromStr for Volume {
    type Err = Error<String>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, (n, unit)) = all_consuming((
            preceded(multispace0, double),
            delimited(multispace0, opt(volume_unit), multispace0),
        ))
        .parse(s)
        .finish()
        .map_err(own_err)?;
        // The legacy unit for a bare volume number is a quarter liter.
        Ok(Volume(n * unit.unwrap_or(250.0)))
    }
}

impl FromStr for Duration {
    type Err = Error<String>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn term(s: &str) -> IResult<&str, f64> {
            (
                preceded(multispace0, double),
                delimited(multispace0, opt(duration_unit), multispace0),
            )
                .map(|(n, unit)| n * unit.unwrap_or(1.0))
                .parse(s)
        }

        let (_, terms) = all_consuming(many1(term))
            .parse(s)
            .finish()
            .map_err(own_err)?;
        Ok(Duration(terms.into_iter().sum()))
    }
}

fn fmt_scalar(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Mass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} g", fmt_scalar(self.0))
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ml", fmt_scalar(self.0))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} s", fmt_scalar(self.0))
    }
}

/// Read a JSON value as a plain number or a dimensioned string, in base
/// units. This is what field-wise arithmetic on records operates on.
pub fn scalar(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(
            s.parse::<Mass>()
                .map(|m| m.0)
                .or_else(|_| s.parse::<Volume>().map(|v| v.0))
                .or_else(|_| s.parse::<Duration>().map(|d| d.0))
                .ok()?,
        ),
        _ => None,
    }
}

/// Multiply the numeric prefix of a dimensioned string, keeping whatever
/// unit text follows it verbatim: `"1 kg"` × 1.5 → `"1.5 kg"`.
pub fn scale_dimensioned(s: &str, factor: f64) -> Option<String> {
    let (rest, n) = preceded(multispace0::<&str, Error<&str>>, double)
        .parse(s)
        .ok()?;
    Some(format!("{}{}", fmt_scalar(n * factor), rest))
}
