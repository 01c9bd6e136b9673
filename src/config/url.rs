//! Connection URLs: `sqlite::memory:`, `sqlite://relative.db`,
//! `sqlite:///abs/path.db?read_only=true&busy_timeout_ms=500`.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till1, take_while1},
    character::complete::char,
    combinator::{all_consuming, opt},
    multi::separated_list1,
    sequence::{preceded, separated_pair, tuple},
};
use serde_json::Value;

use crate::{
    config::DatabaseConfig,
    error::{Result, RouteError},
};

type Query<'a> = Vec<(&'a str, &'a str)>;

fn scheme(input: &str) -> IResult<&str, &str> {
    alt((tag("sqlite3"), tag("sqlite")))(input)
}

fn location(input: &str) -> IResult<&str, &str> {
    alt((
        tag(":memory:"),
        preceded(tag("//"), take_till1(|c: char| c == '?')),
    ))(input)
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn query_pair(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        take_while1(is_key_char),
        char('='),
        take_while1(|c: char| c != '&'),
    )(input)
}

fn query(input: &str) -> IResult<&str, Query<'_>> {
    preceded(char('?'), separated_list1(char('&'), query_pair))(input)
}

fn connection_url(input: &str) -> IResult<&str, (&str, &str, Option<Query<'_>>)> {
    tuple((scheme, preceded(char(':'), location), opt(query)))(input)
}

fn coerce(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(raw)),
    }
}

pub fn parse(url: &str) -> Result<DatabaseConfig> {
    match all_consuming(connection_url)(url.trim()) {
        Ok((_, (_scheme, name, query))) => Ok(query
            .unwrap_or_default()
            .into_iter()
            .fold(DatabaseConfig::sqlite(name), |config, (key, value)| {
                config.with(key, coerce(value))
            })),
        Err(e) => Err(RouteError::InvalidUrl {
            url: url.to_string(),
            reason: format!("parse error: {e}"),
        }),
    }
}
