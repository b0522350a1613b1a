//! ORDER BY specifications and pagination.
//!
//! Order specs are short strings, parsed with nom:
//!
//! ```text
//! -created_at,name          created_at DESC, name ASC
//! name desc, id asc         name DESC, id ASC
//! name:desc                 name DESC
//! ```

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, opt, value},
    multi::separated_list0,
    sequence::{delimited, preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::schema::{Settings, TableSchema};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "ASC"),
            Direction::Desc => write!(f, "DESC"),
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub column: String,
    pub direction: Direction,
}

/// An ordered list of sort keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderSpec {
    items: Vec<OrderItem>,
}

impl OrderSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an order string such as `"-created_at,name"`.
    pub fn parse(input: &str) -> Result<Self, Error> {
        match all_consuming(parse_spec)(input) {
            Ok((_, items)) => Ok(Self { items }),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(Error::order(
                input.len() - e.input.len(),
                format!("unexpected '{}'", e.input),
            )),
            Err(nom::Err::Incomplete(_)) => Err(Error::order(input.len(), "unexpected end of input")),
        }
    }

    pub fn asc(self, column: impl Into<String>) -> Self {
        self.push(column, Direction::Asc)
    }

    pub fn desc(self, column: impl Into<String>) -> Self {
        self.push(column, Direction::Desc)
    }

    pub fn push(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.items.push(OrderItem {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Direction)> for OrderSpec {
    fn from_iter<I: IntoIterator<Item = (S, Direction)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(OrderSpec::new(), |spec, (column, direction)| spec.push(column, direction))
    }
}

impl std::str::FromStr for OrderSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderSpec::parse(s)
    }
}

fn parse_spec(input: &str) -> IResult<&str, Vec<OrderItem>> {
    delimited(
        multispace0,
        separated_list0(delimited(multispace0, char(','), multispace0), parse_item),
        multispace0,
    )(input)
}

fn parse_item(input: &str) -> IResult<&str, OrderItem> {
    let (input, sign) = opt(alt((
        value(Direction::Desc, char('-')),
        value(Direction::Asc, char('+')),
    )))(input)?;
    let (input, column) = parse_identifier(input)?;
    let (input, explicit) = opt(preceded(
        alt((multispace1, map(tuple((multispace0, char(':'), multispace0)), |_| ""))),
        parse_direction,
    ))(input)?;

    Ok((
        input,
        OrderItem {
            column: column.to_string(),
            direction: explicit.or(sign).unwrap_or_default(),
        },
    ))
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

fn parse_direction(input: &str) -> IResult<&str, Direction> {
    alt((
        value(Direction::Desc, tag_no_case("desc")),
        value(Direction::Asc, tag_no_case("asc")),
    ))(input)
}

/// Requested page, as it arrives from a client. Both parts are optional and
/// non-positive values fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Page {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    pub fn resolve(&self, settings: &Settings) -> Pagination {
        let per_page = match self.per_page {
            Some(n) if n > 0 => n as u64,
            _ => settings.default_per_page,
        };
        let per_page = settings.max_per_page.map_or(per_page, |max| per_page.min(max));
        let page = match self.page {
            Some(n) if n > 0 => n as u64,
            _ => 1,
        };
        Pagination {
            limit: per_page,
            offset: (page - 1).saturating_mul(per_page),
        }
    }
}

/// LIMIT/OFFSET derived from a [`Page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
}

impl TableSchema {
    /// `ORDER BY ...` for the columns of `spec` this table knows about.
    ///
    /// Unknown columns are dropped. Returns an empty string when
    /// nothing survives.
    pub fn order_sql(&self, spec: &OrderSpec) -> String {
        let g = self.generator();
        let parts: Vec<String> = spec
            .items()
            .iter()
            .filter(|item| {
                let known = self.column_names().iter().any(|c| *c == item.column);
                if !known {
                    tracing::debug!(table = %self.name(), column = %item.column, "unknown order column; dropped");
                }
                known
            })
            .map(|item| format!("{} {}", g.quote_identifier(&item.column), item.direction))
            .collect();

        if parts.is_empty() {
            String::new()
        } else {
            format!("ORDER BY {}", parts.join(", "))
        }
    }

    /// ` LIMIT n OFFSET m` for `page`, using this table's pagination settings.
    pub fn paginate_sql(&self, page: &Page) -> String {
        let p = page.resolve(self.settings());
        let offset = (p.offset > 0).then_some(p.offset);
        self.generator().limit_offset(Some(p.limit), offset)
    }
}
