//! Literal-anchor scraping of the buy/sell quote out of the feed markup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Anchors {
    /// Marker that precedes the quote block.
    pub section: String,
    /// Column marker; the first occurrence after `section` is buy, the second sell.
    pub column: String,
    /// Text immediately before the number.
    pub value_prefix: String,
}

impl Default for Anchors {
    fn default() -> Self {
        Self {
            section: "BluePromedio".to_owned(),
            column: "colCompraVenta".to_owned(),
            value_prefix: "data-order=\"$ ".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub buy: f64,
    pub sell: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("{0} value not found in feed")]
    Missing(&'static str),
    #[error("{field} value {raw:?} is not numeric")]
    NotNumeric { field: &'static str, raw: String },
    #[error("{0} value is zero")]
    Zero(&'static str),
}

pub fn extract_quote(body: &str, anchors: &Anchors) -> Result<Quote, ExtractError> {
    let section = body.split(anchors.section.as_str()).nth(1).unwrap_or_default();
    let buy = parse_field("buy", column_value(section, anchors, 1))?;
    let sell = parse_field("sell", column_value(section, anchors, 2))?;
    Ok(Quote { buy, sell })
}

fn column_value<'a>(section: &'a str, anchors: &Anchors, index: usize) -> Option<&'a str> {
    section
        .split(anchors.column.as_str())
        .nth(index)?
        .split(anchors.value_prefix.as_str())
        .nth(1)?
        .split('"')
        .next()
}

fn parse_field(field: &'static str, raw: Option<&str>) -> Result<f64, ExtractError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ExtractError::Missing(field))?;
    let value = parse_amount(raw).ok_or_else(|| ExtractError::NotNumeric {
        field,
        raw: raw.to_owned(),
    })?;
    if value.abs() < f64::EPSILON {
        return Err(ExtractError::Zero(field));
    }
    Ok(value)
}

/// Parse a `1.234,56` style amount (dot thousands, comma decimals), rounded to cents.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace('.', "").replace(',', ".");
    let value: f64 = normalized.parse().ok()?;
    value.is_finite().then(|| round2(value))
}

/// Round half away from zero to two decimals.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
