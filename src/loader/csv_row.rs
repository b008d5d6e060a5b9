use serde::Deserialize;
use thiserror::Error;
use time::{macros::format_description, Date, PrimitiveDateTime, Time};

use crate::sales::SalesLine;

/// Headers the feed must carry; checked once before any row is read.
pub const REQUIRED_HEADERS: [&str; 4] = ["OrderID", "OrderDate", "ShipDate", "ProductName"];

/// Cell values the feed uses for "no value".
const MISSING_MARKERS: [&str; 10] = [
    "NaN", "nan", "NA", "N/A", "n/a", "NULL", "null", "None", "#N/A", "<NA>",
];

/// Raw CSV line of the Superstore feed. Unknown columns are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct CsvRow {
    #[serde(rename = "OrderID")]
    pub order_id: Option<String>,
    #[serde(rename = "OrderDate")]
    pub order_date: Option<String>,
    #[serde(rename = "ShipDate")]
    pub ship_date: Option<String>,
    #[serde(rename = "ShipMode", default)]
    pub ship_mode: Option<String>,
    #[serde(rename = "CustomerID", default)]
    pub customer_id: Option<String>,
    #[serde(rename = "CustomerName", default)]
    pub customer_name: Option<String>,
    #[serde(rename = "Segment", default)]
    pub segment: Option<String>,
    #[serde(rename = "Country", default)]
    pub country: Option<String>,
    #[serde(rename = "City", default)]
    pub city: Option<String>,
    #[serde(rename = "State", default)]
    pub state: Option<String>,
    #[serde(rename = "Postal Code", default)]
    pub postal_code: Option<String>,
    #[serde(rename = "Region", default)]
    pub region: Option<String>,
    #[serde(rename = "ProductID", default)]
    pub product_id: Option<String>,
    #[serde(rename = "Category", default)]
    pub category: Option<String>,
    #[serde(rename = "Sub-Category", default)]
    pub sub_category: Option<String>,
    #[serde(rename = "ProductName")]
    pub product_name: Option<String>,
    #[serde(rename = "Sales", default)]
    pub sales: Option<String>,
    #[serde(rename = "Quantity", default)]
    pub quantity: Option<String>,
    #[serde(rename = "Discount", default)]
    pub discount: Option<String>,
    #[serde(rename = "Profit", default)]
    pub profit: Option<String>,
}

/// Why a single CSV line was not loaded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("invalid number {value:?} in {field}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid quantity {0:?}")]
    InvalidQuantity(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// A converted line plus whether any of its dates had to be nulled.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub line: SalesLine,
    pub dates_coerced: u32,
}

fn is_missing(v: &str) -> bool {
    v.is_empty() || MISSING_MARKERS.contains(&v)
}

fn clean(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !is_missing(s))
}

/// Parses `DD/MM/YYYY` (day and month may be unpadded). Anything else,
/// including impossible dates and two-digit years, is `None`.
pub fn parse_date(raw: &str) -> Option<PrimitiveDateTime> {
    let format = format_description!("[day padding:none]/[month padding:none]/[year]");
    let date = Date::parse(raw.trim(), format).ok()?;
    Some(PrimitiveDateTime::new(date, Time::MIDNIGHT))
}

/// Numeric postal code; absent or unparseable values become 0.
pub fn parse_postal_code(raw: Option<&str>) -> i32 {
    let Some(raw) = raw.map(str::trim) else {
        return 0;
    };
    if let Ok(n) = raw.parse::<i32>() {
        return n;
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() && f.abs() <= i32::MAX as f64 => f.trunc() as i32,
        _ => 0,
    }
}

fn parse_amount(field: &'static str, raw: Option<String>) -> Result<Option<f64>, RowError> {
    let Some(raw) = clean(raw) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(RowError::InvalidNumber { field, value: raw }),
    }
}

fn parse_quantity(raw: Option<String>) -> Result<Option<i32>, RowError> {
    let Some(raw) = clean(raw) else {
        return Ok(None);
    };
    let n = match raw.parse::<i32>() {
        Ok(n) => n,
        Err(_) => match raw.parse::<f64>() {
            Ok(f) if f.fract() == 0.0 && f.abs() <= i32::MAX as f64 => f as i32,
            _ => return Err(RowError::InvalidQuantity(raw)),
        },
    };
    if n < 1 {
        return Err(RowError::InvalidQuantity(raw));
    }
    Ok(Some(n))
}

impl CsvRow {
    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn into_line(self) -> Result<ParsedRow, RowError> {
        let order_id = clean(self.order_id).ok_or(RowError::MissingField("OrderID"))?;

        let mut dates_coerced = 0;
        let mut date = |raw: Option<String>| match clean(raw) {
            None => None,
            Some(s) => {
                let parsed = parse_date(&s);
                if parsed.is_none() {
                    dates_coerced += 1;
                }
                parsed
            }
        };
        let order_date = date(self.order_date);
        let ship_date = date(self.ship_date);

        let line = SalesLine {
            order_id,
            order_date,
            ship_date,
            ship_mode: clean(self.ship_mode),
            customer_id: clean(self.customer_id),
            customer_name: clean(self.customer_name),
            segment: clean(self.segment),
            country: clean(self.country),
            city: clean(self.city),
            state: clean(self.state),
            postal_code: Some(parse_postal_code(self.postal_code.as_deref())),
            region: clean(self.region),
            product_id: clean(self.product_id),
            category: clean(self.category),
            sub_category: clean(self.sub_category),
            product_name: clean(self.product_name),
            sales: parse_amount("Sales", self.sales)?,
            quantity: parse_quantity(self.quantity)?,
            discount: parse_amount("Discount", self.discount)?,
            profit: parse_amount("Profit", self.profit)?,
        };
        Ok(ParsedRow {
            line,
            dates_coerced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn row() -> CsvRow {
        CsvRow {
            order_id: Some("CA-2016-152156".into()),
            order_date: Some("8/11/2016".into()),
            ship_date: Some("11/11/2016".into()),
            ship_mode: Some("Second Class".into()),
            customer_id: Some("CG-12520".into()),
            customer_name: Some("Claire Gute".into()),
            segment: Some("Consumer".into()),
            country: Some("United States".into()),
            city: Some("Henderson".into()),
            state: Some("Kentucky".into()),
            postal_code: Some("42420".into()),
            region: Some("South".into()),
            product_id: Some("FUR-BO-10001798".into()),
            category: Some("Furniture".into()),
            sub_category: Some("Bookcases".into()),
            product_name: Some("Bush Somerset Collection Bookcase".into()),
            sales: Some("261.96".into()),
            quantity: Some("2".into()),
            discount: Some("0".into()),
            profit: Some("41.9136".into()),
        }
    }

    #[test]
    fn converts_a_complete_row() {
        let parsed = row().into_line().unwrap();
        assert_eq!(parsed.dates_coerced, 0);
        let l = parsed.line;
        assert_eq!(l.order_id, "CA-2016-152156");
        assert_eq!(l.order_date, Some(datetime!(2016-11-08 0:00)));
        assert_eq!(l.ship_date, Some(datetime!(2016-11-11 0:00)));
        assert_eq!(l.postal_code, Some(42420));
        assert_eq!(l.sales, Some(261.96));
        assert_eq!(l.quantity, Some(2));
        assert_eq!(l.discount, Some(0.0));
        assert_eq!(l.profit, Some(41.9136));
    }

    #[test]
    fn bad_dates_become_null_and_are_counted() {
        let mut r = row();
        r.order_date = Some("2016-11-08".into());
        r.ship_date = Some("31/02/2016".into());
        let parsed = r.into_line().unwrap();
        assert_eq!(parsed.line.order_date, None);
        assert_eq!(parsed.line.ship_date, None);
        assert_eq!(parsed.dates_coerced, 2);

        let mut r = row();
        r.order_date = None;
        let parsed = r.into_line().unwrap();
        assert_eq!(parsed.line.order_date, None);
        assert_eq!(parsed.dates_coerced, 0);
    }

    #[test]
    fn postal_code_defaults_to_zero() {
        assert_eq!(parse_postal_code(None), 0);
        assert_eq!(parse_postal_code(Some("")), 0);
        assert_eq!(parse_postal_code(Some("N/A")), 0);
        assert_eq!(parse_postal_code(Some("10024.0")), 10024);
        assert_eq!(parse_postal_code(Some(" 98103 ")), 98103);
    }

    #[test]
    fn empty_measures_are_null_not_zero() {
        let mut r = row();
        r.sales = Some("".into());
        r.profit = None;
        let l = r.into_line().unwrap().line;
        assert_eq!(l.sales, None);
        assert_eq!(l.profit, None);
    }

    #[test]
    fn malformed_values_reject_the_row() {
        let mut r = row();
        r.sales = Some("12,5x".into());
        assert_eq!(
            r.into_line().unwrap_err(),
            RowError::InvalidNumber { field: "Sales", value: "12,5x".into() }
        );

        let mut r = row();
        r.quantity = Some("0".into());
        assert_eq!(r.into_line().unwrap_err(), RowError::InvalidQuantity("0".into()));

        let mut r = row();
        r.order_id = Some("  ".into());
        assert_eq!(r.into_line().unwrap_err(), RowError::MissingField("OrderID"));
    }

    #[test]
    fn parses_unpadded_and_padded_dates() {
        assert_eq!(parse_date("1/2/2017"), Some(datetime!(2017-02-01 0:00)));
        assert_eq!(parse_date("01/02/2017"), Some(datetime!(2017-02-01 0:00)));
        assert_eq!(parse_date("29/02/2016"), Some(datetime!(2016-02-29 0:00)));
        assert_eq!(parse_date("29/02/2017"), None);
        assert_eq!(parse_date("13/13/2017"), None);
        assert_eq!(parse_date("garbage"), None);
        assert_eq!(parse_date("1/2/17"), None);
    }

    #[test]
    fn missing_markers_load_as_null() {
        let mut r = row();
        r.sales = Some("NaN".into());
        r.quantity = Some("N/A".into());
        r.profit = Some(" null ".into());
        r.region = Some("#N/A".into());
        let l = r.into_line().unwrap().line;
        assert_eq!(l.sales, None);
        assert_eq!(l.quantity, None);
        assert_eq!(l.profit, None);
        assert_eq!(l.region, None);
        assert_eq!(l.discount, Some(0.0));
    }

    #[test]
    fn missing_marker_date_is_null_without_coercion() {
        let mut r = row();
        r.ship_date = Some("NaN".into());
        let parsed = r.into_line().unwrap();
        assert_eq!(parsed.line.ship_date, None);
        assert_eq!(parsed.dates_coerced, 0);
    }
}
