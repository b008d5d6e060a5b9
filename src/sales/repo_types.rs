use sqlx::FromRow;
use time::PrimitiveDateTime;

/// One order line as stored in `superstore_sales`.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SalesRecord {
    pub id: i64, // surrogate key, assigned on insert
    #[sqlx(flatten)]
    pub line: SalesLine,
}

/// Column values of an order line, without the surrogate id.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct SalesLine {
    pub order_id: String,
    pub order_date: Option<PrimitiveDateTime>,
    pub ship_date: Option<PrimitiveDateTime>,
    pub ship_mode: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub segment: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<i32>,
    pub region: Option<String>,
    pub product_id: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub product_name: Option<String>,
    pub sales: Option<f64>,
    pub quantity: Option<i32>,
    pub discount: Option<f64>,
    pub profit: Option<f64>,
}
