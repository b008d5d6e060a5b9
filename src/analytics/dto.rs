use serde::{Deserialize, Serialize};

/// Wrapper expected by the table widgets.
#[derive(Debug, Serialize)]
pub struct TableData<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RegionSales {
    pub region: Option<String>,
    pub total_sales: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MonthSales {
    pub month: Option<String>,
    pub total_sales: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ProductSales {
    pub product_name: Option<String>,
    pub total_sales: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CategorySubCategorySales {
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub total_sales: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CustomerRow {
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub segment: Option<String>,
    pub total_orders: i64,
    pub total_sales: Option<f64>,
    pub total_profit: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SegmentOrders {
    pub segment: Option<String>,
    pub order_count: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CustomerSales {
    pub customer_name: Option<String>,
    pub total_sales: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ProductRow {
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub total_quantity: Option<i64>,
    pub total_sales: Option<f64>,
    pub total_profit: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CategoryProfit {
    pub category: Option<String>,
    pub sales: Option<f64>,
    pub profit: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StateProfit {
    pub state: Option<String>,
    pub sales: Option<f64>,
    pub profit: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CitySales {
    pub city: Option<String>,
    pub state: Option<String>,
    pub sales: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct YearMonthSales {
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub year_month: Option<String>,
    pub total_sales: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DaySales {
    pub day: Option<String>,
    pub total_sales: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HeatmapCell {
    pub month: Option<String>,
    pub day: Option<i64>,
    pub value: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Summary {
    pub total_sales: Option<f64>,
    pub total_profit: Option<f64>,
    pub num_orders: i64,
    pub num_unique_customers: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RecentSale {
    pub id: i64,
    pub order_id: String,
    pub order_date: Option<String>, // YYYY-MM-DD
    pub customer_name: Option<String>,
    pub product_name: Option<String>,
    pub region: Option<String>,
    pub sales: Option<f64>,
    pub profit: Option<f64>,
}

/// Query string of the generic `/aggregate` endpoint.
#[derive(Debug, Deserialize)]
pub struct AggregateParams {
    pub dimension: String,
    /// Comma separated metric names, e.g. `sales,profit`.
    #[serde(default = "default_metrics")]
    pub metrics: String,
    pub limit: Option<usize>,
    /// `key`, `natural` or the name of one of the requested metrics.
    pub sort: Option<String>,
    pub null_dates: Option<String>,
}
fn default_metrics() -> String {
    "sales".into()
}
