use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;
use time::macros::format_description;
use tracing::debug;

use super::{
    calendar::DateDimensionExtractor,
    dto::*,
    engine::{self, AggregateQuery, AggregateRow, Dimension, Metric, QueryError, SortKey},
};
use crate::sales::{FactStore, SalesRecord};

pub const TOP_PRODUCTS: usize = 10;
pub const TOP_CUSTOMERS: usize = 10;
pub const TOP_CITIES: usize = 20;
pub const CUSTOMER_TABLE: usize = 100;
pub const PRODUCT_TABLE: usize = 200;
pub const RECENT_SALES: usize = 10;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("fact store: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<AnalyticsError> for (StatusCode, String) {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::Query(q) => (StatusCode::BAD_REQUEST, q.to_string()),
            AnalyticsError::Store(s) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", s)),
        }
    }
}

type Result<T> = std::result::Result<T, AnalyticsError>;

/// Answers grouped queries over the fact table.
///
/// Every call reads the full table from the store and recomputes; nothing is
/// cached between calls.
#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn FactStore>,
    calendar: Arc<dyn DateDimensionExtractor>,
}

fn text(row: &AggregateRow, i: usize) -> Option<String> {
    row.key.get(i).and_then(|k| k.as_text())
}

fn int(row: &AggregateRow, i: usize) -> Option<i64> {
    row.key.get(i).and_then(|k| k.as_int())
}

fn amount(row: &AggregateRow, i: usize) -> Option<f64> {
    row.metrics.get(i).and_then(|m| m.as_f64())
}

fn count(row: &AggregateRow, i: usize) -> i64 {
    row.metrics.get(i).and_then(|m| m.as_i64()).unwrap_or(0)
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn FactStore>, calendar: Arc<dyn DateDimensionExtractor>) -> Self {
        Self { store, calendar }
    }

    pub async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>> {
        let records = self.store.records().await?;
        let rows = engine::aggregate(&records, query, self.calendar.as_ref())?;
        debug!(
            dimension = query.dimension.name(),
            scanned = records.len(),
            groups = rows.len(),
            "aggregate computed"
        );
        Ok(rows)
    }

    pub async fn sales_by_region(&self) -> Result<Vec<RegionSales>> {
        let q = AggregateQuery::new(Dimension::Region, [Metric::Sales]);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| RegionSales {
                region: text(r, 0),
                total_sales: amount(r, 0),
            })
            .collect())
    }

    pub async fn sales_trend(&self) -> Result<Vec<MonthSales>> {
        let q = AggregateQuery::new(Dimension::MonthOfOrder, [Metric::Sales]).sort(SortKey::Key);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| MonthSales {
                month: text(r, 0),
                total_sales: amount(r, 0),
            })
            .collect())
    }

    pub async fn top_products(&self) -> Result<Vec<ProductSales>> {
        let q = AggregateQuery::new(Dimension::ProductName, [Metric::Sales]).limit(TOP_PRODUCTS);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| ProductSales {
                product_name: text(r, 0),
                total_sales: amount(r, 0),
            })
            .collect())
    }

    pub async fn category_subcategory_sales(&self) -> Result<Vec<CategorySubCategorySales>> {
        let q = AggregateQuery::new(Dimension::CategorySubCategory, [Metric::Sales])
            .sort(SortKey::Natural);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| CategorySubCategorySales {
                category: text(r, 0),
                sub_category: text(r, 1),
                total_sales: amount(r, 0),
            })
            .collect())
    }

    pub async fn customers_table(&self) -> Result<Vec<CustomerRow>> {
        let q = AggregateQuery::new(
            Dimension::Customer,
            [Metric::Orders, Metric::Sales, Metric::Profit],
        )
        .sort(SortKey::Metric(1))
        .limit(CUSTOMER_TABLE);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| CustomerRow {
                customer_id: text(r, 0),
                customer_name: text(r, 1),
                segment: text(r, 2),
                total_orders: count(r, 0),
                total_sales: amount(r, 1),
                total_profit: amount(r, 2),
            })
            .collect())
    }

    pub async fn orders_by_segment(&self) -> Result<Vec<SegmentOrders>> {
        let q = AggregateQuery::new(Dimension::Segment, [Metric::Orders]).sort(SortKey::Natural);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| SegmentOrders {
                segment: text(r, 0),
                order_count: count(r, 0),
            })
            .collect())
    }

    pub async fn top_customers(&self) -> Result<Vec<CustomerSales>> {
        let q =
            AggregateQuery::new(Dimension::CustomerName, [Metric::Sales]).limit(TOP_CUSTOMERS);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| CustomerSales {
                customer_name: text(r, 0),
                total_sales: amount(r, 0),
            })
            .collect())
    }

    pub async fn products_table(&self) -> Result<Vec<ProductRow>> {
        let q = AggregateQuery::new(
            Dimension::Product,
            [Metric::Quantity, Metric::Sales, Metric::Profit],
        )
        .sort(SortKey::Metric(1))
        .limit(PRODUCT_TABLE);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| ProductRow {
                product_id: text(r, 0),
                product_name: text(r, 1),
                category: text(r, 2),
                sub_category: text(r, 3),
                total_quantity: r.metrics.first().and_then(|m| m.as_i64()),
                total_sales: amount(r, 1),
                total_profit: amount(r, 2),
            })
            .collect())
    }

    pub async fn profit_vs_sales_by_category(&self) -> Result<Vec<CategoryProfit>> {
        let q = AggregateQuery::new(Dimension::Category, [Metric::Sales, Metric::Profit])
            .sort(SortKey::Natural);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| CategoryProfit {
                category: text(r, 0),
                sales: amount(r, 0),
                profit: amount(r, 1),
            })
            .collect())
    }

    pub async fn sales_profit_by_state(&self) -> Result<Vec<StateProfit>> {
        let q = AggregateQuery::new(Dimension::State, [Metric::Sales, Metric::Profit]);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| StateProfit {
                state: text(r, 0),
                sales: amount(r, 0),
                profit: amount(r, 1),
            })
            .collect())
    }

    pub async fn top_cities(&self) -> Result<Vec<CitySales>> {
        let q = AggregateQuery::new(Dimension::CityState, [Metric::Sales]).limit(TOP_CITIES);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| CitySales {
                city: text(r, 0),
                state: text(r, 1),
                sales: amount(r, 0),
            })
            .collect())
    }

    pub async fn sales_by_year_month(&self) -> Result<Vec<YearMonthSales>> {
        let q = AggregateQuery::new(Dimension::YearMonth, [Metric::Sales]).sort(SortKey::Key);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| YearMonthSales {
                year: int(r, 0),
                month: int(r, 1),
                year_month: text(r, 2),
                total_sales: amount(r, 0),
            })
            .collect())
    }

    pub async fn sales_by_day_of_week(&self) -> Result<Vec<DaySales>> {
        let q = AggregateQuery::new(Dimension::DayOfWeek, [Metric::Sales]).sort(SortKey::Key);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| DaySales {
                day: int(r, 0)
                    .and_then(|d| self.calendar.day_label(d))
                    .map(str::to_string),
                total_sales: amount(r, 0),
            })
            .collect())
    }

    pub async fn sales_heatmap(&self) -> Result<Vec<HeatmapCell>> {
        let q = AggregateQuery::new(Dimension::MonthDay, [Metric::Sales]).sort(SortKey::Key);
        Ok(self
            .aggregate(&q)
            .await?
            .iter()
            .map(|r| HeatmapCell {
                month: int(r, 0)
                    .and_then(|m| self.calendar.month_label(m))
                    .map(str::to_string),
                day: int(r, 1),
                value: amount(r, 0),
            })
            .collect())
    }

    pub async fn summary(&self) -> Result<Summary> {
        let q = AggregateQuery::new(
            Dimension::Overall,
            [Metric::Sales, Metric::Profit, Metric::Orders, Metric::Customers],
        );
        let rows = self.aggregate(&q).await?;
        Ok(match rows.first() {
            Some(r) => Summary {
                total_sales: amount(r, 0),
                total_profit: amount(r, 1),
                num_orders: count(r, 2),
                num_unique_customers: count(r, 3),
            },
            None => Summary {
                total_sales: None,
                total_profit: None,
                num_orders: 0,
                num_unique_customers: 0,
            },
        })
    }

    /// Most recent lines by order date; undated lines come last.
    pub async fn recent_sales(&self, n: usize) -> Result<Vec<RecentSale>> {
        let mut records = self.store.records().await?;
        records.sort_by(|a, b| match (a.line.order_date, b.line.order_date) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        records.truncate(n);
        Ok(records.into_iter().map(recent_sale).collect())
    }
}

fn recent_sale(r: SalesRecord) -> RecentSale {
    let ymd = format_description!("[year]-[month]-[day]");
    RecentSale {
        id: r.id,
        order_date: r.line.order_date.and_then(|d| d.format(ymd).ok()),
        order_id: r.line.order_id,
        customer_name: r.line.customer_name,
        product_name: r.line.product_name,
        region: r.line.region,
        sales: r.line.sales,
        profit: r.line.profit,
    }
}
