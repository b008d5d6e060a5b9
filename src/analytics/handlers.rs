use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{error, instrument, warn};

use super::{
    dto::*,
    engine::{AggregateQuery, Metric, QueryError, SortKey},
    service::{AnalyticsError, RECENT_SALES},
};
use crate::{auth::AuthUser, state::AppState};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/recent_sales", get(recent_sales))
        .route("/aggregate", get(aggregate))
        .route("/sales_by_region", get(sales_by_region))
        .route("/sales_trend", get(sales_trend))
        .route("/top_products", get(top_products))
        .route("/category_subcategory_sales", get(category_subcategory_sales))
        .route("/customers_data", get(customers_data))
        .route("/orders_by_segment", get(orders_by_segment))
        .route("/top_customers_by_sales", get(top_customers_by_sales))
        .route("/products_data", get(products_data))
        .route("/profit_vs_sales_by_category", get(profit_vs_sales_by_category))
        .route("/sales_profit_by_state", get(sales_profit_by_state))
        .route("/top_cities_by_sales", get(top_cities_by_sales))
        .route("/sales_by_year_month", get(sales_by_year_month))
        .route("/sales_by_day_of_week", get(sales_by_day_of_week))
        .route("/sales_heatmap", get(sales_heatmap))
}

fn failed(e: AnalyticsError) -> (StatusCode, String) {
    match &e {
        AnalyticsError::Query(q) => warn!(error = %q, "rejected aggregate query"),
        AnalyticsError::Store(s) => error!(error = %s, "aggregate failed"),
    }
    e.into()
}

#[instrument(skip(state))]
pub async fn summary(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ApiResult<Summary> {
    Ok(Json(state.analytics.summary().await.map_err(failed)?))
}

#[instrument(skip(state))]
pub async fn recent_sales(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<RecentSale>> {
    Ok(Json(
        state.analytics.recent_sales(RECENT_SALES).await.map_err(failed)?,
    ))
}

fn parse_aggregate(p: &AggregateParams) -> Result<AggregateQuery, QueryError> {
    let dimension = p.dimension.parse()?;
    let metrics = Metric::parse_list(&p.metrics)?;
    let mut q = AggregateQuery::new(dimension, metrics.clone());
    if let Some(sort) = &p.sort {
        q = q.sort(SortKey::parse(sort, &metrics)?);
    }
    if let Some(n) = p.limit {
        q = q.limit(n);
    }
    if let Some(rule) = &p.null_dates {
        q = q.null_dates(rule.parse()?);
    }
    Ok(q)
}

/// GET /aggregate?dimension=region&metrics=sales,profit&limit=10&sort=profit
#[instrument(skip(state))]
pub async fn aggregate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<AggregateParams>,
) -> ApiResult<Vec<Map<String, Value>>> {
    let query = parse_aggregate(&params).map_err(|e| failed(e.into()))?;
    let rows = state.analytics.aggregate(&query).await.map_err(failed)?;
    Ok(Json(
        rows.iter()
            .map(|r| r.to_object(query.dimension, &query.metrics))
            .collect(),
    ))
}

#[instrument(skip(state))]
pub async fn sales_by_region(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<RegionSales>> {
    Ok(Json(state.analytics.sales_by_region().await.map_err(failed)?))
}

#[instrument(skip(state))]
pub async fn sales_trend(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<MonthSales>> {
    Ok(Json(state.analytics.sales_trend().await.map_err(failed)?))
}

#[instrument(skip(state))]
pub async fn top_products(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<ProductSales>> {
    Ok(Json(state.analytics.top_products().await.map_err(failed)?))
}

#[instrument(skip(state))]
pub async fn category_subcategory_sales(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<CategorySubCategorySales>> {
    Ok(Json(
        state
            .analytics
            .category_subcategory_sales()
            .await
            .map_err(failed)?,
    ))
}

/// Table widget payload: `{"data": [...]}`.
#[instrument(skip(state))]
pub async fn customers_data(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<TableData<CustomerRow>> {
    let data = state.analytics.customers_table().await.map_err(failed)?;
    Ok(Json(TableData { data }))
}

#[instrument(skip(state))]
pub async fn orders_by_segment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<SegmentOrders>> {
    Ok(Json(state.analytics.orders_by_segment().await.map_err(failed)?))
}

#[instrument(skip(state))]
pub async fn top_customers_by_sales(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<CustomerSales>> {
    Ok(Json(state.analytics.top_customers().await.map_err(failed)?))
}

/// Table widget payload: `{"data": [...]}`.
#[instrument(skip(state))]
pub async fn products_data(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<TableData<ProductRow>> {
    let data = state.analytics.products_table().await.map_err(failed)?;
    Ok(Json(TableData { data }))
}

#[instrument(skip(state))]
pub async fn profit_vs_sales_by_category(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<CategoryProfit>> {
    Ok(Json(
        state
            .analytics
            .profit_vs_sales_by_category()
            .await
            .map_err(failed)?,
    ))
}

#[instrument(skip(state))]
pub async fn sales_profit_by_state(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<StateProfit>> {
    Ok(Json(
        state.analytics.sales_profit_by_state().await.map_err(failed)?,
    ))
}

#[instrument(skip(state))]
pub async fn top_cities_by_sales(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<CitySales>> {
    Ok(Json(state.analytics.top_cities().await.map_err(failed)?))
}

#[instrument(skip(state))]
pub async fn sales_by_year_month(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<YearMonthSales>> {
    Ok(Json(
        state.analytics.sales_by_year_month().await.map_err(failed)?,
    ))
}

#[instrument(skip(state))]
pub async fn sales_by_day_of_week(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<DaySales>> {
    Ok(Json(
        state.analytics.sales_by_day_of_week().await.map_err(failed)?,
    ))
}

#[instrument(skip(state))]
pub async fn sales_heatmap(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<HeatmapCell>> {
    Ok(Json(state.analytics.sales_heatmap().await.map_err(failed)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sales::SalesLine;
    use uuid::Uuid;

    fn state() -> AppState {
        let line = |order: &str, segment: &str, sales: f64| SalesLine {
            order_id: order.into(),
            segment: Some(segment.into()),
            category: Some("Technology".into()),
            sales: Some(sales),
            profit: Some(sales / 4.0),
            ..SalesLine::default()
        };
        AppState::fake_with_lines(vec![
            line("O1", "Consumer", 8.0),
            line("O1", "Consumer", 4.0),
            line("O2", "Corporate", 2.0),
        ])
    }

    fn params(dimension: &str, metrics: &str) -> AggregateParams {
        AggregateParams {
            dimension: dimension.into(),
            metrics: metrics.into(),
            limit: None,
            sort: None,
            null_dates: None,
        }
    }

    #[tokio::test]
    async fn customers_data_is_wrapped_in_data_key() {
        let Json(body) = customers_data(State(state()), AuthUser(Uuid::new_v4()))
            .await
            .unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert!(json["data"].is_array());
    }

    #[tokio::test]
    async fn orders_by_segment_keeps_first_appearance_order() {
        let Json(rows) = orders_by_segment(State(state()), AuthUser(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![
                SegmentOrders { segment: Some("Consumer".into()), order_count: 1 },
                SegmentOrders { segment: Some("Corporate".into()), order_count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn generic_aggregate_returns_named_fields() {
        let mut p = params("segment", "orders,sales");
        p.sort = Some("sales".into());
        let Json(rows) = aggregate(State(state()), AuthUser(Uuid::new_v4()), Query(p))
            .await
            .unwrap();
        assert_eq!(
            Value::Array(rows.into_iter().map(Value::Object).collect()),
            serde_json::json!([
                {"segment": "Consumer", "order_count": 1, "total_sales": 12.0},
                {"segment": "Corporate", "order_count": 1, "total_sales": 2.0}
            ])
        );
    }

    #[tokio::test]
    async fn generic_aggregate_rejects_unknown_dimension() {
        let err = aggregate(
            State(state()),
            AuthUser(Uuid::new_v4()),
            Query(params("planet", "sales")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("planet"));
    }

    #[test]
    fn parse_aggregate_applies_options() {
        let mut p = params("day_of_week", "sales,profit");
        p.limit = Some(3);
        p.sort = Some("key".into());
        p.null_dates = Some("bucket".into());
        let q = parse_aggregate(&p).unwrap();
        assert_eq!(q.limit, Some(3));
        assert_eq!(q.sort, SortKey::Key);
        assert_eq!(q.metrics, vec![Metric::Sales, Metric::Profit]);
    }
}
