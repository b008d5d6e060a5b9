use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    str::FromStr,
};

use serde::Serialize;
use thiserror::Error;

use super::calendar::DateDimensionExtractor;
use crate::sales::{SalesLine, SalesRecord};

/// Group-by key of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Whole table as a single group.
    Overall,
    Region,
    /// `YYYY-MM` of the order date.
    MonthOfOrder,
    /// Year, month and `YYYY-MM` of the order date.
    YearMonth,
    ProductName,
    /// Product id, name, category and sub-category.
    Product,
    Category,
    CategorySubCategory,
    /// Customer id, name and segment.
    Customer,
    CustomerName,
    Segment,
    State,
    CityState,
    /// 0 = Sunday .. 6 = Saturday.
    DayOfWeek,
    /// Month of year and day of month.
    MonthDay,
}

impl Dimension {
    pub const ALL: [Dimension; 15] = [
        Dimension::Overall,
        Dimension::Region,
        Dimension::MonthOfOrder,
        Dimension::YearMonth,
        Dimension::ProductName,
        Dimension::Product,
        Dimension::Category,
        Dimension::CategorySubCategory,
        Dimension::Customer,
        Dimension::CustomerName,
        Dimension::Segment,
        Dimension::State,
        Dimension::CityState,
        Dimension::DayOfWeek,
        Dimension::MonthDay,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Overall => "overall",
            Dimension::Region => "region",
            Dimension::MonthOfOrder => "month_of_order",
            Dimension::YearMonth => "year_month",
            Dimension::ProductName => "product_name",
            Dimension::Product => "product",
            Dimension::Category => "category",
            Dimension::CategorySubCategory => "category_sub_category",
            Dimension::Customer => "customer",
            Dimension::CustomerName => "customer_name",
            Dimension::Segment => "segment",
            Dimension::State => "state",
            Dimension::CityState => "city_state",
            Dimension::DayOfWeek => "day_of_week",
            Dimension::MonthDay => "month_day",
        }
    }

    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            Dimension::Overall => &[],
            Dimension::Region => &["region"],
            Dimension::MonthOfOrder => &["month"],
            Dimension::YearMonth => &["year", "month", "year_month"],
            Dimension::ProductName => &["product_name"],
            Dimension::Product => &["product_id", "product_name", "category", "sub_category"],
            Dimension::Category => &["category"],
            Dimension::CategorySubCategory => &["category", "sub_category"],
            Dimension::Customer => &["customer_id", "customer_name", "segment"],
            Dimension::CustomerName => &["customer_name"],
            Dimension::Segment => &["segment"],
            Dimension::State => &["state"],
            Dimension::CityState => &["city", "state"],
            Dimension::DayOfWeek => &["day_of_week"],
            Dimension::MonthDay => &["month", "day"],
        }
    }

    pub fn is_date_derived(&self) -> bool {
        matches!(
            self,
            Dimension::MonthOfOrder
                | Dimension::YearMonth
                | Dimension::DayOfWeek
                | Dimension::MonthDay
        )
    }

    /// `None` means the line does not take part in this grouping.
    fn key(
        &self,
        line: &SalesLine,
        cal: &dyn DateDimensionExtractor,
        null_dates: NullDates,
    ) -> Option<Vec<KeyValue>> {
        if self.is_date_derived() {
            let Some(date) = line.order_date else {
                return match null_dates {
                    NullDates::Exclude => None,
                    NullDates::Bucket => Some(vec![KeyValue::Null; self.field_names().len()]),
                };
            };
            let key = match self {
                Dimension::MonthOfOrder => vec![KeyValue::Text(cal.year_month(date))],
                Dimension::YearMonth => vec![
                    KeyValue::Int(cal.year(date).into()),
                    KeyValue::Int(cal.month(date).into()),
                    KeyValue::Text(cal.year_month(date)),
                ],
                Dimension::DayOfWeek => vec![KeyValue::Int(cal.day_of_week(date).into())],
                Dimension::MonthDay => vec![
                    KeyValue::Int(cal.month(date).into()),
                    KeyValue::Int(cal.day_of_month(date).into()),
                ],
                _ => unreachable!("non-date dimension"),
            };
            return Some(key);
        }

        let t = KeyValue::text;
        let key = match self {
            Dimension::Overall => vec![],
            Dimension::Region => vec![t(&line.region)],
            Dimension::ProductName => vec![t(&line.product_name)],
            Dimension::Product => vec![
                t(&line.product_id),
                t(&line.product_name),
                t(&line.category),
                t(&line.sub_category),
            ],
            Dimension::Category => vec![t(&line.category)],
            Dimension::CategorySubCategory => vec![t(&line.category), t(&line.sub_category)],
            Dimension::Customer => vec![
                t(&line.customer_id),
                t(&line.customer_name),
                t(&line.segment),
            ],
            Dimension::CustomerName => vec![t(&line.customer_name)],
            Dimension::Segment => vec![t(&line.segment)],
            Dimension::State => vec![t(&line.state)],
            Dimension::CityState => vec![t(&line.city), t(&line.state)],
            _ => unreachable!("date dimension"),
        };
        Some(key)
    }
}

impl FromStr for Dimension {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Dimension::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| QueryError::UnknownDimension(s.to_string()))
    }
}

/// Aggregate computed per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// sum(sales)
    Sales,
    /// sum(profit)
    Profit,
    /// sum(quantity)
    Quantity,
    /// count(distinct order_id)
    Orders,
    /// count(distinct customer_id)
    Customers,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Sales,
        Metric::Profit,
        Metric::Quantity,
        Metric::Orders,
        Metric::Customers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Sales => "sales",
            Metric::Profit => "profit",
            Metric::Quantity => "quantity",
            Metric::Orders => "orders",
            Metric::Customers => "customers",
        }
    }

    /// Parses a comma separated list such as `sales,profit`.
    pub fn parse_list(s: &str) -> Result<Vec<Metric>, QueryError> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect()
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            Metric::Sales => "total_sales",
            Metric::Profit => "total_profit",
            Metric::Quantity => "total_quantity",
            Metric::Orders => "order_count",
            Metric::Customers => "customer_count",
        }
    }

    fn accumulator(&self) -> Accumulator {
        match self {
            Metric::Sales | Metric::Profit => Accumulator::Amount(None),
            Metric::Quantity => Accumulator::Units(None),
            Metric::Orders | Metric::Customers => Accumulator::Distinct(HashSet::new()),
        }
    }
}

impl FromStr for Metric {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| QueryError::UnknownMetric(s.to_string()))
    }
}

/// Ordering applied to the grouped rows before the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Descending by the i-th requested metric; null sums last.
    Metric(usize),
    /// Ascending by the group key; null key parts first.
    Key,
    /// Order in which each group's first record appears in storage.
    Natural,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Metric(0)
    }
}

impl SortKey {
    /// `key`, `natural`, or the name of one of `metrics`.
    pub fn parse(s: &str, metrics: &[Metric]) -> Result<Self, QueryError> {
        match s.trim() {
            "key" => Ok(SortKey::Key),
            "natural" => Ok(SortKey::Natural),
            other => {
                let metric: Metric = other.parse()?;
                metrics
                    .iter()
                    .position(|m| *m == metric)
                    .map(SortKey::Metric)
                    .ok_or_else(|| QueryError::SortMetricNotRequested(other.to_string()))
            }
        }
    }
}

/// How date-derived dimensions treat lines without an order date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NullDates {
    #[default]
    Exclude,
    /// Lines without a date form one group whose key parts are all null.
    Bucket,
}

impl FromStr for NullDates {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "exclude" => Ok(NullDates::Exclude),
            "bucket" => Ok(NullDates::Bucket),
            other => Err(QueryError::UnknownNullDates(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Null,
    Int(i64),
    Text(String),
}

impl KeyValue {
    fn text(value: &Option<String>) -> Self {
        match value {
            Some(s) => KeyValue::Text(s.clone()),
            None => KeyValue::Null,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            KeyValue::Text(s) => Some(s.clone()),
            KeyValue::Int(i) => Some(i.to_string()),
            KeyValue::Null => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            KeyValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Currency sum; null when every value in the group was null.
    Amount(Option<f64>),
    /// Integer sum; null when every value in the group was null.
    Units(Option<i64>),
    Count(i64),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Amount(v) => *v,
            MetricValue::Units(v) => v.map(|n| n as f64),
            MetricValue::Count(n) => Some(*n as f64),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Amount(v) => v.map(|f| f as i64),
            MetricValue::Units(v) => *v,
            MetricValue::Count(n) => Some(*n),
        }
    }
}

enum Accumulator {
    Amount(Option<f64>),
    Units(Option<i64>),
    Distinct(HashSet<String>),
}

impl Accumulator {
    fn add(&mut self, metric: Metric, line: &SalesLine) {
        match (self, metric) {
            (Accumulator::Amount(total), Metric::Sales) => add_amount(total, line.sales),
            (Accumulator::Amount(total), Metric::Profit) => add_amount(total, line.profit),
            (Accumulator::Units(total), Metric::Quantity) => {
                if let Some(q) = line.quantity {
                    *total = Some(total.unwrap_or(0) + i64::from(q));
                }
            }
            (Accumulator::Distinct(seen), Metric::Orders) => {
                if !seen.contains(&line.order_id) {
                    seen.insert(line.order_id.clone());
                }
            }
            (Accumulator::Distinct(seen), Metric::Customers) => {
                if let Some(c) = &line.customer_id {
                    if !seen.contains(c) {
                        seen.insert(c.clone());
                    }
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> MetricValue {
        match self {
            Accumulator::Amount(v) => MetricValue::Amount(v),
            Accumulator::Units(v) => MetricValue::Units(v),
            Accumulator::Distinct(seen) => MetricValue::Count(seen.len() as i64),
        }
    }
}

fn add_amount(total: &mut Option<f64>, value: Option<f64>) {
    if let Some(v) = value {
        *total = Some(total.unwrap_or(0.0) + v);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown dimension {0:?}")]
    UnknownDimension(String),
    #[error("unknown metric {0:?}")]
    UnknownMetric(String),
    #[error("unknown null date rule {0:?}")]
    UnknownNullDates(String),
    #[error("sort metric {0:?} is not among the requested metrics")]
    SortMetricNotRequested(String),
    #[error("at least one metric is required")]
    NoMetrics,
    #[error("sort metric index {0} is out of range")]
    SortMetricOutOfRange(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub dimension: Dimension,
    pub metrics: Vec<Metric>,
    pub limit: Option<usize>,
    pub sort: SortKey,
    pub null_dates: NullDates,
}

impl AggregateQuery {
    pub fn new(dimension: Dimension, metrics: impl Into<Vec<Metric>>) -> Self {
        Self {
            dimension,
            metrics: metrics.into(),
            limit: None,
            sort: SortKey::default(),
            null_dates: NullDates::default(),
        }
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn null_dates(mut self, null_dates: NullDates) -> Self {
        self.null_dates = null_dates;
        self
    }

    fn validate(&self) -> Result<(), QueryError> {
        if self.metrics.is_empty() {
            return Err(QueryError::NoMetrics);
        }
        if let SortKey::Metric(i) = self.sort {
            if i >= self.metrics.len() {
                return Err(QueryError::SortMetricOutOfRange(i));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: Vec<KeyValue>,
    pub metrics: Vec<MetricValue>,
}

impl AggregateRow {
    /// Flat JSON object: dimension field names followed by metric field names.
    pub fn to_object(
        &self,
        dimension: Dimension,
        metrics: &[Metric],
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut obj = serde_json::Map::new();
        for (name, value) in dimension.field_names().iter().zip(&self.key) {
            obj.insert((*name).to_string(), serde_json::json!(value));
        }
        for (metric, value) in metrics.iter().zip(&self.metrics) {
            obj.insert(metric.field_name().to_string(), serde_json::json!(value));
        }
        obj
    }
}

fn cmp_desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Groups `records` by the query's dimension and computes its metrics.
///
/// Records are expected in storage order. Groups are kept in order of first
/// appearance and every sort is stable, so equal metric values keep that order.
pub fn aggregate(
    records: &[SalesRecord],
    query: &AggregateQuery,
    cal: &dyn DateDimensionExtractor,
) -> Result<Vec<AggregateRow>, QueryError> {
    query.validate()?;

    let mut index: HashMap<Vec<KeyValue>, usize> = HashMap::new();
    let mut groups: Vec<(Vec<KeyValue>, Vec<Accumulator>)> = Vec::new();

    for record in records {
        let Some(key) = query.dimension.key(&record.line, cal, query.null_dates) else {
            continue;
        };
        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                let accs = query.metrics.iter().map(Metric::accumulator).collect();
                groups.push((key.clone(), accs));
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        let accs = &mut groups[slot].1;
        for (acc, metric) in accs.iter_mut().zip(&query.metrics) {
            acc.add(*metric, &record.line);
        }
    }

    let mut rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|(key, accs)| AggregateRow {
            key,
            metrics: accs.into_iter().map(Accumulator::finish).collect(),
        })
        .collect();

    match query.sort {
        SortKey::Metric(i) => {
            rows.sort_by(|a, b| cmp_desc_nulls_last(a.metrics[i].as_f64(), b.metrics[i].as_f64()))
        }
        SortKey::Key => rows.sort_by(|a, b| a.key.cmp(&b.key)),
        SortKey::Natural => {}
    }

    if let Some(n) = query.limit {
        rows.truncate(n);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::calendar::Calendar;
    use time::{macros::datetime, PrimitiveDateTime};

    fn record(id: i64, line: SalesLine) -> SalesRecord {
        SalesRecord { id, line }
    }

    fn sale(order: &str, region: &str, sales: Option<f64>) -> SalesLine {
        SalesLine {
            order_id: order.into(),
            region: Some(region.into()),
            sales,
            ..SalesLine::default()
        }
    }

    fn dated(order: &str, date: Option<PrimitiveDateTime>, sales: f64) -> SalesLine {
        SalesLine {
            order_id: order.into(),
            order_date: date,
            sales: Some(sales),
            ..SalesLine::default()
        }
    }

    fn table(lines: Vec<SalesLine>) -> Vec<SalesRecord> {
        lines
            .into_iter()
            .enumerate()
            .map(|(i, l)| record(i as i64 + 1, l))
            .collect()
    }

    fn run(records: &[SalesRecord], q: AggregateQuery) -> Vec<AggregateRow> {
        aggregate(records, &q, &Calendar::Spanish).expect("valid query")
    }

    #[test]
    fn sales_by_region_example() {
        let records = table(vec![
            sale("O1", "West", Some(100.0)),
            sale("O2", "West", Some(50.0)),
            sale("O3", "East", Some(30.0)),
        ]);
        let rows = run(&records, AggregateQuery::new(Dimension::Region, [Metric::Sales]));
        assert_eq!(
            rows,
            vec![
                AggregateRow {
                    key: vec![KeyValue::Text("West".into())],
                    metrics: vec![MetricValue::Amount(Some(150.0))],
                },
                AggregateRow {
                    key: vec![KeyValue::Text("East".into())],
                    metrics: vec![MetricValue::Amount(Some(30.0))],
                },
            ]
        );
        let obj = rows[0].to_object(Dimension::Region, &[Metric::Sales]);
        assert_eq!(
            serde_json::Value::Object(obj),
            serde_json::json!({"region": "West", "total_sales": 150.0})
        );
    }

    #[test]
    fn group_sums_add_up_to_table_sum_for_every_dimension() {
        let records = table(vec![
            SalesLine {
                order_id: "O1".into(),
                order_date: Some(datetime!(2023-11-03 0:00)),
                region: Some("West".into()),
                state: Some("California".into()),
                city: Some("Los Angeles".into()),
                customer_id: Some("C1".into()),
                customer_name: Some("Ann".into()),
                segment: Some("Consumer".into()),
                product_id: Some("P1".into()),
                product_name: Some("Chair".into()),
                category: Some("Furniture".into()),
                sub_category: Some("Chairs".into()),
                sales: Some(100.5),
                ..SalesLine::default()
            },
            SalesLine {
                order_id: "O2".into(),
                order_date: Some(datetime!(2024-01-14 0:00)),
                region: None,
                state: Some("Texas".into()),
                city: Some("Austin".into()),
                customer_id: Some("C2".into()),
                customer_name: Some("Bob".into()),
                sales: Some(20.25),
                ..SalesLine::default()
            },
            SalesLine {
                order_id: "O2".into(),
                order_date: Some(datetime!(2024-01-14 0:00)),
                region: Some("Central".into()),
                sales: None,
                ..SalesLine::default()
            },
            SalesLine {
                order_id: "O3".into(),
                order_date: Some(datetime!(2024-02-29 0:00)),
                region: Some("West".into()),
                product_name: Some("Chair".into()),
                sales: Some(7.0),
                ..SalesLine::default()
            },
        ]);
        let expected = 100.5 + 20.25 + 7.0;
        for dim in Dimension::ALL {
            let rows = run(&records, AggregateQuery::new(dim, [Metric::Sales]));
            let total: f64 = rows.iter().filter_map(|r| r.metrics[0].as_f64()).sum();
            assert_eq!(total, expected, "dimension {:?}", dim);
        }
    }

    #[test]
    fn null_sales_are_excluded_not_zeroed() {
        let records = table(vec![
            sale("O1", "North", None),
            sale("O2", "North", None),
            sale("O3", "South", Some(-5.0)),
        ]);
        let rows = run(
            &records,
            AggregateQuery::new(Dimension::Region, [Metric::Sales, Metric::Orders]),
        );
        assert_eq!(rows.len(), 2);
        // the all-null group sorts after the negative sum
        assert_eq!(rows[0].key, vec![KeyValue::Text("South".into())]);
        assert_eq!(rows[1].metrics[0], MetricValue::Amount(None));
        assert_eq!(rows[1].metrics[1], MetricValue::Count(2));
    }

    #[test]
    fn null_key_forms_its_own_group() {
        let mut lines = vec![sale("O1", "West", Some(1.0))];
        lines.push(SalesLine {
            order_id: "O2".into(),
            region: None,
            sales: Some(2.0),
            ..SalesLine::default()
        });
        let rows = run(&table(lines), AggregateQuery::new(Dimension::Region, [Metric::Sales]));
        assert_eq!(rows[0].key, vec![KeyValue::Null]);
        assert_eq!(rows[0].metrics[0], MetricValue::Amount(Some(2.0)));
        let obj = rows[0].to_object(Dimension::Region, &[Metric::Sales]);
        assert_eq!(obj["region"], serde_json::Value::Null);
    }

    #[test]
    fn multi_line_order_counts_once() {
        let records = table(vec![
            sale("CA-1", "West", Some(1.0)),
            sale("CA-1", "West", Some(2.0)),
            sale("CA-1", "West", Some(3.0)),
            sale("CA-2", "West", Some(4.0)),
        ]);
        let rows = run(&records, AggregateQuery::new(Dimension::Region, [Metric::Orders]));
        assert_eq!(rows[0].metrics[0], MetricValue::Count(2));

        let single = table(vec![sale("X", "East", Some(1.0)), sale("X", "East", Some(1.0))]);
        let rows = run(&single, AggregateQuery::new(Dimension::Overall, [Metric::Orders]));
        assert_eq!(rows, vec![AggregateRow { key: vec![], metrics: vec![MetricValue::Count(1)] }]);
    }

    #[test]
    fn ties_keep_storage_order() {
        let records = table(vec![
            sale("O1", "B", Some(10.0)),
            sale("O2", "A", Some(10.0)),
            sale("O3", "C", Some(20.0)),
            sale("O4", "D", Some(10.0)),
        ]);
        let rows = run(&records, AggregateQuery::new(Dimension::Region, [Metric::Sales]));
        let keys: Vec<_> = rows.iter().map(|r| r.key[0].as_text().unwrap()).collect();
        assert_eq!(keys, vec!["C", "B", "A", "D"]);
    }

    #[test]
    fn limit_truncates_after_sort() {
        let records = table(
            (0..30)
                .map(|i| sale(&format!("O{i}"), &format!("R{i}"), Some(i as f64)))
                .collect(),
        );
        let rows = run(
            &records,
            AggregateQuery::new(Dimension::Region, [Metric::Sales]).limit(10),
        );
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].metrics[0], MetricValue::Amount(Some(29.0)));
        assert_eq!(rows[9].metrics[0], MetricValue::Amount(Some(20.0)));
    }

    #[test]
    fn null_dates_are_excluded_from_date_dimensions() {
        let records = table(vec![
            dated("O1", Some(datetime!(2024-03-10 0:00)), 5.0),
            dated("O2", None, 1000.0),
        ]);
        for dim in [
            Dimension::MonthOfOrder,
            Dimension::YearMonth,
            Dimension::DayOfWeek,
            Dimension::MonthDay,
        ] {
            let rows = run(&records, AggregateQuery::new(dim, [Metric::Sales]).sort(SortKey::Key));
            assert_eq!(rows.len(), 1, "dimension {:?}", dim);
            assert_eq!(rows[0].metrics[0], MetricValue::Amount(Some(5.0)));
        }
        let rows = run(
            &records,
            AggregateQuery::new(Dimension::DayOfWeek, [Metric::Sales])
                .sort(SortKey::Key)
                .null_dates(NullDates::Bucket),
        );
        assert_eq!(rows[0].key, vec![KeyValue::Null]);
        assert_eq!(rows[1].key, vec![KeyValue::Int(0)]);
    }

    #[test]
    fn month_of_order_key_sort_is_chronological() {
        let records = table(vec![
            dated("O1", Some(datetime!(2024-01-02 0:00)), 1.0),
            dated("O2", Some(datetime!(2023-11-30 0:00)), 1.0),
            dated("O3", Some(datetime!(2023-02-01 0:00)), 1.0),
            dated("O4", Some(datetime!(2024-01-31 0:00)), 1.0),
        ]);
        let rows = run(
            &records,
            AggregateQuery::new(Dimension::MonthOfOrder, [Metric::Sales]).sort(SortKey::Key),
        );
        let months: Vec<_> = rows.iter().map(|r| r.key[0].as_text().unwrap()).collect();
        assert_eq!(months, vec!["2023-02", "2023-11", "2024-01"]);
        assert_eq!(rows[2].metrics[0], MetricValue::Amount(Some(2.0)));
    }

    #[test]
    fn quantity_and_distinct_customers() {
        let records = table(vec![
            SalesLine {
                order_id: "O1".into(),
                customer_id: Some("C1".into()),
                quantity: Some(2),
                ..SalesLine::default()
            },
            SalesLine {
                order_id: "O2".into(),
                customer_id: Some("C1".into()),
                quantity: Some(3),
                ..SalesLine::default()
            },
            SalesLine {
                order_id: "O3".into(),
                customer_id: None,
                quantity: None,
                ..SalesLine::default()
            },
        ]);
        let rows = run(
            &records,
            AggregateQuery::new(Dimension::Overall, [Metric::Quantity, Metric::Customers]),
        );
        assert_eq!(rows[0].metrics, vec![MetricValue::Units(Some(5)), MetricValue::Count(1)]);
    }

    #[test]
    fn invalid_queries_are_rejected() {
        let cal = Calendar::Spanish;
        let q = AggregateQuery::new(Dimension::Region, Vec::<Metric>::new());
        assert_eq!(aggregate(&[], &q, &cal), Err(QueryError::NoMetrics));
        let q = AggregateQuery::new(Dimension::Region, [Metric::Sales]).sort(SortKey::Metric(1));
        assert_eq!(aggregate(&[], &q, &cal), Err(QueryError::SortMetricOutOfRange(1)));
    }

    #[test]
    fn parses_query_parts() {
        for dim in Dimension::ALL {
            assert_eq!(dim.name().parse::<Dimension>(), Ok(dim));
        }
        assert_eq!(
            "week".parse::<Dimension>(),
            Err(QueryError::UnknownDimension("week".into()))
        );
        let metrics = Metric::parse_list("sales, profit,orders").unwrap();
        assert_eq!(metrics, vec![Metric::Sales, Metric::Profit, Metric::Orders]);
        assert_eq!(Metric::parse_list("sales,margin"), Err(QueryError::UnknownMetric("margin".into())));
        assert_eq!(SortKey::parse("profit", &metrics), Ok(SortKey::Metric(1)));
        assert_eq!(SortKey::parse("key", &metrics), Ok(SortKey::Key));
        assert_eq!(
            SortKey::parse("quantity", &metrics),
            Err(QueryError::SortMetricNotRequested("quantity".into()))
        );
        assert_eq!("bucket".parse::<NullDates>(), Ok(NullDates::Bucket));
    }

    #[test]
    fn empty_table_yields_no_rows() {
        let rows = run(&[], AggregateQuery::new(Dimension::Overall, [Metric::Sales]));
        assert!(rows.is_empty());
    }
}
