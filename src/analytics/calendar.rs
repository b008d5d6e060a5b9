use std::str::FromStr;

use serde::Deserialize;
use time::PrimitiveDateTime;

/// Single policy for everything derived from an order date.
///
/// Day-of-week numbering is 0 = Sunday .. 6 = Saturday. Months are 1..=12.
/// Label lookups outside those ranges return `None`.
pub trait DateDimensionExtractor: Send + Sync {
    fn day_labels(&self) -> &'static [&'static str; 7];
    fn month_labels(&self) -> &'static [&'static str; 12];

    fn year(&self, date: PrimitiveDateTime) -> i32 {
        date.year()
    }

    fn month(&self, date: PrimitiveDateTime) -> u8 {
        u8::from(date.month())
    }

    fn day_of_month(&self, date: PrimitiveDateTime) -> u8 {
        date.day()
    }

    fn day_of_week(&self, date: PrimitiveDateTime) -> u8 {
        date.weekday().number_days_from_sunday()
    }

    /// Zero padded `YYYY-MM`; sorts lexicographically in chronological order.
    fn year_month(&self, date: PrimitiveDateTime) -> String {
        format!("{:04}-{:02}", self.year(date), self.month(date))
    }

    fn day_label(&self, day_of_week: i64) -> Option<&'static str> {
        usize::try_from(day_of_week)
            .ok()
            .and_then(|i| self.day_labels().get(i).copied())
    }

    fn month_label(&self, month: i64) -> Option<&'static str> {
        usize::try_from(month - 1)
            .ok()
            .and_then(|i| self.month_labels().get(i).copied())
    }
}

const ES_DAYS: [&str; 7] = [
    "Domingo",
    "Lunes",
    "Martes",
    "Miércoles",
    "Jueves",
    "Viernes",
    "Sábado",
];
const ES_MONTHS: [&str; 12] = [
    "Ene", "Feb", "Mar", "Abr", "May", "Jun", "Jul", "Ago", "Sep", "Oct", "Nov", "Dic",
];
const EN_DAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];
const EN_MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Label set used for day and month names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Calendar {
    #[default]
    #[serde(alias = "es")]
    Spanish,
    #[serde(alias = "en")]
    English,
}

impl FromStr for Calendar {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "es" | "spanish" => Ok(Calendar::Spanish),
            "en" | "english" => Ok(Calendar::English),
            other => anyhow::bail!("unsupported locale {:?}", other),
        }
    }
}

impl DateDimensionExtractor for Calendar {
    fn day_labels(&self) -> &'static [&'static str; 7] {
        match self {
            Calendar::Spanish => &ES_DAYS,
            Calendar::English => &EN_DAYS,
        }
    }

    fn month_labels(&self) -> &'static [&'static str; 12] {
        match self {
            Calendar::Spanish => &ES_MONTHS,
            Calendar::English => &EN_MONTHS,
        }
    }
}
