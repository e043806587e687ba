//! The persisted epidemic record.

use chrono::{Duration, NaiveDate};
use pulse_core::{CacheRecord, NumberLocale};

use crate::types::{Day, EpidemicSnapshot};

/// Store key of the 7-field epidemic record.
pub const EPIDEMIC_KEY: &str = "covid_data";

/// Index of the tests figure, the record's change marker.
pub const TESTS_FIELD: usize = 5;

/// Figures as the display layer shows them, locale-grouped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EpidemicRecord {
    pub today_cases: String,
    pub today_deaths: String,
    pub total_cases: String,
    pub critical_cases: String,
    pub country_name: String,
    pub tests: String,
    pub date_label: String,
}

impl CacheRecord for EpidemicRecord {
    const DELIMITER: char = ']';
    const FIELD_COUNT: usize = 7;
    const COMPARISON_FIELD: Option<usize> = Some(TESTS_FIELD);

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.today_cases.clone(),
            self.today_deaths.clone(),
            self.total_cases.clone(),
            self.critical_cases.clone(),
            self.country_name.clone(),
            self.tests.clone(),
            self.date_label.clone(),
        ]
    }

    fn from_fields(fields: Vec<String>) -> Self {
        let mut it = fields.into_iter();
        let mut next = || it.next().unwrap_or_default();
        Self {
            today_cases: next(),
            today_deaths: next(),
            total_cases: next(),
            critical_cases: next(),
            country_name: next(),
            tests: next(),
            date_label: next(),
        }
    }
}

impl EpidemicRecord {
    /// Format `snapshot` for the store. `today` is the local calendar date;
    /// a yesterday snapshot is labelled one day earlier.
    pub fn from_snapshot(snapshot: &EpidemicSnapshot, locale: &NumberLocale, today: NaiveDate) -> Self {
        let date = match snapshot.as_of {
            Day::Today => today,
            Day::Yesterday => today - Duration::days(1),
        };
        Self {
            today_cases: locale.format(snapshot.today_cases),
            today_deaths: locale.format(snapshot.today_deaths),
            total_cases: locale.format(snapshot.total_cases),
            critical_cases: locale.format(snapshot.critical_cases),
            country_name: snapshot.country_name.clone(),
            tests: locale.format(snapshot.tests),
            date_label: date_label(date),
        }
    }

    /// Tests figure read back with the grouping it was written with.
    pub fn tests_count(&self, locale: &NumberLocale) -> Option<i64> {
        locale.parse(&self.tests)
    }
}

/// Day of month and short month name, e.g. "19 Oct".
pub fn date_label(date: NaiveDate) -> String {
    date.format("%-d %b").to_string()
}
