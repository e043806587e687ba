use pulse_core::{JsonObject, NumberLocale};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which day's figures a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Day {
    Today,
    Yesterday,
}

impl Day {
    /// Query flag understood by the epidemic endpoint.
    pub fn query(&self) -> &'static str {
        match self {
            Day::Today => "today",
            Day::Yesterday => "yesterday",
        }
    }
}

/// One day of country-level figures.
///
/// Missing integer keys read as 0, which downstream code treats as
/// "no data" rather than a real zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpidemicSnapshot {
    pub today_cases: i64,
    pub total_cases: i64,
    pub today_deaths: i64,
    pub today_recovered: i64,
    pub critical_cases: i64,
    pub tests: i64,
    pub country_iso: String,
    pub country_name: String,
    pub as_of: Day,
}

impl EpidemicSnapshot {
    pub fn from_payload(body: &JsonObject, country_iso: &str, as_of: Day) -> Self {
        let iso = body
            .get("countryInfo")
            .and_then(|info| info.get("iso2"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(country_iso)
            .to_string();
        let name = body
            .get("country")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| iso.clone());

        Self {
            today_cases: count(body, "todayCases"),
            total_cases: count(body, "cases"),
            today_deaths: count(body, "todayDeaths"),
            today_recovered: count(body, "todayRecovered"),
            critical_cases: count(body, "critical"),
            tests: count(body, "tests"),
            country_iso: iso,
            country_name: name,
            as_of,
        }
    }

    fn field(&self, field: DeltaField) -> i64 {
        match field {
            DeltaField::Tests => self.tests,
            DeltaField::Deaths => self.today_deaths,
            DeltaField::Cases => self.total_cases,
        }
    }
}

fn count(body: &JsonObject, key: &str) -> i64 {
    body.get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
        .unwrap_or(0)
}

/// Figures that can be compared day over day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaField {
    /// Cumulative tests
    Tests,
    /// Deaths reported that day
    Deaths,
    /// Cumulative cases
    Cases,
}

/// Day-over-day difference, or `Error` when it cannot be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Value(i64),
    Error,
}

impl Delta {
    /// `today - yesterday`, unless a snapshot is missing or either side is
    /// zero.
    pub fn between(
        today: Option<&EpidemicSnapshot>,
        yesterday: Option<&EpidemicSnapshot>,
        field: DeltaField,
    ) -> Self {
        let (Some(today), Some(yesterday)) = (today, yesterday) else {
            return Delta::Error;
        };
        let (t, y) = (today.field(field), yesterday.field(field));
        if t == 0 || y == 0 {
            return Delta::Error;
        }
        Delta::Value(t - y)
    }

    pub fn value(&self) -> Option<i64> {
        match self {
            Delta::Value(v) => Some(*v),
            Delta::Error => None,
        }
    }

    /// Grouped display string, `None` for `Error`.
    pub fn format(&self, locale: &NumberLocale) -> Option<String> {
        self.value().map(|v| locale.format(v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaView {
    pub tests: Delta,
    pub deaths: Delta,
    pub cases: Delta,
}

impl DeltaView {
    pub fn between(today: Option<&EpidemicSnapshot>, yesterday: Option<&EpidemicSnapshot>) -> Self {
        Self {
            tests: Delta::between(today, yesterday, DeltaField::Tests),
            deaths: Delta::between(today, yesterday, DeltaField::Deaths),
            cases: Delta::between(today, yesterday, DeltaField::Cases),
        }
    }
}
