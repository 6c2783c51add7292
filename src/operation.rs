use std::fmt;

use chrono::{Days, Local, NaiveDate};
use http::Method;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{
    model::{Aggregate, MeasurementKind},
    prelude::*,
};

/// Metering data kinds served by the API.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Operation {
    /// Daily energy consumption, in Wh.
    DailyConsumption,

    /// Average consumed power over 30-minute intervals, in W.
    ConsumptionLoadCurve,

    /// Daily maximum apparent power, in VA.
    ConsumptionMaxPower,

    /// Daily energy production, in Wh.
    DailyProduction,

    /// Average produced power over 30-minute intervals, in W.
    ProductionLoadCurve,
}

impl Operation {
    pub const ALL: [Self; 5] = [
        Self::DailyConsumption,
        Self::ConsumptionLoadCurve,
        Self::ConsumptionMaxPower,
        Self::DailyProduction,
        Self::ProductionLoadCurve,
    ];

    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::DailyConsumption => "daily_consumption",
            Self::ConsumptionLoadCurve => "consumption_load_curve",
            Self::ConsumptionMaxPower => "consumption_max_power",
            Self::DailyProduction => "daily_production",
            Self::ProductionLoadCurve => "production_load_curve",
        }
    }

    #[must_use]
    pub const fn is_load_curve(self) -> bool {
        matches!(self, Self::ConsumptionLoadCurve | Self::ProductionLoadCurve)
    }

    #[must_use]
    pub const fn is_max_power(self) -> bool {
        matches!(self, Self::ConsumptionMaxPower)
    }

    /// Measurement kind and aggregation the response must declare.
    #[must_use]
    pub const fn expected_reading_type(self) -> (MeasurementKind, Aggregate) {
        match self {
            Self::DailyConsumption | Self::DailyProduction => {
                (MeasurementKind::Energy, Aggregate::Sum)
            }
            Self::ConsumptionLoadCurve | Self::ProductionLoadCurve => {
                (MeasurementKind::Power, Aggregate::Average)
            }
            Self::ConsumptionMaxPower => (MeasurementKind::Power, Aggregate::Maximum),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Calendar date range: `start` inclusive, `end` exclusive.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, UsageError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(UsageError::InvalidDateRange { start, end })
        }
    }

    /// From yesterday to today, in the local time zone.
    #[must_use]
    pub fn yesterday() -> Self {
        let end = Local::now().date_naive();
        Self { start: end - Days::new(1), end }
    }

    #[must_use]
    pub const fn start(self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub const fn end(self) -> NaiveDate {
        self.end
    }

    /// Whether the date falls into `[start, end)`.
    #[must_use]
    pub fn contains(self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// Query string of a metering request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MeteringQuery {
    pub prm: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Everything needed to issue a request, except the base URL and the credentials.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: &'static str,
    pub query: Option<MeteringQuery>,
}

impl RequestDescriptor {
    const LIST_PRMS_PATH: &'static str = "prms";

    #[must_use]
    pub fn metering(operation: Operation, prm: &str, range: DateRange) -> Self {
        Self {
            method: Method::GET,
            path: operation.path(),
            query: Some(MeteringQuery { prm: prm.to_owned(), start: range.start, end: range.end }),
        }
    }

    /// List the PRMs the token grants access to.
    #[must_use]
    pub const fn list_prms() -> Self {
        Self { method: Method::GET, path: Self::LIST_PRMS_PATH, query: None }
    }

    /// Resolve the descriptor against the API base URL.
    pub fn url(&self, base_url: &Url) -> Result<Url, UsageError> {
        let mut url = base_url.clone();
        url.path_segments_mut()
            .map_err(|()| UsageError::InvalidRequest(format!("`{base_url}` cannot be a base URL")))?
            .pop_if_empty()
            .push(self.path);
        match &self.query {
            Some(query) => {
                let query = serde_qs::to_string(query)
                    .map_err(|error| UsageError::InvalidRequest(error.to_string()))?;
                url.set_query(Some(&query));
            }
            None => url.set_query(None),
        }
        Ok(url)
    }
}
