//! Metering data returned by the API.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::{
    operation::{DateRange, Operation},
    prelude::*,
};

/// Default load curve granularity, used when a load curve reading does not specify it.
const DEFAULT_INTERVAL_LENGTH: &str = "PT30M";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    #[display("energy")]
    Energy,

    #[display("power")]
    Power,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    #[display("sum")]
    Sum,

    #[display("average")]
    Average,

    #[display("maximum")]
    Maximum,
}

/// Unit and aggregation of the readings.
#[must_use]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReadingType {
    /// `Wh` for energy, `W` for power, `VA` for apparent power.
    pub unit: String,

    pub measurement_kind: MeasurementKind,

    pub aggregate: Aggregate,

    /// ISO 8601 duration, for example `P1D`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measuring_period: Option<String>,
}

/// Reading timestamp: a calendar date for daily readings, a date-time for load curve points.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(untagged)]
pub enum ReadingDate {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl ReadingDate {
    #[must_use]
    pub fn date(self) -> NaiveDate {
        match self {
            Self::Date(date) => date,
            Self::DateTime(date_time) => date_time.date(),
        }
    }

    /// Daily readings are considered to start at midnight.
    #[must_use]
    pub fn date_time(self) -> NaiveDateTime {
        match self {
            Self::Date(date) => date.and_time(NaiveTime::MIN),
            Self::DateTime(date_time) => date_time,
        }
    }
}

impl FromStr for ReadingDate {
    type Err = chrono::ParseError;

    /// Parse `2024-01-01`, `2024-01-01T00:30:00`, or `2024-01-01 00:30:00`.
    ///
    /// Date-times may also omit the seconds or carry an offset. The offset is dropped,
    /// keeping the meter's wall-clock time.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains(['T', ' ']) {
            return s.parse().map(Self::Date);
        }
        let s = s.replacen(' ', "T", 1);
        DateTime::parse_from_rfc3339(&s)
            .map(|date_time| date_time.naive_local())
            .or_else(|_| s.parse::<NaiveDateTime>())
            .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M"))
            .map(Self::DateTime)
    }
}

impl fmt::Display for ReadingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{date}"),
            Self::DateTime(date_time) => write!(f, "{}", date_time.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

#[must_use]
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct IntervalReading {
    /// Wh for energy, W for power, VA for apparent power.
    pub value: u64,

    pub date: ReadingDate,

    /// Load curve granularity as an ISO 8601 duration, load curves only.
    pub interval_length: Option<String>,

    /// Peak power classifier, maximum power only.
    pub measure_type: Option<String>,
}

/// Result of a single metering call.
///
/// `start` and `end` are the requested ones, not the range echoed by the server.
/// Every reading falls on a date within `[start, end)`, except for load curves: their points
/// are stamped with the end of the interval, so the last one may fall on `end` at midnight.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeteringData {
    usage_point_id: String,
    range: DateRange,
    quality: String,
    reading_type: ReadingType,
    interval_reading: Vec<IntervalReading>,

    #[serde(skip)]
    total: u64,
}

impl MeteringData {
    /// Assemble the metering data from a successful response body.
    pub fn from_response(
        operation: Operation,
        prm: &str,
        range: DateRange,
        body: &[u8],
    ) -> Result<Self, ShapeError> {
        let response: Response = serde_json::from_slice(body)?;

        let expected = operation.expected_reading_type();
        let actual = (response.reading_type.measurement_kind, response.reading_type.aggregate);
        if actual != expected {
            return Err(ShapeError::ReadingType { operation, expected, actual });
        }
        if let Some(usage_point_id) = &response.usage_point_id
            && usage_point_id != prm
        {
            warn!(prm, %usage_point_id, "the response is for another PRM");
        }

        let mut interval_reading = response
            .interval_reading
            .into_iter()
            .map(|reading| reading.decorate(operation))
            .collect::<Vec<_>>();
        interval_reading.sort_by_key(|reading| reading.date.date_time());

        if let Some(reading) =
            interval_reading.iter().find(|reading| !is_within(operation, range, reading.date))
        {
            return Err(ShapeError::OutOfRange { date: reading.date, range });
        }
        let total = interval_reading
            .iter()
            .try_fold(0_u64, |total, reading| total.checked_add(reading.value))
            .ok_or(ShapeError::TotalOverflow)?;

        Ok(Self {
            usage_point_id: prm.to_owned(),
            range,
            quality: response.quality,
            reading_type: response.reading_type,
            interval_reading,
            total,
        })
    }

    #[must_use]
    pub fn usage_point_id(&self) -> &str {
        &self.usage_point_id
    }

    #[must_use]
    pub const fn range(&self) -> DateRange {
        self.range
    }

    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.range.start()
    }

    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.range.end()
    }

    /// Data quality indicator, as reported by the API (for example, `BRUT`).
    #[must_use]
    pub fn quality(&self) -> &str {
        &self.quality
    }

    pub const fn reading_type(&self) -> &ReadingType {
        &self.reading_type
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.reading_type.unit
    }

    /// Readings in ascending date order. Gaps are kept as they are.
    #[must_use]
    pub fn interval_reading(&self) -> &[IntervalReading] {
        &self.interval_reading
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IntervalReading> {
        self.interval_reading.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interval_reading.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interval_reading.is_empty()
    }

    /// Sum of the reading values, zero when there are no readings.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Mean of the reading values.
    ///
    /// There is no meaningful mean of nothing, so [`None`] is returned when there are no readings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> Option<f64> {
        if self.interval_reading.is_empty() {
            None
        } else {
            Some(self.total() as f64 / self.interval_reading.len() as f64)
        }
    }
}

impl<'a> IntoIterator for &'a MeteringData {
    type Item = &'a IntervalReading;
    type IntoIter = std::slice::Iter<'a, IntervalReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The response is successful, but it does not look like what the operation should return.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("failed to deserialize the response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("`{operation}` must return {} {}, got {} {}", expected.0, expected.1, actual.0, actual.1)]
    ReadingType {
        operation: Operation,
        expected: (MeasurementKind, Aggregate),
        actual: (MeasurementKind, Aggregate),
    },

    #[error("reading at `{date}` is outside of `{}`..`{}`", range.start(), range.end())]
    OutOfRange { date: ReadingDate, range: DateRange },

    #[error("the reading values sum up beyond `u64::MAX`")]
    TotalOverflow,
}

/// Load curve points are stamped with the end of their interval,
/// so the last one of the range falls on `end` at midnight.
fn is_within(operation: Operation, range: DateRange, date: ReadingDate) -> bool {
    match date {
        ReadingDate::DateTime(date_time)
            if operation.is_load_curve() && date_time == range.end().and_time(NaiveTime::MIN) =>
        {
            true
        }
        _ => range.contains(date.date()),
    }
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    usage_point_id: Option<String>,

    quality: String,

    reading_type: ReadingType,

    #[serde(default)]
    interval_reading: Vec<RawReading>,
}

#[serde_as]
#[derive(Deserialize)]
struct RawReading {
    /// The API sends the values as strings.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    value: u64,

    #[serde_as(as = "DisplayFromStr")]
    date: ReadingDate,

    #[serde(default)]
    interval_length: Option<String>,

    #[serde(default)]
    measure_type: Option<String>,
}

impl RawReading {
    fn decorate(self, operation: Operation) -> IntervalReading {
        let interval_length = operation.is_load_curve().then(|| {
            self.interval_length.unwrap_or_else(|| DEFAULT_INTERVAL_LENGTH.to_owned())
        });
        let measure_type = self.measure_type.filter(|_| operation.is_max_power());
        IntervalReading { value: self.value, date: self.date, interval_length, measure_type }
    }
}
