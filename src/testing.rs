//! Fixtures and scripted transports shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::NaiveDate;
use http::StatusCode;
use serde_json::{Value, json};

use crate::{
    error::TransportError,
    operation::DateRange,
    transport::{AsyncTransport, HttpRequest, HttpResponse, Transport},
};

pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

pub const SINGLE_PRM: &str = "12345678901234";

pub const MULTI_PRMS: [&str; 2] = ["12345678901234", "98765432109876"];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().without_time().compact().with_test_writer().try_init();
}

/// Build an unsigned token carrying the claims.
pub fn forge_token(claims: &Value) -> String {
    let header = json!({ "alg": "HS256", "typ": "JWT" });
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode("signature"),
    )
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn range(start: (i32, u32, u32), end: (i32, u32, u32)) -> DateRange {
    DateRange::new(date(start.0, start.1, start.2), date(end.0, end.1, end.2)).unwrap()
}

pub fn json_response(status: u16, body: &Value) -> HttpResponse {
    HttpResponse { status: StatusCode::from_u16(status).unwrap(), body: body.to_string().into_bytes() }
}

pub fn daily_consumption_response() -> Value {
    // language=JSON
    json!({
        "usage_point_id": SINGLE_PRM,
        "start": "2024-01-01",
        "end": "2024-01-04",
        "quality": "BRUT",
        "reading_type": {
            "unit": "Wh",
            "measurement_kind": "energy",
            "aggregate": "sum",
            "measuring_period": "P1D"
        },
        "interval_reading": [
            { "value": "11776", "date": "2024-01-01" },
            { "value": "14401", "date": "2024-01-02" },
            { "value": "12820", "date": "2024-01-03" }
        ]
    })
}

/// Seven days summing up to 1750 Wh.
pub fn week_response() -> Value {
    let readings = [100, 200, 150, 300, 250, 400, 350]
        .iter()
        .zip(1..)
        .map(|(value, day)| json!({ "value": value.to_string(), "date": format!("2024-01-0{day}") }))
        .collect::<Vec<_>>();
    // language=JSON
    json!({
        "usage_point_id": SINGLE_PRM,
        "start": "2024-01-01",
        "end": "2024-01-08",
        "quality": "BRUT",
        "reading_type": {
            "unit": "Wh",
            "measurement_kind": "energy",
            "aggregate": "sum",
            "measuring_period": "P1D"
        },
        "interval_reading": readings
    })
}

pub fn load_curve_response() -> Value {
    // language=JSON
    json!({
        "usage_point_id": SINGLE_PRM,
        "start": "2024-01-01",
        "end": "2024-01-02",
        "quality": "BRUT",
        "reading_type": {
            "unit": "W",
            "measurement_kind": "power",
            "aggregate": "average"
        },
        "interval_reading": [
            { "value": "450", "date": "2024-01-01 00:00:00", "interval_length": "PT30M" },
            { "value": "380", "date": "2024-01-01 00:30:00", "interval_length": "PT30M" },
            { "value": "410", "date": "2024-01-01 01:00:00", "interval_length": "PT30M" }
        ]
    })
}

pub fn max_power_response() -> Value {
    // language=JSON
    json!({
        "usage_point_id": SINGLE_PRM,
        "start": "2024-01-01",
        "end": "2024-01-04",
        "quality": "BRUT",
        "reading_type": {
            "unit": "VA",
            "measurement_kind": "power",
            "aggregate": "maximum",
            "measuring_period": "P1D"
        },
        "interval_reading": [
            { "value": "6120", "date": "2024-01-01 18:42:10", "measure_type": "B" },
            { "value": "5410", "date": "2024-01-02 07:12:55", "measure_type": "B" },
            { "value": "7034", "date": "2024-01-03 19:03:31", "measure_type": "B" }
        ]
    })
}

/// Observes what a scripted transport went through, after the transport is moved into a client.
#[derive(Clone, Default)]
pub struct Probe(Arc<ProbeInner>);

#[derive(Default)]
struct ProbeInner {
    requests: Mutex<Vec<HttpRequest>>,
    connects: AtomicUsize,
    releases: AtomicUsize,
}

impl Probe {
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.0.requests.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.0.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.0.releases.load(Ordering::SeqCst)
    }

    fn record(&self, request: &HttpRequest) {
        self.0.requests.lock().unwrap().push(request.clone());
    }
}

type Reply = Result<HttpResponse, &'static str>;

/// Blocking transport replaying the scripted replies in order.
///
/// An `Err` reply becomes a transport failure. Running out of replies is a transport failure too.
pub struct ScriptedTransport {
    probe: Probe,
    replies: VecDeque<Reply>,
}

impl ScriptedTransport {
    pub fn new(probe: &Probe, replies: impl IntoIterator<Item = Reply>) -> Self {
        Self { probe: probe.clone(), replies: replies.into_iter().collect() }
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.probe.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.probe.record(request);
        match self.replies.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(TransportError::new(message)),
            None => Err(TransportError::new("the script is exhausted")),
        }
    }

    fn release(&mut self) {
        self.probe.0.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Non-blocking transport replaying the scripted replies in order.
///
/// A `None` reply never completes, so that the caller may cancel the call.
pub struct AsyncScriptedTransport {
    probe: Probe,
    replies: VecDeque<Option<Reply>>,
}

impl AsyncScriptedTransport {
    pub fn new(probe: &Probe, replies: impl IntoIterator<Item = Option<Reply>>) -> Self {
        Self { probe: probe.clone(), replies: replies.into_iter().collect() }
    }
}

#[async_trait]
impl AsyncTransport for AsyncScriptedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.probe.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.probe.record(request);
        match self.replies.pop_front() {
            Some(Some(Ok(response))) => Ok(response),
            Some(Some(Err(message))) => Err(TransportError::new(message)),
            Some(None) => std::future::pending().await,
            None => Err(TransportError::new("the script is exhausted")),
        }
    }

    fn release(&mut self) {
        self.probe.0.releases.fetch_add(1, Ordering::SeqCst);
    }
}
