//! Client for the [Conso API](https://conso.boris.sh), which serves Linky smart meter readings.
//!
//! The request pipeline is implemented once in a sans-I/O session and driven by two clients:
//!
//! - [`Client`] blocks the calling thread on every request ([`ureq`] by default);
//! - [`AsyncClient`] suspends the calling task instead ([`reqwest`] by default).
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use conso::{Client, Config};
//!
//! # fn main() -> conso::Result {
//! let mut client = Client::connect(Config::new("eyJhbGciOi…"))?;
//! let data = client.daily_consumption(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
//! )?;
//! println!("{} Wh over {} days", data.total(), data.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod model;
mod operation;
mod prelude;
mod session;
#[cfg(test)]
mod testing;
mod token;
mod transport;

pub use self::{
    client::{AsyncClient, Client},
    config::Config,
    error::{Error, Result, TransportError, UsageError},
    model::{Aggregate, IntervalReading, MeasurementKind, MeteringData, ReadingDate, ReadingType, ShapeError},
    operation::{DateRange, MeteringQuery, Operation, RequestDescriptor},
    session::State,
    token::{Token, is_valid_prm},
    transport::{
        AsyncTransport,
        HttpRequest,
        HttpResponse,
        ReqwestTransport,
        Transport,
        UreqTransport,
    },
};
