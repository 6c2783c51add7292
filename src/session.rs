//! Sans-I/O session shared by the blocking and the async clients.
//!
//! The session owns the state machine, the PRM selection, and the response interpretation.
//! It never performs I/O: it hands out [`HttpRequest`]s and takes [`HttpResponse`]s back,
//! and the clients move them through their transports.

use http::{HeaderMap, HeaderValue, header};
use serde::Deserialize;

use crate::{
    config::Config,
    model::MeteringData,
    operation::{DateRange, Operation, RequestDescriptor},
    prelude::*,
    token::{Token, is_valid_prm},
    transport::{HttpRequest, HttpResponse},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, derive_more::Display)]
pub enum State {
    #[display("unopened")]
    Unopened,

    #[display("open")]
    Open,

    #[display("closed")]
    Closed,
}

/// PRMs the token grants access to, looked up at most once per session.
#[derive(Clone, Debug)]
enum PrmSet {
    Unresolved,
    Resolved(Vec<String>),
}

/// What it takes to learn the PRM of a call.
#[derive(Debug)]
pub enum Resolution {
    Selected(String),

    /// The token does not list its PRMs, the listing has to be fetched first.
    Discover(HttpRequest),
}

#[derive(Debug)]
pub struct Session {
    config: Config,
    state: State,
    token: Option<Token>,
    prms: PrmSet,
}

impl Session {
    pub const fn new(config: Config) -> Self {
        Self { config, state: State::Unopened, token: None, prms: PrmSet::Unresolved }
    }

    pub const fn state(&self) -> State {
        self.state
    }

    /// Validate the token ahead of opening.
    ///
    /// Returns whether the transport has to be connected, that is, the session is not open yet.
    pub fn begin_open(&mut self) -> Result<bool> {
        match self.state {
            State::Open => Ok(false),
            State::Closed => Err(UsageError::Closed.into()),
            State::Unopened => {
                self.token = Some(Token::parse(&self.config.token)?);
                Ok(true)
            }
        }
    }

    /// Mark the session open, once the transport is connected.
    pub fn finish_open(&mut self) {
        debug_assert_eq!(self.state, State::Unopened);
        self.state = State::Open;
        info!(prm = self.config.prm.as_deref(), "opened");
    }

    /// Move to the closed state.
    ///
    /// Returns whether the transport must be released: `true` exactly once per session.
    pub fn close(&mut self) -> bool {
        let was_closed = self.state == State::Closed;
        if !was_closed {
            self.state = State::Closed;
            info!("closed");
        }
        !was_closed
    }

    fn token(&self) -> Result<&Token> {
        match (self.state, &self.token) {
            (State::Open, Some(token)) => Ok(token),
            (State::Unopened, _) | (State::Open, None) => Err(UsageError::NotOpen.into()),
            (State::Closed, _) => Err(UsageError::Closed.into()),
        }
    }

    /// PRM the calls go to: the configured one, or the only one the token grants.
    pub fn prm(&self) -> Option<&str> {
        self.config.prm.as_deref().or(match &self.prms {
            PrmSet::Resolved(prms) if prms.len() == 1 => Some(prms[0].as_str()),
            _ => None,
        })
    }

    /// PRMs the token grants access to, once resolved.
    pub fn prms(&self) -> Option<&[String]> {
        match &self.prms {
            PrmSet::Resolved(prms) => Some(prms),
            PrmSet::Unresolved => None,
        }
    }

    /// Pick the PRM for the next call.
    ///
    /// An explicitly configured PRM is used as is, only the server may refuse it.
    pub fn resolve_prm(&mut self) -> Result<Resolution> {
        let claimed = self.token()?.prms().map(<[String]>::to_vec);
        if matches!(self.prms, PrmSet::Unresolved)
            && let Some(claimed) = claimed
        {
            debug!(n_prms = claimed.len(), "resolved PRMs from the token");
            self.prms = PrmSet::Resolved(claimed);
        }
        if let Some(prm) = &self.config.prm {
            return Ok(Resolution::Selected(prm.clone()));
        }
        match &self.prms {
            PrmSet::Resolved(prms) => select(prms).map(Resolution::Selected),
            PrmSet::Unresolved => {
                info!("the token does not list PRMs, fetching…");
                Ok(Resolution::Discover(self.request(&RequestDescriptor::list_prms())?))
            }
        }
    }

    /// Cache the PRM listing and pick the PRM for the call that needed it.
    pub fn complete_discovery(&mut self, response: &HttpResponse) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Listing {
            Plain(Vec<String>),
            Wrapped { prms: Vec<String> },
        }

        self.token()?;
        check_status(response, None)?;
        let prms = match serde_json::from_slice(&response.body) {
            Ok(Listing::Plain(prms) | Listing::Wrapped { prms }) => prms,
            Err(error) => return Err(Error::unexpected_response(response.status, error, &response.body)),
        };
        if let Some(prm) = prms.iter().find(|prm| !is_valid_prm(prm)) {
            return Err(Error::unexpected_response(
                response.status,
                format!("`{prm}` is not a PRM"),
                &response.body,
            ));
        }
        info!(n_prms = prms.len(), "fetched PRMs");
        let selected = select(&prms);
        self.prms = PrmSet::Resolved(prms);
        selected
    }

    /// Build the request for a metering call.
    pub fn metering_request(
        &self,
        operation: Operation,
        prm: &str,
        range: DateRange,
    ) -> Result<HttpRequest> {
        self.request(&RequestDescriptor::metering(operation, prm, range))
    }

    /// Interpret a metering call response.
    pub fn finish(
        &self,
        operation: Operation,
        prm: &str,
        range: DateRange,
        response: &HttpResponse,
    ) -> Result<MeteringData> {
        self.token()?;
        check_status(response, Some(prm))?;
        let data = MeteringData::from_response(operation, prm, range, &response.body)
            .map_err(|error| Error::unexpected_response(response.status, error, &response.body))?;
        info!(n_readings = data.len(), total = data.total(), unit = data.unit(), "fetched");
        Ok(data)
    }

    fn request(&self, descriptor: &RequestDescriptor) -> Result<HttpRequest> {
        let token = self.token()?;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|_| Error::InvalidToken("token is not a valid header value".to_owned()))?,
        );
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)
                .map_err(|error| UsageError::InvalidRequest(format!("invalid user agent: {error}")))?,
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        Ok(HttpRequest {
            method: descriptor.method.clone(),
            url: descriptor.url(&self.config.base_url)?,
            headers,
        })
    }
}

fn check_status(response: &HttpResponse, prm: Option<&str>) -> Result {
    match Error::from_response(response.status, &response.body, prm) {
        Some(error) => {
            warn!(status = %response.status, "request failed: {error}");
            Err(error)
        }
        None => Ok(()),
    }
}

fn select(prms: &[String]) -> Result<String> {
    match prms {
        [] => Err(UsageError::NoPrm.into()),
        [prm] => Ok(prm.clone()),
        _ => Err(UsageError::AmbiguousPrm { prms: prms.to_vec() }.into()),
    }
}
