use chrono::NaiveDate;

use crate::{
    config::Config,
    model::MeteringData,
    operation::{DateRange, Operation},
    prelude::*,
    session::{Resolution, Session, State},
    transport::{Transport, UreqTransport},
};

/// Blocking client: every call runs to completion on the calling thread.
///
/// The session is released when the client is closed or dropped, whichever comes first.
///
/// ```no_run
/// use chrono::NaiveDate;
/// use conso::{Client, Config, UreqTransport};
///
/// # fn main() -> conso::Result {
/// let config = Config::new("eyJhbGciOi…");
/// let transport = UreqTransport::new(config.timeout);
/// let total = Client::scoped(config, transport, |client| {
///     let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
///     let end = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
///     Ok(client.daily_production(start, end)?.total())
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct Client<T: Transport = UreqTransport> {
    session: Session,
    transport: T,
}

impl Client<UreqTransport> {
    /// Open a session over the default transport.
    pub fn connect(config: Config) -> Result<Self> {
        let transport = UreqTransport::new(config.timeout);
        let mut client = Self::new(config, transport);
        client.open()?;
        Ok(client)
    }
}

impl<T: Transport> Client<T> {
    /// Create an unopened session.
    pub const fn new(config: Config, transport: T) -> Self {
        Self { session: Session::new(config), transport }
    }

    /// Open a session, run the closure, and close the session whatever the outcome.
    pub fn scoped<R>(
        config: Config,
        transport: T,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let mut client = Self::new(config, transport);
        let result = client.open().and_then(|()| f(&mut client));
        client.close();
        result
    }

    /// Validate the token and connect the transport.
    ///
    /// Opening an open session does nothing.
    #[instrument(skip_all)]
    pub fn open(&mut self) -> Result {
        if self.session.begin_open()? {
            self.transport.connect()?;
            self.session.finish_open();
        }
        Ok(())
    }

    /// Release the transport. Closing a closed session does nothing.
    pub fn close(&mut self) {
        if self.session.close() {
            self.transport.release();
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.session.state()
    }

    /// PRM the calls go to, if known yet.
    #[must_use]
    pub fn prm(&self) -> Option<&str> {
        self.session.prm()
    }

    /// PRMs the token grants access to, populated by the first call.
    #[must_use]
    pub fn prms(&self) -> Option<&[String]> {
        self.session.prms()
    }

    /// Daily energy consumption, in Wh.
    pub fn daily_consumption(&mut self, start: NaiveDate, end: NaiveDate) -> Result<MeteringData> {
        self.fetch(Operation::DailyConsumption, DateRange::new(start, end)?)
    }

    /// Average consumed power over 30-minute intervals, in W.
    pub fn consumption_load_curve(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData> {
        self.fetch(Operation::ConsumptionLoadCurve, DateRange::new(start, end)?)
    }

    /// Daily maximum apparent power, in VA.
    pub fn max_power(&mut self, start: NaiveDate, end: NaiveDate) -> Result<MeteringData> {
        self.fetch(Operation::ConsumptionMaxPower, DateRange::new(start, end)?)
    }

    /// Daily energy production, in Wh.
    pub fn daily_production(&mut self, start: NaiveDate, end: NaiveDate) -> Result<MeteringData> {
        self.fetch(Operation::DailyProduction, DateRange::new(start, end)?)
    }

    /// Average produced power over 30-minute intervals, in W.
    pub fn production_load_curve(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData> {
        self.fetch(Operation::ProductionLoadCurve, DateRange::new(start, end)?)
    }

    #[instrument(skip_all, fields(operation = %operation, start = %range.start(), end = %range.end()))]
    pub fn fetch(&mut self, operation: Operation, range: DateRange) -> Result<MeteringData> {
        let prm = match self.session.resolve_prm()? {
            Resolution::Selected(prm) => prm,
            Resolution::Discover(request) => {
                let response = self.transport.execute(&request)?;
                self.session.complete_discovery(&response)?
            }
        };
        info!(prm = prm.as_str(), "fetching…");
        let request = self.session.metering_request(operation, &prm, range)?;
        let response = self.transport.execute(&request)?;
        self.session.finish(operation, &prm, range, &response)
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        self.close();
    }
}
