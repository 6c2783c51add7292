use chrono::NaiveDate;

use crate::{
    config::Config,
    model::MeteringData,
    operation::{DateRange, Operation},
    prelude::*,
    session::{Resolution, Session, State},
    transport::{AsyncTransport, ReqwestTransport},
};

/// Non-blocking client.
///
/// Dropping an in-flight call leaves the session open and usable. The session is released
/// when the client is closed or dropped, whichever comes first.
///
/// ```no_run
/// use chrono::NaiveDate;
/// use conso::{AsyncClient, Config};
///
/// # async fn run() -> conso::Result {
/// let mut client = AsyncClient::connect(Config::new("eyJhbGciOi…")).await?;
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let end = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
/// let curve = client.consumption_load_curve(start, end).await?;
/// println!("{:?} W", curve.average());
/// client.close();
/// # Ok(())
/// # }
/// ```
pub struct AsyncClient<T: AsyncTransport = ReqwestTransport> {
    session: Session,
    transport: T,
}

impl AsyncClient<ReqwestTransport> {
    /// Open a session over the default transport.
    pub async fn connect(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout);
        let mut client = Self::new(config, transport);
        client.open().await?;
        Ok(client)
    }
}

impl<T: AsyncTransport> AsyncClient<T> {
    /// Create an unopened session.
    pub const fn new(config: Config, transport: T) -> Self {
        Self { session: Session::new(config), transport }
    }

    /// Open a session, run the closure, and close the session whatever the outcome.
    pub async fn scoped<R>(
        config: Config,
        transport: T,
        f: impl AsyncFnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let mut client = Self::new(config, transport);
        let result = match client.open().await {
            Ok(()) => f(&mut client).await,
            Err(error) => Err(error),
        };
        client.close();
        result
    }

    /// Validate the token and connect the transport.
    ///
    /// Opening an open session does nothing.
    #[instrument(skip_all)]
    pub async fn open(&mut self) -> Result {
        if self.session.begin_open()? {
            self.transport.connect().await?;
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

    #[must_use]
    pub fn prm(&self) -> Option<&str> {
        self.session.prm()
    }

    #[must_use]
    pub fn prms(&self) -> Option<&[String]> {
        self.session.prms()
    }

    pub async fn daily_consumption(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData> {
        self.fetch(Operation::DailyConsumption, DateRange::new(start, end)?).await
    }

    pub async fn consumption_load_curve(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData> {
        self.fetch(Operation::ConsumptionLoadCurve, DateRange::new(start, end)?).await
    }

    pub async fn max_power(&mut self, start: NaiveDate, end: NaiveDate) -> Result<MeteringData> {
        self.fetch(Operation::ConsumptionMaxPower, DateRange::new(start, end)?).await
    }

    pub async fn daily_production(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData> {
        self.fetch(Operation::DailyProduction, DateRange::new(start, end)?).await
    }

    pub async fn production_load_curve(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData> {
        self.fetch(Operation::ProductionLoadCurve, DateRange::new(start, end)?).await
    }

    #[instrument(skip_all, fields(operation = %operation, start = %range.start(), end = %range.end()))]
    pub async fn fetch(&mut self, operation: Operation, range: DateRange) -> Result<MeteringData> {
        let prm = match self.session.resolve_prm()? {
            Resolution::Selected(prm) => prm,
            Resolution::Discover(request) => {
                let response = self.transport.execute(&request).await?;
                self.session.complete_discovery(&response)?
            }
        };
        info!(prm = prm.as_str(), "fetching…");
        let request = self.session.metering_request(operation, &prm, range)?;
        let response = self.transport.execute(&request).await?;
        self.session.finish(operation, &prm, range, &response)
    }
}

impl<T: AsyncTransport> Drop for AsyncClient<T> {
    fn drop(&mut self) {
        self.close();
    }
}
