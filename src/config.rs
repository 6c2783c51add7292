use std::{sync::LazyLock, time::Duration};

use bon::Builder;
use reqwest::Url;

static DEFAULT_BASE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://conso.boris.sh/api").expect("the default base URL must be valid")
});

const DEFAULT_USER_AGENT: &str = concat!("conso/", env!("CARGO_PKG_VERSION"));

/// Session configuration.
///
/// ```
/// use std::time::Duration;
///
/// let config = conso::Config::builder()
///     .token("eyJhbGciOi…")
///     .prm("12345678901234")
///     .timeout(Duration::from_secs(10))
///     .build();
/// assert_eq!(config.base_url.as_str(), "https://conso.boris.sh/api");
/// ```
#[must_use]
#[derive(Clone, Builder, derive_more::Debug)]
pub struct Config {
    /// Bearer token from <https://conso.boris.sh>.
    #[builder(into)]
    #[debug(skip)]
    pub token: String,

    /// PRM to query. When unset, it is taken from the token if the token grants exactly one.
    #[builder(into)]
    pub prm: Option<String>,

    #[builder(default = DEFAULT_BASE_URL.clone())]
    pub base_url: Url,

    #[builder(into, default = DEFAULT_USER_AGENT.to_owned())]
    pub user_agent: String,

    /// Timeout of a single request, including reading the response body.
    #[builder(default = Duration::from_secs(30))]
    pub timeout: Duration,
}

impl Config {
    pub fn new(token: impl Into<String>) -> Self {
        Self::builder().token(token).build()
    }

    pub fn with_prm(mut self, prm: impl Into<String>) -> Self {
        self.prm = Some(prm.into());
        self
    }
}
