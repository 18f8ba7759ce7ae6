use serde::Deserialize;
use tracing::level_filters::LevelFilter;

/// Deployment environment, selects the log format and verbosity.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Compact logs without timestamps, for running in a terminal.
    #[default]
    #[display("local")]
    Local,

    #[display("dev")]
    Dev,

    /// JSON logs, for collection by the service manager.
    #[display("prod")]
    Prod,
}

impl Environment {
    pub const fn max_level(self) -> LevelFilter {
        match self {
            Self::Local | Self::Dev => LevelFilter::DEBUG,
            Self::Prod => LevelFilter::INFO,
        }
    }

    pub fn init_tracing(self) {
        let subscriber = tracing_subscriber::fmt().with_max_level(self.max_level());
        match self {
            Self::Local => subscriber.without_time().compact().init(),
            Self::Dev => subscriber.compact().init(),
            Self::Prod => subscriber.json().init(),
        }
    }
}
