//! Battery local JSON API, version 2.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Method,
    StatusCode,
    Url,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use tokio::time::sleep;

use crate::{
    core::{
        device::Device,
        status::{BatteryStatus, OperatingMode},
    },
    prelude::*,
    quantity::power::Watts,
};

/// Failure of a single request attempt.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("the request has timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("the battery has responded with `{0}`")]
    Status(StatusCode),

    #[error("the request has failed")]
    Http(#[source] reqwest::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() { Self::Timeout(error) } else { Self::Http(error) }
    }
}

/// All the attempts have been exhausted.
#[derive(Debug, thiserror::Error)]
#[error("`{method} {path}` has failed after {attempts} attempt(s)")]
pub struct RequestFailed {
    pub method: Method,
    pub path: String,
    pub attempts: u32,

    #[source]
    pub source: TransportError,
}

pub struct Client {
    inner: reqwest::Client,

    /// Base URL without the trailing slash.
    base_url: String,

    max_attempts: u32,

    /// The n-th retry is delayed by `n × backoff_step`.
    backoff_step: Duration,

    /// Per-attempt deadline.
    timeout: Duration,
}

impl Client {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(3);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn try_new(base_url: &Url, token: &str) -> Result<Self> {
        let mut token =
            HeaderValue::from_str(token).context("the token is not a valid header value")?;
        token.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("Auth-Token", token);
        let inner = reqwest::Client::builder()
            .user_agent("dusk")
            .default_headers(headers)
            .build()?;
        Ok(Self {
            inner,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff_step: Self::DEFAULT_BACKOFF_STEP,
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, max_attempts: u32, backoff_step: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_step = backoff_step;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay before the retry that follows the failed `attempt`.
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(method = %method, path = path))]
    async fn call(
        &self,
        method: Method,
        path: &str,
        form: Option<&str>,
    ) -> Result<String, RequestFailed> {
        let url = format!("{}/{path}", self.base_url);
        let mut attempt = 1;
        loop {
            match self.send(method.clone(), &url, form).await {
                Ok(body) => {
                    debug!(attempt, "succeeded");
                    return Ok(body);
                }
                Err(source) if attempt >= self.max_attempts => {
                    let path = path.to_owned();
                    return Err(RequestFailed { method, path, attempts: attempt, source });
                }
                Err(error) => {
                    let backoff = self.backoff(attempt);
                    warn!(attempt, ?backoff, "retrying: {error:#}");
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        form: Option<&str>,
    ) -> Result<String, TransportError> {
        let mut request = self.inner.request(method, url).timeout(self.timeout);
        if let Some(form) = form {
            request = request
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(form.to_owned());
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(TransportError::Status(status));
        }
        Ok(response.text().await?)
    }

    async fn set_operating_mode(&self, operating_mode: OperatingMode) -> Result {
        #[serde_as]
        #[derive(Serialize)]
        struct Configuration {
            #[serde(rename = "EM_OperatingMode")]
            #[serde_as(as = "DisplayFromStr")]
            operating_mode: OperatingMode,
        }

        info!(%operating_mode, "switching…");
        let form = serde_qs::to_string(&Configuration { operating_mode })?;
        self.call(Method::PUT, "configurations", Some(&form))
            .await
            .with_context(|| format!("failed to switch to the operating mode `{operating_mode}`"))?;
        Ok(())
    }
}

#[async_trait]
impl Device for Client {
    async fn status(&self) -> Result<BatteryStatus> {
        let body = self.call(Method::GET, "status", None).await.context("failed to get the status")?;
        serde_json::from_str(&body).context("failed to deserialize the status")
    }

    async fn start_discharge(&self, power: Watts) -> Result {
        let path = format!("setpoint/discharge/{}", power.to_setpoint());
        self.call(Method::POST, &path, None).await.context("failed to start the discharge")?;
        Ok(())
    }

    async fn stop_discharge(&self) -> Result {
        let path = format!("setpoint/discharge/{}", Watts::ZERO.to_setpoint());
        self.call(Method::POST, &path, None).await.context("failed to stop the discharge")?;
        Ok(())
    }

    async fn switch_to_manual(&self, current: OperatingMode) -> Result {
        if current == OperatingMode::Manual {
            debug!("already in the manual mode");
            return Ok(());
        }
        self.set_operating_mode(OperatingMode::Manual).await
    }

    async fn switch_to_automatic(&self, current: OperatingMode) -> Result {
        if current == OperatingMode::Automatic {
            debug!("already in the automatic mode");
            return Ok(());
        }
        self.set_operating_mode(OperatingMode::Automatic).await
    }
}

#[cfg(test)]
mod tests {
    use mockito::Server;
    use tokio::net::TcpListener;

    use super::*;
    use crate::quantity::{energy::WattHours, percent::Percent};

    fn client(server: &Server) -> Result<Client> {
        let base_url = Url::parse(&format!("{}/api/v2/", server.url()))?;
        Ok(Client::try_new(&base_url, "secret")?.with_retry_policy(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn status_ok() -> Result {
        let mut server = Server::new_async().await;
        // language=json
        let body = r#"{
            "OperatingMode": "2",
            "RSOC": 61,
            "USOC": 57,
            "RemainingCapacity_Wh": 6077,
            "Consumption_W": 2101,
            "Pac_total_W": -300,
            "BatteryDischarging": false
        }"#;
        let mock = server
            .mock("GET", "/api/v2/status")
            .match_header("Auth-Token", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let status = client(&server)?.status().await?;
        assert_eq!(status.operating_mode, OperatingMode::Automatic);
        assert_eq!(status.relative_state_of_charge, Percent(61.0));
        assert_eq!(status.remaining_capacity, WattHours(6077.0));
        assert_eq!(status.ac_power, Watts(-300.0));
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn start_discharge_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/setpoint/discharge/800")
            .match_header("Auth-Token", "secret")
            .with_status(201)
            .create_async()
            .await;

        client(&server)?.start_discharge(Watts(800.0)).await?;
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn stop_discharge_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/setpoint/discharge/0")
            .match_header("Auth-Token", "secret")
            .with_status(201)
            .create_async()
            .await;

        client(&server)?.stop_discharge().await?;
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn switch_to_manual_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/v2/configurations")
            .match_header("Auth-Token", "secret")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body("EM_OperatingMode=1")
            .with_status(200)
            .create_async()
            .await;

        client(&server)?.switch_to_manual(OperatingMode::Automatic).await?;
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn switch_to_automatic_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/v2/configurations")
            .match_body("EM_OperatingMode=2")
            .with_status(200)
            .create_async()
            .await;

        client(&server)?.switch_to_automatic(OperatingMode::Manual).await?;
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn switch_is_skipped_when_already_there() -> Result {
        let mut server = Server::new_async().await;
        let mock = server.mock("PUT", "/api/v2/configurations").expect(0).create_async().await;

        let client = client(&server)?;
        client.switch_to_manual(OperatingMode::Manual).await?;
        client.switch_to_automatic(OperatingMode::Automatic).await?;
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn retries_are_exhausted() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/setpoint/discharge/0")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let error = client(&server)?.stop_discharge().await.unwrap_err();
        let request_failed = error.downcast_ref::<RequestFailed>().unwrap();
        assert_eq!(request_failed.attempts, 3);
        assert_eq!(request_failed.path, "setpoint/discharge/0");
        assert!(matches!(
            request_failed.source,
            TransportError::Status(StatusCode::INTERNAL_SERVER_ERROR),
        ));
        mock.assert_async().await;
        Ok(())
    }

    #[test]
    fn backoff_grows_linearly() -> Result {
        let client = Client::try_new(&Url::parse("http://192.168.1.10/api/v2")?, "secret")?;
        assert_eq!(client.backoff(1), Duration::from_secs(3));
        assert_eq!(client.backoff(2), Duration::from_secs(6));
        assert_eq!(client.backoff(3), Duration::from_secs(9));
        assert_eq!(client.backoff(4), Duration::from_secs(12));
        Ok(())
    }

    #[tokio::test]
    async fn timed_out_attempts_are_retried() -> Result {
        // Accept the connections but never respond.
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let acceptor = tokio::spawn(async move {
            let mut streams = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                streams.push(stream);
            }
        });

        let client = Client::try_new(&Url::parse(&format!("http://{address}/api/v2"))?, "secret")?
            .with_retry_policy(3, Duration::from_millis(1))
            .with_timeout(Duration::from_millis(100));
        let error = client.status().await.unwrap_err();
        acceptor.abort();

        let request_failed = error.downcast_ref::<RequestFailed>().unwrap();
        assert_eq!(request_failed.attempts, 3);
        assert_eq!(request_failed.path, "status");
        assert!(matches!(request_failed.source, TransportError::Timeout(_)));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_status_is_an_error() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v2/status")
            .with_status(200)
            .with_body("<html></html>")
            .expect(1)
            .create_async()
            .await;

        assert!(client(&server)?.status().await.is_err());
        mock.assert_async().await;
        Ok(())
    }
}
