pub mod endpoint;
pub mod error;
pub mod response;

use crate::model::{self, ClientState, DeviceInfo, DeviceModel, Measurements, Metric, Session};
use base64::{engine::general_purpose::STANDARD, Engine as _};
pub use error::Error;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha1::{Digest, Sha1};

pub fn api(host: &str, password: String) -> model::Api {
    model::Api {
        api_url: normalize_url(host),
        password,
    }
}

/// Prepend `http://` to bare hosts and drop trailing slashes.
pub fn normalize_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("http://{}", host)
    }
}

/// Password hash expected by `/api/login?login=`: lowercase hex of
/// `SHA1(model_name + password + salt)`.
pub fn login_hash(model_name: &str, password: &str, salt: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(model_name.as_bytes());
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Decode the base64 `user_info` field. Any decoding failure yields `None`.
pub fn decode_user_info(user_info: Option<&str>) -> Option<String> {
    /* whitespace such as line breaks is skipped, not rejected */
    let encoded: String = user_info?
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if encoded.is_empty() {
        return None;
    }
    let bytes = STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Map a transport-level failure to Error
fn map_transport_err(error: reqwest::Error) -> Error {
    if error.is_decode() {
        Error::ProtocolError(error.to_string())
    } else {
        Error::ConnectionError(error.to_string())
    }
}

/// Check the `STATUS` field of a device response. Anything but `"OK"` is turned into an error
/// built with `failure`, otherwise `value` is carried forward.
fn map_response_status(value: Value, failure: fn(String) -> Error) -> Result<Value, Error> {
    match value.get(response::STATUS).and_then(Value::as_str) {
        Some(response::STATUS_OK) => Ok(value),
        _ => Err(failure(value.to_string())),
    }
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value::<T>(value.clone())
        .map_err(|e| Error::ProtocolError(format!("{}: {}", e, value)))
}

/// Extract the single data field of a measurement response.
fn extract_value(value: &Value) -> Result<f64, Error> {
    let data = value
        .as_object()
        .and_then(|map| map.iter().find(|(key, _)| key.as_str() != response::STATUS))
        .map(|(_, v)| v)
        .ok_or_else(|| Error::ProtocolError(format!("response carries no data: {}", value)))?;

    match data {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::ProtocolError(format!("not a number: {}", data)))
}

/// Client of a single Novatek-Electro EM-series meter.
///
/// Holds the login session. All operations take `&mut self`, so one client serves a single
/// logical caller at a time.
#[derive(Debug)]
pub struct DeviceClient {
    api: model::Api,
    client: reqwest::Client,
    session: Option<Session>,
    info: DeviceInfo,
    state: ClientState,
}

impl DeviceClient {
    pub fn new(host: &str, password: String) -> Result<DeviceClient, Error> {
        let client = reqwest::ClientBuilder::new()
            .build()
            .or(Err(Error::InternalError))?;
        Ok(DeviceClient::with_client(api(host, password), client))
    }

    pub fn with_client(api: model::Api, client: reqwest::Client) -> DeviceClient {
        DeviceClient {
            api,
            client,
            session: None,
            info: DeviceInfo::default(),
            state: ClientState::Disconnected,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api.api_url
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    async fn get(&self, url: &str) -> Result<Value, Error> {
        let text = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(map_transport_err)?
            .text()
            .await
            .map_err(map_transport_err)?;

        log::trace!("url: {}, response_text: {}", url, text);

        serde_json::from_str::<Value>(&text)
            .map_err(|e| Error::ProtocolError(format!("invalid JSON ({}): {}", e, text)))
    }

    /// Log in to the device and open a new session.
    pub async fn connect(&mut self) -> Result<(), Error> {
        self.state = ClientState::Connecting;
        let result = self.login().await;
        self.state = match result {
            Ok(_) => ClientState::Connected,
            Err(_) => ClientState::Failed,
        };
        result
    }

    async fn login(&mut self) -> Result<(), Error> {
        self.session = None;

        log::debug!("Requesting device info from {}", self.api.api_url);
        let url = format!("{}{}", self.api.api_url, endpoint::DEVICE_INFO);
        let device_info: response::DeviceInfo =
            parse(map_response_status(self.get(&url).await?, Error::ProtocolError)?)?;

        let device_id = device_info.device_id();
        self.info = DeviceInfo {
            device_id,
            model: device_id.and_then(DeviceModel::from_device_id),
            name: decode_user_info(device_info.user_info.as_deref()),
        };

        log::debug!("Requesting login salt");
        let url = format!("{}{}", self.api.api_url, endpoint::SALT);
        let salt: response::Salt =
            parse(map_response_status(self.get(&url).await?, Error::ProtocolError)?)?;

        let hash = login_hash(self.info.model_name(), &self.api.password, &salt.salt);
        let url = format!("{}{}{}", self.api.api_url, endpoint::LOGIN, hash);
        let login: response::Login =
            parse(map_response_status(self.get(&url).await?, Error::AuthenticationError)?)?;

        log::info!(
            "Logged in to {} (model: {:?}, name: {:?})",
            self.api.api_url,
            self.info.model_name(),
            self.info.name
        );

        self.session = Some(Session {
            endpoint: format!("{}/{}", self.api.api_url, login.sid),
            sid: login.sid,
        });
        Ok(())
    }

    /// Close the session. Never fails; the local session is dropped whatever the device says.
    pub async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            let url = format!("{}{}{}", self.api.api_url, endpoint::LOGOUT, session.sid);
            log::debug!("Logging out of {}", self.api.api_url);
            if let Err(e) = self.get(&url).await {
                log::warn!("Error while logging out: {}", e);
            }
        }
        self.state = ClientState::Disconnected;
    }

    /// Raw, unscaled value at `path` below the session endpoint.
    pub async fn read_metric(&self, path: &str) -> Result<f64, Error> {
        let session = self.session.as_ref().ok_or(Error::NotAuthenticated)?;
        let url = format!("{}{}", session.endpoint, path);
        let value = map_response_status(self.get(&url).await?, Error::ProtocolError)?;
        extract_value(&value)
    }

    /// Value of `metric` in physical units.
    pub async fn read(&self, metric: Metric) -> Result<f64, Error> {
        Ok(self.read_metric(&metric.path()).await? / metric.scale())
    }

    pub async fn voltage(&self) -> Result<f64, Error> {
        self.read(Metric::Voltage).await
    }

    pub async fn current(&self) -> Result<f64, Error> {
        self.read(Metric::Current).await
    }

    pub async fn frequency(&self) -> Result<f64, Error> {
        self.read(Metric::Frequency).await
    }

    pub async fn active_power(&self) -> Result<f64, Error> {
        self.read(Metric::ActivePower).await
    }

    pub async fn full_power(&self) -> Result<f64, Error> {
        self.read(Metric::FullPower).await
    }

    pub async fn active_energy(&self) -> Result<f64, Error> {
        self.read(Metric::ActiveEnergy).await
    }

    pub async fn full_energy(&self) -> Result<f64, Error> {
        self.read(Metric::FullEnergy).await
    }

    async fn read_all(&self) -> Result<Measurements, Error> {
        Ok(Measurements {
            voltage: self.voltage().await?,
            current: self.current().await?,
            frequency: self.frequency().await?,
            active_power: self.active_power().await?,
            full_power: self.full_power().await?,
            active_energy: self.active_energy().await?,
            full_energy: self.full_energy().await?,
        })
    }

    async fn relogin_and_read_all(&mut self) -> Result<Measurements, Error> {
        self.login().await?;
        self.read_all().await
    }

    /// Poll all seven metrics.
    ///
    /// The device drops sessions silently, so any failure is treated as an expired session: log
    /// in once more and poll again. A second failure is returned as is.
    pub async fn fetch_all(&mut self) -> Result<Measurements, Error> {
        let first = self.read_all().await;
        let err = match first {
            Ok(measurements) => {
                self.state = ClientState::Connected;
                return Ok(measurements);
            }
            Err(e) => e,
        };

        log::warn!("Polling {} failed ({}), logging in again", self.api.api_url, err);
        self.state = ClientState::Reconnecting;

        let result = self.relogin_and_read_all().await;
        self.state = match result {
            Ok(_) => ClientState::Connected,
            Err(_) => ClientState::Failed,
        };
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize() {
        assert_eq!("http://192.168.1.10", normalize_url("192.168.1.10"));
        assert_eq!("http://em129.local", normalize_url("http://em129.local/"));
        assert_eq!("https://em129.local:8443", normalize_url("https://em129.local:8443"));
    }

    #[test]
    fn login_hash_is_sha1_of_concatenation() {
        /* SHA1("abc") */
        assert_eq!(
            "a9993e364706816aba3e25717850c26c9cd0d89d",
            login_hash("a", "b", "c")
        );
        assert_eq!(login_hash("", "abc", ""), login_hash("ab", "", "c"));
    }

    #[test]
    fn user_info() {
        assert_eq!(Some("Кухня".to_string()), decode_user_info(Some("0JrRg9GF0L3Rjw==")));
        assert_eq!(
            Some("Кухня".to_string()),
            decode_user_info(Some("0JrRg9GF\n0L3Rjw==\r\n"))
        );
        assert_eq!(None, decode_user_info(Some("not base64!")));
        assert_eq!(None, decode_user_info(Some(" \n")));
        /* valid base64, invalid UTF-8 */
        assert_eq!(None, decode_user_info(Some("/w==")));
        assert_eq!(None, decode_user_info(Some("")));
        assert_eq!(None, decode_user_info(None));
    }

    #[test]
    fn response_status() {
        assert!(map_response_status(json!({"STATUS": "OK"}), Error::ProtocolError).is_ok());
        assert_eq!(
            Err(Error::AuthenticationError(r#"{"STATUS":"ERROR"}"#.to_string())),
            map_response_status(json!({"STATUS": "ERROR"}), Error::AuthenticationError)
        );
        assert!(matches!(
            map_response_status(json!({}), Error::ProtocolError),
            Err(Error::ProtocolError(_))
        ));
    }

    #[test]
    fn extract() {
        assert_eq!(Ok(2300.0), extract_value(&json!({"STATUS": "OK", "volt_msr": 2300})));
        assert_eq!(Ok(49.5), extract_value(&json!({"STATUS": "OK", "freq_msr": "49.5"})));
        assert!(matches!(
            extract_value(&json!({"STATUS": "OK"})),
            Err(Error::ProtocolError(_))
        ));
        assert!(matches!(
            extract_value(&json!({"STATUS": "OK", "cur_msr": null})),
            Err(Error::ProtocolError(_))
        ));
    }

    #[tokio::test]
    async fn read_without_session() {
        let client = DeviceClient::new("127.0.0.1:1", "secret".to_string()).unwrap();
        assert_eq!(Err(Error::NotAuthenticated), client.voltage().await);
        assert_eq!(ClientState::Disconnected, client.state());
    }
}
