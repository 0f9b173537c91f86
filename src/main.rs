#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use config::Config;
use novatek_rs::{DeviceClient, Error};
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, State};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

mod metrics;

const DEFAULT_INTERVAL: i64 = 30;

#[derive(Clone, serde::Deserialize)]
pub struct NovatekConfig {
    host: String,
    password: String,
    interval: u64,
}

/// Device client plus the outcome of its latest poll.
///
/// The device is polled at most once per `interval`, successful or not. Requests in between get
/// the outcome of that poll.
pub struct Poller {
    client: DeviceClient,
    interval: Duration,
    last_poll: Option<Instant>,
    last_result: Result<(), Error>,
}

impl Poller {
    pub fn new(client: DeviceClient, interval: Duration) -> Poller {
        Poller {
            client,
            interval,
            last_poll: None,
            last_result: Ok(()),
        }
    }

    fn poll_due(&self, now: Instant) -> bool {
        self.last_poll
            .map(|at| now.duration_since(at) >= self.interval)
            .unwrap_or(true)
    }

    async fn poll(&mut self) -> Result<(), Error> {
        let now = Instant::now();
        if self.poll_due(now) {
            self.last_poll = Some(now);
            self.last_result = metrics::collect(&mut self.client).await;
        } else {
            log::info!("interval time not yet elapsed since last poll; returning cached result")
        }
        self.last_result.clone()
    }
}

/// Structure containing state for API handlers.
pub struct StateData {
    poller: Mutex<Poller>,
}

pub fn read_settings() -> Result<NovatekConfig, config::ConfigError> {
    let mut settings = Config::default();
    settings
        .set_default("interval", DEFAULT_INTERVAL)?
        .merge(config::Environment::with_prefix("NOVATEK"))?;

    settings.try_into()
}

#[get("/metrics")]
async fn metrics_route(state: &State<StateData>) -> Result<String, Error> {
    state.poller.lock().await.poll().await?;
    metrics::read().await
}

#[get("/device")]
async fn device_route(state: &State<StateData>) -> String {
    let poller = state.poller.lock().await;
    let client = &poller.client;
    let info = client.device_info();

    format!(
        "host: {}\nmodel: {}\ndevice_id: {:?}\nname: {}\nstate: {:?}\n",
        client.api_url(),
        info.model_name(),
        info.device_id,
        info.name.as_deref().unwrap_or(""),
        client.state()
    )
}

fn rocket(poller: Poller) -> Rocket<Build> {
    let state = StateData {
        poller: Mutex::new(poller),
    };

    rocket::build()
        .manage(state)
        .mount("/", routes![metrics_route, device_route])
        .attach(AdHoc::on_shutdown("Device logout", |rocket| {
            Box::pin(async move {
                if let Some(state) = rocket.state::<StateData>() {
                    state.poller.lock().await.client.disconnect().await;
                }
            })
        }))
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = read_settings()?;
    let mut client = DeviceClient::new(&settings.host, settings.password)?;

    match client.connect().await {
        Ok(()) => {}
        Err(e @ Error::AuthenticationError(_)) => {
            log::error!("Device {} rejected the password: {}", client.api_url(), e);
            return Err(e.into());
        }
        Err(e) => {
            log::warn!(
                "Device {} not ready ({}), will log in on first poll",
                client.api_url(),
                e
            );
        }
    }

    let poller = Poller::new(client, Duration::from_secs(settings.interval));
    let _rocket = rocket(poller).launch().await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;

    const METRIC_KEYS: [&str; 7] = [
        "volt_msr",
        "cur_msr",
        "freq_msr",
        "powa_msr",
        "pows_msr",
        "enrga_msr",
        "enrgs_msr",
    ];

    async fn mock_get(server: &mut ServerGuard, path: &str, body: &str, hits: usize) -> Mock {
        server
            .mock("GET", path)
            .with_status(200)
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    /// Meter that expects exactly `polls` complete polls and a single login.
    async fn healthy_meter(server: &mut ServerGuard, polls: usize) -> Vec<Mock> {
        let mut mocks = vec![
            mock_get(server, "/api/login?device_info", r#"{"STATUS":"OK","device_id":271}"#, 1)
                .await,
            mock_get(server, "/api/login?salt", r#"{"STATUS":"OK","SALT":"abc"}"#, 1).await,
            server
                .mock("GET", Matcher::Regex(r"^/api/login\?login=".to_string()))
                .with_status(200)
                .with_body(r#"{"STATUS":"OK","SID":"sid"}"#)
                .expect(1)
                .create_async()
                .await,
        ];
        for key in METRIC_KEYS.iter() {
            let path = format!("/sid/api/all/get?{}", key);
            let body = format!(r#"{{"STATUS":"OK","{}":100}}"#, key);
            mocks.push(mock_get(server, &path, &body, polls).await);
        }
        mocks
    }

    async fn local_client(server: &ServerGuard, interval: Duration) -> Client {
        let device = DeviceClient::new(&server.url(), "secret".to_string()).unwrap();
        Client::tracked(rocket(Poller::new(device, interval)))
            .await
            .unwrap()
    }

    #[rocket::async_test]
    async fn metrics_polls_once_per_interval() {
        let mut server = Server::new_async().await;
        let meter = healthy_meter(&mut server, 1).await;
        let client = local_client(&server, Duration::from_secs(3600)).await;

        for _ in 0..3 {
            let response = client.get("/metrics").dispatch().await;
            assert_eq!(Status::Ok, response.status());
            let body = response.into_string().await.unwrap();
            assert!(body.contains("novatek_voltage_volts"));
        }

        for mock in meter.iter() {
            mock.assert_async().await;
        }
    }

    #[rocket::async_test]
    async fn metrics_polls_again_once_interval_elapsed() {
        let mut server = Server::new_async().await;
        let meter = healthy_meter(&mut server, 2).await;
        let client = local_client(&server, Duration::from_secs(0)).await;

        for _ in 0..2 {
            let response = client.get("/metrics").dispatch().await;
            assert_eq!(Status::Ok, response.status());
        }

        for mock in meter.iter() {
            mock.assert_async().await;
        }
    }

    #[rocket::async_test]
    async fn failed_poll_is_not_repeated_within_interval() {
        let mut server = Server::new_async().await;
        let device_info = server
            .mock("GET", "/api/login?device_info")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;
        let client = local_client(&server, Duration::from_secs(3600)).await;

        for _ in 0..3 {
            let response = client.get("/metrics").dispatch().await;
            assert_eq!(Status::ServiceUnavailable, response.status());
        }

        device_info.assert_async().await;
    }

    #[rocket::async_test]
    async fn device_reports_state() {
        let mut server = Server::new_async().await;
        let _meter = healthy_meter(&mut server, 1).await;
        let client = local_client(&server, Duration::from_secs(3600)).await;

        let response = client.get("/device").dispatch().await;
        let body = response.into_string().await.unwrap();
        assert!(body.contains("state: Disconnected"));

        let _ = client.get("/metrics").dispatch().await;

        let body = client.get("/device").dispatch().await.into_string().await.unwrap();
        assert!(body.contains("model: EM-129"));
        assert!(body.contains("state: Connected"));
    }
}
