use novatek_rs::model::{Measurements, Metric};
use novatek_rs::{DeviceClient, Error};
use prometheus::{Encoder, GaugeVec, IntCounter, TextEncoder};

lazy_static! {
    static ref VOLTAGE_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("novatek_voltage_volts", Metric::Voltage.help()),
        &["host", "model"],
    )
    .unwrap();
    static ref CURRENT_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("novatek_current_amperes", Metric::Current.help()),
        &["host", "model"],
    )
    .unwrap();
    static ref FREQUENCY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("novatek_frequency_hertz", Metric::Frequency.help()),
        &["host", "model"],
    )
    .unwrap();
    static ref ACTIVE_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("novatek_active_power_watts", Metric::ActivePower.help()),
        &["host", "model"],
    )
    .unwrap();
    static ref FULL_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("novatek_full_power_watts", Metric::FullPower.help()),
        &["host", "model"],
    )
    .unwrap();
    static ref ACTIVE_ENERGY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("novatek_active_energy_watt_hours", Metric::ActiveEnergy.help()),
        &["host", "model"],
    )
    .unwrap();
    static ref FULL_ENERGY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("novatek_full_energy_watt_hours", Metric::FullEnergy.help()),
        &["host", "model"],
    )
    .unwrap();
    static ref DEVICE_INFO_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("novatek_device_info", "device identity reported at login"),
        &["host", "model", "name"],
    )
    .unwrap();
    static ref POLL_FAILURES: IntCounter = register_int_counter!(
        "novatek_poll_failures_total",
        "polls that failed even after logging in again"
    )
    .unwrap();
}

fn gauge(metric: Metric) -> &'static GaugeVec {
    match metric {
        Metric::Voltage => &*VOLTAGE_GAUGE,
        Metric::Current => &*CURRENT_GAUGE,
        Metric::Frequency => &*FREQUENCY_GAUGE,
        Metric::ActivePower => &*ACTIVE_POWER_GAUGE,
        Metric::FullPower => &*FULL_POWER_GAUGE,
        Metric::ActiveEnergy => &*ACTIVE_ENERGY_GAUGE,
        Metric::FullEnergy => &*FULL_ENERGY_GAUGE,
    }
}

/// Feed one snapshot to the gauges.
fn process_measurements(measurements: &Measurements, host: &str, model: &str) {
    for (metric, value) in measurements.iter() {
        gauge(metric).with_label_values(&[host, model]).set(value);
    }
}

/// Poll the device once, updating Prometheus exporter registry.
pub async fn collect(client: &mut DeviceClient) -> Result<(), Error> {
    let measurements = client.fetch_all().await.map_err(|e| {
        POLL_FAILURES.inc();
        log::error!("Unable to poll {}: {}", client.api_url(), e);
        e
    })?;

    let info = client.device_info();
    process_measurements(&measurements, client.api_url(), info.model_name());
    DEVICE_INFO_GAUGE
        .with_label_values(&[
            client.api_url(),
            info.model_name(),
            info.name.as_deref().unwrap_or(""),
        ])
        .set(1.0);

    Ok(())
}

/// Read metrics from Prometheus exporter registry.
pub async fn read() -> Result<String, Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .or(Err(Error::FormatError))?;
    String::from_utf8(buffer).or(Err(Error::FormatError))
}
