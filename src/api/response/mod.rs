use serde::Deserialize;
use serde_json::Value;

pub const STATUS: &str = "STATUS";
pub const STATUS_OK: &str = "OK";

/* GET /api/login?device_info */
#[derive(Debug, Deserialize)]
pub struct DeviceInfo {
    /* kept loose: an unexpected type maps to an unknown model rather than an error */
    #[serde(default)]
    pub device_id: Option<Value>,
    /* base64 */
    #[serde(default)]
    pub user_info: Option<String>,
}

impl DeviceInfo {
    /// Integer device id. Integral floats such as `243.0` count as well.
    pub fn device_id(&self) -> Option<u64> {
        let id = self.device_id.as_ref()?;
        id.as_u64().or_else(|| {
            id.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
    }
}

/* GET /api/login?salt */
#[derive(Debug, Deserialize)]
pub struct Salt {
    #[serde(rename = "SALT", default)]
    pub salt: String,
}

/* GET /api/login?login=<sha1> */
#[derive(Debug, Deserialize)]
pub struct Login {
    #[serde(rename = "SID")]
    pub sid: String,
}
