pub type Endpoint = str;

pub const DEVICE_INFO: &Endpoint = "/api/login?device_info";
pub const SALT: &Endpoint = "/api/login?salt";
/* followed by the SHA1 hex digest */
pub const LOGIN: &Endpoint = "/api/login?login=";
/* followed by the SID */
pub const LOGOUT: &Endpoint = "/api/login?logout=";
/* relative to the session endpoint */
pub const ALL_GET: &Endpoint = "/api/all/get";
