/// Root topic every device publishes under.
pub const NAMESPACE: &str = "shellies";

pub const ANNOUNCE: &str = "announce";
pub const COMMAND: &str = "command";

pub const CMD_ANNOUNCE: &str = "announce";
pub const CMD_UPDATE: &str = "update";

pub const COAP_MULTICAST_ADDR: &str = "224.0.1.187";
pub const COAP_PORT: u16 = 5683;

pub const STATUS_PATH: &str = "/cit/s";
pub const DESCRIPTION_PATH: &str = "/cit/d";

/// Custom option carrying `<type>#<id>#<revision>`
pub const OPTION_GLOBAL_DEVID: u16 = 3332;
/// Custom option carrying the encoded validity window
pub const OPTION_STATUS_VALIDITY: u16 = 3412;
/// Custom option carrying the status serial
pub const OPTION_STATUS_SERIAL: u16 = 3420;
pub const OPTION_URI_PATH: u16 = 11;

/// Field of a status payload holding the property tuples.
pub const STATUS_PROPERTIES: &str = "G";

pub const IDENTITY_SEPARATOR: char = '#';

/// Pooling window applied to MQTT property bursts unless configured otherwise.
pub const DEFAULT_POOLING_WINDOW_MS: u64 = 500;
