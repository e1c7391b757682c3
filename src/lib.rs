pub mod config;
pub mod gps_simulator;
pub mod logger;
pub mod traffic_models;

pub mod constants {
    pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:9000";
    pub const NUM_DEVICES: usize = 5;
    pub const REPORT_INTERVAL_MS: u64 = 5_000;
    pub const REPORT_JITTER_MS: u64 = 0;
    pub const RECONNECT_DELAY_MS: u64 = 2_000;

    pub const BASE_LATITUDE: f64 = 37.7749;
    pub const BASE_LONGITUDE: f64 = -122.4194;
    pub const JITTER_DEGREES: f64 = 0.0005;

    // 7-digit prefix followed by 8 random digits, 15 digits total
    pub const IDENTITY_PREFIX: &str = "3563070";
    pub const IDENTITY_RANDOM_DIGITS: u32 = 8;

    pub const CODEC_ID: u8 = 0x08;
    pub const RECORD_COUNT: u8 = 1;
    pub const PRIORITY: u8 = 0x00;
    pub const ALTITUDE: i16 = 50;
    pub const ANGLE: i16 = 180;
    pub const SATELLITES: u8 = 10;
    pub const SPEED: i16 = 60;
    pub const EXTENSION_BYTES: [u8; 5] = [0x01; 5];
    pub const COORDINATE_SCALE: f64 = 10_000_000.0;

    pub const HANDSHAKE_ACCEPTED: u8 = 0x01;

    pub const LOG_STDOUT: bool = true;
    pub const DEFAULT_LOG_FILTER: &str = "info";
}
