pub mod auto_reading;
pub mod bluetooth;
pub mod logging;
pub mod preferences;
pub mod readings;
pub mod storage;
