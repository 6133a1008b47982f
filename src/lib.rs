pub mod capture;
pub mod config;
pub mod constants;
pub mod detection;
pub mod logging;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;
pub mod tasks;
pub mod telemetry;
pub mod workers;
