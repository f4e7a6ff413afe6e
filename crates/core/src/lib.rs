pub mod application;
pub mod domain;
pub mod error;
pub mod gml;
pub mod parser;
pub mod ports;
pub mod throttle;
pub mod utils;
