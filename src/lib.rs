pub mod config;
pub mod db;
pub mod errors;
pub mod extract;
pub mod lut;
pub mod models;
pub mod prompt;
pub mod qa;
pub mod routes;
pub mod service;
