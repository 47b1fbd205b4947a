pub mod db;
pub mod fetch;
#[cfg(test)]
mod http_stub;
pub mod jsonld;
pub mod models;
pub mod parser;
pub mod remote;
pub mod service;
pub mod shopping;
pub mod store;
pub mod units;
