pub mod http_engine;

pub use http_engine::HttpEngine;
