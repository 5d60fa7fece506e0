//! # RESTFUL CORE LIBRARY
//!
//! **DEPENDENCY-INJECTED RESOURCE DISPATCH FOR RESTFUL SERVICES**
//!
//! **ARCHITECTURE**: Binding registry -> graph resolver -> scope manager -> instance factory,
//! with a route table and request dispatcher on top
//! **GUARANTEE**: Dependency graphs are validated before the first request is served
//! **TRANSPORT**: Transport-neutral request/response types; see `restful-engine` for HTTP

pub mod api;
pub mod application;
pub mod dependencies;
pub mod dispatch;
pub mod errors;
pub mod request;
pub mod resource;
pub mod response;
pub mod routing;
pub mod serialization;
