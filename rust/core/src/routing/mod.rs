pub mod matcher;
pub mod parser;
pub mod types;

pub use matcher::{allow_header, RouteTable};
pub use parser::{normalize_path, parse_route_pattern, PathTemplate};
pub use types::{HttpMethod, ParamSource, ParamSpec, Route, RouteMatch};
