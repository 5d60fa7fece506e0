pub mod parser;
pub mod types;

pub use parser::{parse_form_body, parse_json_body, parse_query_string};
pub use types::{HttpRequest, RequestBody};
