pub mod serializer;
pub mod types;

pub use serializer::{
    create_response, encoded_response, error_response, serialize_json_response,
    serialize_response_body,
};
pub use types::{HttpResponse, ResponseBody};
