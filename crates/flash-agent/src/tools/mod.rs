//! Tools used by the demo agents.

mod arithmetic;
mod user_info;
mod weather;

use schemars::{JsonSchema, schema_for};
use serde_json::Value;

pub use arithmetic::{ArithmeticInput, ArithmeticTool, Operation};
pub use user_info::{FetchUserAgeInput, FetchUserAgeTool, UserInfo};
pub use weather::{WEATHER_API_BASE_URL, WeatherInput, WeatherTool};

/// Generates the JSON schema of `T` in the shape function-calling APIs
/// accept, without the `$schema` and `title` keys.
pub fn schema_of<T: JsonSchema>() -> Value {
    let mut schema = schema_for!(T).to_value();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}
