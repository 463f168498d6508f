//! Wire-to-engine request normalization.
//!
//! Proto3 strings cannot be absent, so "not provided" arrives as `""`. These
//! helpers fold both spellings into `None` and parse the JSON-carrying
//! fields.

use serde_json::Value;
use tranqu_engine::TranspileInput;

use crate::error::{Error, Result};
use crate::proto::TranspileRequest;

/// Treat an empty or missing string as absent. The value is otherwise kept
/// byte for byte.
pub fn optional_string(raw: Option<&str>) -> Option<String> {
    match raw {
        None | Some("") => None,
        Some(value) => Some(value.to_string()),
    }
}

/// Treat an empty or missing string as absent, otherwise parse it as JSON.
///
/// `field` names the request field in the resulting
/// [`Error::MalformedInput`].
pub fn optional_json(field: &'static str, raw: Option<&str>) -> Result<Option<Value>> {
    match raw {
        None | Some("") => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|source| Error::MalformedInput { field, source }),
    }
}

/// Build the engine input for a request.
pub fn normalize(request: &TranspileRequest) -> Result<TranspileInput> {
    Ok(TranspileInput {
        program: request.program.clone(),
        program_lib: optional_string(Some(&request.program_lib)),
        transpiler_lib: optional_string(Some(&request.transpiler_lib)),
        transpiler_options: optional_json(
            "transpiler_options",
            Some(&request.transpiler_options),
        )?,
        device: optional_json("device", Some(&request.device))?,
        device_lib: optional_string(Some(&request.device_lib)),
    })
}
