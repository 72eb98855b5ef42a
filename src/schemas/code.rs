use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RunCodeRequest {
    #[validate(length(min = 1, max = 32, message = "language must not be empty"))]
    pub(crate) language: String,
    #[serde(alias = "sourceCode")]
    #[validate(length(min = 1, max = 65536, message = "source_code must be 1-65536 characters"))]
    pub(crate) source_code: String,
    #[serde(default)]
    #[validate(length(max = 65536, message = "stdin is too large"))]
    pub(crate) stdin: Option<String>,
}
