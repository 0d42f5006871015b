use serde::{Deserialize, Serialize};

/// Envelope wrapping every API response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Borrow the payload, if the server sent one.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Take the payload, if the server sent one.
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

impl<T> Default for ApiResponse<T> {
    fn default() -> Self {
        Self {
            data: None,
            message: None,
            error: None,
            access_token: None,
        }
    }
}
