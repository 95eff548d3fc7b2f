use serde::Serialize;

/// Reply body of the job endpoints.
#[derive(Debug, Serialize)]
pub struct JobResponse<T: Serialize> {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<T>,
}

impl<T: Serialize> JobResponse<T> {
    pub fn success(message: impl Into<String>, summary: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            summary: Some(summary),
        }
    }
}

impl JobResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            summary: None,
        }
    }
}

/// One entry of the positive-bin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageLink {
    pub filename: String,
    pub link: String,
}
