use serde::{Deserialize, Serialize};

/// Twitter API v2 envelope. `data` is missing when nothing matched, and
/// `errors` may be present even on a 200.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response<Data> {
    pub data: Option<Data>,
    pub meta: Option<Meta>,
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Meta {
    pub next_token: Option<String>,
    pub result_count: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub message: Option<String>,
    pub r#type: Option<String>,
}

impl ApiError {
    pub fn describe(&self) -> String {
        self.detail
            .as_ref()
            .or(self.message.as_ref())
            .or(self.title.as_ref())
            .cloned()
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Top-level body of a non-success response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Problem {
    pub title: Option<String>,
    pub detail: Option<String>,
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub username: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub lang: Option<String>,
}
