use serde::{Deserialize, Serialize};

// Storage keys, same names the browser client kept in local storage
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// The two opaque tokens a session is made of. Either may be missing.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: &str, refresh_token: &str) -> Self {
        Credentials {
            access_token: Some(access_token.to_owned()),
            refresh_token: Some(refresh_token.to_owned()),
        }
    }
}
