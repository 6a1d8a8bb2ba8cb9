use serde::{Deserialize, Serialize};

/// Display name given to identities that never picked one.
pub const DEFAULT_NAME: &str = "Anonymous";

/// Persisted per-identity attributes.
///
/// Serialized with the short field names used both on the wire and in the
/// profile file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "_id")]
    pub stable_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "color")]
    pub color_hex: String,
}

impl Profile {
    /// A fresh profile with the default display name.
    pub fn new(stable_id: impl Into<String>, color_hex: impl Into<String>) -> Self {
        Self {
            stable_id: stable_id.into(),
            display_name: DEFAULT_NAME.to_string(),
            color_hex: color_hex.into(),
        }
    }
}
