use serde::{Deserialize, Deserializer, Serialize};

/// Backend user record returned by the token exchange.
///
/// Only the fields the session layer reads are typed; everything else the
/// backend sends is kept in `extra` so the record survives a store round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(alias = "_id", deserialize_with = "deserialize_user_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, alias = "isProfileComplete", alias = "profileComplete")]
    pub profile_complete: bool,
    #[serde(default, alias = "isOnboarded")]
    pub onboarded: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionUser {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
            role: None,
            profile_complete: false,
            onboarded: false,
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn role_kind(&self) -> UserRole {
        self.role
            .as_deref()
            .map_or(UserRole::Unknown, UserRole::parse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    GymOwner,
    Trainer,
    Merchant,
    Member,
    Unknown,
}

impl UserRole {
    /// Lenient parse; the backend has shipped snake_case, camelCase and
    /// short forms for the same role.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let normalized = raw
            .trim()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "admin" | "superadmin" => Self::Admin,
            "gymowner" | "owner" | "gym" => Self::GymOwner,
            "trainer" | "coach" => Self::Trainer,
            "merchant" | "seller" => Self::Merchant,
            "member" | "user" | "customer" => Self::Member,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::GymOwner => "gym_owner",
            Self::Trainer => "trainer",
            Self::Merchant => "merchant",
            Self::Member => "member",
            Self::Unknown => "unknown",
        }
    }
}

fn deserialize_user_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let id = match value {
        serde_json::Value::String(id) => id.trim().to_string(),
        serde_json::Value::Number(id) => id.to_string(),
        other => {
            return Err(serde::de::Error::custom(format!(
                "user id must be a string or number, got {other}"
            )));
        }
    };
    if id.is_empty() {
        return Err(serde::de::Error::custom("user id must not be empty"));
    }
    Ok(id)
}
