use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tenant,
    Landlord,
    Admin,
}

/// Cached copy of the signed-in user's profile.
///
/// Fields the client does not model are kept in `extra` so a snapshot written
/// back to disk is identical to what the server returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn is_landlord(&self) -> bool {
        self.has_role(Role::Landlord)
    }

    pub fn is_tenant(&self) -> bool {
        self.has_role(Role::Tenant)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_owned()
    }

    /// Shallow merge of `patch` over this profile, the way a local edit
    /// is applied before the server confirms it.
    pub fn merged(&self, patch: &Value) -> serde_json::Result<UserProfile> {
        let mut current = serde_json::to_value(self)?;
        if let (Some(target), Some(changes)) = (current.as_object_mut(), patch.as_object()) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(current)
    }
}
