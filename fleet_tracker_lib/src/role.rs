use serde::{Deserialize, Serialize};

/// Which side of the fleet app the authenticated identity is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Driver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Driver => "driver",
        }
    }

    /// Key the credential for this role is persisted under.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Role::Owner => "ownerToken",
            Role::Driver => "driverToken",
        }
    }

    /// Broadcast room scoping event delivery to one authenticated identity.
    pub fn room_id(&self, identity_id: &str) -> String {
        format!("{}-{}", self.as_str(), identity_id)
    }

    /// In-app route of the trip detail view for this role.
    pub fn trip_route(&self, trip_id: &str) -> String {
        match self {
            Role::Owner => format!("/owner-home/trips/{trip_id}"),
            Role::Driver => format!("/driver-home/trips/{trip_id}"),
        }
    }
}
