use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::UserId;

/// Role a principal acts under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Bank,
    Auditor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Buyer,
        Role::Seller,
        Role::Bank,
        Role::Auditor,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Bank => "bank",
            Role::Auditor => "auditor",
            Role::Admin => "admin",
        }
    }

    /// Roles allowed to resolve integrity alerts
    pub fn can_resolve_alerts(&self) -> bool {
        matches!(self, Role::Admin | Role::Auditor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            "bank" => Ok(Role::Bank),
            "auditor" => Ok(Role::Auditor),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Authenticated caller, as handed over by the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn buyer(id: i64) -> Self {
        Self::new(id, Role::Buyer)
    }

    pub fn seller(id: i64) -> Self {
        Self::new(id, Role::Seller)
    }

    pub fn bank(id: i64) -> Self {
        Self::new(id, Role::Bank)
    }

    pub fn auditor(id: i64) -> Self {
        Self::new(id, Role::Auditor)
    }

    pub fn admin(id: i64) -> Self {
        Self::new(id, Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("corporate".parse::<Role>().is_err());
    }

    #[test]
    fn test_alert_resolution_roles() {
        assert!(Role::Admin.can_resolve_alerts());
        assert!(Role::Auditor.can_resolve_alerts());
        assert!(!Role::Bank.can_resolve_alerts());
        assert!(!Role::Buyer.can_resolve_alerts());
    }
}
