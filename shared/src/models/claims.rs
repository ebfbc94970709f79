use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model JWT claims yang diterbitkan auth provider untuk semua role marketplace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    pub sub: i32,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: String,
    pub jti: String,
}

impl TokenClaims {
    /// Cek apakah token adalah access token
    pub fn is_access_token(&self) -> bool {
        self.token_type == "access"
    }

    /// Cek apakah token sudah expired berdasarkan current time
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp <= now
    }

    /// Konversi claims menjadi principal yang dipakai workflow
    pub fn principal(&self) -> Option<Principal> {
        let role = self.role.parse().ok()?;
        Some(Principal { id: self.sub, role })
    }
}

// Role yang dikenal oleh marketplace
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Shopkeeper,
    Farmer,
    DeliveryAgent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Shopkeeper => "shopkeeper",
            Role::Farmer => "farmer",
            Role::DeliveryAgent => "delivery_agent",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "shopkeeper" => Ok(Role::Shopkeeper),
            "farmer" => Ok(Role::Farmer),
            "delivery_agent" => Ok(Role::DeliveryAgent),
            "admin" => Ok(Role::Admin),
            other => Err(format!("role tidak dikenal: {}", other)),
        }
    }
}

/// Pihak yang melakukan aksi. Selalu di-pass eksplisit ke setiap operasi workflow,
/// tidak pernah dibaca dari state global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: i32,
    pub role: Role,
}

impl Principal {
    pub fn new(id: i32, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    // Shopkeeper dan farmer sama-sama bisa punya toko
    pub fn can_own_shop(&self) -> bool {
        matches!(self.role, Role::Shopkeeper | Role::Farmer)
    }

    pub fn is_customer(&self) -> bool {
        self.role == Role::Customer
    }

    pub fn is_delivery_agent(&self) -> bool {
        self.role == Role::DeliveryAgent
    }
}
