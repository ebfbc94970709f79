// Status workflow sebagai enum tertutup, menggantikan string status bebas.
// Representasi di database dan JSON sama: snake_case lowercase.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

// Error parsing status dari database atau request
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Status {kind} tidak dikenal: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

// Generate as_str, Display, FromStr, dan encoding sqlx (disimpan sebagai TEXT)
macro_rules! text_status {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(raw.parse::<$name>()?)
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

// Status order dari sisi customer dan shopkeeper
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingApproval,
    Approved,
    Preparing,
    Ready,
    Delivered,
    Rejected,
    Cancelled,
}

text_status!(OrderStatus, "order", {
    PendingApproval => "pending_approval",
    Approved => "approved",
    Preparing => "preparing",
    Ready => "ready",
    Delivered => "delivered",
    Rejected => "rejected",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Tabel transisi order. Semua transisi lain ditolak.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingApproval, Approved)
                | (PendingApproval, Rejected)
                | (PendingApproval, Cancelled)
                | (Approved, Preparing)
                | (Approved, Cancelled)
                | (Preparing, Ready)
                | (Preparing, Cancelled)
                | (Ready, Delivered)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// Transisi otomatis ke delivered saat delivery-service menyelesaikan
    /// delivery. Toko bisa saja belum menandai ready, jadi approved dan
    /// preparing juga diterima. Transisi manual tetap lewat `can_transition_to`.
    pub fn can_complete_delivery(&self) -> bool {
        self.can_transition_to(OrderStatus::Delivered)
            || matches!(self, OrderStatus::Approved | OrderStatus::Preparing)
    }

    /// Status yang boleh diselesaikan delivery, untuk filter `status = ANY(..)`
    pub fn delivery_completable() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|s| s.can_complete_delivery())
            .map(|s| s.as_str())
            .collect()
    }

    // Stok sudah dipotong untuk status-status ini
    pub fn has_reserved_stock(&self) -> bool {
        matches!(
            self,
            OrderStatus::Approved | OrderStatus::Preparing | OrderStatus::Ready
        )
    }

    pub fn is_cancellable(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }
}

// Status approval per item order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

text_status!(ApprovalStatus, "approval", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

// Status lifecycle delivery, hanya maju
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Unassigned,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

text_status!(DeliveryStatus, "delivery", {
    Unassigned => "unassigned",
    Assigned => "assigned",
    PickedUp => "picked_up",
    InTransit => "in_transit",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl DeliveryStatus {
    /// Status berikutnya di jalur normal delivery
    pub fn next(&self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::Unassigned => Some(DeliveryStatus::Assigned),
            DeliveryStatus::Assigned => Some(DeliveryStatus::PickedUp),
            DeliveryStatus::PickedUp => Some(DeliveryStatus::InTransit),
            DeliveryStatus::InTransit => Some(DeliveryStatus::Delivered),
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled => None,
        }
    }

    /// Status yang harus dimiliki delivery sebelum bisa pindah ke `self`
    pub fn previous(&self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::Assigned => Some(DeliveryStatus::Unassigned),
            DeliveryStatus::PickedUp => Some(DeliveryStatus::Assigned),
            DeliveryStatus::InTransit => Some(DeliveryStatus::PickedUp),
            DeliveryStatus::Delivered => Some(DeliveryStatus::InTransit),
            DeliveryStatus::Unassigned | DeliveryStatus::Cancelled => None,
        }
    }

    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        // cancelled hanya dari unassigned, lewat pembatalan order
        if next == DeliveryStatus::Cancelled {
            return *self == DeliveryStatus::Unassigned;
        }
        self.next() == Some(next)
    }
}

// Metode pembayaran yang dipilih customer saat checkout
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Upi,
    Card,
}

text_status!(PaymentMethod, "payment_method", {
    CashOnDelivery => "cash_on_delivery",
    Upi => "upi",
    Card => "card",
});

// Status toko, hanya approved yang muncul ke customer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShopStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

text_status!(ShopStatus, "shop", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Suspended => "suspended",
});

// Status verifikasi delivery agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

text_status!(AgentStatus, "agent", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Suspended => "suspended",
});
