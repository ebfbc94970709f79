// Shared library untuk order-service dan delivery-service
// Berisi model principal, status workflow, middleware auth, dan utilities
pub mod models;
pub mod utils;

pub use models::claims::{Principal, Role, TokenClaims};
pub use models::page::Page;
pub use models::status::{
    AgentStatus, ApprovalStatus, DeliveryStatus, OrderStatus, PaymentMethod, ShopStatus,
    UnknownStatus,
};
