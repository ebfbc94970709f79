pub mod claims;
pub mod page;
pub mod status;
