//! Query methods grouped per table family

pub mod contacts;
pub mod messages;
pub mod scheduled;
pub mod users;
pub mod webhooks;
