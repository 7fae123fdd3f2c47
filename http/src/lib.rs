//! Outbound session transport and health reporting.

pub mod egress;
pub mod health;
