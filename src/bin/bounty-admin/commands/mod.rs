//! CLI command implementations

pub mod activity;
pub mod budget;
pub mod deposit;
pub mod member;
pub mod serve;
pub mod verify;
