//! Types shared between the FamilyTask server and its HTTP consumers.

pub mod api;
pub mod auth;
pub mod domain;
pub mod jwt;
