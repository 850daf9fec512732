//! Todo domain: data model, business rules, and HTTP routes.

pub mod model;
pub mod routes;
pub mod service;
