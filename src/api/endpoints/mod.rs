//! Route handlers. Each one opens its own connection, resolves the actor
//! from request extensions and delegates to the service layer.

pub mod applications;
pub mod audit;
pub mod documents;
pub mod fields;
pub mod health;
pub mod objects;
