pub mod api;
pub mod auth;
pub mod extract;
pub mod failure;
pub mod routes;

pub use api::*;
pub use auth::*;
pub use extract::*;
pub use routes::*;
