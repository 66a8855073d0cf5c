pub mod categories;
pub mod handlers;
pub mod library;
pub mod manga;
pub mod middleware;
pub mod routes;
pub mod sources;

pub use routes::create_router;
