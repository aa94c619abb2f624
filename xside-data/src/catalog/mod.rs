//! Client for the remote catalog service.
//!
//! This module provides [`CatalogSession`], an authenticated session that
//! reads paginated client and item listings and reports display events.
//!
//! # Protocol
//!
//! - `POST /api/token/` exchanges `{email, password}` for `{access, refresh}`.
//! - `POST /api/refresh/` exchanges `{refresh}` for a new pair.
//! - Listings (`GET /api/client/{id?}`, `GET /api/item/{id?}`) take
//!   `page_size` and zero-based `page` query parameters and answer with a
//!   `data` array; an empty array marks the end of the listing.
//! - A `401` whose body carries `code == "token_not_valid"` triggers a token
//!   refresh before the next attempt.

mod config;
mod event;
mod session;

pub use config::{CatalogApiConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_USER_AGENT};
pub use event::{DisplayEvent, EventKind};
pub use session::{
    ApiError, AuthError, CatalogSession, DEFAULT_PAGE_SIZE, PageRequest, SessionBuildError,
    TokenPair,
};
