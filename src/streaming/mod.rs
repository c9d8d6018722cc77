//! Media streaming.
//!
//! # Routes
//!
//! - `GET /media?path=<file>` - direct file streaming with range support,
//!   for source clips and trim outputs alike

mod direct;

pub use direct::{media, parse_range_header, serve_file, ByteRange, MediaQuery};

use axum::{routing::get, Router};

use crate::server::AppContext;

/// Create media streaming router.
pub fn media_router() -> Router<AppContext> {
    Router::new().route("/media", get(media))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_router_creation() {
        let _router: Router<AppContext> = media_router();
    }
}
