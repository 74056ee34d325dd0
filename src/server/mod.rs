//! HTTP server layer for the variant service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     GET /images/a.jpg?width=500   POST /events/upload           │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │    edge     │  │  handlers   │  │       signature         │  │
//! │  │ (normalize) │  │ (requests)  │  │   (webhook bodies)      │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod edge;
pub mod handlers;
pub mod routes;
pub mod signature;

pub use edge::edge_normalize;
pub use handlers::{
    health_handler, upload_event_handler, variant_handler, AppState, ErrorResponse,
    HealthResponse, UploadEventResponse, VARIANT_CACHE_HEADER,
};
pub use routes::{create_router, RouterConfig};
pub use signature::{EventSigner, SIGNATURE_HEADER};
