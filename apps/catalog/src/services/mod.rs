//! Application services for the catalog backend.

pub mod auth;
pub mod metadata;
pub mod storage;
pub mod tracks;

pub use auth::{AuthService, Claims};
pub use storage::{MediaStore, UploadGate};
pub use tracks::TrackService;
