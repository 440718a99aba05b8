pub mod auth;

pub use auth::{require_admin, require_member, CurrentMember, JwtClaims, FEATURES_SCOPE};
