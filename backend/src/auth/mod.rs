pub mod credentials;
pub mod middleware;
pub mod models;

pub use credentials::CredentialVerifier;
pub use middleware::{AuthenticatedUser, MaybeUser};
pub use models::Identity;
