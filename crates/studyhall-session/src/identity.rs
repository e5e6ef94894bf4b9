//! Identity verification hook.
//!
//! Studyhall doesn't implement authentication itself — that's your job
//! (or your auth provider's: Firebase, Auth0, Supabase, custom JWT, etc.).
//!
//! Instead, Studyhall defines the [`IdentityVerifier`] trait: a single
//! async method that takes the credential captured at connection time
//! and returns an [`Identity`] or an error. You implement this trait
//! with your auth logic, and the engine calls it exactly once per
//! connection, before any event is processed.
//!
//! # Why a trait?
//!
//! A trait is like an interface in other languages — it defines WHAT
//! something can do without specifying HOW. This lets us:
//! - Use JWT validation in production
//! - Use a static token table in development
//! - Use a mock verifier in tests
//!
//! All without changing any engine code.

use studyhall_protocol::UserId;

/// Who a verified user is.
///
/// Produced by the [`IdentityVerifier`] from a credential; everything
/// downstream (participant records, event routing) keys off the
/// `user_id` in here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    /// Name shown to other participants.
    pub display_name: String,
    pub role: Role,
}

/// Coarse role attached to an identity.
///
/// The engine itself does not gate anything on role — session authority
/// is per-session (the host) — but it carries the role through so
/// embedding servers can gate their own surfaces (e.g. only instructors
/// may create sessions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Instructor,
}

/// Errors from identity verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client presented no credential at all (no `?token=` query
    /// parameter, no `Authorization` header).
    #[error("no credential presented")]
    MissingCredential,

    /// The credential was presented but rejected — invalid, expired,
    /// or unknown to the verifier.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

/// Resolves a connection-time credential to a verified [`Identity`].
///
/// # Trait bounds
///
/// - `Send + Sync` → the verifier can be shared across async tasks
///   (Tokio may call it from different threads simultaneously).
/// - `'static` → it doesn't borrow temporary data. This is required
///   because the verifier lives as long as the engine.
///
/// # Example
///
/// ```rust
/// use studyhall_session::{AuthError, Identity, IdentityVerifier, Role};
/// use studyhall_protocol::UserId;
///
/// /// Accepts tokens of the form "name:role". Development only!
/// struct DevVerifier;
///
/// impl IdentityVerifier for DevVerifier {
///     async fn verify(
///         &self,
///         credential: &str,
///     ) -> Result<Identity, AuthError> {
///         let (name, role) = credential.split_once(':').ok_or_else(|| {
///             AuthError::InvalidCredential("expected name:role".into())
///         })?;
///         let role = match role {
///             "instructor" => Role::Instructor,
///             _ => Role::Student,
///         };
///         Ok(Identity {
///             user_id: UserId::from(name),
///             display_name: name.to_string(),
///             role,
///         })
///     }
/// }
/// ```
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Validates the given credential and returns who it belongs to.
    ///
    /// Called once per connection, right after the transport handshake.
    ///
    /// # Returns
    /// - `Ok(Identity)` — verification succeeded, here's who they are
    /// - `Err(AuthError)` — credential is missing, invalid, or expired
    fn verify(
        &self,
        credential: &str,
    ) -> impl std::future::Future<Output = Result<Identity, AuthError>> + Send;
}
