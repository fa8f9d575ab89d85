//! Request identity for courtbook: credential verification for both token
//! sources, the per-request context, and the permission gate.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod request_context;
mod token;
mod federated;
mod resolver;
mod provider;
mod authorizer;

pub use principal::{Principal, PrincipalSource};
pub use request_context::RequestContext;
pub use token::{LocalClaims, TokenIssuer};
pub use federated::FederatedVerifier;
pub use resolver::IdentityResolver;
pub use provider::{provision_federated_user, FederatedProfile, Provisioned};
pub use authorizer::AccessGuard;
