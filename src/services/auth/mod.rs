pub mod bearer;
pub mod factory;
pub mod guard;
pub mod jwt;
pub mod provider;
pub mod token;
pub mod user;

pub use bearer::{BearerExtractor, BearerToken};
pub use factory::PersonalAccessTokenFactory;
pub use guard::{AuthGuardFactory, Guard, GuardError, GuardRegistry, SessionGuard, TokenProvider};
pub use jwt::{JwtTokenManager, SigningKeys};
pub use provider::{BearerTokenProvider, SubjectUserProvider, UserProvider};
pub use token::{AccessToken, NewAccessToken, TokenClaims, TokenError, TokenManager};
pub use user::{AccessTokenContext, Authenticatable, HasApiTokens, TokenableUser, User};
