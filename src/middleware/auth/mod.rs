pub mod guard;
pub mod scopes;
