use std::fmt;
use uuid::Uuid;

pub const ANONYMOUS: &str = "anonymous";

/// Pseudo-user token sent as `x-user-id` so the backend can attribute credits.
/// Not an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    token: String,
    minted: bool,
}

impl Identity {
    pub fn mint() -> Self {
        Self { token: Uuid::new_v4().to_string(), minted: true }
    }

    pub fn anonymous() -> Self {
        Self { token: ANONYMOUS.to_string(), minted: false }
    }

    /// A configured token wins; a blank one falls back to the anonymous literal.
    pub fn resolve(configured: Option<&str>) -> Self {
        match configured.map(str::trim) {
            Some("") => Self::anonymous(),
            Some(token) => Self { token: token.to_string(), minted: false },
            None => Self::mint(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn is_minted(&self) -> bool {
        self.minted
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
