use serde::Serialize;

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
}

impl Identity {
    /// Sessions without an owner are accessible to every authenticated caller.
    pub fn can_access(&self, owner_user_id: Option<i64>) -> bool {
        match owner_user_id {
            Some(owner) => owner == self.user_id,
            None => true,
        }
    }
}

/// What the request carried in its `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentedCredentials {
    Missing,
    Malformed,
    Basic { username: String, password: String },
}

/// Outcome of parsing and verifying the presented credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    Absent,
    Invalid,
    Valid(Identity),
}

impl CredentialCheck {
    /// Collapses to an optional identity. Only the ingestion endpoint does this.
    pub fn into_optional(self) -> Option<Identity> {
        match self {
            CredentialCheck::Valid(identity) => Some(identity),
            CredentialCheck::Absent | CredentialCheck::Invalid => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: i64) -> Identity {
        Identity {
            user_id: id,
            username: format!("user{id}"),
        }
    }

    #[test]
    fn owner_matches() {
        assert!(identity(1).can_access(Some(1)));
        assert!(!identity(1).can_access(Some(2)));
    }

    #[test]
    fn ownerless_is_shared() {
        assert!(identity(7).can_access(None));
    }

    #[test]
    fn invalid_collapses_to_anonymous() {
        assert_eq!(CredentialCheck::Invalid.into_optional(), None);
        assert_eq!(CredentialCheck::Absent.into_optional(), None);
        assert_eq!(
            CredentialCheck::Valid(identity(3)).into_optional(),
            Some(identity(3))
        );
    }
}
