use crate::common::User;

/// Login credential kept between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub token: String,
    pub user: User,
    pub saved_at: i64,
}
