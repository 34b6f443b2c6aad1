use std::fmt::Debug;

use derive_more::{AsRef, From};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Login credentials of the bank data portal account.
#[derive(Debug, TypedBuilder, Serialize, Deserialize)]
pub struct Credentials {
    pub email: Email,
    pub password: Password,
}

#[derive(Debug, From, AsRef, Serialize, Deserialize)]
#[as_ref(forward)]
pub struct Email(String);

/// Never printed: `Debug` is redacted and there is no `Display`.
#[derive(From, AsRef, Serialize, Deserialize)]
#[as_ref(forward)]
pub struct Password(String);
impl Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(..)")
    }
}
