use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::SetupError;

/// One role's account on the application under test.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub user_name: String,
    pub password: SecretString,
    pub is_admin: bool,
}

// body of `POST /app/createUser`
#[derive(serde::Serialize)]
pub struct CreateUserForm<'a> {
    email: &'a str,
    is_admin: &'static str,
    user_name: &'a str,
    password: &'a str,
}

// body of `POST /accounts/login/`
#[derive(serde::Serialize)]
pub struct LoginForm<'a> {
    username: &'a str,
    password: &'a str,
    csrfmiddlewaretoken: &'a str,
}

impl Credentials {
    #[allow(clippy::missing_errors_doc)]
    pub fn validate(&self) -> Result<(), SetupError> {
        if !EmailAddress::is_valid(&self.email) {
            return Err(SetupError::InvalidCredentials(format!(
                "{} is not a valid email address",
                self.email
            )));
        }
        if self.user_name.trim().is_empty() {
            return Err(SetupError::InvalidCredentials(format!(
                "account {} has an empty user name",
                self.email
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn role(&self) -> &'static str {
        if self.is_admin { "admin" } else { "user" }
    }

    #[must_use]
    pub fn create_user_form(&self) -> CreateUserForm<'_> {
        CreateUserForm {
            email: &self.email,
            is_admin: if self.is_admin { "1" } else { "0" },
            user_name: &self.user_name,
            password: self.password.expose_secret(),
        }
    }

    #[must_use]
    pub fn login_form<'a>(&'a self, csrf_token: &'a str) -> LoginForm<'a> {
        LoginForm {
            username: &self.user_name,
            password: self.password.expose_secret(),
            csrfmiddlewaretoken: csrf_token,
        }
    }
}
