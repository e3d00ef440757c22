use crate::db::models::{ProfileUpdate, Registration};
use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=30;

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Validation(message.into())
}

pub fn username(value: &str) -> Result<(), AppError> {
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("\"username\" must only contain alpha-numeric characters"));
    }
    if !USERNAME_LEN.contains(&value.len()) {
        return Err(invalid(format!(
            "\"username\" length must be between {} and {} characters",
            USERNAME_LEN.start(),
            USERNAME_LEN.end()
        )));
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), AppError> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !value.chars().any(char::is_whitespace)
                && domain.split('.').count() >= 2
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(invalid("\"email\" must be a valid email"))
    }
}

pub fn password(field: &str, value: &str) -> Result<(), AppError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid(format!(
            "\"{field}\" length must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

pub fn registration(reg: &Registration) -> Result<(), AppError> {
    username(&reg.username)?;
    email(&reg.email)?;
    password("password", &reg.password)?;
    if reg.confirm_password != reg.password {
        return Err(invalid("\"confirmPassword\" must be [ref:password]"));
    }
    Ok(())
}

pub fn login(email_value: &str, password_value: &str) -> Result<(), AppError> {
    email(email_value)?;
    if password_value.is_empty() {
        return Err(invalid("\"password\" is not allowed to be empty"));
    }
    Ok(())
}

pub fn profile_update(update: &ProfileUpdate) -> Result<(), AppError> {
    if let Some(value) = &update.username {
        username(value)?;
    }
    if let Some(value) = &update.email {
        email(value)?;
    }
    Ok(())
}

pub fn user_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| invalid("Invalid user ID"))
}

/// Parses an optional integer query parameter; blank counts as absent.
pub fn query_number(name: &str, raw: Option<&str>, default: i64) -> Result<i64, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse::<i64>()
            .map_err(|_| invalid(format!("\"{name}\" must be a number"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(username("alice99").is_ok());
        assert!(username("al").is_err());
        assert!(username(&"a".repeat(31)).is_err());
        assert!(username("alice_99").is_err());
        assert!(username("alice 99").is_err());
    }

    #[test]
    fn test_email_rules() {
        assert!(email("alice@example.com").is_ok());
        assert!(email("a.b+c@mail.example.org").is_ok());
        assert!(email("alice").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("alice@example").is_err());
        assert!(email("alice@example.").is_err());
        assert!(email("alice@@example.com").is_err());
        assert!(email("al ice@example.com").is_err());
    }

    #[test]
    fn test_registration_rules() {
        let mut reg = Registration {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "Secret123".to_string(),
            confirm_password: "Secret123".to_string(),
            full_name: None,
        };
        assert!(registration(&reg).is_ok());

        reg.confirm_password = "Secret12".to_string();
        assert!(registration(&reg).is_err());

        reg.password = "short".to_string();
        reg.confirm_password = "short".to_string();
        assert!(registration(&reg).is_err());
    }

    #[test]
    fn test_user_id() {
        assert_eq!(user_id("42").unwrap(), 42);
        assert!(user_id("0").is_err());
        assert!(user_id("-3").is_err());
        assert!(user_id("abc").is_err());
    }

    #[test]
    fn test_query_number() {
        assert_eq!(query_number("page", None, 1).unwrap(), 1);
        assert_eq!(query_number("page", Some(""), 1).unwrap(), 1);
        assert_eq!(query_number("page", Some("3"), 1).unwrap(), 3);
        assert!(query_number("page", Some("three"), 1).is_err());
    }
}
