//! Argon2id password hashing for the configured user accounts

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password into a PHC string suitable for `auth.users[].password_hash`
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// `Err` only when the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Argon2id hash with the default parameters that no password produces
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$Y29ubmVjdGVoci1kdW1teQ$BwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSY";

/// Verify a login attempt. Without a stored hash the password is checked
/// against [`DUMMY_HASH`] so unknown users cost the same Argon2 work.
pub fn verify_login(password: &str, hash: Option<&str>) -> Result<bool, argon2::password_hash::Error> {
    match hash {
        Some(hash) => verify_password(password, hash),
        None => {
            verify_password(password, DUMMY_HASH)?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash() {
        assert!(verify_password("pw", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_unknown_user_runs_full_verification() {
        assert!(PasswordHash::new(DUMMY_HASH).is_ok());
        assert!(!verify_password("correct horse", DUMMY_HASH).unwrap());
        assert!(!verify_login("correct horse", None).unwrap());

        let hash = hash_password("correct horse").unwrap();
        assert!(verify_login("correct horse", Some(&hash)).unwrap());
    }
}
