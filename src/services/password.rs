// src/services/password.rs
use bcrypt::{hash, verify, BcryptError};
use regex::Regex;
use serde::Serialize;

pub const BCRYPT_COST: u32 = 10;
pub const MIN_PASSWORD_LENGTH: usize = 8;

lazy_static::lazy_static! {
    static ref CAPITAL: Regex = Regex::new("[A-Z]").unwrap();
    static ref DIGIT: Regex = Regex::new("[0-9]").unwrap();
    static ref SPECIAL: Regex = Regex::new("[^a-zA-Z0-9]").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    TooShort,
    MissingCapitalOrNumber,
}

impl PolicyViolation {
    pub fn message(&self) -> &'static str {
        match self {
            PolicyViolation::TooShort => "Password must be at least 8 characters long",
            PolicyViolation::MissingCapitalOrNumber => {
                "Password must contain at least one capital letter and one number"
            }
        }
    }
}

/// Registration/reset policy: 8+ characters, at least one capital letter and one digit.
pub fn check_policy(password: &str) -> Result<(), PolicyViolation> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PolicyViolation::TooShort);
    }
    if !CAPITAL.is_match(password) || !DIGIT.is_match(password) {
        return Err(PolicyViolation::MissingCapitalOrNumber);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequirements {
    pub min_length: bool,
    pub capital_letter: bool,
    pub number: bool,
    pub special_char: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PasswordStrength {
    pub score: u8,
    pub label: &'static str,
    pub requirements: PasswordRequirements,
}

pub fn strength(password: &str) -> PasswordStrength {
    let requirements = PasswordRequirements {
        min_length: password.chars().count() >= MIN_PASSWORD_LENGTH,
        capital_letter: CAPITAL.is_match(password),
        number: DIGIT.is_match(password),
        special_char: SPECIAL.is_match(password),
    };

    let score = if password.is_empty() {
        0
    } else {
        [
            requirements.min_length,
            requirements.capital_letter,
            requirements.number,
            requirements.special_char,
        ]
        .iter()
        .filter(|met| **met)
        .count() as u8
    };

    let label = match score {
        _ if password.is_empty() => "",
        0 | 1 => "Weak",
        2 => "Fair",
        3 => "Good",
        _ => "Strong",
    };

    PasswordStrength {
        score,
        label,
        requirements,
    }
}

pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    hash(password, BCRYPT_COST)
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, BcryptError> {
    verify(password, password_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy() {
        assert_eq!(check_policy("Ab1"), Err(PolicyViolation::TooShort));
        assert_eq!(
            check_policy("alllowercase1"),
            Err(PolicyViolation::MissingCapitalOrNumber)
        );
        assert_eq!(
            check_policy("NoDigitsHere"),
            Err(PolicyViolation::MissingCapitalOrNumber)
        );
        assert_eq!(check_policy("Concrete2024"), Ok(()));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 7 characters, more than 8 bytes
        assert_eq!(check_policy("Ééééé1é"), Err(PolicyViolation::TooShort));
    }

    #[test]
    fn test_strength_labels() {
        assert_eq!(strength("").score, 0);
        assert_eq!(strength("").label, "");
        assert_eq!(strength("abc").label, "Weak");
        assert_eq!(strength("abcdefgh").label, "Weak");
        assert_eq!(strength("Abcdefgh").label, "Fair");
        assert_eq!(strength("Abcdefg1").label, "Good");

        let strong = strength("Abcdef1!");
        assert_eq!(strong.score, 4);
        assert_eq!(strong.label, "Strong");
        assert!(strong.requirements.special_char);
    }

    #[test]
    fn test_hash_and_verify() {
        // Low cost keeps the test fast; production uses BCRYPT_COST
        let hashed = bcrypt::hash("Concrete2024", 4).unwrap();
        assert!(verify_password("Concrete2024", &hashed).unwrap());
        assert!(!verify_password("Concrete2025", &hashed).unwrap());
    }
}
