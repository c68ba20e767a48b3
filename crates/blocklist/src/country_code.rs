use core::str::FromStr;

use serde::{Deserialize, Serialize};

use countryguard_core::{DomainError, DomainResult, ValueObject};

/// ISO-3166 alpha-2 style country code, always two upper-case ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Trim, upper-case and validate.
    pub fn parse(input: &str) -> DomainResult<Self> {
        let code = input.trim().to_ascii_uppercase();
        if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::invalid_code(input));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for CountryCode {}

impl core::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CountryCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CountryCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CountryCode> for String {
    fn from(value: CountryCode) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(CountryCode::parse(" us ").unwrap().as_str(), "US");
        assert_eq!(CountryCode::parse("dE").unwrap().as_str(), "DE");
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "   ", "U", "USA", "U1", "1U", "U S", "é", "ÜS"] {
            match CountryCode::parse(bad) {
                Err(DomainError::InvalidCode(_)) => {}
                other => panic!("Expected InvalidCode for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn deserialization_validates() {
        let ok: CountryCode = serde_json::from_str("\"fr\"").unwrap();
        assert_eq!(ok.as_str(), "FR");
        assert!(serde_json::from_str::<CountryCode>("\"FRA\"").is_err());
    }

    proptest! {
        /// Any two ASCII letters, in any case, padded with whitespace, normalize to
        /// their trimmed upper-case form.
        #[test]
        fn valid_codes_normalize(
            code in "[a-zA-Z]{2}",
            left in "[ \t]{0,3}",
            right in "[ \t]{0,3}",
        ) {
            let parsed = CountryCode::parse(&format!("{left}{code}{right}")).unwrap();
            prop_assert_eq!(parsed.as_str(), code.to_ascii_uppercase());
        }

        /// Anything that is not exactly two letters once trimmed is rejected.
        #[test]
        fn non_two_letter_inputs_fail(input in "\\PC{0,6}") {
            let trimmed = input.trim();
            let valid = trimmed.len() == 2 && trimmed.bytes().all(|b| b.is_ascii_alphabetic());
            prop_assume!(!valid);
            prop_assert!(matches!(CountryCode::parse(&input), Err(DomainError::InvalidCode(_))));
        }
    }
}
