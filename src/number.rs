//! E.164 number handling on top of libphonenumber metadata.

use phonenumber::{country, Mode, PhoneNumber};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NumberError {
    #[error("'{number}' is not a phone number: {reason}")]
    Invalid { number: String, reason: String },
}

/// Region assumed for numbers written without a country calling code.
pub const DEFAULT_REGION: country::Id = country::Id::US;

fn invalid(number: &str, reason: impl ToString) -> NumberError {
    NumberError::Invalid {
        number: number.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a number written in international form, `+` or `00` followed by
/// the country calling code. National numbers are rejected.
pub fn parse_international(number: &str) -> Result<PhoneNumber, NumberError> {
    let trimmed = number.trim();
    let international = match trimmed.strip_prefix("00") {
        Some(rest) => format!("+{}", rest),
        None => trimmed.to_string(),
    };
    phonenumber::parse(None, &international).map_err(|e| invalid(number, e))
}

/// Country calling code of an international number, e.g. `"44"`.
pub fn country_code(number: &str) -> Result<String, NumberError> {
    Ok(parse_international(number)?.country().code().to_string())
}

/// E.164 form (`+15145550100`) of a number. National numbers are read in
/// [`DEFAULT_REGION`].
pub fn e164(number: &str) -> Result<String, NumberError> {
    let parsed = phonenumber::parse(Some(DEFAULT_REGION), number.trim()).map_err(|e| invalid(number, e))?;
    Ok(parsed.format().mode(Mode::E164).to_string())
}

/// Digits dialed upstream for an international number: E.164 without `+`.
pub fn dial_digits(number: &str) -> Result<String, NumberError> {
    let parsed = parse_international(number)?;
    let formatted = parsed.format().mode(Mode::E164).to_string();
    Ok(formatted.trim_start_matches('+').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_code() {
        assert_eq!(country_code("+1 650-555-5555").unwrap(), "1");
        assert_eq!(country_code("+44 20 7123 1234").unwrap(), "44");
        assert_eq!(country_code("0033123456789").unwrap(), "33");
    }

    #[test]
    fn test_national_and_garbage_rejected() {
        assert!(matches!(country_code("6505555555"), Err(NumberError::Invalid { .. })));
        assert!(country_code("invalid-number").is_err());
        assert!(country_code("").is_err());
    }

    #[test]
    fn test_e164_formatting() {
        assert_eq!(e164("+1 555 555 0199").unwrap(), "+15555550199");
        assert_eq!(e164("(514) 555-0111").unwrap(), "+15145550111");
        assert_eq!(e164("+44 20 7123 1234").unwrap(), "+442071231234");
    }

    #[test]
    fn test_dial_digits() {
        assert_eq!(dial_digits("+44 20 7123 4567").unwrap(), "442071234567");
        assert!(dial_digits("2071234567").is_err());
    }
}
