use serde::{Deserialize, Serialize};

const COUNTRY_PREFIX: &str = "+44";
const MOBILE_LEADING_DIGIT: char = '7';
/// Digits after the country prefix in a mobile number, leading 7 included.
const NATIONAL_MOBILE_DIGITS: usize = 10;

/// Outcome of the contactability check, in priority order of the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneValidationReason {
    UkMobile,
    NotUk,
    NotMobile,
    InvalidFormat,
    Empty,
}

impl PhoneValidationReason {
    pub const fn label(self) -> &'static str {
        match self {
            PhoneValidationReason::UkMobile => "uk_mobile",
            PhoneValidationReason::NotUk => "not_uk",
            PhoneValidationReason::NotMobile => "not_mobile",
            PhoneValidationReason::InvalidFormat => "invalid_format",
            PhoneValidationReason::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneValidation {
    pub valid: bool,
    pub reason: PhoneValidationReason,
}

impl PhoneValidation {
    fn rejected(reason: PhoneValidationReason) -> Self {
        Self {
            valid: false,
            reason,
        }
    }
}

/// Check a `+`-prefixed number against the UK mobile shape `+447xxxxxxxxx`.
/// First failing rule wins; total for every input.
pub fn validate_phone(phone: Option<&str>) -> PhoneValidation {
    let phone = phone.map(str::trim).unwrap_or_default();
    if phone.is_empty() {
        return PhoneValidation::rejected(PhoneValidationReason::Empty);
    }

    let Some(national) = phone.strip_prefix(COUNTRY_PREFIX) else {
        return PhoneValidation::rejected(PhoneValidationReason::NotUk);
    };

    if !national.starts_with(MOBILE_LEADING_DIGIT) {
        return PhoneValidation::rejected(PhoneValidationReason::NotMobile);
    }

    if national.len() != NATIONAL_MOBILE_DIGITS || !national.chars().all(|c| c.is_ascii_digit()) {
        return PhoneValidation::rejected(PhoneValidationReason::InvalidFormat);
    }

    PhoneValidation {
        valid: true,
        reason: PhoneValidationReason::UkMobile,
    }
}
