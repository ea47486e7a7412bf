// Danish register and VAT format checks shared by the canonical models.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use validator::ValidationError;

/// Invoice totals may disagree by less than one øre.
pub const TOTAL_TOLERANCE: Decimal = dec!(0.01);

static DANISH_VAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^DK\d{8}$").expect("static regex is valid")
});

/// CVR numbers are 8 digits. Separators such as spaces and dashes are ignored.
pub fn is_valid_cvr(cvr: &str) -> bool {
    let digits: String = cvr.chars().filter(|c| c.is_ascii_digit()).collect();
    let has_foreign = cvr
        .chars()
        .any(|c| !c.is_ascii_digit() && !c.is_whitespace() && c != '-');

    !has_foreign && digits.len() == 8
}

/// Danish VAT numbers are `DK` followed by the 8-digit CVR.
pub fn is_valid_danish_vat(vat_number: &str) -> bool {
    let cleaned: String = vat_number
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();
    DANISH_VAT_REGEX.is_match(&cleaned)
}

pub fn validate_cvr(cvr: &str) -> Result<(), ValidationError> {
    if !is_valid_cvr(cvr) {
        return Err(ValidationError::new("cvr_format"));
    }
    Ok(())
}

pub fn validate_danish_vat(vat_number: &str) -> Result<(), ValidationError> {
    if !is_valid_danish_vat(vat_number) {
        return Err(ValidationError::new("danish_vat_format"));
    }
    Ok(())
}

/// `true` when `inc_vat` equals `ex_vat + vat` within [`TOTAL_TOLERANCE`].
pub fn totals_balance(ex_vat: Decimal, vat: Decimal, inc_vat: Decimal) -> bool {
    (inc_vat - (ex_vat + vat)).abs() < TOTAL_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cvr_validation() {
        assert!(is_valid_cvr("12345678"));
        assert!(is_valid_cvr("1234-5678"));
        assert!(!is_valid_cvr("1234567"));
        assert!(!is_valid_cvr("123456789"));
        assert!(!is_valid_cvr(""));
        assert!(!is_valid_cvr("DK12345678"));
    }

    #[test]
    fn test_danish_vat_validation() {
        assert!(is_valid_danish_vat("DK12345678"));
        assert!(is_valid_danish_vat("DK 1234 5678"));
        assert!(is_valid_danish_vat("dk12345678"));
        assert!(!is_valid_danish_vat("SE12345678"));
        assert!(!is_valid_danish_vat("12345678"));
    }

    #[test]
    fn test_totals_tolerance() {
        assert!(totals_balance(dec!(100), dec!(25), dec!(125)));
        assert!(totals_balance(dec!(100), dec!(25), dec!(125.009)));
        assert!(!totals_balance(dec!(100), dec!(25), dec!(125.01)));
    }
}
