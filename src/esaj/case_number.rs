use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaseNumberError {
    /// Carries the original, non-normalized string for the error row and log.
    #[error("Número de processo inválido: {0}")]
    Invalid(String),
}

/// Splits a unified case number into the two values the portal search form
/// expects: the 13-character leading segment and the 4-character forum
/// suffix. `.` and `-` are stripped before validation; anything that does
/// not normalize to exactly 20 characters is rejected.
pub fn split_case_number(raw: &str) -> Result<(String, String), CaseNumberError> {
    let digits: Vec<char> = raw.chars().filter(|c| *c != '.' && *c != '-').collect();
    if digits.len() != 20 {
        return Err(CaseNumberError::Invalid(raw.to_string()));
    }
    let prefix: String = digits[..13].iter().collect();
    let suffix: String = digits[16..].iter().collect();
    Ok((prefix, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_punctuated_number() {
        let (prefix, suffix) = split_case_number("0044370-60.2018.8.26.0500").unwrap();
        assert_eq!(prefix, "0044370602018");
        assert_eq!(prefix.len(), 13);
        assert_eq!(suffix, "0500");
        assert_eq!(suffix.len(), 4);
    }

    #[test]
    fn splits_bare_number() {
        let (prefix, suffix) = split_case_number("00443706020188260500").unwrap();
        assert_eq!(prefix, "0044370602018");
        assert_eq!(suffix, "0500");
    }

    #[test]
    fn rejects_wrong_length_with_original_string() {
        let err = split_case_number("1234-56").unwrap_err();
        assert_eq!(err, CaseNumberError::Invalid("1234-56".to_string()));
        assert!(err.to_string().contains("1234-56"));
    }

    #[test]
    fn rejects_twenty_one_digit_number() {
        // This historical sample normalizes to 21 characters and is
        // therefore rejected, same as any other off-length input.
        let raw = "0443679-76.2019.8.26.0500";
        let digits: String = raw.chars().filter(|c| *c != '.' && *c != '-').collect();
        assert_eq!(digits.len(), 21);
        assert!(split_case_number(raw).is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(split_case_number("").is_err());
    }
}
