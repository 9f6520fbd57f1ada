//! Small validation helpers shared by sweep parameter checks and application config.
use std::ops::RangeInclusive;
use url::Url;

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates that a floating point value is finite and strictly positive.
pub fn is_positive_finite(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() {
        Err("Value must be a finite number")
    } else if value <= 0.0 {
        Err("Value must be greater than 0")
    } else {
        Ok(())
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Parses an `http`/`https` base URL that names a host.
pub fn parse_base_url(value: &str) -> Result<Url, String> {
    let value = value.trim();
    is_not_empty(value)?;

    let url = Url::parse(value).map_err(|e| e.to_string())?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(format!("unsupported scheme '{scheme}', use http or https"));
    }
    if url.host().is_none() {
        return Err("URL must contain a host".to_string());
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_in_range() {
        assert!(is_in_range(5, 1..=10).is_ok());
        assert!(is_in_range(11, 1..=10).is_err());
        assert!(is_in_range(0.1, 0.1..=5.0).is_ok());
    }

    #[test]
    fn test_is_positive_finite() {
        assert!(is_positive_finite(1e-3).is_ok());
        assert!(is_positive_finite(0.0).is_err());
        assert!(is_positive_finite(-4.0).is_err());
        assert!(is_positive_finite(f64::NAN).is_err());
        assert!(is_positive_finite(f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse_base_url() {
        let url = parse_base_url(" http://localhost:8000 ").unwrap();
        assert_eq!(url.port(), Some(8000));
        assert!(parse_base_url("https://lab.example.org/api").is_ok());
        assert!(parse_base_url("http://[::1]:8000").is_ok());

        assert!(parse_base_url("ftp://localhost").is_err());
        assert!(parse_base_url("http://").is_err());
        assert!(parse_base_url("").is_err());
        assert!(parse_base_url("localhost:8000").is_err());
    }

    #[test]
    fn test_parse_base_url_rejects_malformed_hosts_and_ports() {
        assert!(parse_base_url("http://bad host").is_err());
        assert!(parse_base_url("http://:8000").is_err());
        assert!(parse_base_url("https://exa mple.org:99999999").is_err());
        assert!(parse_base_url("http://localhost:99999999").is_err());
    }
}
