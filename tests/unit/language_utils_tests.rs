/*!
 * Tests for language code utilities
 */

use subflow::language_utils::{get_language_name, languages_match, normalize_language_code, validate_language_code};

#[test]
fn test_normalizeLanguageCode_withSourceCodes_shouldMapToPart1() {
    assert_eq!(normalize_language_code("eng").unwrap(), "en");
    assert_eq!(normalize_language_code("fre").unwrap(), "fr");
    assert_eq!(normalize_language_code("ger").unwrap(), "de");
    assert_eq!(normalize_language_code("pob").unwrap(), "pt-br");
    assert_eq!(normalize_language_code("PT_BR").unwrap(), "pt-br");
    assert_eq!(normalize_language_code(" ES ").unwrap(), "es");
}

#[test]
fn test_validateLanguageCode_shouldRejectUnknownCodes() {
    assert!(validate_language_code("es").is_ok());
    assert!(validate_language_code("zz").is_err());
    assert!(validate_language_code("").is_err());
}

#[test]
fn test_languagesMatch_shouldCompareNormalizedForms() {
    assert!(languages_match("en", "eng"));
    assert!(languages_match("pob", "pt-br"));
    assert!(!languages_match("pt", "pt-br"));
    assert!(!languages_match("en", "fr"));
    assert!(languages_match("Klingon", "klingon"));
}

#[test]
fn test_getLanguageName_shouldIncludeRegion() {
    assert_eq!(get_language_name("fr").unwrap(), "French");
    assert_eq!(get_language_name("pt-br").unwrap(), "Portuguese (BR)");
}
