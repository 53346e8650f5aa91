use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for subtitle language codes
///
/// Target languages arrive as ISO 639-1 codes with an optional region
/// (`pt-br`), while subtitle sources report ISO 639-2 codes, including the
/// bibliographic variants and a few source-specific ones (`pob`). Everything
/// is compared through one normalized form: lowercase 639-1 plus region.

/// ISO 639-2/B codes that differ from their 639-2/T counterparts
fn part2b_to_part2t(code: &str) -> &str {
    match code {
        "fre" => "fra",
        "ger" => "deu",
        "dut" => "nld",
        "gre" => "ell",
        "chi" => "zho",
        "cze" => "ces",
        "ice" => "isl",
        "alb" => "sqi",
        "arm" => "hye",
        "baq" => "eus",
        "bur" => "mya",
        "per" => "fas",
        "geo" => "kat",
        "may" => "msa",
        "mac" => "mkd",
        "rum" => "ron",
        "slo" => "slk",
        "wel" => "cym",
        other => other,
    }
}

/// Codes used by subtitle sources that are not ISO 639-2 at all
fn source_specific_code(code: &str) -> Option<&'static str> {
    match code {
        "pob" | "pb" => Some("pt-br"),
        "spn" | "ea" => Some("es"),
        "ze" | "zht" => Some("zh-tw"),
        "zhs" => Some("zh"),
        "scc" => Some("sr"),
        _ => None,
    }
}

/// Normalize a language code to lowercase ISO 639-1, keeping a region suffix
///
/// Falls back to ISO 639-2/T for languages without a 639-1 code.
pub fn normalize_language_code(code: &str) -> Result<String> {
    let code = code.trim().to_lowercase().replace('_', "-");

    if let Some(mapped) = source_specific_code(&code) {
        return Ok(mapped.to_string());
    }

    let (base, region) = match code.split_once('-') {
        Some((base, region)) if !region.is_empty() => (base, Some(region)),
        _ => (code.as_str(), None),
    };

    let language = match base.len() {
        2 => Language::from_639_1(base),
        3 => Language::from_639_3(part2b_to_part2t(base)),
        _ => None,
    }
    .ok_or_else(|| anyhow!("Invalid language code: {}", code))?;

    let base = language
        .to_639_1()
        .map(str::to_string)
        .unwrap_or_else(|| language.to_639_3().to_string());

    Ok(match region {
        Some(region) => format!("{}-{}", base, region),
        None => base,
    })
}

/// Validate that a code names a known language
pub fn validate_language_code(code: &str) -> Result<()> {
    normalize_language_code(code).map(|_| ())
}

/// Check if two language codes represent the same language and region
///
/// Unknown codes only match themselves, compared case-insensitively.
pub fn languages_match(code1: &str, code2: &str) -> bool {
    match (normalize_language_code(code1), normalize_language_code(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => code1.trim().eq_ignore_ascii_case(code2.trim()),
    }
}

/// English name of a language, with the region appended when present
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_language_code(code)?;
    let (base, region) = match normalized.split_once('-') {
        Some((base, region)) => (base, Some(region)),
        None => (normalized.as_str(), None),
    };

    let lang = match base.len() {
        2 => Language::from_639_1(base),
        _ => Language::from_639_3(base),
    }
    .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(match region {
        Some(region) => format!("{} ({})", lang.to_name(), region.to_uppercase()),
        None => lang.to_name().to_string(),
    })
}
