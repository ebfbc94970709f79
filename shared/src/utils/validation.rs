use regex::Regex;
use std::sync::LazyLock;

static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+91|91|0)?[6-9][0-9]{9}$").expect("phone regex valid"));

static PINCODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]{5}$").expect("pincode regex valid"));

// Validate nomor HP (10 digit, boleh prefix +91/91/0)
pub fn is_valid_phone(phone: &str) -> bool {
    let normalized: String = phone.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    PHONE_REGEX.is_match(&normalized)
}

// Validate pincode 6 digit
pub fn is_valid_pincode(pincode: &str) -> bool {
    PINCODE_REGEX.is_match(pincode.trim())
}

// Field wajib tidak boleh kosong atau hanya spasi
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn is_blank_opt(value: Option<&str>) -> bool {
    value.map(is_blank).unwrap_or(true)
}

// URL foto bukti delivery harus http(s) absolut
pub fn is_valid_photo_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("https://") || url.starts_with("http://"))
        && url.len() > "https://".len()
        && !url.contains(char::is_whitespace)
}

// Validate koordinat latitude/longitude
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

// Sanitize string untuk prevent XSS
pub fn sanitize_html(input: &str) -> String {
    input
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
