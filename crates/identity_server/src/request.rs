//! `/identify` request body parsing.

use serde::Deserialize;

/// `phoneNumber` as clients send it: a string or a bare JSON number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PhoneField {
    Text(String),
    Number(serde_json::Number),
}

/// Raw `/identify` body. Missing and `null` fields are both absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<PhoneField>,
}

impl IdentifyRequest {
    /// Phone number as text. Numbers render in shortest decimal form, so
    /// `123.0` and `1e3` read as `123` and `1000`.
    pub fn phone_text(&self) -> Option<String> {
        self.phone_number.as_ref().map(|phone| match phone {
            PhoneField::Text(text) => text.clone(),
            PhoneField::Number(number) => number_text(number),
        })
    }
}

fn number_text(number: &serde_json::Number) -> String {
    if number.is_f64() {
        if let Some(value) = number.as_f64() {
            // `-0` reads as `0`.
            let value = if value == 0.0 { 0.0 } else { value };
            return value.to_string();
        }
    }
    number.to_string()
}

/// Parses a raw body. An empty body or a JSON `null` is treated as `{}`.
pub fn parse_identify_request(body: &[u8]) -> Result<IdentifyRequest, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(IdentifyRequest::default());
    }
    serde_json::from_slice::<Option<IdentifyRequest>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|err| format!("invalid request body: {err}"))
}
