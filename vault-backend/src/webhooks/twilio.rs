//! Twilio request validation and SMS payload extraction.
//!
//! Twilio signs `url + key1 + value1 + key2 + value2 ...` (POST parameters
//! sorted by key) with HMAC-SHA1 under the account auth token and sends the
//! base64 digest in `X-Twilio-Signature`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::rejected;
use crate::error::VaultResult;
use crate::inbound::{normalize_phone, InboundMessage};
use crate::models::MessageChannel;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Empty TwiML reply: acknowledge without auto-responding
pub const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

/// Decode an `application/x-www-form-urlencoded` body into ordered pairs
pub fn parse_form(body: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

fn mac_for(url: &str, params: &[(String, String)], auth_token: &str) -> VaultResult<HmacSha1> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
        .map_err(|_| rejected("invalid auth token"))?;
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Ok(mac)
}

/// The signature Twilio would send for this request
#[cfg(test)]
pub fn compute_signature(url: &str, params: &[(String, String)], auth_token: &str) -> VaultResult<String> {
    let mac = mac_for(url, params, auth_token)?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(
    url: &str,
    params: &[(String, String)],
    header: Option<&str>,
    auth_token: &str,
) -> VaultResult<()> {
    let header = header.ok_or_else(|| rejected("missing X-Twilio-Signature"))?;
    let claimed = STANDARD
        .decode(header.trim())
        .map_err(|_| rejected("signature is not valid base64"))?;

    mac_for(url, params, auth_token)?
        .verify_slice(&claimed)
        .map_err(|_| rejected("signature mismatch"))
}

/// The URL Twilio requested, as it would have seen it. Behind a proxy the
/// connection info is the proxy's view, so `public_base_url` wins when set.
pub fn request_url(
    public_base_url: Option<&str>,
    scheme: &str,
    host: &str,
    path_and_query: &str,
) -> String {
    match public_base_url {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), path_and_query),
        None => format!("{}://{}{}", scheme, host, path_and_query),
    }
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Map an inbound SMS/MMS webhook to a message. Returns `None` for
/// callbacks that carry no sender (delivery status updates).
pub fn extract_message(params: &[(String, String)]) -> Option<InboundMessage> {
    let from = param(params, "From").filter(|f| !f.is_empty())?;
    let body = param(params, "Body").unwrap_or_default();
    let num_media: u32 = param(params, "NumMedia")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    let (content, message_type) = if body.is_empty() && num_media > 0 {
        ("[media]".to_string(), "media")
    } else {
        (body.to_string(), "text")
    };

    Some(InboundMessage {
        channel: MessageChannel::Sms,
        routing_key: param(params, "To").map(normalize_phone),
        from: normalize_phone(from),
        body: content,
        external_id: param(params, "MessageSid")
            .or_else(|| param(params, "SmsSid"))
            .map(str::to_string),
        message_type: message_type.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://vault.example.com/webhooks/twilio";

    fn params() -> Vec<(String, String)> {
        parse_form(b"To=%2B15550009999&From=%2B15550001&Body=Hello+there&MessageSid=SM123&NumMedia=0")
    }

    #[test]
    fn test_parse_form_decodes() {
        let p = params();
        assert_eq!(param(&p, "To"), Some("+15550009999"));
        assert_eq!(param(&p, "Body"), Some("Hello there"));
    }

    #[test]
    fn test_signature_covers_url_then_sorted_pairs() {
        let p = params();
        let mut mac = HmacSha1::new_from_slice(b"token").unwrap();
        mac.update(URL.as_bytes());
        for (k, v) in [
            ("Body", "Hello there"),
            ("From", "+15550001"),
            ("MessageSid", "SM123"),
            ("NumMedia", "0"),
            ("To", "+15550009999"),
        ] {
            mac.update(k.as_bytes());
            mac.update(v.as_bytes());
        }
        let expected = STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(compute_signature(URL, &p, "token").unwrap(), expected);
    }

    #[test]
    fn test_parameter_order_does_not_matter() {
        let mut reversed = params();
        reversed.reverse();
        assert_eq!(
            compute_signature(URL, &params(), "token").unwrap(),
            compute_signature(URL, &reversed, "token").unwrap()
        );
    }

    #[test]
    fn test_tampered_body_never_matches() {
        let signature = compute_signature(URL, &params(), "token").unwrap();
        verify_signature(URL, &params(), Some(signature.as_str()), "token").unwrap();

        for i in 0..params().len() {
            let mut tampered = params();
            tampered[i].1.push('x');
            assert!(verify_signature(URL, &tampered, Some(signature.as_str()), "token").is_err());
        }

        let other_url = "https://vault.example.com/webhooks/twilio?x=1";
        assert!(verify_signature(other_url, &params(), Some(signature.as_str()), "token").is_err());
        assert!(verify_signature(URL, &params(), Some(signature.as_str()), "other").is_err());
        assert!(verify_signature(URL, &params(), None, "token").is_err());
        assert!(verify_signature(URL, &params(), Some("%%%"), "token").is_err());
    }

    #[test]
    fn test_request_url() {
        assert_eq!(
            request_url(Some("https://vault.example.com/"), "http", "10.0.0.5:8080", "/webhooks/twilio"),
            URL
        );
        assert_eq!(
            request_url(None, "http", "localhost:8080", "/webhooks/twilio?a=1"),
            "http://localhost:8080/webhooks/twilio?a=1"
        );
    }

    #[test]
    fn test_extract_message() {
        let message = extract_message(&params()).unwrap();
        assert_eq!(message.from, "+15550001");
        assert_eq!(message.routing_key.as_deref(), Some("+15550009999"));
        assert_eq!(message.body, "Hello there");
        assert_eq!(message.external_id.as_deref(), Some("SM123"));
        assert_eq!(message.channel, MessageChannel::Sms);

        let mms = parse_form(b"From=%2B15550001&To=%2B15550009999&Body=&NumMedia=2&MessageSid=MM1");
        assert_eq!(extract_message(&mms).unwrap().body, "[media]");

        let status = parse_form(b"MessageSid=SM1&MessageStatus=delivered");
        assert!(extract_message(&status).is_none());
    }
}
