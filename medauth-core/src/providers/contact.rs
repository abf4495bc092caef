//! Phone number normalization for SMS/WhatsApp destinations

use crate::providers::DeliveryError;

/// Minimum number of digits accepted for an international number.
const MIN_DIGITS: usize = 10;

/// Strip everything but digits and '+', and make sure the number starts with '+'.
pub fn normalize_address(raw: &str) -> Result<String, DeliveryError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < MIN_DIGITS {
        return Err(DeliveryError::InvalidAddress(raw.to_string()));
    }
    Ok(format!("+{}", digits))
}

/// Address form used by the WhatsApp channel of the provider.
pub fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{}", number)
    }
}

/// Inverse of [`whatsapp_address`], for matching inbound senders.
pub fn strip_channel_prefix(address: &str) -> &str {
    address.strip_prefix("whatsapp:").unwrap_or(address)
}
