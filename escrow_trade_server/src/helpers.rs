use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `base64(HMAC-SHA256(secret, data))`, the signature format the session gateway uses for caller addresses.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::default(),
    };
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// Checks a base64-encoded HMAC in constant time. An empty secret never validates.
pub fn verify_hmac(secret: &str, data: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = base64::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hmac_round_trip() {
        let sig = calculate_hmac("gateway-secret", b"0xb0b");
        assert!(verify_hmac("gateway-secret", b"0xb0b", &sig));
        assert!(!verify_hmac("gateway-secret", b"0xbad", &sig));
        assert!(!verify_hmac("other-secret", b"0xb0b", &sig));
        assert!(!verify_hmac("", b"0xb0b", &calculate_hmac("", b"0xb0b")));
        assert!(!verify_hmac("gateway-secret", b"0xb0b", "not base64!"));
    }

    #[test]
    fn known_vector() {
        // RFC 4231, test case 2
        let sig = calculate_hmac("Jefe", b"what do ya want for nothing?");
        assert_eq!(sig, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }
}
