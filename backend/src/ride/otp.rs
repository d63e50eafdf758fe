use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::ride::model::Otp;

/// Fresh 6-digit code valid for `ttl`.
pub fn generate(now: DateTime<Utc>, ttl: Duration) -> Otp {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    Otp {
        code: format!("{:06}", code),
        expires_at: now + ttl,
        verified: false,
    }
}

/// Accepts a matching, unexpired, unused code.
pub fn verify(otp: &Otp, supplied: &str, now: DateTime<Utc>) -> bool {
    !otp.verified
        && now <= otp.expires_at
        && constant_time_eq(otp.code.as_bytes(), supplied.trim().as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_shape() {
        let now = Utc::now();
        for _ in 0..50 {
            let otp = generate(now, Duration::minutes(10));
            assert_eq!(otp.code.len(), 6);
            assert!(otp.code.chars().all(|c| c.is_ascii_digit()));
            assert_eq!(otp.expires_at, now + Duration::minutes(10));
            assert!(!otp.verified);
        }
    }

    #[test]
    fn test_verify() {
        let now = Utc::now();
        let otp = Otp {
            code: "042917".to_string(),
            expires_at: now + Duration::minutes(10),
            verified: false,
        };

        assert!(verify(&otp, "042917", now));
        assert!(!verify(&otp, "42917", now));
        assert!(!verify(&otp, "000000", now));
        assert!(!verify(&otp, "042917", now + Duration::minutes(11)));

        let used = Otp {
            verified: true,
            ..otp
        };
        assert!(!verify(&used, "042917", now));
    }
}
