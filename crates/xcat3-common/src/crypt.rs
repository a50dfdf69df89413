//! §4.8 password crypt helper. Rust's stdlib has no `crypt(3)`
//! equivalent, so this uses `pwhash`, which implements the
//! `$1$`/`$5$`/`$6$` algorithms directly.

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Md5,
    Sha256,
    Sha512,
}

impl CryptMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "md5" => Some(CryptMethod::Md5),
            "sha256" => Some(CryptMethod::Sha256),
            "sha512" => Some(CryptMethod::Sha512),
            _ => None,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            CryptMethod::Md5 => "$1$",
            CryptMethod::Sha256 => "$5$",
            CryptMethod::Sha512 => "$6$",
        }
    }
}

impl Default for CryptMethod {
    fn default() -> Self {
        CryptMethod::Sha256
    }
}

const SALT_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const SALT_LEN: usize = 8;

fn random_salt() -> String {
    let mut rng = rand::thread_rng();
    (0..SALT_LEN)
        .map(|_| SALT_ALPHABET[rng.gen_range(0..SALT_ALPHABET.len())] as char)
        .collect()
}

/// Already-hashed detection: a recognized crypt prefix means the input
/// is used verbatim.
fn already_hashed(password: &str) -> bool {
    password.starts_with("$1$") || password.starts_with("$5$") || password.starts_with("$6$")
}

/// Apply the §4.8 contract: pass through already-hashed input, else
/// hash with a random 8-char salt using `method` (default sha256).
pub fn crypt_password(password: &str, method: Option<CryptMethod>) -> String {
    if already_hashed(password) {
        return password.to_string();
    }
    let method = method.unwrap_or_default();
    let salt = random_salt();
    hash_with(password, method, &salt)
}

fn hash_with(password: &str, method: CryptMethod, salt: &str) -> String {
    let full_salt = format!("{}{}", method.prefix(), salt);
    match method {
        CryptMethod::Md5 => pwhash::md5_crypt::hash_with(full_salt.as_str(), password)
            .unwrap_or_else(|_| format!("{full_salt}$")),
        CryptMethod::Sha256 => pwhash::sha256_crypt::hash_with(full_salt.as_str(), password)
            .unwrap_or_else(|_| format!("{full_salt}$")),
        CryptMethod::Sha512 => pwhash::sha512_crypt::hash_with(full_salt.as_str(), password)
            .unwrap_or_else(|_| format!("{full_salt}$")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_hashed_password_passes_through_unchanged() {
        let hashed = "$6$abcdefgh$somehashvalue";
        assert_eq!(crypt_password(hashed, None), hashed);
    }

    #[test]
    fn cleartext_password_is_hashed_with_default_method() {
        let out = crypt_password("hunter2", None);
        assert!(out.starts_with("$5$"));
        assert_ne!(out, "hunter2");
    }

    #[test]
    fn explicit_method_selects_prefix() {
        let out = crypt_password("hunter2", Some(CryptMethod::Md5));
        assert!(out.starts_with("$1$"));
        let out = crypt_password("hunter2", Some(CryptMethod::Sha512));
        assert!(out.starts_with("$6$"));
    }
}
