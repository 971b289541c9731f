//! Handles the login credentials and the AES key they derive

/// The username and password a session authenticates with
#[derive(Clone)]
pub(crate) struct Credentials {
    /// The username to login to the camera with
    pub(crate) username: String,
    /// The password to use for login. Some cameras allow this to be omitted
    pub(crate) password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entry(&"username", &self.username)
            .entry(&"password", &"******")
            .finish()
    }
}

impl Credentials {
    pub(crate) fn new<T: Into<String>, U: Into<String>>(username: T, password: Option<U>) -> Self {
        Self {
            username: username.into(),
            password: password.map(|t| t.into()),
        }
    }

    /// Derive the AES key from the password and the NONCE negotiated during
    /// login
    ///
    /// The key is the first 16 ASCII characters of the uppercase hex MD5 of
    /// `"{nonce}-{password}"`. The observed protocol really does use the hex
    /// characters themselves, not the decoded digest.
    pub(crate) fn make_aeskey<T: AsRef<str>>(&self, nonce: T) -> [u8; 16] {
        let key_phrase = format!(
            "{}-{}",
            nonce.as_ref(),
            self.password.clone().unwrap_or_default()
        );
        let key_phrase_hash = format!("{:X}", md5::compute(key_phrase));
        key_phrase_hash.as_bytes()[0..16].try_into().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_aeskey() {
        // MD5("ABC123-admin") = 577C8EA84B648439C5F7D39C2CBD4AB6; the key is
        // the ASCII of its first 16 hex characters
        let credentials = Credentials::new("admin", Some("admin"));
        assert_eq!(
            credentials.make_aeskey("ABC123"),
            [
                0x35, 0x37, 0x37, 0x43, 0x38, 0x45, 0x41, 0x38, //
                0x34, 0x42, 0x36, 0x34, 0x38, 0x34, 0x33, 0x39,
            ]
        );
        assert_eq!(&credentials.make_aeskey("ABC123"), b"577C8EA84B648439");
    }

    #[test]
    fn test_debug_redacts_password() {
        let credentials = Credentials::new("admin", Some("hunter2"));
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("admin"));
    }
}
