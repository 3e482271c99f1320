use sha1::{Digest, Sha1};

pub const NATIVE_PASSWORD_PLUGIN: &str = "mysql_native_password";

/// The single account accepted by the log fixture server.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    /// SHA1(SHA1(password)); `None` for an empty password.
    stage2: Option<[u8; 20]>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        let stage2 = if password.is_empty() {
            None
        } else {
            Some(stage2_from_password(password.as_bytes()))
        };
        Self {
            username: username.into(),
            stage2,
        }
    }

    pub fn verify(
        &self,
        auth_plugin: &str,
        username: &[u8],
        salt: &[u8],
        auth_data: &[u8],
    ) -> bool {
        if auth_plugin != NATIVE_PASSWORD_PLUGIN {
            return false;
        }
        if username != self.username.as_bytes() {
            return false;
        }
        match &self.stage2 {
            None => auth_data.is_empty(),
            Some(stage2) => verify_native_password_token(salt, stage2, auth_data),
        }
    }
}

pub fn stage2_from_password(password: &[u8]) -> [u8; 20] {
    let stage1 = Sha1::digest(password);
    let stage2 = Sha1::digest(stage1);
    stage2.into()
}

/// Checks a mysql_native_password scramble against the stored stage2 hash.
///
/// token = SHA1(password) XOR SHA1(salt + stage2)
pub fn verify_native_password_token(
    salt: &[u8],
    stored_stage2: &[u8; 20],
    auth_data: &[u8],
) -> bool {
    if auth_data.len() != 20 {
        return false;
    }

    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(stored_stage2);
    let salt_stage2_hash: [u8; 20] = hasher.finalize().into();

    let mut stage1 = [0u8; 20];
    for (i, b) in stage1.iter_mut().enumerate() {
        *b = auth_data[i] ^ salt_stage2_hash[i];
    }

    let stage2_check: [u8; 20] = Sha1::digest(stage1).into();
    stage2_check == *stored_stage2
}
