// file: src/shadow.rs
// version: 1.0.0
// guid: 6e2a9c4f-8d13-4b7a-a0e5-1f3c7b9d2e86

//! Root account password in a shadow(5) file

use crate::{RegistrarError, Result};
use rand::Rng;
use sha_crypt::{sha512_crypt_b64, Sha512Params, ROUNDS_DEFAULT};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const SALT_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789./";
const SALT_LENGTH: usize = 16;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// The password hash field of `account`
pub fn read_password_hash(path: &Path, account: &str) -> Result<String> {
    let content = fs::read_to_string(path)?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(':');
        if fields.next() == Some(account) {
            return Ok(fields.next().unwrap_or_default().to_string());
        }
    }
    Err(RegistrarError::not_found(format!(
        "account {} in {}",
        account,
        path.display()
    )))
}

/// Replace the password of `account` with a SHA-512 crypt hash of `password`.
///
/// The new file is written next to the old one and renamed over it, so the
/// directory must be writable. Other accounts are carried over unchanged.
pub fn set_password(path: &Path, account: &str, password: &str) -> Result<()> {
    if password.trim().is_empty() {
        return Err(RegistrarError::validation("password must not be blank"));
    }

    let hash = hash_password(password, &generate_salt())?;
    let days = (chrono::Utc::now().timestamp() as f64 / SECONDS_PER_DAY).round();

    let content = fs::read_to_string(path)?;
    let mut updated = String::with_capacity(content.len() + hash.len());
    let mut found = false;
    for line in content.lines() {
        let mut fields: Vec<String> = line.trim().split(':').map(str::to_string).collect();
        if fields[0] == account {
            if fields.len() < 3 {
                return Err(RegistrarError::parse(format!(
                    "malformed shadow entry for {}",
                    account
                )));
            }
            fields[1] = hash.clone();
            fields[2] = format!("{:.0}", days);
            found = true;
        }
        updated.push_str(&fields.join(":"));
        updated.push('\n');
    }
    if !found {
        return Err(RegistrarError::not_found(format!(
            "account {} in {}",
            account,
            path.display()
        )));
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new().prefix("shadow").tempfile_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o640))?;
    }
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        writer.write_all(updated.as_bytes())?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| RegistrarError::Io(e.error))?;

    info!("Password of {} updated in {}", account, path.display());
    Ok(())
}

fn generate_salt() -> String {
    let mut rng = rand::thread_rng();
    (0..SALT_LENGTH)
        .map(|_| SALT_CHARS[rng.gen_range(0..SALT_CHARS.len())] as char)
        .collect()
}

/// `$6$<salt>$<hash>` with the default round count
fn hash_password(password: &str, salt: &str) -> Result<String> {
    let params = Sha512Params::new(ROUNDS_DEFAULT)
        .map_err(|e| RegistrarError::validation(format!("bad hash parameters: {:?}", e)))?;
    let hash = sha512_crypt_b64(password.as_bytes(), salt.as_bytes(), &params)
        .map_err(|e| RegistrarError::validation(format!("cannot hash password: {:?}", e)))?;
    Ok(format!("$6${}${}", salt, hash))
}
