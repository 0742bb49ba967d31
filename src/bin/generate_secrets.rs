//! Secret generation utility for Clinivault deployments.
//!
//! Writes the two startup secrets, each to its own file with 0600
//! permissions:
//! - `clinivault_cipher_key`: base64 of 32 random bytes (AES-256-GCM key)
//! - `clinivault_signing_secret`: base64 of 48 random bytes (HS256 secret)
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin generate_secrets -- --out-dir <dir> [--force]
//! ```
//!
//! Only fingerprints are printed, never secret material.

use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use clinivault::domain::{CipherKey, SigningSecret, CIPHER_KEY_LEN};

const USAGE: &str = "Usage: generate_secrets --out-dir <dir> [--force]";
const SIGNING_SECRET_BYTES: usize = 48;

fn random_b64(len: usize) -> Zeroizing<String> {
    let mut bytes = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(&mut bytes);
    Zeroizing::new(general_purpose::STANDARD.encode(bytes.as_slice()))
}

fn write_secret(path: &Path, value: &str, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!("Refusing to overwrite existing file {}. Use --force.", path.display()));
    }

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }

    let mut file = opts
        .open(path)
        .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
    file.write_all(value.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

fn run(out_dir: &Path, force: bool) -> Result<(), String> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| format!("Failed to create {}: {e}", out_dir.display()))?;

    let cipher_key = random_b64(CIPHER_KEY_LEN);
    let signing_secret = random_b64(SIGNING_SECRET_BYTES);

    // Round-trip both through the loaders so the files are known-good.
    let key = CipherKey::from_base64(&cipher_key).map_err(|e| e.to_string())?;
    let secret = SigningSecret::new(signing_secret.as_bytes().to_vec()).map_err(|e| e.to_string())?;

    let key_path = out_dir.join("clinivault_cipher_key");
    let secret_path = out_dir.join("clinivault_signing_secret");
    write_secret(&key_path, &cipher_key, force)?;
    write_secret(&secret_path, &signing_secret, force)?;

    println!("Wrote cipher key to {} (fingerprint {})", key_path.display(), key.fingerprint);
    println!(
        "Wrote signing secret to {} (fingerprint {})",
        secret_path.display(),
        secret.fingerprint
    );
    Ok(())
}

fn main() {
    let mut args = std::env::args().skip(1);
    let mut out_dir: Option<PathBuf> = None;
    let mut force = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out-dir" => {
                let p = args.next().unwrap_or_default();
                if p.is_empty() {
                    eprintln!("{USAGE}");
                    std::process::exit(2);
                }
                out_dir = Some(PathBuf::from(p));
            }
            "--force" => force = true,
            "-h" | "--help" => {
                println!(
                    "{USAGE}\n\nWrites clinivault_cipher_key and clinivault_signing_secret into \
                     <dir> with 0600 permissions. Point CLINIVAULT_CIPHER_KEY_FILE and \
                     CLINIVAULT_SIGNING_SECRET_FILE at them, or mount them under /run/secrets."
                );
                return;
            }
            _ => {
                eprintln!("Unknown arg: {arg}\n{USAGE}");
                std::process::exit(2);
            }
        }
    }

    let Some(out_dir) = out_dir else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    if let Err(message) = run(&out_dir, force) {
        eprintln!("{message}");
        std::process::exit(3);
    }
}
