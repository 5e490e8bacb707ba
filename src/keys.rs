//! Key generation for a new bot identity.

use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::config::{NetworkEnv, ENCRYPTION_KEY_VAR, ENV_VAR, WALLET_KEY_VAR};
use crate::error::{Error, Result};

/// Freshly generated credentials, hex encoded.
#[derive(Debug, Clone)]
pub struct GeneratedKeys {
    pub wallet_key: String,
    pub encryption_key: String,
    pub env: NetworkEnv,
}

impl GeneratedKeys {
    pub fn generate(env: NetworkEnv) -> Self {
        Self {
            wallet_key: format!("0x{}", random_hex()),
            encryption_key: random_hex(),
            env,
        }
    }

    /// `KEY=value` lines.
    pub fn to_env_lines(&self) -> String {
        format!(
            "{}={}\n{}={}\n{}={}\n",
            WALLET_KEY_VAR,
            self.wallet_key,
            ENCRYPTION_KEY_VAR,
            self.encryption_key,
            ENV_VAR,
            self.env
        )
    }

    /// Append to an env file. Refuses if the file already defines any of the keys.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        let existing = if path.exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };

        for var in [WALLET_KEY_VAR, ENCRYPTION_KEY_VAR, ENV_VAR] {
            let prefix = format!("{}=", var);
            if existing.lines().any(|l| l.trim_start().starts_with(&prefix)) {
                return Err(Error::Config(format!(
                    "{} already defines {}; remove it first",
                    path.display(),
                    var
                )));
            }
        }

        let mut content = existing;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&self.to_env_lines());
        std::fs::write(path, content)?;

        tracing::info!("Wrote keys to {}", path.display());
        Ok(())
    }
}

fn random_hex() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
