//! SOPS-backed value vault
//!
//! Single values are encrypted by piping them through `sops` as a binary
//! document. The resulting JSON envelope is hex-encoded so it fits on one
//! line of a configuration file.

use std::sync::Arc;

use tracing::debug;

use crate::config::VaultConfig;
use crate::domain::SecurityFault;
use crate::infrastructure::traits::{CommandRunner, Vault};
use crate::infrastructure::InfraError;

pub struct SopsVault {
    config: VaultConfig,
    cmd: Arc<dyn CommandRunner>,
}

impl SopsVault {
    pub fn new(config: VaultConfig, cmd: Arc<dyn CommandRunner>) -> Self {
        Self { config, cmd }
    }

    fn cipher(&self, reason: impl ToString) -> SecurityFault {
        SecurityFault::Cipher {
            vault: self.config.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Runs the vault command, mapping launch failures and non-zero exits.
    fn sops(&self, args: &[&str], stdin: &str) -> Result<String, SecurityFault> {
        let output = self
            .cmd
            .run_with_stdin(&self.config.command, args, stdin)
            .map_err(|e| SecurityFault::VaultUnavailable {
                vault: self.config.name.clone(),
                reason: format!("run {}: {}", self.config.command, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let failure = InfraError::Vault {
                message: stderr.trim().to_string(),
                exit_code: output.status.code(),
            };
            return Err(self.cipher(failure));
        }
        String::from_utf8(output.stdout).map_err(|e| self.cipher(e))
    }
}

impl Vault for SopsVault {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, SecurityFault> {
        let (key_flag, key_value) = match (&self.config.age_key, &self.config.gpg_key) {
            (Some(age), _) => ("--age", age.as_str()),
            (None, Some(gpg)) => ("--pgp", gpg.as_str()),
            (None, None) => {
                return Err(SecurityFault::VaultUnavailable {
                    vault: self.config.name.clone(),
                    reason: "no encryption key configured (gpg_key or age_key)".to_string(),
                })
            }
        };
        let args = [
            "-e",
            key_flag,
            key_value,
            "--input-type",
            "binary",
            "--output-type",
            "json",
            "/dev/stdin",
        ];
        let envelope = self.sops(&args, plaintext)?;
        debug!("encrypt: {} byte envelope", envelope.len());
        Ok(hex::encode(envelope.trim()))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, SecurityFault> {
        let bytes = hex::decode(ciphertext.trim()).map_err(|e| self.cipher(e))?;
        let envelope = String::from_utf8(bytes).map_err(|e| self.cipher(e))?;
        let args = [
            "-d",
            "--input-type",
            "json",
            "--output-type",
            "binary",
            "/dev/stdin",
        ];
        self.sops(&args, &envelope)
    }

    fn passcode(&self) -> Result<String, SecurityFault> {
        std::env::var(&self.config.passcode_env).map_err(|_| SecurityFault::VaultUnavailable {
            vault: self.config.name.clone(),
            reason: format!("passcode variable {} is not set", self.config.passcode_env),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use std::sync::Mutex;

    /// Records invocations and answers with a canned output.
    struct CannedRunner {
        status: i32,
        stdout: &'static str,
        calls: Mutex<Vec<(String, Vec<String>, String)>>,
    }

    impl CannedRunner {
        fn new(status: i32, stdout: &'static str) -> Self {
            Self {
                status,
                stdout,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for CannedRunner {
        fn run_with_stdin(&self, cmd: &str, args: &[&str], stdin: &str) -> io::Result<Output> {
            self.calls.lock().unwrap().push((
                cmd.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
                stdin.to_string(),
            ));
            Ok(Output {
                status: ExitStatus::from_raw(self.status << 8),
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: b"boom".to_vec(),
            })
        }
    }

    fn config() -> VaultConfig {
        VaultConfig {
            age_key: Some("age1xyz".to_string()),
            ..VaultConfig::default()
        }
    }

    #[test]
    fn test_encrypt_hex_encodes_envelope() {
        let runner = Arc::new(CannedRunner::new(0, "{\"data\":\"x\"}\n"));
        let vault = SopsVault::new(config(), runner.clone());
        let ciphertext = vault.encrypt("secret").unwrap();
        assert_eq!(hex::decode(&ciphertext).unwrap(), b"{\"data\":\"x\"}");

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, "sops");
        assert!(calls[0].1.contains(&"--age".to_string()));
        assert_eq!(calls[0].2, "secret");
    }

    #[test]
    fn test_decrypt_feeds_envelope_to_sops() {
        let runner = Arc::new(CannedRunner::new(0, "secret"));
        let vault = SopsVault::new(config(), runner.clone());
        let plaintext = vault.decrypt(&hex::encode("{\"data\":\"x\"}")).unwrap();
        assert_eq!(plaintext, "secret");
        assert_eq!(runner.calls.lock().unwrap()[0].2, "{\"data\":\"x\"}");
    }

    #[test]
    fn test_failed_command_is_cipher_fault() {
        let vault = SopsVault::new(config(), Arc::new(CannedRunner::new(1, "")));
        let err = vault.decrypt(&hex::encode("{}")).unwrap_err();
        assert!(matches!(err, SecurityFault::Cipher { .. }));
    }

    #[test]
    fn test_encrypt_without_key_is_unavailable() {
        let vault = SopsVault::new(
            VaultConfig::default(),
            Arc::new(CannedRunner::new(0, "")),
        );
        assert!(matches!(
            vault.encrypt("x"),
            Err(SecurityFault::VaultUnavailable { .. })
        ));
    }
}
