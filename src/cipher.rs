//! Bulk cipher boundary
//!
//! chunkvault does not implement its own cipher. Bulk encryption and
//! decryption are delegated to an external primitive behind the
//! [`Cipher`] trait, so the archive engine stays testable without a real
//! cipher binary; tests inject an in-memory reversible transform.
//!
//! The production implementation, [`CommandCipher`], pipes data through
//! an external program (OpenSSL by default) via stdin/stdout. The
//! contract with that collaborator is strict: a non-zero exit status,
//! anything on stderr, or empty output for non-empty input is treated as
//! a fatal error. Silent corruption is the one failure mode this boundary
//! cannot tolerate.

use crate::error::{Result, VaultError};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::trace;

/// Environment variable used to hand the secret to the cipher subprocess
///
/// Passing the secret via the environment keeps it out of the process
/// argument list, which is world-readable on most platforms.
pub const CIPHER_SECRET_ENV: &str = "CHUNKVAULT_SECRET";

/// Symmetric bulk encryption strategy
///
/// Implementations must be deterministic in the round-trip sense:
/// `decrypt(encrypt(data, s), s) == data`. Ciphertext itself need not be
/// deterministic; deduplication decides on plaintext hashes before
/// encryption ever runs.
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext` under `secret`
    fn encrypt(&self, plaintext: &[u8], secret: &str) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext` under `secret`
    fn decrypt(&self, ciphertext: &[u8], secret: &str) -> Result<Vec<u8>>;
}

/// Cipher implementation that shells out to an external program
///
/// The default program is `openssl`, invoked as
/// `openssl enc -aes-256-cbc -pbkdf2` with the secret supplied through
/// the [`CIPHER_SECRET_ENV`] environment variable.
#[derive(Debug, Clone)]
pub struct CommandCipher {
    program: String,
}

impl CommandCipher {
    /// Create a cipher invoking `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Name of the external program this cipher invokes
    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[&str], input: &[u8], secret: &str) -> Result<Vec<u8>> {
        trace!("invoking cipher: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(args)
            .env(CIPHER_SECRET_ENV, secret)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                VaultError::cipher(format!("failed to start {}: {}", self.program, e))
            })?;

        // Feed stdin from a separate thread while draining stdout, so a
        // chunk larger than the pipe buffer cannot deadlock the exchange.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VaultError::cipher("cipher stdin unavailable"))?;
        let payload = input.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&payload));

        let output = child
            .wait_with_output()
            .map_err(|e| VaultError::cipher(format!("cipher did not finish: {}", e)))?;

        let write_result = writer
            .join()
            .map_err(|_| VaultError::cipher("cipher stdin writer panicked"))?;

        if !output.status.success() {
            return Err(VaultError::cipher(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        if !output.stderr.is_empty() {
            return Err(VaultError::cipher(format!(
                "{} wrote to stderr: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // A broken pipe here would have shown up as a failed exit status
        // above; any other write failure is reported on its own.
        write_result
            .map_err(|e| VaultError::cipher(format!("failed writing to cipher: {}", e)))?;

        if output.stdout.is_empty() && !input.is_empty() {
            return Err(VaultError::cipher(format!(
                "{} produced no output",
                self.program
            )));
        }

        Ok(output.stdout)
    }
}

impl Default for CommandCipher {
    fn default() -> Self {
        Self::new("openssl")
    }
}

/// OpenSSL `-pass` argument referencing [`CIPHER_SECRET_ENV`]
const PASS_ARG: &str = "env:CHUNKVAULT_SECRET";

impl Cipher for CommandCipher {
    fn encrypt(&self, plaintext: &[u8], secret: &str) -> Result<Vec<u8>> {
        self.run(
            &["enc", "-aes-256-cbc", "-pbkdf2", "-pass", PASS_ARG],
            plaintext,
            secret,
        )
    }

    fn decrypt(&self, ciphertext: &[u8], secret: &str) -> Result<Vec<u8>> {
        self.run(
            &["enc", "-aes-256-cbc", "-d", "-pbkdf2", "-pass", PASS_ARG],
            ciphertext,
            secret,
        )
    }
}

/// Render the shell command decrypting one stored blob
///
/// Used by the restore script generator: the emitted command reads the
/// data key from the sidecar `key_file` rather than taking the secret
/// inline.
pub fn decrypt_command(
    program: &str,
    input: &std::path::Path,
    output: &std::path::Path,
    key_file: &std::path::Path,
) -> String {
    format!(
        "{} enc -aes-256-cbc -d -pbkdf2 -pass 'file:{}' -in '{}' -out '{}'",
        program,
        key_file.display(),
        input.display(),
        output.display()
    )
}
