//! # External Collaborators
//!
//! Interfaces to the pieces this crate deliberately does not implement:
//! executable inspection and revision checks, server signature checks, and
//! CD key decoding. Applications plug real implementations in through
//! [`Collaborators`]; the defaults refuse politely so a handshake fails with
//! a clear error instead of sending garbage.
//!
//! Also holds the install-directory helpers that sit on top of those
//! interfaces: probing for the game executable and reading saved
//! credentials.

use crate::core::payloads::CdKey;
use crate::error::{ProtocolError, Result};
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reads version resources and computes revision-check hashes.
pub trait ExeInspector: Send + Sync {
    /// `(version, human readable info)` for one executable.
    fn exe_info(&self, path: &Path) -> io::Result<(u32, String)>;

    /// Hash the game files against the server's value string.
    fn check_revision(&self, value_string: &[u8], files: &[PathBuf], mpq_number: i32)
        -> io::Result<u32>;
}

pub trait SignatureVerifier: Send + Sync {
    /// Whether `signature` was issued for the server at `ip`.
    fn verify(&self, ip: IpAddr, signature: &[u8; 128]) -> bool;
}

pub trait KeyDecoder: Send + Sync {
    /// Ownership proof for `key` bound to both session tokens.
    fn key_proof(&self, key: &str, client_token: u32, server_token: u32) -> Result<CdKey>;

    /// Shape check run before any network I/O.
    ///
    /// Accepts 16 or 26 alphanumeric characters, ignoring dashes and spaces.
    fn validate(&self, key: &str) -> Result<()> {
        let mut len = 0;
        for c in key.chars().filter(|c| *c != '-' && *c != ' ') {
            if !c.is_ascii_alphanumeric() {
                return Err(ProtocolError::InvalidCdKey(format!(
                    "unexpected character '{c}'"
                )));
            }
            len += 1;
        }
        match len {
            16 | 26 => Ok(()),
            n => Err(ProtocolError::InvalidCdKey(format!(
                "expected 16 or 26 characters, got {n}"
            ))),
        }
    }
}

/// Stand-in used when no implementation is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl ExeInspector for Unavailable {
    fn exe_info(&self, path: &Path) -> io::Result<(u32, String)> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("no executable inspector for {}", path.display()),
        ))
    }

    fn check_revision(&self, _: &[u8], _: &[PathBuf], _: i32) -> io::Result<u32> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no revision checker configured",
        ))
    }
}

impl SignatureVerifier for Unavailable {
    fn verify(&self, _: IpAddr, _: &[u8; 128]) -> bool {
        false
    }
}

impl KeyDecoder for Unavailable {
    fn key_proof(&self, _: &str, _: u32, _: u32) -> Result<CdKey> {
        Err(ProtocolError::InvalidCdKey(
            "no CD key decoder configured".into(),
        ))
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub exe: Arc<dyn ExeInspector>,
    pub signature: Arc<dyn SignatureVerifier>,
    pub keys: Arc<dyn KeyDecoder>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            exe: Arc::new(Unavailable),
            signature: Arc::new(Unavailable),
            keys: Arc::new(Unavailable),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

pub const EXE_LEGACY: &str = "war3.exe";
pub const EXE_MODERN: &str = "Warcraft III.exe";
pub const STORM_DLL: &str = "Storm.dll";
pub const GAME_DLL: &str = "game.dll";

/// Executable name for a game version: versions from 28 ship the renamed binary.
pub fn exe_name(game_version: u32) -> &'static str {
    if game_version < 28 {
        EXE_LEGACY
    } else {
        EXE_MODERN
    }
}

/// Files hashed by the revision check. Versions before 29 include the DLLs.
/// Each file must exist.
pub fn revision_files(bin_path: &Path, game_version: u32) -> io::Result<Vec<PathBuf>> {
    let mut files = vec![bin_path.join(exe_name(game_version))];
    if game_version < 29 {
        files.push(bin_path.join(STORM_DLL));
        files.push(bin_path.join(GAME_DLL));
    }
    for file in &files {
        std::fs::metadata(file)?;
    }
    Ok(files)
}

/// Archive number from the server's MPQ file name, `-1` when there is none.
///
/// Understands `ver-IX86-N.mpq` and `IX86verN.mpq`.
pub fn extract_mpq_number(mpq_file_name: &str) -> i32 {
    let lower = mpq_file_name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".mpq").unwrap_or(&lower);

    let digits = if let Some(rest) = stem.strip_prefix("ver-") {
        rest.rsplit('-').next()
    } else {
        stem.find("ver").map(|i| &stem[i + 3..])
    };

    digits
        .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|d| d.parse().ok())
        .unwrap_or(-1)
}

/// One executable tried during version inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAttempt {
    pub path: PathBuf,
    pub outcome: std::result::Result<u32, String>,
}

/// Record of every executable tried while inferring the game version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExeProbe {
    pub attempts: Vec<ProbeAttempt>,
}

impl ExeProbe {
    /// Try each known executable in `bin_path` until one yields a version.
    pub fn run(inspector: &dyn ExeInspector, bin_path: &Path) -> Self {
        let mut probe = Self::default();
        for name in [EXE_LEGACY, EXE_MODERN] {
            let path = bin_path.join(name);
            let outcome = inspector
                .exe_info(&path)
                .map(|(version, _)| version)
                .map_err(|e| e.to_string());
            let found = outcome.is_ok();
            probe.attempts.push(ProbeAttempt { path, outcome });
            if found {
                break;
            }
        }
        probe
    }

    /// Full executable version of the first successful attempt.
    pub fn exe_version(&self) -> Option<u32> {
        self.attempts.iter().find_map(|a| a.outcome.as_ref().ok().copied())
    }

    /// Minor game version (`1.xx`) encoded in the executable version.
    pub fn game_version(&self) -> Option<u32> {
        self.exe_version().map(game_version_from_exe)
    }
}

pub fn game_version_from_exe(exe_version: u32) -> u32 {
    (exe_version >> 16) & 0xFF
}

/// Trimmed contents of a small text file in the install directory, if any.
pub fn read_install_file(bin_path: &Path, name: &str) -> Option<String> {
    std::fs::read_to_string(bin_path.join(name))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_mpq_number() {
        assert_eq!(extract_mpq_number("ver-IX86-7.mpq"), 7);
        assert_eq!(extract_mpq_number("IX86ver3.mpq"), 3);
        assert_eq!(extract_mpq_number("lockdown-IX86-07.mpq"), -1);
        assert_eq!(extract_mpq_number("ver-IX86-.mpq"), -1);
        assert_eq!(extract_mpq_number(""), -1);
    }

    #[test]
    fn test_exe_name_by_version() {
        assert_eq!(exe_name(26), "war3.exe");
        assert_eq!(exe_name(28), "Warcraft III.exe");
    }

    #[test]
    fn test_missing_revision_file() {
        let err = revision_files(Path::new("/nonexistent-install"), 26).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_key_shape() {
        let d = Unavailable;
        assert!(d.validate("ABCD-EFGH-JKLM-NPQR").is_ok());
        assert!(d.validate("ABCDEFGHJKLMNPQRTVWXYZ2346").is_ok());
        assert!(d.validate("SHORT").is_err());
        assert!(d.validate("ABCD-EFGH-JKLM-NPQ!").is_err());
    }

    struct Scripted {
        versions: Mutex<Vec<io::Result<(u32, String)>>>,
    }

    impl ExeInspector for Scripted {
        fn exe_info(&self, _: &Path) -> io::Result<(u32, String)> {
            self.versions.lock().unwrap().remove(0)
        }

        fn check_revision(&self, _: &[u8], _: &[PathBuf], _: i32) -> io::Result<u32> {
            Ok(0)
        }
    }

    #[test]
    fn test_probe_records_each_attempt() {
        let inspector = Scripted {
            versions: Mutex::new(vec![
                Err(io::Error::from(io::ErrorKind::NotFound)),
                Ok((0x011D_0000, "Warcraft III.exe 01/01/20 00:00:00 1".into())),
            ]),
        };
        let probe = ExeProbe::run(&inspector, Path::new("/games/w3"));
        assert_eq!(probe.attempts.len(), 2);
        assert!(probe.attempts[0].outcome.is_err());
        assert_eq!(probe.attempts[1].path, Path::new("/games/w3/Warcraft III.exe"));
        assert_eq!(probe.game_version(), Some(29));
    }

    #[test]
    fn test_probe_stops_at_first_hit() {
        let inspector = Scripted {
            versions: Mutex::new(vec![Ok((0x011A_0000, String::new()))]),
        };
        let probe = ExeProbe::run(&inspector, Path::new("/games/w3"));
        assert_eq!(probe.attempts.len(), 1);
        assert_eq!(probe.game_version(), Some(26));
    }
}
