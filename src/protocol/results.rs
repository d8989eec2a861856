//! Server result codes and their mapping to [`Rejection`].
//!
//! Every handshake response carries a numeric result. Zero means success;
//! everything else maps one-to-one to a [`Rejection`] variant, with codes
//! this crate does not recognise kept verbatim.

use thiserror::Error;

/// Handshake step a result code belongs to, for unrecognised codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AuthCheck,
    AccountLogon,
    LogonProof,
    AccountCreate,
    ChangePassProof,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("game version is too old")]
    OldGameVersion,
    #[error("game version is invalid")]
    InvalidGameVersion,
    #[error("game version must be downgraded")]
    GameVersionDowngrade,
    #[error("{} CD key is invalid", key_name(.expansion))]
    InvalidCdKey { expansion: bool },
    #[error("{} CD key is in use by '{owner}'", key_name(.expansion))]
    CdKeyInUse { expansion: bool, owner: String },
    #[error("{} CD key is banned", key_name(.expansion))]
    CdKeyBanned { expansion: bool },
    #[error("{} CD key is for another product", key_name(.expansion))]
    WrongProduct { expansion: bool },
    #[error("account does not exist")]
    AccountDoesNotExist,
    #[error("account must be upgraded")]
    AccountUpgradeRequired,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("account closed: {0}")]
    AccountClosed(String),
    #[error("server error: {0}")]
    ServerMessage(String),
    #[error("account name already exists")]
    AccountExists,
    #[error("account name is too short")]
    NameTooShort,
    #[error("account name contains illegal characters")]
    NameIllegalCharacters,
    #[error("account name contains a banned word")]
    NameBannedWord,
    #[error("account name has too few alphanumeric characters")]
    NameTooFewAlphanumeric,
    #[error("account name has adjacent punctuation")]
    NameAdjacentPunctuation,
    #[error("account name has too much punctuation")]
    NameTooManyPunctuation,
    #[error("{step:?} failed with result 0x{code:X}")]
    Unrecognized { step: Step, code: u32 },
}

fn key_name(expansion: &bool) -> &'static str {
    if *expansion {
        "expansion"
    } else {
        "base"
    }
}

pub const AUTH_SUCCESS: u32 = 0x000;
pub const LOGON_SUCCESS: u32 = 0x00;
pub const LOGON_PROOF_SUCCESS: u32 = 0x00;
pub const LOGON_PROOF_REQUIRE_EMAIL: u32 = 0x0E;
pub const ACCOUNT_CREATE_SUCCESS: u32 = 0x00;

// Bit set on CD key results that refer to the expansion key.
const EXPANSION_KEY_BIT: u32 = 0x010;

/// Version and CD key check (0x51).
pub fn auth_check(result: u32, additional_info: &str) -> Result<(), Rejection> {
    let expansion = result & EXPANSION_KEY_BIT != 0;
    match result {
        AUTH_SUCCESS => Ok(()),
        0x100 => Err(Rejection::OldGameVersion),
        0x101 => Err(Rejection::InvalidGameVersion),
        0x102 => Err(Rejection::GameVersionDowngrade),
        0x200 | 0x210 => Err(Rejection::InvalidCdKey { expansion }),
        0x201 | 0x211 => Err(Rejection::CdKeyInUse {
            expansion,
            owner: additional_info.to_string(),
        }),
        0x202 | 0x212 => Err(Rejection::CdKeyBanned { expansion }),
        0x203 | 0x213 => Err(Rejection::WrongProduct { expansion }),
        code => Err(Rejection::Unrecognized {
            step: Step::AuthCheck,
            code,
        }),
    }
}

/// Logon and change-password challenge (0x53, 0x55).
pub fn account_logon(result: u32) -> Result<(), Rejection> {
    match result {
        LOGON_SUCCESS => Ok(()),
        0x01 => Err(Rejection::AccountDoesNotExist),
        0x05 => Err(Rejection::AccountUpgradeRequired),
        code => Err(Rejection::Unrecognized {
            step: Step::AccountLogon,
            code,
        }),
    }
}

/// Outcome of an accepted logon proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofAccepted {
    Ok,
    /// Server wants an e-mail address registered before chat.
    EmailRequired,
}

/// Logon proof (0x54).
pub fn logon_proof(result: u32, additional_info: &str) -> Result<ProofAccepted, Rejection> {
    match result {
        LOGON_PROOF_SUCCESS => Ok(ProofAccepted::Ok),
        LOGON_PROOF_REQUIRE_EMAIL => Ok(ProofAccepted::EmailRequired),
        0x02 => Err(Rejection::IncorrectPassword),
        0x06 => Err(Rejection::AccountClosed(additional_info.to_string())),
        0x0F => Err(Rejection::ServerMessage(additional_info.to_string())),
        code => Err(Rejection::Unrecognized {
            step: Step::LogonProof,
            code,
        }),
    }
}

/// Change-password proof (0x56). There is no e-mail detour here.
pub fn change_pass_proof(result: u32) -> Result<(), Rejection> {
    match result {
        LOGON_PROOF_SUCCESS => Ok(()),
        0x02 => Err(Rejection::IncorrectPassword),
        0x06 => Err(Rejection::AccountClosed(String::new())),
        code => Err(Rejection::Unrecognized {
            step: Step::ChangePassProof,
            code,
        }),
    }
}

/// Account creation (0x52).
pub fn account_create(result: u32) -> Result<(), Rejection> {
    match result {
        ACCOUNT_CREATE_SUCCESS => Ok(()),
        0x04 => Err(Rejection::AccountExists),
        0x07 => Err(Rejection::NameTooShort),
        0x08 => Err(Rejection::NameIllegalCharacters),
        0x09 => Err(Rejection::NameBannedWord),
        0x0A => Err(Rejection::NameTooFewAlphanumeric),
        0x0B => Err(Rejection::NameAdjacentPunctuation),
        0x0C => Err(Rejection::NameTooManyPunctuation),
        code => Err(Rejection::Unrecognized {
            step: Step::AccountCreate,
            code,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_check_key_slots() {
        assert_eq!(auth_check(0, ""), Ok(()));
        assert_eq!(
            auth_check(0x201, "someone"),
            Err(Rejection::CdKeyInUse {
                expansion: false,
                owner: "someone".into()
            })
        );
        assert_eq!(
            auth_check(0x212, ""),
            Err(Rejection::CdKeyBanned { expansion: true })
        );
        assert_eq!(
            auth_check(0x101, ""),
            Err(Rejection::InvalidGameVersion)
        );
        assert_eq!(
            auth_check(0x999, ""),
            Err(Rejection::Unrecognized {
                step: Step::AuthCheck,
                code: 0x999
            })
        );
    }

    #[test]
    fn test_logon_proof_email_is_accepted() {
        assert_eq!(logon_proof(0x0E, ""), Ok(ProofAccepted::EmailRequired));
        assert_eq!(
            logon_proof(0x0F, "go away"),
            Err(Rejection::ServerMessage("go away".into()))
        );
    }

    #[test]
    fn test_messages_name_the_key() {
        let msg = Rejection::InvalidCdKey { expansion: true }.to_string();
        assert_eq!(msg, "expansion CD key is invalid");
    }

    #[test]
    fn test_account_create_codes() {
        assert_eq!(account_create(0x04), Err(Rejection::AccountExists));
        assert_eq!(account_create(0x0C), Err(Rejection::NameTooManyPunctuation));
        assert!(account_logon(0x01).is_err());
    }
}
