//! 보안 레이어 -- 서명 검증 및 복호화로 패킷 수용 여부를 결정합니다.
//!
//! 패킷의 첫 TLV 헤더로 보안 레벨을 판별합니다.
//!
//! | 파트 타입 | 레벨 | 페이로드 레이아웃 |
//! |-----------|------|-------------------|
//! | `0x0200`  | sign | HMAC-SHA256 태그(32) + 사용자명, 이후 나머지 패킷 |
//! | `0x0210`  | encrypt | 사용자명 길이(u16) + 사용자명 + IV(16) + AES-256-OFB 암호문 |
//! | 그 외     | none | 평문 |
//!
//! 암호문을 복호화하면 SHA-1 태그(20) + 평문 페이로드가 나옵니다.
//! 레이어는 부수 효과가 없으며 `(bytes, 인증 DB)`의 순수 함수입니다.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use aes::Aes256;
use ofb::Ofb;
use ofb::cipher::{KeyIvInit, StreamCipher};
use ring::{digest, hmac};
use tracing::{info, warn};

use telemon_core::config::SecurityLevel;

use crate::error::CollectdError;

/// 서명 봉투 파트 타입
pub const TYPE_SIGN_SHA256: u16 = 0x0200;
/// 암호화 봉투 파트 타입
pub const TYPE_ENCR_AES256: u16 = 0x0210;

/// HMAC-SHA256 태그 길이
const SIGNATURE_LEN: usize = 32;
/// AES IV 길이
const IV_LEN: usize = 16;
/// SHA-1 체크섬 길이
const CHECKSUM_LEN: usize = 20;
/// 암호화 파트 최소 길이 (이하면 잘린 것으로 판단)
const MIN_ENCRYPTED_LEN: usize = 38;

type Aes256Ofb = Ofb<Aes256>;

/// 사용자명 → 공유 비밀 매핑
#[derive(Debug, Clone, Default)]
pub struct AuthDb {
    users: HashMap<String, String>,
}

impl AuthDb {
    /// 빈 인증 DB를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// `user:password` 형식의 인증 파일을 로드합니다.
    pub fn load(path: &Path) -> Result<Self, CollectdError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CollectdError::config(
                "auth_file",
                format!("Unable to load collectd's auth file {}: {e}", path.display()),
            )
        })?;

        let db = Self::parse(&content);
        if db.is_empty() {
            warn!(path = %path.display(), "auth file has no entries");
        } else {
            info!(path = %path.display(), users = db.len(), "loaded collectd auth file");
        }
        Ok(db)
    }

    /// 인증 파일 내용을 해석합니다.
    ///
    /// 첫 `:`에서 나누며, 사용자명이나 비밀번호가 비어 있는 줄은 경고 후 건너뜁니다.
    /// 중복 사용자는 경고하고 마지막 항목을 사용합니다.
    pub fn parse(content: &str) -> Self {
        let mut db = Self::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((user, password)) = line.split_once(':') else {
                warn!(line = lineno + 1, "invalid auth line, expected user:password");
                continue;
            };
            let (user, password) = (user.trim(), password.trim());
            if user.is_empty() || password.is_empty() {
                warn!(line = lineno + 1, "invalid auth line, empty user or password");
                continue;
            }

            if db.insert(user, password).is_some() {
                warn!(line = lineno + 1, user, "found multiple entries for user");
            }
        }
        db
    }

    /// 사용자를 추가합니다. 이전 비밀번호가 있었다면 반환합니다.
    pub fn insert(&mut self, user: impl Into<String>, password: impl Into<String>) -> Option<String> {
        self.users.insert(user.into(), password.into())
    }

    /// 사용자의 비밀번호를 반환합니다.
    pub fn password(&self, user: &str) -> Option<&str> {
        self.users.get(user).map(String::as_str)
    }

    /// 등록된 사용자 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// 등록된 사용자가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// 패킷 보안 레이어
#[derive(Debug, Clone)]
pub struct SecurityLayer {
    min_level: SecurityLevel,
    auth: AuthDb,
}

impl SecurityLayer {
    /// 최소 보안 레벨과 인증 DB로 레이어를 생성합니다.
    pub fn new(min_level: SecurityLevel, auth: AuthDb) -> Self {
        Self { min_level, auth }
    }

    /// 설정에서 레이어를 생성합니다.
    ///
    /// 최소 레벨이 sign 이상이면 인증 파일이 반드시 필요합니다.
    pub fn from_config(
        min_level: SecurityLevel,
        auth_file: Option<&Path>,
    ) -> Result<Self, CollectdError> {
        let auth = match auth_file {
            Some(path) => AuthDb::load(path)?,
            None if min_level > SecurityLevel::None => {
                return Err(CollectdError::config(
                    "auth_file",
                    "Collectd security level configured but no auth file specified",
                ));
            }
            None => AuthDb::new(),
        };
        Ok(Self::new(min_level, auth))
    }

    /// 설정된 최소 보안 레벨을 반환합니다.
    pub fn min_level(&self) -> SecurityLevel {
        self.min_level
    }

    /// 패킷을 검사하고 파서에 넘길 페이로드를 반환합니다.
    ///
    /// 평문 패킷은 빌린 슬라이스를, 복호화한 패킷은 새 버퍼를 반환합니다.
    pub fn open<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>, CollectdError> {
        if data.len() < 4 {
            return Err(CollectdError::protocol("Truncated header."));
        }
        let part_type = u16::from_be_bytes([data[0], data[1]]);
        let part_len = usize::from(u16::from_be_bytes([data[2], data[3]]));

        let level = match part_type {
            TYPE_SIGN_SHA256 => SecurityLevel::Sign,
            TYPE_ENCR_AES256 => SecurityLevel::Encrypt,
            _ => SecurityLevel::None,
        };
        if level < self.min_level {
            return Err(CollectdError::protocol(
                "Packet has lower security level than allowed",
            ));
        }

        match level {
            SecurityLevel::None => Ok(Cow::Borrowed(data)),
            SecurityLevel::Sign if self.min_level == SecurityLevel::None => {
                // 검증 없이 서명 파트만 건너뜀
                Ok(Cow::Borrowed(data.get(part_len..).unwrap_or_default()))
            }
            SecurityLevel::Sign | SecurityLevel::Encrypt => {
                let body_len = part_len
                    .checked_sub(4)
                    .ok_or_else(|| CollectdError::protocol("Invalid part length."))?;
                let rest = &data[4..];
                if rest.len() < body_len {
                    return Err(CollectdError::protocol("Truncated part payload."));
                }
                if level == SecurityLevel::Sign {
                    self.open_signed(body_len, rest).map(Cow::Borrowed)
                } else {
                    self.open_encrypted(body_len, rest).map(Cow::Owned)
                }
            }
        }
    }

    fn open_signed<'a>(&self, body_len: usize, data: &'a [u8]) -> Result<&'a [u8], CollectdError> {
        if body_len <= SIGNATURE_LEN {
            return Err(CollectdError::protocol("Truncated signed part."));
        }
        let (tag, signed) = data.split_at(SIGNATURE_LEN);
        let user_len = body_len - SIGNATURE_LEN;
        let user = std::str::from_utf8(&signed[..user_len])
            .map_err(|_| CollectdError::protocol("Invalid user name in signed part."))?;

        let password = self.auth.password(user).ok_or_else(|| {
            CollectdError::protocol(format!("Signed packet, unknown user '{user}'"))
        })?;

        let key = hmac::Key::new(hmac::HMAC_SHA256, password.as_bytes());
        hmac::verify(&key, signed, tag)
            .map_err(|_| CollectdError::protocol(format!("Bad signature from user '{user}'")))?;

        Ok(&signed[user_len..])
    }

    fn open_encrypted(&self, body_len: usize, data: &[u8]) -> Result<Vec<u8>, CollectdError> {
        if body_len != data.len() {
            return Err(CollectdError::protocol(
                "Encrypted packet size disagrees with header.",
            ));
        }
        if data.len() <= MIN_ENCRYPTED_LEN {
            return Err(CollectdError::protocol("Truncated encrypted part."));
        }
        let user_len = usize::from(u16::from_be_bytes([data[0], data[1]]));
        let data = &data[2..];
        if data.len() <= user_len + IV_LEN + CHECKSUM_LEN {
            return Err(CollectdError::protocol("Truncated encrypted part."));
        }

        let (user, data) = data.split_at(user_len);
        let user = std::str::from_utf8(user)
            .map_err(|_| CollectdError::protocol("Invalid user name in encrypted part."))?;
        let password = self.auth.password(user).ok_or_else(|| {
            CollectdError::protocol(format!("Couldn't decrypt, unknown user '{user}'"))
        })?;

        let (iv, ciphertext) = data.split_at(IV_LEN);
        let mut plain = ciphertext.to_vec();
        apply_keystream(password, iv, &mut plain)?;

        let (tag, payload) = plain.split_at(CHECKSUM_LEN);
        let expected = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, payload);
        if !hashes_match(tag, expected.as_ref()) {
            return Err(CollectdError::protocol(format!(
                "Bad checksum on encrypted packet for '{user}'"
            )));
        }

        Ok(payload.to_vec())
    }
}

/// AES-256-OFB 키스트림을 버퍼에 적용합니다. 키는 SHA-256(password)입니다.
///
/// OFB는 스트림 모드라서 블록 경계까지 채우지 않고 정확한 길이로 처리합니다.
fn apply_keystream(password: &str, iv: &[u8], buf: &mut [u8]) -> Result<(), CollectdError> {
    let key = digest::digest(&digest::SHA256, password.as_bytes());
    let mut cipher = Aes256Ofb::new_from_slices(key.as_ref(), iv)
        .map_err(|_| CollectdError::protocol("Invalid key or IV length."))?;
    cipher.apply_keystream(buf);
    Ok(())
}

/// 상수 시간 바이트 비교
fn hashes_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// 페이로드 앞에 서명 파트를 붙입니다.
///
/// 사용자 이름이 길어 파트 길이가 u16을 넘으면 `ProtocolError`입니다.
pub fn sign_packet(user: &str, password: &str, payload: &[u8]) -> Result<Vec<u8>, CollectdError> {
    let part_len = u16::try_from(4 + SIGNATURE_LEN + user.len())
        .map_err(|_| CollectdError::protocol("User name too long."))?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, password.as_bytes());
    let mut signed = Vec::with_capacity(user.len() + payload.len());
    signed.extend_from_slice(user.as_bytes());
    signed.extend_from_slice(payload);
    let tag = hmac::sign(&key, &signed);

    let mut out = Vec::with_capacity(usize::from(part_len) + payload.len());
    out.extend_from_slice(&TYPE_SIGN_SHA256.to_be_bytes());
    out.extend_from_slice(&part_len.to_be_bytes());
    out.extend_from_slice(tag.as_ref());
    out.extend_from_slice(&signed);
    Ok(out)
}

/// 페이로드를 암호화 파트 하나로 감쌉니다.
pub fn encrypt_packet(
    user: &str,
    password: &str,
    iv: [u8; IV_LEN],
    payload: &[u8],
) -> Result<Vec<u8>, CollectdError> {
    let checksum = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, payload);
    let mut body = Vec::with_capacity(CHECKSUM_LEN + payload.len());
    body.extend_from_slice(checksum.as_ref());
    body.extend_from_slice(payload);
    apply_keystream(password, &iv, &mut body)?;

    let part_len = 4 + 2 + user.len() + IV_LEN + body.len();
    let part_len = u16::try_from(part_len)
        .map_err(|_| CollectdError::protocol("Encrypted packet too large."))?;
    let user_len = u16::try_from(user.len())
        .map_err(|_| CollectdError::protocol("User name too long."))?;

    let mut out = Vec::with_capacity(usize::from(part_len));
    out.extend_from_slice(&TYPE_ENCR_AES256.to_be_bytes());
    out.extend_from_slice(&part_len.to_be_bytes());
    out.extend_from_slice(&user_len.to_be_bytes());
    out.extend_from_slice(user.as_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&body);
    Ok(out)
}
