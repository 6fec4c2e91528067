use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;
use thiserror::Error;

use crate::error::AppError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_LENGTH: usize = 32;
const IV_LENGTH: usize = 16;
const SEPARATOR: &str = "::";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be 32 bytes, got {0}")]
    InvalidKey(usize),
    #[error("ciphertext is not in '<iv>::<data>' form")]
    MissingSeparator,
    #[error("ciphertext is not valid hex")]
    Hex(#[from] hex::FromHexError),
    #[error("initialization vector must be 16 bytes")]
    InvalidIv,
    #[error("ciphertext could not be unpadded")]
    Unpad,
    #[error("plaintext is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<CryptoError> for AppError {
    fn from(e: CryptoError) -> Self {
        AppError::server(format!("Crypto failure: {e}"))
    }
}

/// CryptoService
///
/// Symmetric AES-256-CBC helper with a fixed key and a fresh random IV per call.
/// Output is `hex(iv) + "::" + hex(ciphertext)`.
///
/// There is no integrity tag: a tampered ciphertext either fails to unpad or decrypts
/// to garbage. Do not use it where authenticity matters.
#[derive(Clone)]
pub struct CryptoService {
    key: [u8; KEY_LENGTH],
}

impl CryptoService {
    pub fn new(key: &str) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LENGTH] = key
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(key.len()))?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LENGTH];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        format!("{}{SEPARATOR}{}", hex::encode(iv), hex::encode(ciphertext))
    }

    pub fn decrypt(&self, encrypted: &str) -> Result<String, CryptoError> {
        let (iv, data) = encrypted
            .split_once(SEPARATOR)
            .ok_or(CryptoError::MissingSeparator)?;

        let iv: [u8; IV_LENGTH] = hex::decode(iv)?
            .try_into()
            .map_err(|_| CryptoError::InvalidIv)?;
        let data = hex::decode(data)?;

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&data)
            .map_err(|_| CryptoError::Unpad)?;

        Ok(String::from_utf8(plaintext)?)
    }
}

impl std::fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoService").finish_non_exhaustive()
    }
}
