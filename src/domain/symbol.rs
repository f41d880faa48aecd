use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Largest precision the ledger accepts for a token.
pub const MAX_PRECISION: u8 = 18;

/// Characters that fit in the 56 bits above the precision byte.
pub const MAX_SYMBOL_LEN: usize = 7;

/// A ledger token: its ticker name and how many fractional digits raw amounts carry.
/// On the ledger both live in one packed `u64` (see [`decode_symbol`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    pub precision: u8,
}

impl Token {
    /// Build a token, checking it can be packed.
    pub fn new(name: impl Into<String>, precision: u8) -> Result<Self, SymbolError> {
        let token = Self {
            name: name.into(),
            precision,
        };
        encode_symbol(&token)?;
        Ok(token)
    }
}

/// Unpack a ledger symbol value.
///
/// The low byte is the precision. Each following byte, least significant first, is one
/// character of the name; decoding stops at the first zero byte.
pub fn decode_symbol(packed: u64) -> Result<Token, SymbolError> {
    let precision = (packed & 0xFF) as u8;
    if precision > MAX_PRECISION {
        return Err(SymbolError::PrecisionOutOfRange(precision));
    }

    let mut name = String::new();
    let mut rest = packed >> 8;
    while rest != 0 {
        let byte = (rest & 0xFF) as u8;
        if byte == 0 {
            break;
        }
        if !is_symbol_char(byte) {
            return Err(SymbolError::InvalidCharacter(byte));
        }
        name.push(byte as char);
        rest >>= 8;
    }

    if name.is_empty() {
        return Err(SymbolError::EmptyName);
    }

    Ok(Token { name, precision })
}

/// Pack a token into the ledger's symbol value. Inverse of [`decode_symbol`].
pub fn encode_symbol(token: &Token) -> Result<u64, SymbolError> {
    if token.precision > MAX_PRECISION {
        return Err(SymbolError::PrecisionOutOfRange(token.precision));
    }
    let bytes = token.name.as_bytes();
    if bytes.is_empty() {
        return Err(SymbolError::EmptyName);
    }
    if bytes.len() > MAX_SYMBOL_LEN {
        return Err(SymbolError::NameTooLong(bytes.len()));
    }

    let mut packed = 0u64;
    for (i, &byte) in bytes.iter().enumerate() {
        if !is_symbol_char(byte) {
            return Err(SymbolError::InvalidCharacter(byte));
        }
        packed |= (byte as u64) << (8 * (i + 1));
    }

    Ok(packed | token.precision as u64)
}

/// Symbol names are uppercase ASCII letters only.
fn is_symbol_char(byte: u8) -> bool {
    byte.is_ascii_uppercase()
}

/// Textual form used by the ledger's JSON API: `"4,EOS"`.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.precision, self.name)
    }
}

impl FromStr for Token {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (precision, name) = s
            .trim()
            .split_once(',')
            .ok_or_else(|| SymbolError::Unparseable(s.to_string()))?;
        let precision: u8 = precision
            .trim()
            .parse()
            .map_err(|_| SymbolError::Unparseable(s.to_string()))?;
        Token::new(name.trim(), precision)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    EmptyName,
    NameTooLong(usize),
    InvalidCharacter(u8),
    PrecisionOutOfRange(u8),
    Unparseable(String),
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolError::EmptyName => write!(f, "symbol name is empty"),
            SymbolError::NameTooLong(len) => write!(
                f,
                "symbol name has {} characters, at most {} fit",
                len, MAX_SYMBOL_LEN
            ),
            SymbolError::InvalidCharacter(byte) => {
                write!(f, "symbol name may only hold A-Z, found byte 0x{:02x}", byte)
            }
            SymbolError::PrecisionOutOfRange(p) => {
                write!(f, "precision {} exceeds maximum of {}", p, MAX_PRECISION)
            }
            SymbolError::Unparseable(s) => write!(f, "cannot parse symbol '{}'", s),
        }
    }
}

impl std::error::Error for SymbolError {}
