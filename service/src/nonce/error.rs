//! Rejection reasons produced by the replay guard.

use std::str::FromStr;

/// Language used when rendering a rejection message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lang {
    #[default]
    EnUs,
    ZhCn,
}

impl Lang {
    /// Pick a language from a loose tag such as `zh_cn`, `zh-CN` or an
    /// `Accept-Language` value. Anything not Chinese falls back to English.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim_start().to_ascii_lowercase().starts_with("zh") {
            Self::ZhCn
        } else {
            Self::EnUs
        }
    }
}

impl FromStr for Lang {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

/// Why a request carrying (or lacking) a nonce was refused.
///
/// Every variant is terminal for the request and is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NonceRejection {
    #[error("Missing nonce!")]
    MissingNonce,
    #[error("Invalid nonce!")]
    InvalidNonce,
    #[error("Nonce already exists!")]
    NonceExist,
    #[error("Nonce count exceed!")]
    NonceCountExceed,
}

impl NonceRejection {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingNonce => "MissingNonce",
            Self::InvalidNonce => "InvalidNonce",
            Self::NonceExist => "NonceExist",
            Self::NonceCountExceed => "NonceCountExceed",
        }
    }

    #[must_use]
    pub const fn message(self, lang: Lang) -> &'static str {
        match (self, lang) {
            (Self::MissingNonce, Lang::EnUs) => "Missing nonce!",
            (Self::MissingNonce, Lang::ZhCn) => "缺少随机串！",
            (Self::InvalidNonce, Lang::EnUs) => "Invalid nonce!",
            (Self::InvalidNonce, Lang::ZhCn) => "无效的随机串！",
            (Self::NonceExist, Lang::EnUs) => "Nonce already exists!",
            (Self::NonceExist, Lang::ZhCn) => "随机串已存在！",
            (Self::NonceCountExceed, Lang::EnUs) => "Nonce count exceed!",
            (Self::NonceCountExceed, Lang::ZhCn) => "随机串数量超出限制！",
        }
    }
}
