//! オーガナイザー認証モジュール
//!
//! SHOWROOM オーガナイザー管理画面へのアクセスに必要な認証情報を扱います。
//!
//! ## 機能
//!
//! - Cookie文字列の解析（言語Cookieの付与を含む）
//! - 認証情報の保存・読み込み（`credentials.toml`）
//! - 環境変数による上書き

mod credential_store;

pub use credential_store::{
    parse_cookie_pairs, CredentialStore, OrganizerCredentials, OrganizerSession, ENV_COOKIE,
    ENV_LOGIN_ID, LANGUAGE_COOKIE,
};

/// 認証関連のエラー型
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Cookie文字列から有効な組が得られない
    #[error("Invalid organizer cookie: {0}")]
    InvalidCookie(String),

    /// 認証情報が未設定
    #[error("Organizer credentials not configured (run `srpay auth set` or set {env})")]
    NotConfigured { env: &'static str },

    /// 保存エラー
    #[error("Failed to save credentials: {0}")]
    SaveError(String),

    /// 読み込みエラー
    #[error("Failed to load credentials: {0}")]
    LoadError(String),

    /// I/Oエラー
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML解析エラー
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOMLシリアライズエラー
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;
