//! 認証情報の管理
//!
//! 管理画面からコピーした Cookie 文字列とログインIDを `credentials.toml` に保存します。
//! `config.toml` とは別ファイルです。

use super::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Cookie文字列を上書きする環境変数
pub const ENV_COOKIE: &str = "SRPAY_COOKIE";
/// ログインIDを上書きする環境変数
pub const ENV_LOGIN_ID: &str = "SRPAY_LOGIN_ID";
/// 日本語ページを返させるための言語Cookie
pub const LANGUAGE_COOKIE: (&str, &str) = ("i18n_redirected", "ja");

/// 保存される認証情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizerCredentials {
    /// DevTools からコピーした Cookie 文字列
    pub cookie: String,
    /// オーガナイザーのログインID（事務所合計行の表示に使う）
    #[serde(default)]
    pub login_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub acquired_at: DateTime<Utc>,
}

impl OrganizerCredentials {
    pub fn new(cookie: impl Into<String>, login_id: Option<String>) -> Self {
        Self {
            cookie: cookie.into(),
            login_id: login_id.filter(|id| !id.trim().is_empty()),
            acquired_at: Utc::now(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.session().is_ok()
    }

    /// リクエストに使うセッションを作成
    pub fn session(&self) -> AuthResult<OrganizerSession> {
        OrganizerSession::from_cookie_string(&self.cookie, self.login_id.clone())
    }

    /// 表示用に値を伏せた Cookie 名一覧
    pub fn masked(&self) -> String {
        parse_cookie_pairs(&self.cookie)
            .iter()
            .map(|(name, _)| format!("{name}=***"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// `name=value; name2=value2` を組に分解。`=` を含まない断片は捨てる。
pub fn parse_cookie_pairs(cookie_string: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();

    for part in cookie_string.split(';') {
        let Some((name, value)) = part.trim().split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        // 同名は後勝ち
        match pairs.iter_mut().find(|(existing, _)| existing == name) {
            Some(pair) => pair.1 = value.trim().to_string(),
            None => pairs.push((name.to_string(), value.trim().to_string())),
        }
    }

    pairs
}

/// 認証済みセッション（CookieヘッダーとログインID）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizerSession {
    cookie_header: String,
    login_id: Option<String>,
}

impl OrganizerSession {
    pub fn from_cookie_string(cookie_string: &str, login_id: Option<String>) -> AuthResult<Self> {
        let mut pairs = parse_cookie_pairs(cookie_string);
        if pairs.is_empty() {
            return Err(AuthError::InvalidCookie(
                "no name=value pairs found in cookie string".to_string(),
            ));
        }

        let (lang_name, lang_value) = LANGUAGE_COOKIE;
        pairs.retain(|(name, _)| name != lang_name);
        pairs.push((lang_name.to_string(), lang_value.to_string()));

        let cookie_header = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        // 改行や制御文字を含むとヘッダーに載せられない
        reqwest::header::HeaderValue::from_str(&cookie_header).map_err(|_| {
            AuthError::InvalidCookie(
                "cookie string contains characters not allowed in an HTTP header".to_string(),
            )
        })?;

        Ok(Self {
            cookie_header,
            login_id,
        })
    }

    pub fn cookie_header(&self) -> &str {
        &self.cookie_header
    }

    pub fn login_id(&self) -> Option<&str> {
        self.login_id.as_deref()
    }
}

/// 認証情報ファイルの構造
#[derive(Debug, Serialize, Deserialize)]
struct CredentialFile {
    organizer: OrganizerCredentials,
}

/// 認証情報の保存先
pub struct CredentialStore {
    credentials_path: PathBuf,
}

impl CredentialStore {
    /// * `config_dir` - 設定ディレクトリのパス（例: ~/.config/srpay）
    pub fn new(config_dir: PathBuf) -> Self {
        let credentials_path = config_dir.join("credentials.toml");
        Self { credentials_path }
    }

    pub fn with_default_dir() -> AuthResult<Self> {
        let config_dir = crate::config::project_dirs()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| AuthError::LoadError("Failed to determine config directory".into()))?;

        Ok(Self::new(config_dir))
    }

    pub fn save(&self, credentials: &OrganizerCredentials) -> AuthResult<()> {
        if !credentials.is_valid() {
            return Err(AuthError::InvalidCookie(
                "refusing to save a cookie string without name=value pairs".into(),
            ));
        }

        if let Some(parent) = self.credentials_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = CredentialFile {
            organizer: credentials.clone(),
        };

        let toml_string = toml::to_string_pretty(&file)?;
        fs::write(&self.credentials_path, toml_string)
            .map_err(|e| AuthError::SaveError(e.to_string()))?;

        tracing::info!(path = %self.credentials_path.display(), "🔐 Credentials saved");
        Ok(())
    }

    pub fn load(&self) -> AuthResult<OrganizerCredentials> {
        if !self.credentials_path.exists() {
            return Err(AuthError::LoadError("Credentials file not found".into()));
        }

        let content = fs::read_to_string(&self.credentials_path)?;
        let file: CredentialFile = toml::from_str(&content)?;

        if !file.organizer.is_valid() {
            return Err(AuthError::InvalidCookie("stored cookie string is empty".into()));
        }

        Ok(file.organizer)
    }

    /// 環境変数を優先し、無ければファイルから読み込む
    pub fn resolve(&self) -> AuthResult<OrganizerCredentials> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(&self, lookup: F) -> AuthResult<OrganizerCredentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_cookie = lookup(ENV_COOKIE).filter(|c| !c.trim().is_empty());
        let env_login_id = lookup(ENV_LOGIN_ID).filter(|id| !id.trim().is_empty());

        if let Some(cookie) = env_cookie {
            tracing::debug!("🔑 Using organizer cookie from {}", ENV_COOKIE);
            let login_id = env_login_id.or_else(|| self.load().ok().and_then(|c| c.login_id));
            return Ok(OrganizerCredentials::new(cookie, login_id));
        }

        if !self.exists() {
            return Err(AuthError::NotConfigured { env: ENV_COOKIE });
        }

        let mut credentials = self.load()?;
        if env_login_id.is_some() {
            credentials.login_id = env_login_id;
        }
        Ok(credentials)
    }

    pub fn exists(&self) -> bool {
        self.credentials_path.exists()
    }

    pub fn delete(&self) -> AuthResult<()> {
        if self.credentials_path.exists() {
            fs::remove_file(&self.credentials_path)?;
        }
        Ok(())
    }

    pub fn credentials_path(&self) -> &PathBuf {
        &self.credentials_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_credentials() -> OrganizerCredentials {
        OrganizerCredentials::new("sr_id=abc123; f=xyz", Some("mk_agency".into()))
    }

    #[test]
    fn test_parse_cookie_pairs() {
        let pairs = parse_cookie_pairs(" sr_id = abc ; broken; f=1=2; ;=x; sr_id=def");
        assert_eq!(
            pairs,
            vec![
                ("sr_id".to_string(), "def".to_string()),
                ("f".to_string(), "1=2".to_string()),
            ]
        );
        assert!(parse_cookie_pairs("").is_empty());
        assert!(parse_cookie_pairs("no pairs here").is_empty());
    }

    #[test]
    fn test_session_appends_language_cookie() {
        let session = OrganizerSession::from_cookie_string("sr_id=abc; i18n_redirected=en", None)
            .unwrap();
        assert_eq!(session.cookie_header(), "sr_id=abc; i18n_redirected=ja");
        assert_eq!(session.login_id(), None);
    }

    #[test]
    fn test_session_rejects_unparseable_cookie() {
        let result = OrganizerSession::from_cookie_string("   ", None);
        assert!(matches!(result, Err(AuthError::InvalidCookie(_))));
    }

    #[test]
    fn test_session_rejects_header_unsafe_cookie() {
        for cookie in ["sr_id=abc\u{7}", "sr_id=a\nb; f=1", "sr_id=a\u{7f}"] {
            let result = OrganizerSession::from_cookie_string(cookie, None);
            assert!(
                matches!(result, Err(AuthError::InvalidCookie(_))),
                "{cookie:?} should be rejected"
            );
            assert!(!OrganizerCredentials::new(cookie, None).is_valid());
        }
    }

    #[test]
    fn test_masked_hides_values() {
        assert_eq!(create_test_credentials().masked(), "sr_id=***; f=***");
    }

    #[test]
    fn test_store_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().to_path_buf());

        let credentials = create_test_credentials();
        store.save(&credentials).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.cookie, credentials.cookie);
        assert_eq!(loaded.login_id.as_deref(), Some("mk_agency"));

        let content = fs::read_to_string(store.credentials_path()).unwrap();
        assert!(content.contains("[organizer]"));
        assert!(content.contains("login_id = \"mk_agency\""));
    }

    #[test]
    fn test_store_refuses_invalid_cookie() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().to_path_buf());

        let result = store.save(&OrganizerCredentials::new("garbage", None));
        assert!(matches!(result, Err(AuthError::InvalidCookie(_))));
        assert!(!store.exists());
    }

    #[test]
    fn test_store_delete_and_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().join("nested"));

        assert!(store.load().is_err());
        store.save(&create_test_credentials()).unwrap();
        assert!(store.exists());

        store.delete().unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn test_resolve_prefers_environment() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().to_path_buf());
        store.save(&create_test_credentials()).unwrap();

        let resolved = store
            .resolve_with(|key| (key == ENV_COOKIE).then(|| "sr_id=from_env".to_string()))
            .unwrap();

        assert_eq!(resolved.cookie, "sr_id=from_env");
        // ログインIDはファイルから補完される
        assert_eq!(resolved.login_id.as_deref(), Some("mk_agency"));
    }

    #[test]
    fn test_resolve_login_id_override_and_not_configured() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().to_path_buf());

        let missing = store.resolve_with(|_| None);
        assert!(matches!(missing, Err(AuthError::NotConfigured { .. })));

        store.save(&create_test_credentials()).unwrap();
        let resolved = store
            .resolve_with(|key| (key == ENV_LOGIN_ID).then(|| "other".to_string()))
            .unwrap();
        assert_eq!(resolved.cookie, "sr_id=abc123; f=xyz");
        assert_eq!(resolved.login_id.as_deref(), Some("other"));
    }
}
