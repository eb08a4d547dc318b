//! JWT verification for tokens issued by the auth service

use crate::config::JwtConfig;
use crate::domain::{Identity, Tenant, ALL_APPS, ALL_ORGS};
use crate::error::{AppError, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Permission granting the admin API
pub const PERMISSION_SURVEYS_ADMIN: &str = "surveys_admin";
/// Blanket permission over every survey in the tenant
pub const PERMISSION_ALL_SURVEYS: &str = "all_surveys";

/// Access token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID)
    pub sub: String,
    pub org_id: String,
    pub app_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Set for system administrators, who may act on every scope
    #[serde(default)]
    pub system: bool,
    /// External identifiers of the account, keyed by field name
    #[serde(default)]
    pub external_ids: HashMap<String, String>,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn actor(&self) -> Identity {
        Identity {
            account_id: self.sub.clone(),
            external_ids: self.external_ids.clone(),
        }
    }

    pub fn tenant(&self) -> Tenant {
        Tenant::new(&self.org_id, &self.app_id)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_admin(&self) -> bool {
        self.has_permission(PERMISSION_SURVEYS_ADMIN) || self.has_permission(PERMISSION_ALL_SURVEYS)
    }

    /// Whether the caller may manage a record scoped to (app, org).
    ///
    /// System records need a system caller. A system caller reaches every
    /// scope; anyone else only their own app and org or the wildcard.
    pub fn can_access(&self, app_id: &str, org_id: &str, system: bool) -> bool {
        if self.system {
            return true;
        }
        !system
            && (app_id == self.app_id || app_id == ALL_APPS)
            && (org_id == self.org_id || org_id == ALL_ORGS)
    }
}

/// JWT token manager
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Result<Self> {
        let (algorithm, encoding_key, decoding_key) = match config.public_key_pem.as_ref() {
            Some(public_key) => (
                Algorithm::RS256,
                None,
                DecodingKey::from_rsa_pem(public_key.as_bytes())?,
            ),
            None => (
                Algorithm::HS256,
                Some(EncodingKey::from_secret(config.secret.as_bytes())),
                DecodingKey::from_secret(config.secret.as_bytes()),
            ),
        };
        Ok(Self {
            config,
            encoding_key,
            decoding_key,
            algorithm,
        })
    }

    /// 5 second leeway instead of the default 60
    fn strict_validation(&self) -> Validation {
        let mut v = Validation::new(self.algorithm);
        v.leeway = 5;
        v.validate_aud = false;
        v
    }

    /// Verify and decode an access token
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = self.strict_validation();
        validation.set_issuer(&[&self.config.issuer]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    /// Sign claims with the shared secret. Only available in HS256 mode;
    /// with a public key the service can verify but never issue.
    pub fn create_token(&self, claims: &Claims) -> Result<String> {
        let key = self.encoding_key.as_ref().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "Token signing is unavailable when verifying with a public key"
            ))
        })?;
        Ok(encode(&Header::new(self.algorithm), claims, key)?)
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn manager() -> JwtManager {
        JwtManager::new(JwtConfig {
            secret: "test-secret-key-for-surveys".to_string(),
            issuer: "https://auth.test".to_string(),
            public_key_pem: None,
        })
        .unwrap()
    }

    fn claims() -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: "u1".to_string(),
            org_id: "o1".to_string(),
            app_id: "a1".to_string(),
            permissions: vec![],
            system: false,
            external_ids: HashMap::from([("uin".to_string(), "123456".to_string())]),
            iss: "https://auth.test".to_string(),
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn test_create_and_verify_token() {
        let manager = manager();
        let token = manager.create_token(&claims()).unwrap();
        let decoded = manager.verify_token(&token).unwrap();
        assert_eq!(decoded, claims());
        assert_eq!(decoded.actor().external_id("uin"), "123456");
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = manager();
        let mut expired = claims();
        expired.exp = Utc::now().timestamp() - 120;
        let token = manager.create_token(&expired).unwrap();
        assert!(matches!(manager.verify_token(&token), Err(AppError::Jwt(_))));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let manager = manager();
        let mut other = claims();
        other.iss = "https://elsewhere".to_string();
        let token = manager.create_token(&other).unwrap();
        assert!(manager.verify_token(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = JwtManager::new(JwtConfig {
            secret: "another-secret".to_string(),
            issuer: "https://auth.test".to_string(),
            public_key_pem: None,
        })
        .unwrap();
        let token = other.create_token(&claims()).unwrap();
        assert!(manager().verify_token(&token).is_err());
    }

    #[test]
    fn test_admin_permissions() {
        let mut c = claims();
        assert!(!c.is_admin());
        c.permissions = vec![PERMISSION_ALL_SURVEYS.to_string()];
        assert!(c.is_admin());
        c.permissions = vec![PERMISSION_SURVEYS_ADMIN.to_string()];
        assert!(c.is_admin());
    }

    #[rstest]
    #[case::own_scope("a1", "o1", false, false, true)]
    #[case::all_apps("all", "o1", false, false, true)]
    #[case::all_orgs("a1", "all", false, false, true)]
    #[case::other_org("a1", "o2", false, false, false)]
    #[case::other_app("a2", "o1", false, false, false)]
    #[case::system_record("a1", "o1", true, false, false)]
    #[case::system_caller_any_scope("a9", "o9", true, true, true)]
    fn test_can_access(
        #[case] app_id: &str,
        #[case] org_id: &str,
        #[case] system_record: bool,
        #[case] system_caller: bool,
        #[case] expected: bool,
    ) {
        let mut c = claims();
        c.system = system_caller;
        assert_eq!(c.can_access(app_id, org_id, system_record), expected);
    }
}
