use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Map;
use uuid::Uuid;

use super::presence::PresenceService;
use crate::database::RecordStore;
use crate::error::AppError;
use crate::models::{Entity, EntityKind, GeoPoint, NewCredentials, NewEntity};
use crate::utils::{generate_token, hash_password, verify_password};

#[derive(Debug, Clone, Serialize)]
pub struct LoginToken {
    pub token: String,
    pub expires_at: i64,
    pub user_id: String,
    pub username: String,
}

/// 注册与登录，签发的令牌在中间件中解析为调用者身份
pub struct AuthService {
    store: Arc<dyn RecordStore>,
    presence: Arc<PresenceService>,
    jwt_secret: String,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

fn validate_username(username: &str) -> Result<(), AppError> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(AppError::InvalidInput("用户名长度必须在3-32个字符之间".into()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::InvalidInput("用户名只能包含字母、数字和下划线".into()));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AppError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::InvalidInput("邮箱格式不正确".into())),
    }
}

fn validate_password(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if !(6..=64).contains(&len) {
        return Err(AppError::InvalidInput("密码长度必须在6-64个字符之间".into()));
    }
    Ok(())
}

impl AuthService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        presence: Arc<PresenceService>,
        jwt_secret: String,
        token_ttl: Duration,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            store,
            presence,
            jwt_secret,
            token_ttl,
            bcrypt_cost,
        }
    }

    /// 注册新用户，返回用户实体
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Entity, AppError> {
        let username = username.trim();
        let email = email.trim();
        validate_username(username)?;
        validate_email(email)?;
        validate_password(password)?;

        // bcrypt 是CPU密集操作，放到阻塞线程池
        let cost = self.bcrypt_cost;
        let plain = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&plain, cost))
            .await
            .map_err(|e| AppError::Internal(format!("hash task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))?;

        let entity = NewEntity {
            public_id: Uuid::new_v4().to_string(),
            display_name: username.to_string(),
            kind: EntityKind::User,
            position: GeoPoint::default(),
            attributes: Map::new(),
        };
        let credentials = NewCredentials {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
        };

        let user = self
            .store
            .insert_user(entity, credentials)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict("用户名或邮箱已被使用".into()),
                other => other,
            })?;

        if let Err(e) = self
            .presence
            .cache_entity(&user, self.presence.policy().entity_ttl)
            .await
        {
            tracing::warn!(public_id = %user.public_id, error = %e, "failed to cache new user");
        }

        tracing::info!("User registered: {} ({})", username, user.public_id);
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginToken, AppError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::InvalidInput("用户名和密码不能为空".into()));
        }

        let credentials = self
            .store
            .find_credentials(username)
            .await
            .inspect_err(|e| tracing::error!(username, error = %e, "credential lookup failed"))?
            .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;

        let plain = password.to_string();
        let hash = credentials.password_hash.clone();
        let matched = tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("verify task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("failed to verify password: {}", e)))?;
        if !matched {
            tracing::warn!("Failed login attempt for {}", username);
            return Err(AppError::Unauthorized);
        }

        let (token, expires_at) = generate_token(
            &credentials.public_id,
            &credentials.username,
            &self.jwt_secret,
            self.token_ttl,
        )
        .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))?;

        tracing::info!("User logged in: {}", username);
        Ok(LoginToken {
            token,
            expires_at,
            user_id: credentials.public_id,
            username: credentials.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::entity_key;
    use crate::cache::GeoCache;
    use crate::services::testing::Fixture;
    use crate::utils::verify_token;

    const SECRET: &str = "test-secret";

    fn auth(fx: &Fixture) -> AuthService {
        AuthService::new(
            fx.store.clone(),
            fx.presence.clone(),
            SECRET.into(),
            Duration::from_secs(3600),
            4,
        )
    }

    #[tokio::test]
    async fn register_then_login_issues_token_for_public_id() {
        let fx = Fixture::new();
        let auth = auth(&fx);

        let user = auth
            .register("alice_1", "alice@example.com", "hunter22")
            .await
            .unwrap();
        assert!(user.is_user());
        assert!(fx
            .cache
            .get_payload(&entity_key(&user.public_id))
            .await
            .unwrap()
            .is_some());

        let login = auth.login("alice_1", "hunter22").await.unwrap();
        assert_eq!(login.user_id, user.public_id);
        let claims = verify_token(&login.token, SECRET).unwrap();
        assert_eq!(claims.sub, user.public_id);
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let fx = Fixture::new();
        let auth = auth(&fx);
        auth.register("alice_1", "alice@example.com", "hunter22")
            .await
            .unwrap();

        assert!(matches!(
            auth.register("alice_1", "other@example.com", "hunter22").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            auth.register("alice_2", "alice@example.com", "hunter22").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let fx = Fixture::new();
        let auth = auth(&fx);

        for (username, email, password) in [
            ("ab", "a@example.com", "hunter22"),
            ("bad name", "a@example.com", "hunter22"),
            ("alice", "not-an-email", "hunter22"),
            ("alice", "a@example.com", "short"),
        ] {
            assert!(matches!(
                auth.register(username, email, password).await,
                Err(AppError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn login_failures() {
        let fx = Fixture::new();
        let auth = auth(&fx);
        auth.register("alice_1", "alice@example.com", "hunter22")
            .await
            .unwrap();

        assert!(matches!(
            auth.login("alice_1", "wrong-pass").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            auth.login("nobody", "hunter22").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            auth.login("", "").await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
