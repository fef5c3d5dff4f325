//! 用户管理服务

use crate::{
    auth::password::CredentialHasher,
    error::AppError,
    models::user::{CreateUserRequest, NewUser, User},
    repository::UserStore,
    validation::UserValidator,
};
use std::sync::Arc;

pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
    validator: UserValidator,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn CredentialHasher>,
        validator: UserValidator,
    ) -> Self {
        Self {
            store,
            hasher,
            validator,
        }
    }

    /// 创建用户（不签发令牌）
    pub async fn create_user(&self, req: CreateUserRequest) -> Result<User, AppError> {
        self.validator.validate_registration(&req)?;

        let password_hash = self.hasher.hash(req.password).await?;

        let user = self
            .store
            .create(NewUser {
                name: req.name,
                email: req.email,
                password_hash,
                hobby: req.hobby,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }
}
