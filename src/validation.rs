//! 请求校验
//! 结构规则由 validator 派生宏负责，密码强度与姓名规则由 UserValidator 负责

use crate::{
    config::SecurityConfig,
    error::{AppError, FieldErrors},
    models::user::CreateUserRequest,
};
use validator::{Validate, ValidationErrors};

/// 允许的特殊字符集合
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

/// 姓名最小长度（去除首尾空白后）
pub const NAME_MIN_LENGTH: usize = 2;

/// 用户输入校验器，由配置构建并通过应用状态注入
#[derive(Debug, Clone)]
pub struct UserValidator {
    password_min_length: usize,
    require_uppercase: bool,
    require_digit: bool,
    require_special: bool,
}

impl UserValidator {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            password_min_length: config.password_min_length,
            require_uppercase: config.password_require_uppercase,
            require_digit: config.password_require_digit,
            require_special: config.password_require_special,
        }
    }

    /// 校验注册 / 创建用户请求，所有字段错误一次性返回
    pub fn validate_registration(&self, req: &CreateUserRequest) -> Result<(), AppError> {
        let mut fields = match req.validate() {
            Ok(()) => FieldErrors::new(),
            Err(errors) => collect_field_errors(&errors),
        };

        if !fields.contains_key("name") {
            if let Err(msg) = check_name(&req.name) {
                fields.insert("name".to_string(), msg.to_string());
            }
        }

        if !fields.contains_key("password") {
            if let Err(msg) = self.check_password(&req.password) {
                fields.insert("password".to_string(), msg);
            }
        }

        if fields.is_empty() {
            Ok(())
        } else {
            tracing::debug!(fields = ?fields.keys().collect::<Vec<_>>(), "Registration payload rejected");
            Err(AppError::validation(fields))
        }
    }

    /// 密码策略检查
    pub fn check_password(&self, password: &str) -> Result<(), String> {
        if password.chars().count() < self.password_min_length {
            return Err(format!(
                "Password must be at least {} characters long",
                self.password_min_length
            ));
        }

        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err("Password must contain at least one uppercase letter".to_string());
        }

        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err("Password must contain at least one digit".to_string());
        }

        if self.require_special && !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
            return Err("Password must contain at least one special character".to_string());
        }

        Ok(())
    }
}

/// 姓名规则：去除首尾空白后至少 2 个字符，仅允许字母和空格
pub fn check_name(name: &str) -> Result<(), &'static str> {
    let name = name.trim();

    if name.chars().count() < NAME_MIN_LENGTH {
        return Err("Name must be at least 2 characters long");
    }

    if !name.chars().all(|c| c.is_ascii_alphabetic() || c.is_whitespace()) {
        return Err("Name must contain only letters and spaces");
    }

    Ok(())
}

/// 将 validator 的错误转换为 字段 -> 首条消息
pub fn collect_field_errors(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            errs.first().map(|err| {
                let msg = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                (field.to_string(), msg)
            })
        })
        .collect()
}
