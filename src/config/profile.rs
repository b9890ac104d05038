use crate::error::{AppError, AppResult};

pub fn resolve_profile(requested: &str) -> AppResult<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Ok("default".to_string());
    }

    if trimmed.contains(['/', '\\']) || trimmed.starts_with('.') {
        return Err(AppError::InvalidInput(format!(
            "invalid profile name `{trimmed}`"
        )));
    }

    Ok(trimmed.to_string())
}
