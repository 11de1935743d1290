//! Verification codes for email confirmation and password reset.

use crate::error::{AppError, AppResult};
use crate::models::verification::code_types;
use crate::models::{Member, VerificationCode};
use crate::security::password::hash_blocking;
use crate::state::AppState;
use crate::validators::validate_password;
use serde::Deserialize;
use tracing::{info, warn};

fn default_code_type() -> i16 {
    code_types::EMAIL_VERIFICATION
}

fn default_reset_code_type() -> i16 {
    code_types::PASSWORD_RESET
}

/// Body of `/user/verify/code` and `/user/verify/renew`.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeRequest {
    #[serde(default = "default_code_type")]
    pub code_type: i16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckCodeRequest {
    pub code: String,
    #[serde(default = "default_code_type")]
    pub code_type: i16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetCodeRequest {
    pub email: String,
    #[serde(default = "default_reset_code_type")]
    pub code_type: i16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    #[serde(default = "default_reset_code_type")]
    pub code_type: i16,
    pub password: String,
}

/// Replace the member's codes with a fresh one and mail it.
///
/// Delivery failures are logged; the code stays valid either way.
pub async fn issue_and_send(
    state: &AppState,
    member: &Member,
    name: &str,
    code_type: i16,
    subject: &str,
) -> AppResult<VerificationCode> {
    let code = VerificationCode::generate(&member.id, &member.email, code_type);
    state.persistence.codes.replace_for_member(&code).await?;

    if let Err(e) = state
        .email
        .send_verification_code(&member.email, name, &code.code, subject)
        .await
    {
        warn!(member_id = %member.id, error = %e, "failed to deliver verification code");
    }
    Ok(code)
}

async fn member_by_id(state: &AppState, member_id: &str) -> AppResult<Member> {
    state
        .persistence
        .members
        .find(member_id)
        .await?
        .ok_or_else(|| AppError::NotFound("member".into()))
}

async fn member_by_email(state: &AppState, email: &str) -> AppResult<Member> {
    state
        .persistence
        .members
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound("email account".into()))
}

/// Display name to greet `member` with, empty when no profile exists.
async fn greeting_name(state: &AppState, member: &Member) -> String {
    match state.persistence.profiles.find_by_member(&member.id).await {
        Ok(Some(profile)) => profile.display_name,
        _ => String::new(),
    }
}

/// Look up an untaken, unexpired code and mark it taken.
async fn consume(
    state: &AppState,
    member_id: &str,
    code: &str,
    code_type: i16,
) -> AppResult<VerificationCode> {
    let found = state
        .persistence
        .codes
        .find_untaken(member_id, code.trim(), code_type)
        .await?
        .ok_or_else(|| AppError::Validation("invalid_code".into()))?;

    if found.is_expired() {
        return Err(AppError::Validation("token_expired".into()));
    }

    state.persistence.codes.mark_taken(&found.id).await?;
    Ok(found)
}

pub async fn request_code(state: &AppState, member_id: &str, req: CodeRequest) -> AppResult<()> {
    let member = member_by_id(state, member_id).await?;
    let name = greeting_name(state, &member).await;
    issue_and_send(state, &member, &name, req.code_type, "New Verification Code").await?;
    Ok(())
}

pub async fn renew_code(state: &AppState, member_id: &str, req: CodeRequest) -> AppResult<()> {
    let member = member_by_id(state, member_id).await?;
    let name = greeting_name(state, &member).await;
    issue_and_send(state, &member, &name, req.code_type, "Renew Verification Code").await?;
    Ok(())
}

pub async fn check_code(state: &AppState, member_id: &str, req: CheckCodeRequest) -> AppResult<()> {
    consume(state, member_id, &req.code, req.code_type).await?;
    state.persistence.members.mark_verified(member_id).await?;
    info!(member_id, "member verified");
    Ok(())
}

pub async fn request_reset_code(state: &AppState, req: ResetCodeRequest) -> AppResult<()> {
    let member = member_by_email(state, &req.email).await?;
    let name = greeting_name(state, &member).await;
    issue_and_send(state, &member, &name, req.code_type, "Password Reset Code").await?;
    Ok(())
}

pub async fn reset_password(state: &AppState, req: ResetPasswordRequest) -> AppResult<()> {
    if !validate_password(&req.password) {
        return Err(AppError::Validation("invalid_password".into()));
    }

    let member = member_by_email(state, &req.email).await?;
    consume(state, &member.id, &req.code, req.code_type).await?;

    let hash = hash_blocking(
        state.passwords.clone(),
        member.id.clone(),
        member.email.clone(),
        req.password,
    )
    .await?;
    state.persistence.members.update_password(&member.id, &hash).await?;
    info!(member_id = %member.id, "password reset");
    Ok(())
}
