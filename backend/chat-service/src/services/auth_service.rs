//! Account flows: sign-up, sign-in, logout, token refresh and password change.

use crate::error::{AppError, AppResult};
use crate::models::verification::code_types;
use crate::models::{Member, Profile};
use crate::security::password::{hash_blocking, verify_blocking};
use crate::services::verification;
use crate::state::AppState;
use crate::validators::{validate_email, validate_password};
use chrono::Utc;
use jwt_security::TokenPair;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub display_name: String,
    #[serde(default)]
    pub unique_id: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub unique_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Body returned by sign-up and sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub token: TokenPair,
    pub member: Member,
    pub profile: Profile,
}

/// Where a sign-in came from, for the new-device alert.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: String,
    pub address: String,
}

fn validate_credentials(email: &str, password: &str) -> AppResult<()> {
    if !validate_email(email.trim()) {
        return Err(AppError::Validation("invalid_email".into()));
    }
    if !validate_password(password) {
        return Err(AppError::Validation("invalid_password".into()));
    }
    Ok(())
}

pub async fn sign_up(state: &AppState, req: SignUpRequest) -> AppResult<SessionResponse> {
    validate_credentials(&req.email, &req.password)?;
    if req.display_name.trim().is_empty() {
        return Err(AppError::Validation("invalid_display_name".into()));
    }

    let mut member = Member::prepare(&req.email);
    member.password_hash = hash_blocking(
        state.passwords.clone(),
        member.id.clone(),
        member.email.clone(),
        req.password.clone(),
    )
    .await?;
    state.persistence.members.create(&member).await?;

    let image = req
        .profile_image
        .filter(|img| !img.trim().is_empty())
        .unwrap_or_else(|| state.config.default_profile_pic.clone());
    let profile = Profile::default_for(&member.id, &member.email, &req.display_name, &image);

    if let Err(e) = state.persistence.profiles.create(&profile).await {
        if let Err(cleanup) = state.persistence.members.delete(&member.id).await {
            warn!(member_id = %member.id, error = %cleanup, "failed to roll back member after profile error");
        }
        return Err(e);
    }

    let token = state
        .tokens
        .issue(&member.id, &profile.id, &req.unique_id)
        .await?;

    verification::issue_and_send(
        state,
        &member,
        &profile.display_name,
        code_types::EMAIL_VERIFICATION,
        "Sign Up Verification Code",
    )
    .await?;

    info!(member_id = %member.id, profile_id = %profile.id, "member signed up");
    Ok(SessionResponse {
        token,
        member,
        profile,
    })
}

pub async fn sign_in(
    state: &AppState,
    req: SignInRequest,
    client: ClientInfo,
) -> AppResult<SessionResponse> {
    validate_credentials(&req.email, &req.password)?;

    let member = state
        .persistence
        .members
        .find_by_email(&req.email)
        .await?
        .ok_or_else(|| AppError::NotFound("member".into()))?;

    let matches = verify_blocking(
        state.passwords.clone(),
        member.id.clone(),
        member.email.clone(),
        req.password.clone(),
        member.password_hash.clone(),
    )
    .await?;
    if !matches {
        return Err(AppError::NotFound("member".into()));
    }

    let profile = state
        .persistence
        .profiles
        .find_by_member(&member.id)
        .await?
        .ok_or_else(|| AppError::NotFound("profile".into()))?;

    let existing_sessions = match state.tokens.active_sessions(&member.id).await {
        Ok(sessions) => sessions,
        Err(e) => {
            warn!(member_id = %member.id, error = %e, "could not list active sessions");
            Vec::new()
        }
    };

    let token = state
        .tokens
        .issue(&member.id, &profile.id, &req.unique_id)
        .await?;

    if !existing_sessions.is_empty() {
        let login_time = Utc::now().format("%a %b %e %H:%M:%S %Y").to_string();
        if let Err(e) = state
            .email
            .send_active_login_alert(
                &member.email,
                &profile.display_name,
                &client.user_agent,
                &client.address,
                &login_time,
            )
            .await
        {
            warn!(member_id = %member.id, error = %e, "failed to send sign-in alert");
        }
    }

    if !member.verified {
        verification::issue_and_send(
            state,
            &member,
            &profile.display_name,
            code_types::EMAIL_VERIFICATION,
            "New Login Verification Code",
        )
        .await?;
    }

    Ok(SessionResponse {
        token,
        member,
        profile,
    })
}

pub async fn logout(state: &AppState, access_uuid: &str, user_id: &str) -> AppResult<()> {
    state.tokens.revoke_access(access_uuid, user_id).await?;
    Ok(())
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<TokenPair> {
    Ok(state.tokens.rotate(refresh_token).await?)
}

pub async fn update_password(
    state: &AppState,
    member_id: &str,
    req: UpdatePasswordRequest,
) -> AppResult<()> {
    let member = state
        .persistence
        .members
        .find(member_id)
        .await?
        .ok_or_else(|| AppError::NotFound("member".into()))?;

    let matches = verify_blocking(
        state.passwords.clone(),
        member.id.clone(),
        member.email.clone(),
        req.password.clone(),
        member.password_hash.clone(),
    )
    .await?;
    if !matches {
        return Err(AppError::Unauthorized);
    }

    if req.new_password != req.confirm_password {
        return Err(AppError::Validation("password_mismatch".into()));
    }
    if !validate_password(&req.new_password) {
        return Err(AppError::Validation("invalid_password".into()));
    }

    let hash = hash_blocking(
        state.passwords.clone(),
        member.id.clone(),
        member.email.clone(),
        req.new_password,
    )
    .await?;
    state.persistence.members.update_password(&member.id, &hash).await
}
