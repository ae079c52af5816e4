use axum::{Json, extract::State};
use chrono::Utc;

use crate::{
    AppState,
    auth::{AppJson, issue_token},
    confirmation,
    error::{AppError, AppResult, ErrorBody},
    handlers::conflict_as_validation,
    models::{NewUser, RESERVED_USERNAME, SignupRequest, TokenRequest, TokenResponse},
};

/// signup
///
/// [Public Route] Registers a username/email pair and mails a fresh confirmation code.
///
/// *Identity rules*:
/// - `me` is reserved (400).
/// - A known username must come with its registered email (400 otherwise); the pair is
///   accepted again and a new code replaces the old one.
/// - An email already bound to another username is rejected (400).
///
/// Delivery is fire-and-forget; the response does not wait for the mail.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Code sent", body = SignupRequest),
        (status = 400, description = "Invalid or conflicting identity", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> AppResult<Json<SignupRequest>> {
    payload.validate()?;

    let user = match state.repo.get_user_by_username(&payload.username).await? {
        Some(existing) if existing.email != payload.email => {
            return Err(AppError::Validation(
                "Email does not match the one registered for this username.".to_string(),
            ));
        }
        Some(existing) => existing,
        None => {
            if state.repo.get_user_by_email(&payload.email).await?.is_some() {
                return Err(AppError::Validation(
                    "This email is already registered to another username.".to_string(),
                ));
            }
            state
                .repo
                .create_user(NewUser::with_identity(
                    payload.username.clone(),
                    payload.email.clone(),
                ))
                .await
                .map_err(conflict_as_validation)?
        }
    };

    let code = confirmation::generate_code();
    state.repo.store_confirmation_code(user.id, code.clone()).await?;
    state.mailer.send_confirmation_code(&user.email, &code);

    tracing::info!(username = %user.username, "confirmation code issued");
    Ok(Json(payload))
}

/// obtain_token
///
/// [Public Route] Exchanges a username and its latest confirmation code for an access token.
///
/// A wrong, missing or expired code yields the same 400 so the response does not say
/// which part was wrong. Unknown usernames are 404.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid code or reserved username", body = ErrorBody),
        (status = 404, description = "Unknown username", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    AppJson(payload): AppJson<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    if payload.username == RESERVED_USERNAME {
        return Err(AppError::Validation(format!(
            "Username \"{RESERVED_USERNAME}\" is reserved."
        )));
    }

    let user = state
        .repo
        .get_user_by_username(&payload.username)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let stored = state.repo.get_confirmation_code(user.id).await?;
    let valid = stored.as_ref().is_some_and(|code| {
        confirmation::matches(
            code,
            &payload.confirmation_code,
            Utc::now(),
            state.config.confirmation_code_ttl_secs,
        )
    });
    if !valid {
        tracing::warn!(username = %user.username, "confirmation code rejected");
        return Err(AppError::Validation("Invalid confirmation code.".to_string()));
    }

    let token = issue_token(user.id, &state.config)?;
    tracing::info!(username = %user.username, "access token issued");
    Ok(Json(TokenResponse { token }))
}
